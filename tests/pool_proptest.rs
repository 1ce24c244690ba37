use lineage::{Protected, ResourcePool};
use proptest::prelude::*;
use std::collections::HashSet;

#[derive(Debug, Clone)]
enum Operation {
    Branch(usize),
    AcquireAll,
    ReleaseAll,
}

proptest! {
    #[test]
    fn registry_never_duplicates_a_value(picks in proptest::collection::vec(0usize..16, 0..64)) {
        let values: Vec<Protected<u32>> = (0..16).map(Protected::new).collect();
        let pool = ResourcePool::new();
        let mut seen = HashSet::new();

        for pick in picks {
            let guard = pool.branch(&values[pick]).unwrap();
            if seen.insert(pick) {
                prop_assert_eq!(pool.keys().last().copied(), Some(guard.key()));
            }
            prop_assert!(pool.keys().contains(&guard.key()));
            prop_assert_eq!(pool.len(), seen.len());
            prop_assert!(pool.contains(&values[pick]));
        }
    }

    #[test]
    fn bulk_operations_track_every_entry(ops in proptest::collection::vec(
        prop_oneof![
            (0usize..8).prop_map(Operation::Branch),
            Just(Operation::AcquireAll),
            Just(Operation::ReleaseAll),
        ],
        1..48
    )) {
        let values: Vec<Protected<i64>> = (0..8).map(Protected::new).collect();
        let pool = ResourcePool::new();
        let mut registered = HashSet::new();
        let mut bulk_held = HashSet::new();

        for op in ops {
            match op {
                Operation::Branch(i) => {
                    // Branching never changes who holds what.
                    drop(pool.branch(&values[i]).unwrap());
                    registered.insert(i);
                }
                Operation::AcquireAll => {
                    let taken = pool.acquire_all().unwrap();
                    prop_assert_eq!(taken, registered.difference(&bulk_held).count());
                    bulk_held = registered.clone();
                }
                Operation::ReleaseAll => {
                    prop_assert_eq!(pool.release_all(), bulk_held.len());
                    bulk_held.clear();
                }
            }
            for (i, value) in values.iter().enumerate() {
                prop_assert_eq!(pool.is_busy(value), bulk_held.contains(&i));
            }
        }
        pool.release_all();
        prop_assert!(values.iter().all(|v| !pool.is_busy(v)));
    }
}
