use lineage::{BackoffMode, CancelToken, Error, Protected, ResourcePool, SpinConfig};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

fn assert_send<T: Send>() {}
fn assert_sync<T: Sync>() {}

#[test]
fn protected_values_are_shareable_guards_are_sendable() {
    assert_sync::<Protected<Vec<u8>>>();
    assert_send::<lineage::Guard<'static, Vec<u8>>>();
    assert_sync::<ResourcePool>();
}

#[test]
fn lazy_deref_acquires_and_drop_releases() {
    let pool = ResourcePool::new();
    let value = Protected::new(vec![1, 2]);
    {
        let mut guard = pool.branch(&value).unwrap();
        assert!(!guard.is_held());
        guard.push(3);
        assert!(guard.is_held());
        assert!(pool.is_busy(&value));
    }
    assert!(!pool.is_busy(&value));
    assert_eq!(*pool.branch(&value).unwrap(), vec![1, 2, 3]);
}

#[test]
fn double_release_never_double_unlocks() {
    let pool = ResourcePool::new();
    let value = Protected::new(0_u8);
    let mut mine = pool.branch(&value).unwrap();
    let mut theirs = pool.branch(&value).unwrap();

    assert!(mine.acquire().unwrap());
    assert!(mine.release());
    assert!(theirs.acquire().unwrap());
    // A second release on `mine` must not free the flag `theirs` now holds.
    assert!(!mine.release());
    assert!(matches!(mine.try_release(), Err(Error::AlreadyReleased)));
    assert!(theirs.is_busy());
    assert!(!mine.try_acquire());
}

#[test]
fn contended_acquire_times_out() {
    let pool = Arc::new(ResourcePool::with_config(
        SpinConfig::with_timeout(Duration::from_millis(15)).backoff(BackoffMode::Spin),
    ));
    let value = Arc::new(Protected::new(0_u32));
    let (held_tx, held_rx) = mpsc::channel();
    let (done_tx, done_rx) = mpsc::channel::<()>();

    let holder = {
        let pool = pool.clone();
        let value = value.clone();
        thread::spawn(move || {
            let mut guard = pool.branch(&*value).unwrap();
            guard.acquire().unwrap();
            held_tx.send(()).unwrap();
            done_rx.recv().unwrap();
        })
    };
    held_rx.recv().unwrap();

    let mut waiter = pool.branch(&*value).unwrap();
    match waiter.get() {
        Err(Error::Timeout { waited }) => assert!(waited >= Duration::from_millis(15)),
        other => panic!("expected a timeout, got {:?}", other.map(|v| *v)),
    }
    assert!(!waiter.is_held());

    done_tx.send(()).unwrap();
    holder.join().unwrap();
    assert!(waiter.acquire().unwrap());
}

#[test]
fn cancellation_unblocks_a_waiter() {
    let token = CancelToken::new();
    let pool = Arc::new(ResourcePool::new().with_cancel(token.clone()));
    let value = Arc::new(Protected::new(0_u32));
    let mut holder = pool.branch(&*value).unwrap();
    holder.acquire().unwrap();

    let waiter = {
        let pool = pool.clone();
        let value = value.clone();
        thread::spawn(move || {
            let mut guard = pool.branch(&*value).unwrap();
            let result = guard.acquire().map(|_| ());
            result
        })
    };
    thread::sleep(Duration::from_millis(10));
    token.cancel();
    assert!(matches!(waiter.join().unwrap(), Err(Error::Cancelled)));
    assert!(holder.is_held());
}

#[test]
fn values_with_the_same_address_but_different_types_do_not_alias() {
    let pool = ResourcePool::new();
    let a = Protected::new(1_u32);
    let b = Protected::new(1_i32);
    let ga = pool.branch(&a).unwrap();
    let gb = pool.branch(&b).unwrap();
    assert!(!ga.aliases(&gb));
    assert_ne!(ga.key(), gb.key());
}

#[test]
fn rebinding_away_from_a_live_pool_requires_exclusive_access() {
    let first = ResourcePool::new();
    let second = ResourcePool::new();
    let mut value = Protected::new(());
    drop(first.branch(&value).unwrap());
    assert_eq!(value.bound_pool(), Some(first.id()));
    assert!(second.branch(&value).is_err());
    value.unbind();
    assert!(second.branch(&value).is_ok());
}

static HITS: Protected<u64> = Protected::new(0);

#[test]
fn static_value_moves_to_the_next_pool_once_the_first_is_gone() {
    let first = ResourcePool::new();
    *first.branch(&HITS).unwrap() += 1;
    assert_eq!(HITS.bound_pool(), Some(first.id()));
    drop(first);
    assert_eq!(HITS.bound_pool(), None);

    let second = ResourcePool::new();
    let mut guard = second.branch(&HITS).unwrap();
    *guard.get().unwrap() += 1;
    assert_eq!(*guard, 2);
    assert_eq!(HITS.bound_pool(), Some(second.id()));
}
