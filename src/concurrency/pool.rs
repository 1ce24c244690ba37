//! The resource pool: one guard slot per protected value, shared by a tree.
//!
//! Every worker in a tree branches guards from the same `Arc<ResourcePool>`,
//! so two workers asking for the same value contend on the same busy flag.
//! Registration is serialized by a plain `parking_lot::Mutex`; the per-value
//! flags it stores are the spin-CAS kind.

use super::guard::{Guard, GuardSlot, PoolTag, Protected, SlotKey};
use super::spin::SpinWait;
use crate::config::{CancelToken, SpinConfig};
use crate::error::Result;
use crate::identity::current_thread_id;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

#[derive(Default)]
struct Registry {
    /// Registration order; bulk operations walk this.
    slots: Vec<Arc<GuardSlot>>,
    index: HashMap<SlotKey, usize>,
}

impl Registry {
    fn lookup_or_insert(&mut self, key: SlotKey, type_name: &'static str, tag: &Arc<PoolTag>) -> Arc<GuardSlot> {
        if let Some(&at) = self.index.get(&key) {
            return self.slots[at].clone();
        }
        let slot = Arc::new(GuardSlot::new(key, type_name, tag.clone()));
        self.index.insert(key, self.slots.len());
        self.slots.push(slot.clone());
        tracing::trace!(ty = type_name, addr = key.addr(), entries = self.slots.len(), "registered guard slot");
        slot
    }
}

/// Registry of guard slots keyed by `(TypeId, address)`.
///
/// Protected values stay bound to a pool while it, or any guard it handed
/// out, is alive. After that another pool may branch them.
pub struct ResourcePool {
    tag: Arc<PoolTag>,
    spin: SpinConfig,
    cancel: Option<CancelToken>,
    registry: Mutex<Registry>,
}

impl ResourcePool {
    /// An empty pool that waits forever.
    pub fn new() -> Self {
        Self::with_config(SpinConfig::default())
    }

    /// An empty pool whose guards and bulk operations wait per `spin`.
    pub fn with_config(spin: SpinConfig) -> Self {
        Self {
            tag: PoolTag::new(),
            spin,
            cancel: None,
            registry: Mutex::new(Registry::default()),
        }
    }

    /// Lets `token` abort every wait started through this pool.
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Convenience for `Arc::new(ResourcePool::new())`.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Process-unique id; protected values record it when bound.
    pub fn id(&self) -> u64 {
        self.tag.id()
    }

    /// Wait policy handed to every guard.
    pub fn spin_config(&self) -> SpinConfig {
        self.spin
    }

    /// Returns a guard for `value`, reusing the existing slot if the value
    /// was branched before.
    ///
    /// Fails with [`Error::ForeignPool`](crate::Error::ForeignPool) if `value`
    /// is bound to another pool that is still alive.
    pub fn branch<'a, T: 'static>(&self, value: &'a Protected<T>) -> Result<Guard<'a, T>> {
        value.bind(&self.tag)?;
        let slot = self
            .registry
            .lock()
            .lookup_or_insert(SlotKey::of(value), std::any::type_name::<T>(), &self.tag);
        Ok(Guard::new(slot, value, self.spin, self.cancel.clone()))
    }

    fn snapshot(&self) -> Vec<Arc<GuardSlot>> {
        self.registry.lock().slots.clone()
    }

    /// Takes every registered value for the calling thread, in registration
    /// order. A guard branched afterwards on this thread borrows the hold and
    /// hands it back on release; only `release_all` frees the values.
    ///
    /// Returns how many slots this call took. If the wait times out or is
    /// cancelled, the slots taken so far are given back before the error is
    /// returned. Values registered while this runs are not included.
    pub fn acquire_all(&self) -> Result<usize> {
        let me = current_thread_id();
        let slots = self.snapshot();
        let mut wait = SpinWait::new(self.spin, self.cancel.as_ref());
        let mut taken: Vec<&Arc<GuardSlot>> = Vec::with_capacity(slots.len());
        for slot in &slots {
            match slot.acquire_bulk(me, &mut wait) {
                Ok(true) => taken.push(slot),
                Ok(false) => {}
                Err(err) => {
                    for slot in taken {
                        slot.release_bulk(me);
                    }
                    return Err(err);
                }
            }
        }
        tracing::trace!(pool = self.id(), taken = taken.len(), "acquired all");
        Ok(taken.len())
    }

    /// Gives back, in registration order, every slot the calling thread
    /// bulk-holds. Returns how many were released.
    pub fn release_all(&self) -> usize {
        let me = current_thread_id();
        let released = self
            .snapshot()
            .iter()
            .filter(|slot| slot.release_bulk(me))
            .count();
        tracing::trace!(pool = self.id(), released, "released all");
        released
    }

    /// Number of registered values.
    pub fn len(&self) -> usize {
        self.registry.lock().slots.len()
    }

    /// `true` if nothing was ever branched.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `true` if `value` has a slot here.
    pub fn contains<T: 'static>(&self, value: &Protected<T>) -> bool {
        self.registry.lock().index.contains_key(&SlotKey::of(value))
    }

    /// `true` if `value` has a slot here and somebody holds it.
    pub fn is_busy<T: 'static>(&self, value: &Protected<T>) -> bool {
        let registry = self.registry.lock();
        registry
            .index
            .get(&SlotKey::of(value))
            .is_some_and(|&at| registry.slots[at].is_busy())
    }

    /// Keys in registration order.
    pub fn keys(&self) -> Vec<SlotKey> {
        self.registry.lock().slots.iter().map(|slot| slot.key()).collect()
    }
}

impl Default for ResourcePool {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ResourcePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourcePool")
            .field("id", &self.id())
            .field("entries", &self.len())
            .field("spin", &self.spin)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::time::Duration;

    #[test]
    fn branching_twice_aliases_one_slot() {
        let pool = ResourcePool::new();
        let value = Protected::new(vec![1, 2, 3]);
        let mut first = pool.branch(&value).unwrap();
        let mut second = pool.branch(&value).unwrap();
        assert_eq!(pool.len(), 1);
        assert!(first.aliases(&second));

        assert!(first.try_acquire());
        assert!(second.is_busy());
        assert!(pool.is_busy(&value));
        assert!(!second.try_acquire());
        first.release();
        assert!(second.try_acquire());
    }

    #[test]
    fn distinct_values_get_distinct_slots() {
        let pool = ResourcePool::new();
        let a = Protected::new(1_u16);
        let b = Protected::new(2_u16);
        let ga = pool.branch(&a).unwrap();
        let gb = pool.branch(&b).unwrap();
        assert!(!ga.aliases(&gb));
        assert_eq!(pool.keys(), vec![SlotKey::of(&a), SlotKey::of(&b)]);
    }

    #[test]
    fn foreign_pool_is_refused() {
        let home = ResourcePool::new();
        let other = ResourcePool::new();
        let value = Protected::new(0);
        let _guard = home.branch(&value).unwrap();
        let err = other.branch(&value).unwrap_err();
        assert!(matches!(err, Error::ForeignPool { .. }));
        assert!(!other.contains(&value));
    }

    #[test]
    fn dropped_pool_releases_its_values() {
        let value = Protected::new(0);
        let first = ResourcePool::new();
        let guard = first.branch(&value).unwrap();
        drop(first);

        let second = ResourcePool::new();
        assert!(second.branch(&value).is_err());
        drop(guard);
        let mut guard = second.branch(&value).unwrap();
        assert!(guard.acquire().unwrap());
        assert_eq!(value.bound_pool(), Some(second.id()));
    }

    #[test]
    fn acquire_all_on_empty_pool_is_a_no_op() {
        let pool = ResourcePool::new();
        assert_eq!(pool.acquire_all().unwrap(), 0);
        assert_eq!(pool.release_all(), 0);
    }

    #[test]
    fn acquire_all_then_release_all_round_trips_every_slot() {
        let pool = ResourcePool::new();
        let values: Vec<_> = (0..8).map(Protected::new).collect();
        for value in &values {
            drop(pool.branch(value).unwrap());
        }
        assert_eq!(pool.acquire_all().unwrap(), 8);
        assert!(values.iter().all(|v| pool.is_busy(v)));
        assert_eq!(pool.acquire_all().unwrap(), 0);
        assert_eq!(pool.release_all(), 8);
        assert!(values.iter().all(|v| !pool.is_busy(v)));
        assert_eq!(pool.release_all(), 0);
    }

    #[test]
    fn acquire_all_rolls_back_on_timeout() {
        let pool = Arc::new(ResourcePool::with_config(SpinConfig::with_timeout(Duration::from_millis(20))));
        let free = Protected::new(0_u8);
        let taken = Arc::new(Protected::new(0_u8));
        drop(pool.branch(&free).unwrap());

        let (ready_tx, ready_rx) = std::sync::mpsc::channel();
        let (done_tx, done_rx) = std::sync::mpsc::channel::<()>();
        let holder = {
            let pool = pool.clone();
            let taken = taken.clone();
            std::thread::spawn(move || {
                let mut guard = pool.branch(&*taken).unwrap();
                guard.acquire().unwrap();
                ready_tx.send(()).unwrap();
                done_rx.recv().unwrap();
            })
        };
        ready_rx.recv().unwrap();

        let err = pool.acquire_all().unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
        assert!(!pool.is_busy(&free));

        done_tx.send(()).unwrap();
        holder.join().unwrap();
    }

    #[test]
    fn cancelled_pool_refuses_contended_acquire() {
        let token = CancelToken::new();
        let pool = ResourcePool::new().with_cancel(token.clone());
        let value = Protected::new(0);
        let mut first = pool.branch(&value).unwrap();
        let mut second = pool.branch(&value).unwrap();
        first.acquire().unwrap();
        token.cancel();
        assert!(matches!(second.acquire(), Err(Error::Cancelled)));
        // An uncontended acquire still succeeds.
        first.release();
        assert!(second.acquire().unwrap());
    }
}
