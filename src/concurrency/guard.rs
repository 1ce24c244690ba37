//! Per-value guards: exclusive, time-bounded access to caller-owned data.
//!
//! The caller owns each value inside a [`Protected<T>`]; the crate only ever
//! borrows it. A [`Guard`] obtained from a [`ResourcePool`] pairs that borrow
//! with a busy flag shared by every guard the pool hands out for the same
//! value, so guards on different threads contend on one flag instead of
//! each inventing their own.
//!
//! ```rust
//! use lineage::{Protected, ResourcePool};
//!
//! let pool = ResourcePool::new();
//! let counter = Protected::new(0_u32);
//!
//! let mut guard = pool.branch(&counter).unwrap();
//! *guard += 1; // acquired lazily on first access
//! assert!(guard.release());
//! assert!(!guard.release()); // nothing left to release
//! ```
//!
//! [`ResourcePool`]: super::pool::ResourcePool

use super::spin::SpinWait;
use crate::config::{CancelToken, SpinConfig};
use crate::error::{Error, Result};
use crate::identity::{current_thread_id, next_pool_id};
use crossbeam_utils::CachePadded;
use parking_lot::Mutex;
use std::any::TypeId;
use std::cell::{Cell, UnsafeCell};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Liveness of one `ResourcePool`: the pool and every slot it hands out
/// keep a strong reference, protected values keep a weak one.
#[derive(Debug)]
pub(crate) struct PoolTag {
    id: u64,
}

impl PoolTag {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self { id: next_pool_id() })
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }
}

/// A caller-owned value that guards can lend out one party at a time.
///
/// A `Protected` binds to the first pool that branches it. While that pool
/// (or any guard it handed out) is alive, other pools are refused with
/// [`Error::ForeignPool`] so one value never has two independent busy flags.
/// Once the pool and its guards are gone, the next pool to branch the value
/// takes the binding over.
pub struct Protected<T> {
    pool: Mutex<Option<Weak<PoolTag>>>,
    value: UnsafeCell<T>,
}

// Safety: shared access to the inner value only happens through a `Guard`
// holding the busy flag of the single live pool the value is bound to.
unsafe impl<T: Send> Sync for Protected<T> {}

impl<T> Protected<T> {
    /// Wraps `value`. It is not bound to any pool yet.
    pub const fn new(value: T) -> Self {
        Self {
            pool: parking_lot::const_mutex(None),
            value: UnsafeCell::new(value),
        }
    }

    /// Direct access; exclusive ownership proves no guard is alive.
    pub fn get_mut(&mut self) -> &mut T {
        self.value.get_mut()
    }

    /// Unwraps the value.
    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }

    /// Id of the live pool this value is bound to, if any.
    pub fn bound_pool(&self) -> Option<u64> {
        self.pool.lock().as_ref().and_then(Weak::upgrade).map(|tag| tag.id)
    }

    /// Forgets the pool binding so another pool may branch this value
    /// while the first one is still alive.
    pub fn unbind(&mut self) {
        *self.pool.get_mut() = None;
    }

    pub(crate) fn bind(&self, tag: &Arc<PoolTag>) -> Result<()> {
        let mut bound = self.pool.lock();
        match bound.as_ref().map(Weak::upgrade) {
            Some(Some(live)) if Arc::ptr_eq(&live, tag) => return Ok(()),
            Some(Some(live)) => {
                return Err(Error::ForeignPool {
                    bound: live.id,
                    requested: tag.id,
                })
            }
            Some(None) => tracing::debug!(pool = tag.id, "rebinding protected value left by a dropped pool"),
            None => {}
        }
        *bound = Some(Arc::downgrade(tag));
        Ok(())
    }
}

impl<T: Default> Default for Protected<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> fmt::Debug for Protected<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Protected")
            .field("bound_pool", &self.bound_pool())
            .finish_non_exhaustive()
    }
}

/// Identity of a guarded value: its type plus its address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotKey {
    type_id: TypeId,
    addr: usize,
}

impl SlotKey {
    /// Key of `value`.
    pub fn of<T: 'static>(value: &Protected<T>) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            addr: value as *const Protected<T> as usize,
        }
    }

    /// Address of the protected value.
    pub fn addr(&self) -> usize {
        self.addr
    }

    /// Type of the protected value.
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }
}

/// The registry entry a pool stores once per key; guards alias it.
pub(crate) struct GuardSlot {
    key: SlotKey,
    type_name: &'static str,
    busy: CachePadded<AtomicBool>,
    /// Thread id of a bulk holder (`acquire_all`), 0 when none. `LOANED` is
    /// set while a guard on that thread borrows the hold.
    bulk_owner: AtomicU64,
    _pool: Arc<PoolTag>,
}

impl GuardSlot {
    const LOANED: u64 = 1 << 63;

    pub(crate) fn new(key: SlotKey, type_name: &'static str, pool: Arc<PoolTag>) -> Self {
        Self {
            key,
            type_name,
            busy: CachePadded::new(AtomicBool::new(false)),
            bulk_owner: AtomicU64::new(0),
            _pool: pool,
        }
    }

    pub(crate) fn key(&self) -> SlotKey {
        self.key
    }

    #[inline]
    fn try_lock(&self) -> bool {
        self.busy
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    #[inline]
    fn unlock(&self) {
        self.busy.store(false, Ordering::Release);
    }

    pub(crate) fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// `true` if `thread` bulk-holds this slot, lent out to a guard or not.
    pub(crate) fn is_bulk_held_by(&self, thread: u64) -> bool {
        self.bulk_owner.load(Ordering::Acquire) & !Self::LOANED == thread
    }

    /// Takes the flag on behalf of `thread`'s bulk hold.
    /// `Ok(false)` if `thread` already bulk-holds it.
    pub(crate) fn acquire_bulk(&self, thread: u64, wait: &mut SpinWait<'_>) -> Result<bool> {
        if self.is_bulk_held_by(thread) {
            return Ok(false);
        }
        wait.until(|| self.try_lock())?;
        self.bulk_owner.store(thread, Ordering::Release);
        Ok(true)
    }

    /// Ends `thread`'s bulk hold. Slots held by anybody else are left alone.
    ///
    /// A hold currently lent to a guard is ended too; the guard frees the
    /// flag when it releases.
    pub(crate) fn release_bulk(&self, thread: u64) -> bool {
        if self
            .bulk_owner
            .compare_exchange(thread, 0, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
        {
            self.unlock();
            return true;
        }
        self.bulk_owner
            .compare_exchange(thread | Self::LOANED, 0, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
    }

    /// Lends `thread`'s bulk hold to one guard on the same thread.
    fn borrow_bulk(&self, thread: u64) -> bool {
        self.bulk_owner
            .compare_exchange(thread, thread | Self::LOANED, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
    }

    /// Gives a lent hold back to `thread`; the flag stays set. If the bulk
    /// hold ended meanwhile, the flag is freed instead.
    fn return_bulk(&self, thread: u64) {
        if self
            .bulk_owner
            .compare_exchange(thread | Self::LOANED, thread, Ordering::AcqRel, Ordering::Relaxed)
            .is_err()
        {
            self.unlock();
        }
    }
}

impl fmt::Debug for GuardSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuardSlot")
            .field("type", &self.type_name)
            .field("addr", &format_args!("{:#x}", self.key.addr))
            .field("busy", &self.is_busy())
            .finish()
    }
}

/// Exclusive access to one [`Protected<T>`], shared-flag aware.
///
/// Dereferencing acquires lazily and waits without a deadline; use
/// [`get`](Self::get) or [`acquire`](Self::acquire) to honour the pool's
/// timeout and cancellation token. Dropping the guard releases it.
pub struct Guard<'a, T> {
    slot: Arc<GuardSlot>,
    value: &'a Protected<T>,
    held: Cell<bool>,
    /// Bulk owner this guard borrowed the flag from, 0 when it took the flag itself.
    loan: Cell<u64>,
    spin: SpinConfig,
    cancel: Option<CancelToken>,
}

impl<'a, T> Guard<'a, T> {
    pub(crate) fn new(
        slot: Arc<GuardSlot>,
        value: &'a Protected<T>,
        spin: SpinConfig,
        cancel: Option<CancelToken>,
    ) -> Self {
        Self {
            slot,
            value,
            held: Cell::new(false),
            loan: Cell::new(0),
            spin,
            cancel,
        }
    }

    fn acquire_with(&self, wait: &mut SpinWait<'_>) -> Result<bool> {
        if self.held.get() {
            return Ok(false);
        }
        let me = current_thread_id();
        if self.slot.borrow_bulk(me) {
            self.loan.set(me);
            self.held.set(true);
            tracing::trace!(ty = self.slot.type_name, addr = self.slot.key.addr, "guard borrowed bulk hold");
            return Ok(false);
        }
        wait.until(|| self.slot.try_lock())?;
        self.held.set(true);
        tracing::trace!(ty = self.slot.type_name, addr = self.slot.key.addr, "guard acquired");
        Ok(true)
    }

    fn ensure_held(&self) {
        // Cannot fail: no deadline and no token.
        let _ = self.acquire_with(&mut SpinWait::forever(self.spin.backoff));
    }

    /// Waits until this guard holds the value.
    ///
    /// `Ok(true)` when this call took the busy flag, `Ok(false)` when the
    /// guard already held it or borrowed this thread's bulk hold.
    ///
    /// A borrowed bulk hold goes back to the bulk holder on release, so the
    /// value stays busy until `release_all`. Only one guard borrows it at a
    /// time; a second guard for the same value waits like any other.
    pub fn acquire(&mut self) -> Result<bool> {
        let mut wait = SpinWait::new(self.spin, self.cancel.as_ref());
        self.acquire_with(&mut wait)
    }

    /// One attempt. `true` only if this call took the busy flag.
    pub fn try_acquire(&mut self) -> bool {
        if self.held.get() {
            return false;
        }
        if self.slot.try_lock() {
            self.held.set(true);
            true
        } else {
            false
        }
    }

    /// Acquires (honouring timeout and cancellation) and returns the value.
    pub fn get(&mut self) -> Result<&mut T> {
        self.acquire()?;
        // Safety: `held` means this guard owns the busy flag.
        Ok(unsafe { &mut *self.value.value.get() })
    }

    /// Releases the value. `false` if the guard did not hold it.
    pub fn release(&mut self) -> bool {
        if !self.held.replace(false) {
            return false;
        }
        match self.loan.replace(0) {
            0 => self.slot.unlock(),
            owner => self.slot.return_bulk(owner),
        }
        tracing::trace!(ty = self.slot.type_name, addr = self.slot.key.addr, "guard released");
        true
    }

    /// Like [`release`](Self::release) but reports a release with nothing held.
    pub fn try_release(&mut self) -> Result<()> {
        if self.release() {
            Ok(())
        } else {
            Err(Error::AlreadyReleased)
        }
    }

    /// `true` while this guard instance holds the value.
    pub fn is_held(&self) -> bool {
        self.held.get()
    }

    /// `true` while anybody holds the shared busy flag.
    pub fn is_busy(&self) -> bool {
        self.slot.is_busy()
    }

    /// Identity of the guarded value.
    pub fn key(&self) -> SlotKey {
        self.slot.key
    }

    /// `true` if both guards share one busy flag.
    pub fn aliases<U>(&self, other: &Guard<'_, U>) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }
}

impl<T> Deref for Guard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.ensure_held();
        // Safety: held; `release` needs `&mut self`, so this borrow ends first.
        unsafe { &*self.value.value.get() }
    }
}

impl<T> DerefMut for Guard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.ensure_held();
        // Safety: held, and `&mut self` rules out any other borrow through this guard.
        unsafe { &mut *self.value.value.get() }
    }
}

impl<T> Drop for Guard<'_, T> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<T> fmt::Debug for Guard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Guard")
            .field("slot", &self.slot)
            .field("held", &self.held.get())
            .finish()
    }
}
