//! The ordering lock shared by every worker in one tree.
//!
//! A binary lock that, unlike `std::sync::Mutex`, exposes its own history:
//! whether it has ever been locked and whether it is currently valid. The
//! tree hand-off branches on the first: the first worker takes the lock with
//! a blocking `lock`, later workers spin on `try_lock` until the previous body
//! lets go.
//!
//! # States
//! - 0: Unlocked
//! - 1: Locked, no waiters (likely)
//! - 2: Locked, waiters may be parked

use super::parking::{wait_while, wake_one};
use super::spin::SpinWait;
use crate::config::{CancelToken, SpinConfig};
use crate::error::Result;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Binary lock with observable `was_locked` / `is_valid` state.
#[derive(Debug, Default)]
pub struct OrderingLock {
    state: AtomicU32,
    was_locked: AtomicBool,
    valid: AtomicBool,
}

impl OrderingLock {
    const UNLOCKED: u32 = 0;
    const LOCKED: u32 = 1;
    const CONTENDED: u32 = 2;

    /// Spins this many times before parking in [`lock`](Self::lock).
    const SPIN_LIMIT: u32 = 40;

    /// Creates a lock that still needs [`initialize`](Self::initialize).
    pub const fn new() -> Self {
        Self {
            state: AtomicU32::new(Self::UNLOCKED),
            was_locked: AtomicBool::new(false),
            valid: AtomicBool::new(false),
        }
    }

    /// Creates a lock that is already valid.
    pub fn initialized() -> Self {
        let lock = Self::new();
        lock.initialize();
        lock
    }

    /// Marks the lock valid. Returns `false` if it already was.
    pub fn initialize(&self) -> bool {
        !self.valid.swap(true, Ordering::AcqRel)
    }

    /// Marks the lock invalid. Returns `false` (and does nothing) if it was
    /// never initialized, is already destroyed, or is currently held.
    pub fn destroy(&self) -> bool {
        if self.is_locked() {
            tracing::warn!("refusing to destroy a held ordering lock");
            return false;
        }
        self.valid.swap(false, Ordering::AcqRel)
    }

    /// `true` between `initialize` and `destroy`.
    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    /// `true` once any `lock`/`try_lock` has succeeded.
    pub fn was_locked(&self) -> bool {
        self.was_locked.load(Ordering::Acquire)
    }

    /// `true` while somebody holds the lock.
    pub fn is_locked(&self) -> bool {
        self.state.load(Ordering::Acquire) != Self::UNLOCKED
    }

    /// Blocks until the lock is held. Initializes the lock if needed.
    pub fn lock(&self) {
        if !self.is_valid() {
            self.initialize();
        }
        if self
            .state
            .compare_exchange(Self::UNLOCKED, Self::LOCKED, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            self.lock_slow();
        }
        self.was_locked.store(true, Ordering::Release);
    }

    #[cold]
    fn lock_slow(&self) {
        for _ in 0..Self::SPIN_LIMIT {
            if self.state.load(Ordering::Relaxed) == Self::UNLOCKED
                && self
                    .state
                    .compare_exchange(Self::UNLOCKED, Self::LOCKED, Ordering::Acquire, Ordering::Relaxed)
                    .is_ok()
            {
                return;
            }
            std::hint::spin_loop();
        }
        // Park. Taking the lock as CONTENDED keeps the next unlock waking somebody.
        while self.state.swap(Self::CONTENDED, Ordering::Acquire) != Self::UNLOCKED {
            wait_while(&self.state, Self::CONTENDED);
        }
    }

    /// Takes the lock if it is free. Fails on an invalid lock.
    pub fn try_lock(&self) -> bool {
        if !self.is_valid() {
            return false;
        }
        let acquired = self
            .state
            .compare_exchange(Self::UNLOCKED, Self::LOCKED, Ordering::Acquire, Ordering::Relaxed)
            .is_ok();
        if acquired {
            self.was_locked.store(true, Ordering::Release);
        }
        acquired
    }

    /// Releases the lock. Returns `false` if the lock is invalid or was not held.
    pub fn unlock(&self) -> bool {
        if !self.is_valid() {
            return false;
        }
        match self.state.swap(Self::UNLOCKED, Ordering::Release) {
            Self::UNLOCKED => false,
            Self::CONTENDED => {
                wake_one(&self.state);
                true
            }
            _ => true,
        }
    }

    /// Waits for this tree's turn: a first use locks directly, any later use
    /// retries `try_lock` under `config` until the current holder unlocks.
    pub fn take_turn(&self, config: SpinConfig, cancel: Option<&CancelToken>) -> Result<()> {
        if !self.is_valid() {
            self.initialize();
        }
        if !self.was_locked() {
            self.lock();
            return Ok(());
        }
        SpinWait::new(config, cancel).until(|| self.try_lock())
    }
}
