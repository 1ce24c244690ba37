//! # `lineage` - Guarded Resource Pools and Serialized Worker Trees
//!
//! Spawn workers, arrange them in trees that take turns, and guard values the
//! caller owns so that only one party touches each value at a time.
//!
//! ## Core Abstractions
//!
//! 1. **Guards** (`Guard<'a, T>`):
//!    - Exclusive access to one caller-owned [`Protected<T>`]
//!    - A single compare-and-swap on a shared busy flag; contention spins
//!    - Acquired lazily on first dereference, released on drop
//!
//! 2. **Resource Pools** (`ResourcePool`):
//!    - One busy flag per `(TypeId, address)`: every guard for the same value
//!      contends on the same flag
//!    - Bulk `acquire_all` / `release_all` for coarse-grained workers
//!
//! 3. **Worker Trees** (`WorkerHandle`, `WorkerTree`):
//!    - Each worker is a real OS thread
//!    - All workers of one tree share one ordering lock, so their bodies run
//!      one at a time in the order the lock is won
//!    - Join or detach is fixed at spawn and runs on drop
//!
//! ## Safety Guarantees
//!
//! - **Borrowed, never owned**: guards borrow the protected value, so the
//!   compiler checks that it outlives every guard. Values shared with worker
//!   threads live in an `Arc` or a `static`.
//! - **One flag per value**: a `Protected<T>` binds to the first pool that
//!   branches it; other pools are refused while that pool or one of its
//!   guards is alive.
//! - **Every exit path ends the turn**: a finished, failed, or panicking body
//!   gives back its bulk holds and the tree's turn.
//!
//! ## Example
//!
//! ```rust
//! use lineage::{task, Protected, ResourcePool, WorkerBuilder};
//! use std::sync::Arc;
//!
//! let pool = ResourcePool::shared();
//! let counter = Arc::new(Protected::new(0_u64));
//!
//! // Separate trees run in parallel; the shared pool keeps the counter exclusive.
//! let handles: Vec<_> = (0..4)
//!     .map(|_| {
//!         let counter = counter.clone();
//!         WorkerBuilder::new()
//!             .pool(pool.clone())
//!             .spawn(task(move |ctx| {
//!                 for _ in 0..100 {
//!                     *ctx.branch(&*counter).unwrap() += 1;
//!                 }
//!             }))
//!             .unwrap()
//!     })
//!     .collect();
//! drop(handles); // joins
//!
//! assert_eq!(*pool.branch(&*counter).unwrap(), 400);
//! ```

#![warn(missing_docs, clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod concurrency;
pub mod config;
pub mod error;
mod identity;
pub mod worker;

pub use concurrency::{Guard, OrderingLock, Protected, ResourcePool, SlotKey};
pub use config::{BackoffMode, CancelToken, Disposition, Management, SpinConfig, WorkerConfig};
pub use error::{Error, Result};
pub use identity::WorkerId;
pub use worker::{task, Outcome, Runnable, Task, WorkerBuilder, WorkerContext, WorkerHandle, WorkerState, WorkerTree};

// Compile-time assertions for the sharing model.
const _: () = {
    const fn assert_send_sync<T: Send + Sync>() {}
    const fn assert_send<T: Send>() {}

    assert_send_sync::<ResourcePool>();
    assert_send_sync::<OrderingLock>();
    assert_send_sync::<WorkerTree>();
    assert_send_sync::<Protected<u64>>();
    assert_send::<Guard<'static, u64>>();
    assert_send::<WorkerHandle>();
};
