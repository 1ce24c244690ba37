//! Workers: spawned threads arranged in trees that take turns.
//!
//! ```rust
//! use lineage::{task, Protected, WorkerBuilder};
//! use std::sync::Arc;
//!
//! let total = Arc::new(Protected::new(0_u32));
//!
//! let root_total = total.clone();
//! let mut root = WorkerBuilder::new()
//!     .spawn(task(move |ctx| {
//!         *ctx.branch(&*root_total).unwrap() += 1;
//!     }))
//!     .unwrap();
//!
//! // Never runs at the same time as the root's body; shares its pool.
//! let child_total = total.clone();
//! let mut child = WorkerBuilder::new()
//!     .parent(&root)
//!     .spawn(task(move |ctx| {
//!         *ctx.branch(&*child_total).unwrap() += 1;
//!     }))
//!     .unwrap();
//!
//! root.join().unwrap();
//! child.join().unwrap();
//! assert_eq!(Arc::try_unwrap(total).unwrap().into_inner(), 2);
//! ```

mod context;
mod handle;
mod runnable;
mod tree;

pub use context::WorkerContext;
pub use handle::{WorkerBuilder, WorkerHandle, WorkerState};
pub use runnable::{task, Outcome, Runnable, Task};
pub use tree::WorkerTree;
