//! Guards, the resource pool, and the ordering lock.
//!
//! Every wait in this module is a busy-wait shaped by a
//! [`SpinConfig`](crate::config::SpinConfig): contention is waited out, never
//! reported, unless a timeout or cancellation token says otherwise.

pub mod guard;
pub mod ordering;
mod parking;
pub mod pool;
mod spin;

pub use guard::{Guard, Protected, SlotKey};
pub use ordering::OrderingLock;
pub use pool::ResourcePool;
