//! A worker tree: one ordering lock and one pool shared root to leaves.
//!
//! The ordering lock is created once, when the root is created, and every
//! descendant receives the same `Arc`. Holding a tree's turn is what lets a
//! body run, so at most one body per tree runs at any instant; a child
//! spawned while its parent runs simply starts after the parent lets go.
//!
//! A body that spawns a continuation of its own tree must not join it: the
//! child cannot take the turn until the body returns.

use super::WorkerBuilder;
use crate::concurrency::{OrderingLock, ResourcePool};
use std::fmt;
use std::sync::Arc;

/// Shared state of one tree of workers. Cheap to clone.
#[derive(Clone)]
pub struct WorkerTree {
    order: Arc<OrderingLock>,
    pool: Arc<ResourcePool>,
}

impl WorkerTree {
    /// A new root: fresh ordering lock, fresh pool.
    pub fn new() -> Self {
        Self::with_pool(ResourcePool::shared())
    }

    /// A new root that guards through an existing pool.
    pub fn with_pool(pool: Arc<ResourcePool>) -> Self {
        Self {
            order: Arc::new(OrderingLock::initialized()),
            pool,
        }
    }

    /// Same ordering lock, different pool.
    pub(crate) fn replace_pool(&self, pool: Arc<ResourcePool>) -> Self {
        Self {
            order: self.order.clone(),
            pool,
        }
    }

    /// The pool every worker of this tree branches from.
    pub fn pool(&self) -> &Arc<ResourcePool> {
        &self.pool
    }

    /// The lock that serializes bodies.
    pub fn ordering_lock(&self) -> &Arc<OrderingLock> {
        &self.order
    }

    /// `true` if both links belong to the same tree.
    pub fn same_tree(&self, other: &WorkerTree) -> bool {
        Arc::ptr_eq(&self.order, &other.order)
    }

    /// `true` while some body of this tree holds the turn.
    pub fn is_busy(&self) -> bool {
        self.order.is_locked()
    }

    /// A builder whose workers continue this tree.
    pub fn worker(&self) -> WorkerBuilder {
        WorkerBuilder::new().tree(self)
    }
}

impl Default for WorkerTree {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for WorkerTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerTree")
            .field("busy", &self.is_busy())
            .field("pool", &self.pool)
            .finish()
    }
}
