//! What a running body can see of its worker.

use super::tree::WorkerTree;
use crate::concurrency::{Guard, Protected, ResourcePool};
use crate::error::Result;
use crate::identity::WorkerId;
use std::sync::Arc;

/// Handed to [`Runnable::execute`](super::Runnable::execute).
#[derive(Debug)]
pub struct WorkerContext<'a> {
    pub(crate) id: WorkerId,
    pub(crate) parent: Option<WorkerId>,
    pub(crate) name: &'a str,
    pub(crate) tree: &'a WorkerTree,
}

impl<'a> WorkerContext<'a> {
    /// Id of the running worker.
    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// Id of the handle this worker was spawned from, if any.
    pub fn parent(&self) -> Option<WorkerId> {
        self.parent
    }

    /// Thread name.
    pub fn name(&self) -> &str {
        self.name
    }

    /// The pool shared by this worker's tree.
    pub fn pool(&self) -> &Arc<ResourcePool> {
        self.tree.pool()
    }

    /// Shorthand for `self.pool().branch(value)`.
    pub fn branch<'v, T: 'static>(&self, value: &'v Protected<T>) -> Result<Guard<'v, T>> {
        self.tree.pool().branch(value)
    }

    /// A link to this worker's tree, for spawning continuations from the body.
    pub fn tree(&self) -> WorkerTree {
        self.tree.clone()
    }
}
