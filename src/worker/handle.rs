//! Worker handles: one spawned thread and its place in a tree.
//!
//! # Lifecycle
//! `Created → Spawning → Running → Finished`. `spawn` moves a handle to
//! `Spawning` and starts the thread. The thread's trampoline waits for the
//! tree's turn, moves to `Running`, optionally bulk-acquires the pool, runs
//! the body, then (on every exit path, panics included) gives back bulk
//! holds, unlocks the turn and moves to `Finished`.
//!
//! Join and detach only reclaim the thread. Either may be called by hand;
//! whichever is left runs on drop according to the handle's [`Disposition`].

use super::context::WorkerContext;
use super::runnable::{Outcome, Runnable};
use super::tree::WorkerTree;
use crate::concurrency::{Guard, Protected, ResourcePool};
use crate::config::{CancelToken, Disposition, Management, SpinConfig, WorkerConfig};
use crate::error::{Error, Result};
use crate::identity::WorkerId;
use parking_lot::Mutex;
use std::any::{type_name, Any};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Where a worker is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    /// Handle exists, thread not requested yet. Internal: `spawn` moves past
    /// it before returning the handle, so callers never observe it.
    Created = 0,
    /// Thread requested; waiting for the tree's turn.
    Spawning = 1,
    /// Body running.
    Running = 2,
    /// Body returned, panicked, or never got to run.
    Finished = 3,
}

impl WorkerState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => WorkerState::Created,
            1 => WorkerState::Spawning,
            2 => WorkerState::Running,
            _ => WorkerState::Finished,
        }
    }
}

enum Completion {
    Pending,
    Returned(Outcome),
    Aborted(Error),
    Panicked,
    Taken,
}

/// State the handle and its thread both see.
struct WorkerShared {
    state: AtomicU8,
    completion: Mutex<Completion>,
}

impl WorkerShared {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(WorkerState::Created as u8),
            completion: Mutex::new(Completion::Pending),
        }
    }

    fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: WorkerState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Records how the body ended. The first record wins.
    fn complete(&self, completion: Completion) {
        let mut slot = self.completion.lock();
        if matches!(*slot, Completion::Pending) {
            *slot = completion;
        }
    }

    fn finish(&self, completion: Completion) {
        self.complete(completion);
        self.set_state(WorkerState::Finished);
    }
}

/// Configures and spawns a worker.
///
/// Without [`parent`](Self::parent) or [`tree`](Self::tree) the worker roots
/// a new tree with a fresh ordering lock and a fresh pool.
#[derive(Debug, Default)]
pub struct WorkerBuilder {
    config: WorkerConfig,
    tree: Option<WorkerTree>,
    pool: Option<Arc<ResourcePool>>,
    parent: Option<WorkerId>,
    cancel: Option<CancelToken>,
}

impl WorkerBuilder {
    /// Defaults: join on drop, explicit acquisition, unbounded waits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: WorkerConfig) -> Self {
        self.config = config;
        self
    }

    /// Join or detach on drop. Fixed once spawned.
    pub fn disposition(mut self, disposition: Disposition) -> Self {
        self.config.disposition = disposition;
        self
    }

    /// Bulk acquisition policy.
    pub fn management(mut self, management: Management) -> Self {
        self.config.management = management;
        self
    }

    /// Wait policy for the tree hand-off.
    pub fn spin(mut self, spin: SpinConfig) -> Self {
        self.config.spin = spin;
        self
    }

    /// Thread name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = Some(name.into());
        self
    }

    /// Continues `parent`'s tree: same ordering lock, same pool unless
    /// [`pool`](Self::pool) overrides it.
    pub fn parent(mut self, parent: &WorkerHandle) -> Self {
        self.tree = Some(parent.tree.clone());
        self.parent = Some(parent.id);
        self
    }

    /// Continues `tree` without naming a parent handle.
    pub fn tree(mut self, tree: &WorkerTree) -> Self {
        self.tree = Some(tree.clone());
        self
    }

    /// Guards through `pool` instead of the tree's own.
    pub fn pool(mut self, pool: Arc<ResourcePool>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Lets `token` abort the tree hand-off.
    pub fn cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Starts the worker thread. The body runs once the tree's turn is free.
    pub fn spawn<R: Runnable>(self, runnable: R) -> Result<WorkerHandle> {
        let WorkerBuilder {
            config,
            tree,
            pool,
            parent,
            cancel,
        } = self;

        let tree = match (tree, pool) {
            (Some(tree), Some(pool)) => tree.replace_pool(pool),
            (Some(tree), None) => tree,
            (None, Some(pool)) => WorkerTree::with_pool(pool),
            (None, None) => WorkerTree::new(),
        };
        let id = WorkerId::next();
        let name = config
            .name
            .unwrap_or_else(|| format!("lineage-worker-{}", id.as_u64()));
        let shared = Arc::new(WorkerShared::new());

        let trampoline = Trampoline {
            id,
            parent,
            name: name.clone(),
            tree: tree.clone(),
            shared: shared.clone(),
            management: config.management,
            spin: config.spin,
            cancel,
            runnable: Box::new(runnable),
        };

        shared.set_state(WorkerState::Spawning);
        let thread = match std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || trampoline.run())
        {
            Ok(thread) => thread,
            Err(err) => {
                tracing::warn!(worker = %id, error = %err, "failed to spawn worker thread");
                return Err(Error::Spawn(err));
            }
        };
        tracing::debug!(worker = %id, name = %name, parent = ?parent, disposition = ?config.disposition, "spawned worker");

        Ok(WorkerHandle {
            id,
            parent,
            name,
            disposition: config.disposition,
            tree,
            shared,
            thread: Some(thread),
        })
    }
}

/// Runs on the worker thread.
struct Trampoline {
    id: WorkerId,
    parent: Option<WorkerId>,
    name: String,
    tree: WorkerTree,
    shared: Arc<WorkerShared>,
    management: Management,
    spin: SpinConfig,
    cancel: Option<CancelToken>,
    runnable: Box<dyn Runnable>,
}

impl Trampoline {
    fn run(mut self) {
        if let Err(err) = self
            .tree
            .ordering_lock()
            .take_turn(self.spin, self.cancel.as_ref())
        {
            tracing::warn!(worker = %self.id, error = %err, "gave up waiting for the tree's turn");
            self.shared.finish(Completion::Aborted(err));
            return;
        }
        tracing::debug!(worker = %self.id, "took the tree's turn");

        let _turn = TurnExit {
            id: self.id,
            tree: &self.tree,
            shared: &self.shared,
        };
        self.shared.set_state(WorkerState::Running);

        if self.management == Management::AcquireAllOnStart {
            if let Err(err) = self.tree.pool().acquire_all() {
                tracing::warn!(worker = %self.id, error = %err, "bulk acquisition aborted");
                self.shared.complete(Completion::Aborted(err));
                return;
            }
        }

        let ctx = WorkerContext {
            id: self.id,
            parent: self.parent,
            name: &self.name,
            tree: &self.tree,
        };
        let outcome = self.runnable.execute(&ctx);
        self.shared.complete(Completion::Returned(outcome));
    }
}

/// Ends a turn however the body exits.
struct TurnExit<'a> {
    id: WorkerId,
    tree: &'a WorkerTree,
    shared: &'a WorkerShared,
}

impl Drop for TurnExit<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            tracing::warn!(worker = %self.id, "worker body panicked");
            self.shared.complete(Completion::Panicked);
        }
        self.tree.pool().release_all();
        self.tree.ordering_lock().unlock();
        self.shared.set_state(WorkerState::Finished);
        tracing::debug!(worker = %self.id, "worker finished");
    }
}

/// One spawned worker.
///
/// Dropping the handle joins or detaches per its [`Disposition`].
pub struct WorkerHandle {
    id: WorkerId,
    parent: Option<WorkerId>,
    name: String,
    disposition: Disposition,
    tree: WorkerTree,
    shared: Arc<WorkerShared>,
    thread: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Shorthand for [`WorkerBuilder::new`].
    pub fn builder() -> WorkerBuilder {
        WorkerBuilder::new()
    }

    /// Id of this worker.
    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// Id of the handle this one continues, if any.
    pub fn parent(&self) -> Option<WorkerId> {
        self.parent
    }

    /// Thread name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Join or detach, as chosen when spawned.
    pub fn disposition(&self) -> Disposition {
        self.disposition
    }

    /// Current lifecycle state.
    pub fn state(&self) -> WorkerState {
        self.shared.state()
    }

    /// The tree this worker belongs to.
    pub fn tree(&self) -> &WorkerTree {
        &self.tree
    }

    /// The pool this worker guards through.
    pub fn pool(&self) -> &Arc<ResourcePool> {
        self.tree.pool()
    }

    /// Branches a guard from this worker's pool.
    pub fn branch<'v, T: 'static>(&self, value: &'v Protected<T>) -> Result<Guard<'v, T>> {
        self.tree.pool().branch(value)
    }

    /// Bulk-acquires this worker's pool for the calling thread.
    pub fn acquire_all(&self) -> Result<usize> {
        self.tree.pool().acquire_all()
    }

    /// Gives back the calling thread's bulk holds on this worker's pool.
    pub fn release_all(&self) -> usize {
        self.tree.pool().release_all()
    }

    /// `true` once the thread has been joined or detached.
    pub fn is_reclaimed(&self) -> bool {
        self.thread.is_none()
    }

    /// `true` once the body has finished and the thread has been joined or
    /// detached. Until then, the worker may still be writing.
    pub fn data_is_safe(&self) -> bool {
        self.is_reclaimed() && self.shared.state() == WorkerState::Finished
    }

    /// Same as [`data_is_safe`](Self::data_is_safe); a valid result may still
    /// be a unit one.
    pub fn result_is_valid(&self) -> bool {
        self.data_is_safe()
    }

    /// Blocks until the thread exits. Later calls (and the drop) do nothing.
    ///
    /// Reports a panicked body, or the wait error if the worker gave up on
    /// the tree's turn or on bulk acquisition.
    pub fn join(&mut self) -> Result<()> {
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };
        let joined = thread.join();
        tracing::debug!(worker = %self.id, panicked = joined.is_err(), "joined worker");
        if joined.is_err() {
            return Err(Error::WorkerPanicked {
                name: self.name.clone(),
            });
        }
        let mut completion = self.shared.completion.lock();
        if let Completion::Aborted(_) = &*completion {
            if let Completion::Aborted(err) = std::mem::replace(&mut *completion, Completion::Taken) {
                return Err(err);
            }
        }
        Ok(())
    }

    /// Lets the thread run on unowned. Later calls (and the drop) do nothing.
    pub fn detach(&mut self) {
        if self.thread.take().is_some() {
            tracing::debug!(worker = %self.id, "detached worker");
        }
    }

    /// Takes the body's result.
    ///
    /// * [`Error::NotReady`] until [`data_is_safe`](Self::data_is_safe).
    /// * [`Error::TypeMismatch`] if the result is not an `R`; it stays stored.
    /// * [`Error::NoResult`] for unit bodies (unless `R` is `()`) and once taken.
    /// * [`Error::WorkerPanicked`] if the body panicked.
    pub fn fetch_result<R: 'static>(&self) -> Result<R> {
        if !self.data_is_safe() {
            return Err(Error::NotReady);
        }
        let mismatch = || Error::TypeMismatch {
            expected: type_name::<R>(),
        };
        let mut completion = self.shared.completion.lock();
        match &*completion {
            Completion::Returned(Outcome::Value(value)) if !value.is::<R>() => return Err(mismatch()),
            Completion::Returned(Outcome::Unit) => {
                let unit: Box<dyn Any> = Box::new(());
                return unit.downcast::<R>().map(|value| *value).map_err(|_| Error::NoResult);
            }
            Completion::Panicked => {
                return Err(Error::WorkerPanicked {
                    name: self.name.clone(),
                })
            }
            _ => {}
        }
        match std::mem::replace(&mut *completion, Completion::Taken) {
            Completion::Returned(Outcome::Value(value)) => value.downcast::<R>().map(|value| *value).map_err(|_| mismatch()),
            Completion::Aborted(err) => Err(err),
            _ => Err(Error::NoResult),
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        match self.disposition {
            Disposition::Join => {
                if let Err(err) = self.join() {
                    tracing::warn!(worker = %self.id, error = %err, "worker ended badly; dropped while joining");
                }
            }
            Disposition::Detach => self.detach(),
        }
    }
}

impl fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("id", &self.id)
            .field("parent", &self.parent)
            .field("name", &self.name)
            .field("disposition", &self.disposition)
            .field("state", &self.state())
            .field("reclaimed", &self.is_reclaimed())
            .finish()
    }
}
