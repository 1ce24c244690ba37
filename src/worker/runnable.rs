//! The unit of work a worker runs, and what it hands back.

use super::context::WorkerContext;
use std::any::{Any, TypeId};
use std::fmt;
use std::marker::PhantomData;

/// What a runnable produced.
pub enum Outcome {
    /// The body returns nothing.
    Unit,
    /// A type-erased value, recovered with
    /// [`WorkerHandle::fetch_result`](super::WorkerHandle::fetch_result).
    Value(Box<dyn Any + Send>),
}

impl Outcome {
    /// Boxes `value`, mapping `()` to [`Outcome::Unit`].
    pub fn from_value<R: Send + 'static>(value: R) -> Self {
        if TypeId::of::<R>() == TypeId::of::<()>() {
            Outcome::Unit
        } else {
            Outcome::Value(Box::new(value))
        }
    }

    /// `true` for [`Outcome::Unit`].
    pub fn is_unit(&self) -> bool {
        matches!(self, Outcome::Unit)
    }
}

impl fmt::Debug for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Unit => f.write_str("Unit"),
            Outcome::Value(_) => f.write_str("Value(..)"),
        }
    }
}

/// Packaged work with its arguments already bound.
///
/// `execute` runs exactly once, on the worker thread, after the worker has
/// taken its tree's turn.
pub trait Runnable: Send + 'static {
    /// Runs the work.
    fn execute(&mut self, ctx: &WorkerContext<'_>) -> Outcome;
}

impl Runnable for Box<dyn Runnable> {
    fn execute(&mut self, ctx: &WorkerContext<'_>) -> Outcome {
        (**self).execute(ctx)
    }
}

/// A closure as a [`Runnable`]. Built by [`task`].
pub struct Task<F, R> {
    body: Option<F>,
    _result: PhantomData<fn() -> R>,
}

/// Wraps a closure so a worker can run it.
///
/// ```rust
/// use lineage::{task, WorkerBuilder};
///
/// let mut handle = WorkerBuilder::new().spawn(task(|_ctx| 6 * 7)).unwrap();
/// handle.join().unwrap();
/// assert_eq!(handle.fetch_result::<i32>().unwrap(), 42);
/// ```
pub fn task<F, R>(body: F) -> Task<F, R>
where
    F: FnOnce(&WorkerContext<'_>) -> R + Send + 'static,
    R: Send + 'static,
{
    Task {
        body: Some(body),
        _result: PhantomData,
    }
}

impl<F, R> Runnable for Task<F, R>
where
    F: FnOnce(&WorkerContext<'_>) -> R + Send + 'static,
    R: Send + 'static,
{
    fn execute(&mut self, ctx: &WorkerContext<'_>) -> Outcome {
        match self.body.take() {
            Some(body) => Outcome::from_value(body(ctx)),
            None => Outcome::Unit,
        }
    }
}
