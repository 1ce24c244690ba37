//! The one busy-wait loop used by guards, bulk acquisition and tree hand-off.
//!
//! Every wait in the crate is "retry a non-blocking attempt until it
//! succeeds". `SpinWait` adds the pieces the bare loop lacks: a backoff
//! between attempts, an optional deadline, and an optional cancellation token.

use crate::config::{BackoffMode, CancelToken, SpinConfig};
use crate::error::{Error, Result};
use crossbeam_utils::Backoff;
use std::time::Instant;

pub(crate) struct SpinWait<'a> {
    config: SpinConfig,
    cancel: Option<&'a CancelToken>,
    started: Instant,
    backoff: Backoff,
}

impl<'a> SpinWait<'a> {
    pub(crate) fn new(config: SpinConfig, cancel: Option<&'a CancelToken>) -> Self {
        Self {
            config,
            cancel,
            started: Instant::now(),
            backoff: Backoff::new(),
        }
    }

    /// Waits that ignore the deadline and any token; used where the caller
    /// has no way to receive an error (lazy `Deref`).
    pub(crate) fn forever(backoff: BackoffMode) -> SpinWait<'static> {
        SpinWait::new(SpinConfig { backoff, timeout: None }, None)
    }

    /// Calls `attempt` until it returns `true`.
    pub(crate) fn until(&mut self, mut attempt: impl FnMut() -> bool) -> Result<()> {
        loop {
            if attempt() {
                return Ok(());
            }
            self.pause()?;
        }
    }

    fn pause(&mut self) -> Result<()> {
        if self.cancel.is_some_and(CancelToken::is_cancelled) {
            return Err(Error::Cancelled);
        }
        if let Some(timeout) = self.config.timeout {
            let waited = self.started.elapsed();
            if waited >= timeout {
                tracing::warn!(?waited, "spin wait timed out");
                return Err(Error::Timeout { waited });
            }
        }
        match self.config.backoff {
            BackoffMode::Spin => std::hint::spin_loop(),
            BackoffMode::Snooze => self.backoff.snooze(),
        }
        Ok(())
    }
}
