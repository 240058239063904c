//! Cross-thread run control: cancellation token and halt requests.

use crate::error::{EngineError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation flag handed to every operator call.
///
/// Cloning shares the flag. A token built from an existing
/// `Arc<AtomicBool>` lets a caller's own watchdog flag cancel a run.
///
/// ```
/// use u_opgraph::engine::CancellationToken;
///
/// let token = CancellationToken::new();
/// let seen_by_operator = token.clone();
/// assert!(seen_by_operator.check().is_ok());
///
/// token.cancel();
/// assert!(seen_by_operator.is_cancelled());
/// assert!(seen_by_operator.check().is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Returns [`EngineError::Cancelled`] once the token is cancelled.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(EngineError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// The underlying flag.
    pub fn flag(&self) -> Arc<AtomicBool> {
        self.0.clone()
    }

    pub(crate) fn reset(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

impl From<Arc<AtomicBool>> for CancellationToken {
    fn from(flag: Arc<AtomicBool>) -> Self {
        Self(flag)
    }
}

/// Why a drain loop stopped dequeuing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Halt {
    Pause,
    Stop,
    Abort,
    /// The token was cancelled without an abort request.
    Cancel,
    /// A step budget ran out.
    Budget,
    /// A sibling parallel branch failed.
    Fault,
}

/// Flags shared between an engine and its handles.
#[derive(Debug, Default)]
pub(crate) struct Control {
    pause: AtomicBool,
    stop: AtomicBool,
    abort: AtomicBool,
    token: CancellationToken,
    /// The token belongs to the caller and is never cleared here.
    external: bool,
}

impl Control {
    pub(crate) fn with_token(token: CancellationToken) -> Self {
        Self {
            token,
            external: true,
            ..Self::default()
        }
    }

    /// Fresh control for a copied engine. A caller's token is kept.
    pub(crate) fn detached(&self) -> Self {
        if self.external {
            Self::with_token(self.token.clone())
        } else {
            Self::default()
        }
    }

    /// Clears every request, and the token if the engine owns it.
    pub(crate) fn reset(&self) {
        self.pause.store(false, Ordering::Relaxed);
        self.stop.store(false, Ordering::Relaxed);
        self.abort.store(false, Ordering::Relaxed);
        if !self.external {
            self.token.reset();
        }
    }

    pub(crate) fn clear_pause(&self) {
        self.pause.store(false, Ordering::Relaxed);
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub(crate) fn aborted(&self) -> bool {
        self.abort.load(Ordering::Relaxed)
    }

    /// The strongest pending request, if any.
    pub(crate) fn halt(&self) -> Option<Halt> {
        if self.aborted() {
            Some(Halt::Abort)
        } else if self.stop.load(Ordering::Relaxed) {
            Some(Halt::Stop)
        } else if self.token.is_cancelled() {
            Some(Halt::Cancel)
        } else if self.pause.load(Ordering::Relaxed) {
            Some(Halt::Pause)
        } else {
            None
        }
    }
}

/// Thread-safe remote control for a running engine.
///
/// Requests are observed between operations. Only
/// [`abort`](EngineHandle::abort) also cancels the token that in-flight
/// operators poll.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    control: Arc<Control>,
}

impl EngineHandle {
    pub(crate) fn new(control: Arc<Control>) -> Self {
        Self { control }
    }

    /// Halts after the current operation, keeping the continuation.
    pub fn pause(&self) {
        self.control.pause.store(true, Ordering::Relaxed);
    }

    /// Halts after the current operation and discards the continuation.
    pub fn stop(&self) {
        self.control.stop.store(true, Ordering::Relaxed);
    }

    /// Like [`stop`](EngineHandle::stop), and cancels in-flight operators.
    pub fn abort(&self) {
        self.control.abort.store(true, Ordering::Relaxed);
        self.control.token.cancel();
    }

    /// The token passed to operators; cancelling it stops the run.
    pub fn token(&self) -> CancellationToken {
        self.control.token.clone()
    }
}
