//! Operation context: a cancellation signal plus an optional deadline.
//!
//! Every API call takes a context. Cancelling it (or letting its deadline
//! pass) aborts the in-flight attempt and any pending backoff.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why an operation context ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelCause {
    /// The context was cancelled explicitly.
    Cancelled,
    /// The context deadline passed.
    DeadlineExceeded,
}

impl fmt::Display for CancelCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => f.write_str("context canceled"),
            Self::DeadlineExceeded => f.write_str("context deadline exceeded"),
        }
    }
}

/// Cancellation signal and deadline shared by the operations of one command.
#[derive(Debug, Clone, Default)]
pub struct OperationContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl OperationContext {
    /// Creates a context that never ends on its own.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy that also ends after `timeout`.
    ///
    /// An earlier existing deadline is kept.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;
        self.deadline = Some(self.deadline.map_or(deadline, |d| d.min(deadline)));
        self
    }

    /// Cancels this context.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Returns the underlying token.
    #[must_use]
    pub const fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Returns the deadline, if any.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns why the context ended, or `None` while it is live.
    #[must_use]
    pub fn cause(&self) -> Option<CancelCause> {
        if self.token.is_cancelled() {
            Some(CancelCause::Cancelled)
        } else if self.deadline.is_some_and(|d| Instant::now() >= d) {
            Some(CancelCause::DeadlineExceeded)
        } else {
            None
        }
    }

    /// Waits until the context ends.
    pub async fn done(&self) -> CancelCause {
        match self.deadline {
            Some(deadline) => tokio::select! {
                () = self.token.cancelled() => CancelCause::Cancelled,
                () = tokio::time::sleep_until(deadline) => CancelCause::DeadlineExceeded,
            },
            None => {
                self.token.cancelled().await;
                CancelCause::Cancelled
            }
        }
    }
}
