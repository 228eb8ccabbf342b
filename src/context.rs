//! Shared deadline and cancellation for one measurement

use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Longest deadline a context will carry, roughly thirty years.
pub const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Deadline and cancellation token shared by every network operation
/// of a measurement.
///
/// Expiry and cancellation surface as ordinary `io::Error`s on
/// whichever operation is in flight.
#[derive(Debug, Clone)]
pub struct MeasurementContext {
    deadline: Instant,
    token: CancellationToken,
}

impl MeasurementContext {
    /// Create a context whose deadline is `timeout` from now.
    ///
    /// Timeouts too large to represent are clamped to [`FAR_FUTURE`]
    /// from now.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        let now = Instant::now();
        Self {
            deadline: now
                .checked_add(timeout)
                .unwrap_or_else(|| now + FAR_FUTURE),
            token: CancellationToken::new(),
        }
    }

    /// Token the caller can use to cancel the measurement.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Cancel every operation running under this context.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    #[must_use]
    pub const fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Run `fut` until it completes, the deadline expires, or the
    /// context is cancelled.
    pub async fn run<T, F>(&self, fut: F) -> io::Result<T>
    where
        F: Future<Output = io::Result<T>>,
    {
        tokio::select! {
            biased;
            () = self.token.cancelled() => Err(io::Error::new(
                io::ErrorKind::Interrupted,
                "operation was canceled",
            )),
            res = tokio::time::timeout_at(self.deadline, fut) => res.unwrap_or_else(|_| {
                Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "context deadline exceeded",
                ))
            }),
        }
    }
}
