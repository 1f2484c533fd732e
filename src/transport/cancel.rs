//! First-of-N cancellation over [`CancellationToken`]s.

use std::time::Duration;

use smallvec::SmallVec;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Which party asked for the call to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelSource {
    Caller,
    Timeout,
}

/// Fires as soon as any of its tokens is cancelled.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    sources: SmallVec<[(CancelSource, CancellationToken); 2]>,
}

impl CancelSignal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, source: CancelSource, token: CancellationToken) -> Self {
        self.sources.push((source, token));
        self
    }

    /// The source that has already fired, if any. A deadline wins over a
    /// caller abort when both are set.
    #[must_use]
    pub fn fired(&self) -> Option<CancelSource> {
        let mut fired = None;
        for (source, token) in &self.sources {
            if token.is_cancelled() {
                if *source == CancelSource::Timeout {
                    return Some(CancelSource::Timeout);
                }
                fired = Some(*source);
            }
        }
        fired
    }

    /// Resolve once any token fires. Never resolves for an empty signal.
    pub async fn cancelled(&self) -> CancelSource {
        if let Some(source) = self.fired() {
            return source;
        }
        if self.sources.is_empty() {
            return std::future::pending().await;
        }
        let waits = self.sources.iter().map(|(source, token)| {
            let source = *source;
            Box::pin(async move {
                token.cancelled().await;
                source
            })
        });
        let (first, _, _) = futures_util::future::select_all(waits).await;
        self.fired().unwrap_or(first)
    }

    /// Owned variant of [`CancelSignal::cancelled`] for storage in state
    /// machines.
    pub async fn into_cancelled(self) -> CancelSource {
        self.cancelled().await
    }
}

/// Cancels its token once `duration` has elapsed unless disarmed first.
/// Dropping the guard disarms it.
#[derive(Debug)]
pub struct TimeoutGuard {
    token: CancellationToken,
    duration: Duration,
    task: Option<JoinHandle<()>>,
}

impl TimeoutGuard {
    /// Start the timer. Must be called inside a Tokio runtime.
    #[must_use]
    pub fn arm(duration: Duration) -> Self {
        let token = CancellationToken::new();
        let deadline = token.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            deadline.cancel();
        });
        Self {
            token,
            duration,
            task: Some(task),
        }
    }

    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    #[must_use]
    pub fn duration(&self) -> Duration {
        self.duration
    }

    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.task.is_some()
    }

    /// Stop the timer. Calling it again is a no-op.
    pub fn disarm(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for TimeoutGuard {
    fn drop(&mut self) {
        self.disarm();
    }
}
