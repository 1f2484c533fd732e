use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::Stream;
use pin_project_lite::pin_project;
use tokio::time::{Instant, Sleep};

/// Raised by [`IdleTimeout`] when the inner stream stays silent too long.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("no data received for {0:?}")]
pub struct IdleElapsed(pub Duration);

pin_project! {
    /// Stream adapter that fails when no item arrives within `period`.
    ///
    /// The timer restarts after every item, so only a gap with no data
    /// fires it. After firing the adapter is exhausted. Must be created
    /// inside a Tokio runtime.
    pub struct IdleTimeout<S> {
        #[pin]
        inner: S,
        #[pin]
        sleep: Sleep,
        period: Duration,
        fired: bool,
    }
}

impl<S> IdleTimeout<S> {
    pub fn new(inner: S, period: Duration) -> Self {
        Self {
            inner,
            sleep: tokio::time::sleep(period),
            period,
            fired: false,
        }
    }
}

impl<S: Stream> Stream for IdleTimeout<S> {
    type Item = Result<S::Item, IdleElapsed>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();
        if *this.fired {
            return Poll::Ready(None);
        }

        match this.inner.poll_next(cx) {
            Poll::Ready(Some(item)) => {
                let deadline = Instant::now() + *this.period;
                this.sleep.as_mut().reset(deadline);
                Poll::Ready(Some(Ok(item)))
            }
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => match this.sleep.poll(cx) {
                Poll::Ready(()) => {
                    *this.fired = true;
                    Poll::Ready(Some(Err(IdleElapsed(*this.period))))
                }
                Poll::Pending => Poll::Pending,
            },
        }
    }
}
