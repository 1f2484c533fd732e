//! Transport seam and the invocation policy layered on top of it.

pub mod cancel;
mod http_transport;
pub mod invoke;

use std::fmt;
use std::pin::Pin;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use futures_util::{Stream, StreamExt};

use crate::request::PreparedRequest;

pub use cancel::{CancelSignal, CancelSource, TimeoutGuard};
pub use http_transport::HttpTransport;
pub use invoke::{invoke, Invocation};

/// Response body as a sequence of network reads.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>;

/// Failure reported by a [`Transport`] before or during body delivery.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct TransportError(pub String);

/// Status line plus a streaming body. Dropping the value releases the body.
pub struct UpstreamResponse {
    pub status: http::StatusCode,
    pub body: ByteStream,
}

impl fmt::Debug for UpstreamResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamResponse")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

impl UpstreamResponse {
    /// Read at most `limit` bytes of the body as lossy UTF-8. Read errors end
    /// the read quietly; whatever arrived before them is kept.
    pub async fn text_lossy(mut self, limit: usize) -> String {
        let mut collected = Vec::new();
        while let Some(read) = self.body.next().await {
            let Ok(bytes) = read else {
                break;
            };
            let room = limit.saturating_sub(collected.len());
            collected.extend_from_slice(&bytes[..bytes.len().min(room)]);
            if collected.len() >= limit {
                break;
            }
        }
        String::from_utf8_lossy(&collected).into_owned()
    }
}

/// Executes one HTTP exchange. Implementations must not retry.
pub trait Transport: Send + Sync {
    fn execute(&self, request: PreparedRequest) -> BoxFuture<'static, Result<UpstreamResponse, TransportError>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn text_lossy_stops_at_limit_and_swallows_errors() {
        let body = futures_util::stream::iter(vec![
            Ok(Bytes::from_static(b"hello ")),
            Ok(Bytes::from_static(b"world")),
        ]);
        let response = UpstreamResponse {
            status: http::StatusCode::BAD_GATEWAY,
            body: Box::pin(body),
        };
        assert_eq!(response.text_lossy(8).await, "hello wo");

        let body = futures_util::stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(TransportError("reset".into())),
            Ok(Bytes::from_static(b"never")),
        ]);
        let response = UpstreamResponse {
            status: http::StatusCode::BAD_GATEWAY,
            body: Box::pin(body),
        };
        assert_eq!(response.text_lossy(1024).await, "partial");
    }
}
