use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::{ClientError, UpstreamCode};
use crate::request::PreparedRequest;

use super::cancel::{CancelSignal, CancelSource, TimeoutGuard};
use super::{Transport, TransportError, UpstreamResponse};

const ERROR_BODY_LIMIT_BYTES: usize = 64 * 1024;

/// Per-call invocation policy: who may cancel, and how upstream failures
/// are reported.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub signal: CancelSignal,
    pub timeout: Option<Duration>,
    pub upstream_code: UpstreamCode,
}

impl Invocation {
    /// Combine the caller's token with a deadline timer.
    ///
    /// The timer is only armed for a positive timeout and only when the
    /// caller has not already cancelled. The returned guard must outlive
    /// the body reads.
    #[must_use]
    pub fn arm(
        caller: Option<CancellationToken>,
        timeout: Option<Duration>,
        upstream_code: UpstreamCode,
    ) -> (Self, Option<TimeoutGuard>) {
        let mut signal = CancelSignal::new();
        let caller_cancelled = caller.as_ref().is_some_and(CancellationToken::is_cancelled);
        if let Some(token) = caller {
            signal = signal.with(CancelSource::Caller, token);
        }
        let timer = timeout
            .filter(|duration| !duration.is_zero() && !caller_cancelled)
            .map(TimeoutGuard::arm);
        if let Some(timer) = &timer {
            signal = signal.with(CancelSource::Timeout, timer.token());
        }
        (
            Self {
                signal,
                timeout,
                upstream_code,
            },
            timer,
        )
    }

    /// The error a cancellation from `source` surfaces as.
    #[must_use]
    pub fn cancel_error(&self, source: CancelSource) -> ClientError {
        match source {
            CancelSource::Timeout => ClientError::Timeout(match self.timeout {
                Some(timeout) => format!("no complete response within {} ms", timeout.as_millis()),
                None => "deadline exceeded".to_string(),
            }),
            CancelSource::Caller => ClientError::Aborted,
        }
    }

    /// Map a transport failure, preferring whichever cancellation caused it.
    #[must_use]
    pub fn transport_error(&self, err: TransportError) -> ClientError {
        if let Some(source) = self.signal.fired() {
            return self.cancel_error(source);
        }
        let message = err.0.trim();
        if message.is_empty() {
            ClientError::Network("request failed before a response was received".to_string())
        } else {
            ClientError::Network(message.to_string())
        }
    }
}

/// Issue `request` and wait for a successful response head.
///
/// # Errors
///
/// - [`ClientError::Timeout`] / [`ClientError::Aborted`] when the signal
///   fires first.
/// - [`ClientError::Network`] when the transport fails.
/// - [`ClientError::Upstream`] for a non-success status, carrying the
///   response body text.
pub async fn invoke(
    transport: Arc<dyn Transport>,
    request: PreparedRequest,
    invocation: Invocation,
) -> Result<UpstreamResponse, ClientError> {
    if let Some(source) = invocation.signal.fired() {
        return Err(invocation.cancel_error(source));
    }

    tracing::debug!(
        method = %request.method,
        url = %request.url,
        has_body = request.body.is_some(),
        "issuing upstream request"
    );
    let pending = transport.execute(request);
    let response = tokio::select! {
        biased;
        source = invocation.signal.cancelled() => {
            tracing::debug!(?source, "request cancelled before response");
            return Err(invocation.cancel_error(source));
        }
        result = pending => result.map_err(|err| invocation.transport_error(err))?,
    };

    if response.status.is_success() {
        return Ok(response);
    }

    let status = response.status;
    let body = tokio::select! {
        biased;
        source = invocation.signal.cancelled() => return Err(invocation.cancel_error(source)),
        text = response.text_lossy(ERROR_BODY_LIMIT_BYTES) => text,
    };
    tracing::warn!(status = status.as_u16(), "upstream returned error status");
    Err(upstream_error(status, &body, invocation.upstream_code))
}

fn upstream_error(status: http::StatusCode, body: &str, code: UpstreamCode) -> ClientError {
    let body = body.trim();
    let message = if !body.is_empty() {
        body.to_string()
    } else if let Some(reason) = status.canonical_reason() {
        reason.to_string()
    } else {
        format!("upstream request failed with status {}", status.as_u16())
    };
    ClientError::Upstream {
        status: status.as_u16(),
        code,
        message,
    }
}
