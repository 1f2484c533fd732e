use std::borrow::Cow;

/// Canonical error type surfaced by the completion engine.
///
/// Every variant maps to a stable machine-readable [`code`](ClientError::code)
/// that the orchestration layer is expected to surface verbatim.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    #[error("Request timed out: {0}")]
    Timeout(String),
    #[error("Request aborted")]
    Aborted,
    #[error("Network error: {0}")]
    Network(String),
    #[error("Upstream error: status={status}, message={message}")]
    Upstream {
        status: u16,
        code: UpstreamCode,
        message: String,
    },
    #[error("Invalid JSON response: {0}")]
    InvalidJson(String),
    #[error("Config error: {0}")]
    Config(String),
}

/// How a non-success upstream status is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamCode {
    /// `http_<status>`, used by template-driven backends.
    HttpStatus,
    /// `upstream_error` for 5xx and `bad_request` otherwise, used by the
    /// fixed chat-completions backend.
    Classified,
}

impl ClientError {
    /// Stable error code for this failure.
    #[must_use]
    pub fn code(&self) -> Cow<'static, str> {
        match self {
            ClientError::Timeout(_) => Cow::Borrowed("timeout"),
            ClientError::Aborted => Cow::Borrowed("aborted"),
            ClientError::Network(_) => Cow::Borrowed("network_error"),
            ClientError::Upstream { status, code, .. } => upstream_code(*status, *code),
            ClientError::InvalidJson(_) => Cow::Borrowed("invalid_json"),
            ClientError::Config(_) => Cow::Borrowed("config_error"),
        }
    }

    /// HTTP status carried by upstream failures.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Upstream { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Human-readable message without the variant prefix.
    #[must_use]
    pub fn message(&self) -> Cow<'_, str> {
        match self {
            ClientError::Timeout(message)
            | ClientError::Network(message)
            | ClientError::InvalidJson(message)
            | ClientError::Config(message)
            | ClientError::Upstream { message, .. } => Cow::Borrowed(message),
            ClientError::Aborted => Cow::Borrowed("Request aborted"),
        }
    }
}

fn upstream_code(status: u16, code: UpstreamCode) -> Cow<'static, str> {
    match code {
        UpstreamCode::HttpStatus => Cow::Owned(format!("http_{status}")),
        UpstreamCode::Classified if status >= 500 => Cow::Borrowed("upstream_error"),
        UpstreamCode::Classified => Cow::Borrowed("bad_request"),
    }
}
