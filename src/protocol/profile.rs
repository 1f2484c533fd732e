use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Declarative description of one backend endpoint.
///
/// Profiles arrive fully resolved: the secret in [`AuthDescriptor`] is the
/// final credential, not a reference to one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointProfile {
    pub base_url: String,
    #[serde(default)]
    pub default_model: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub auth: Option<AuthDescriptor>,
    #[serde(default)]
    pub policy: RequestPolicy,
    #[serde(default)]
    pub backend: BackendKind,
    #[serde(default)]
    pub generic: Option<GenericBackend>,
}

impl EndpointProfile {
    /// Profile for an OpenAI-compatible chat-completions endpoint.
    #[must_use]
    pub fn openai_chat(base_url: impl Into<String>, default_model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            default_model: default_model.into(),
            headers: BTreeMap::new(),
            auth: None,
            policy: RequestPolicy::default(),
            backend: BackendKind::OpenAiChat,
            generic: None,
        }
    }

    /// Profile for a template-driven backend.
    #[must_use]
    pub fn generic(
        base_url: impl Into<String>,
        default_model: impl Into<String>,
        generic: GenericBackend,
    ) -> Self {
        Self {
            backend: BackendKind::Generic,
            generic: Some(generic),
            ..Self::openai_chat(base_url, default_model)
        }
    }

    #[must_use]
    pub fn with_auth(mut self, scheme: AuthScheme, token: impl Into<String>) -> Self {
        self.auth = Some(AuthDescriptor {
            scheme,
            token: token.into(),
        });
        self
    }

    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.policy.timeout_ms = Some(timeout_ms);
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// Which request/response contract a profile speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    #[serde(rename = "openai_chat", alias = "openai")]
    OpenAiChat,
    Generic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AuthScheme {
    #[default]
    Bearer,
    Basic,
}

impl AuthScheme {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AuthScheme::Bearer => "Bearer",
            AuthScheme::Basic => "Basic",
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct AuthDescriptor {
    #[serde(default)]
    pub scheme: AuthScheme,
    pub token: String,
}

impl AuthDescriptor {
    /// `Authorization` header value, or `None` when no secret is configured.
    #[must_use]
    pub fn header_value(&self) -> Option<String> {
        let token = self.token.trim();
        if token.is_empty() {
            return None;
        }
        Some(format!("{} {token}", self.scheme.as_str()))
    }
}

impl fmt::Debug for AuthDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthDescriptor")
            .field("scheme", &self.scheme)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Per-request policy attached to a profile.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestPolicy {
    #[serde(default)]
    pub stream: Option<bool>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub idle_timeout_ms: Option<u64>,
}

impl RequestPolicy {
    /// Total-duration timeout; zero means none.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    #[must_use]
    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }
}

/// Configuration block for template-driven backends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenericBackend {
    #[serde(flatten)]
    pub request: RequestTemplate,
    pub schema: ResponseSchema,
}

/// Request shape with placeholder tokens such as `{{model}}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestTemplate {
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: serde_json::Value,
}

/// How to pull answer text, finish reason, and usage out of a response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum ResponseSchema {
    Buffer(BufferSchema),
    Stream(StreamSchema),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferSchema {
    #[serde(rename = "pathText", alias = "path_text")]
    pub path_text: String,
    #[serde(rename = "pathFinish", alias = "path_finish", default)]
    pub path_finish: Option<String>,
    #[serde(rename = "pathUsage", alias = "path_usage", default)]
    pub path_usage: Option<UsagePaths>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamSchema {
    #[serde(default)]
    pub framing: Framing,
    #[serde(rename = "pathDelta", alias = "path_delta", default)]
    pub path_delta: String,
    #[serde(rename = "pathFinish", alias = "path_finish", default)]
    pub path_finish: Option<String>,
    #[serde(rename = "pathUsage", alias = "path_usage", default)]
    pub path_usage: Option<UsagePaths>,
}

/// Wire framing of a streamed body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Framing {
    #[default]
    Sse,
    Lines,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsagePaths {
    #[serde(default)]
    pub prompt_tokens: Option<String>,
    #[serde(default)]
    pub completion_tokens: Option<String>,
    #[serde(default)]
    pub total_tokens: Option<String>,
}
