//! Completion engine entry point.

mod emitter;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::{ClientError, UpstreamCode};
use crate::extract::PayloadExtractor;
use crate::protocol::canonical::{ChatMessage, SendOptions};
use crate::protocol::profile::{BackendKind, EndpointProfile};
use crate::request::openai_chat::{build_chat_request, wants_stream};
use crate::request::template::{build_template_request, generic_block};
use crate::transport::{HttpTransport, Transport};

use emitter::CallPlan;
pub use emitter::CompletionStream;

/// Sends chat completions to any configured backend and streams the answer
/// back as [`ChunkResult`](crate::protocol::canonical::ChunkResult)s.
#[derive(Clone)]
pub struct CompletionClient {
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for CompletionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionClient").finish_non_exhaustive()
    }
}

impl CompletionClient {
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Client over a default [`HttpTransport`].
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] when the HTTP client cannot be built.
    pub fn http() -> Result<Self, ClientError> {
        Ok(Self::new(Arc::new(HttpTransport::new()?)))
    }

    /// Prepare one completion call.
    ///
    /// The request and response extractor are built here, so profile
    /// mistakes fail before anything touches the network. The request
    /// itself is issued when the returned stream is first polled.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] when a template-driven profile lacks
    /// its backend block, names an unknown method, or carries a response
    /// path that does not parse.
    pub fn send(
        &self,
        messages: &[ChatMessage],
        options: &SendOptions,
        profile: &EndpointProfile,
        cancel: Option<CancellationToken>,
    ) -> Result<CompletionStream, ClientError> {
        let (request, extractor, upstream_code) = match profile.backend {
            BackendKind::OpenAiChat => (
                build_chat_request(messages, options, profile),
                PayloadExtractor::openai_chat(wants_stream(options, profile)),
                UpstreamCode::Classified,
            ),
            BackendKind::Generic => {
                let generic = generic_block(profile)?;
                let extractor = PayloadExtractor::for_schema(&generic.schema)
                    .map_err(|err| ClientError::Config(err.to_string()))?;
                (
                    build_template_request(messages, options, profile)?,
                    extractor,
                    UpstreamCode::HttpStatus,
                )
            }
        };

        let model = options
            .model
            .clone()
            .unwrap_or_else(|| profile.default_model.clone());
        tracing::debug!(
            backend = ?profile.backend,
            model = %model,
            framing = ?extractor.framing(),
            "prepared completion request"
        );

        Ok(CompletionStream::new(
            CallPlan {
                transport: Arc::clone(&self.transport),
                request,
                caller: cancel,
                timeout: profile.policy.timeout(),
                idle: profile.policy.idle_timeout(),
                upstream_code,
                model,
            },
            extractor,
        ))
    }
}
