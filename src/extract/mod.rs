//! Payload extraction: decoded frames or buffered documents in, normalized
//! [`ChunkResult`]s out.

pub mod path;

use serde_json::Value;

use crate::error::ClientError;
use crate::protocol::canonical::{ChunkResult, Usage};
use crate::protocol::profile::{BufferSchema, Framing, ResponseSchema, StreamSchema, UsagePaths};

pub use path::{JsonPath, PathError};
use path::{value_to_count, value_to_text};

/// How the response body is cut into units before extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyFraming {
    Sse,
    Lines,
    /// The whole body is one document.
    Whole,
}

impl From<Framing> for BodyFraming {
    fn from(framing: Framing) -> Self {
        match framing {
            Framing::Sse => BodyFraming::Sse,
            Framing::Lines => BodyFraming::Lines,
        }
    }
}

/// Extraction strategy for one call, compiled once from the profile. The
/// variant fixes how the body is cut: streamed bodies into frames, buffered
/// bodies into a single document.
#[derive(Debug, Clone)]
pub enum PayloadExtractor {
    Frames(FrameExtractor),
    Document(DocumentExtractor),
}

/// Interprets streamed frames.
#[derive(Debug, Clone)]
pub enum FrameExtractor {
    /// Chat-completions stream events (`choices[].delta`, top-level `usage`).
    OpenAiChat,
    Schema(StreamExtractor),
}

/// Interprets a fully buffered body.
#[derive(Debug, Clone)]
pub enum DocumentExtractor {
    /// Chat-completions document (`choices[].message`, top-level `usage`).
    OpenAiChat,
    Schema(BufferExtractor),
}

impl PayloadExtractor {
    #[must_use]
    pub fn openai_chat(stream: bool) -> Self {
        if stream {
            PayloadExtractor::Frames(FrameExtractor::OpenAiChat)
        } else {
            PayloadExtractor::Document(DocumentExtractor::OpenAiChat)
        }
    }

    /// Compile the extractor for a template-driven response schema.
    ///
    /// # Errors
    ///
    /// Returns [`PathError`] when any configured path fails to parse.
    pub fn for_schema(schema: &ResponseSchema) -> Result<Self, PathError> {
        Ok(match schema {
            ResponseSchema::Stream(schema) => PayloadExtractor::Frames(FrameExtractor::Schema(
                StreamExtractor::compile(schema)?,
            )),
            ResponseSchema::Buffer(schema) => PayloadExtractor::Document(
                DocumentExtractor::Schema(BufferExtractor::compile(schema)?),
            ),
        })
    }

    #[must_use]
    pub fn framing(&self) -> BodyFraming {
        match self {
            PayloadExtractor::Frames(FrameExtractor::OpenAiChat) => BodyFraming::Sse,
            PayloadExtractor::Frames(FrameExtractor::Schema(extractor)) => extractor.framing.into(),
            PayloadExtractor::Document(_) => BodyFraming::Whole,
        }
    }
}

impl FrameExtractor {
    /// Extract chunks from one streamed frame. Frames that cannot be
    /// interpreted are dropped; they never fail the stream.
    pub fn extract_frame(&self, frame: &str, out: &mut Vec<ChunkResult>) {
        match self {
            FrameExtractor::OpenAiChat => extract_openai_event(frame, out),
            FrameExtractor::Schema(extractor) => {
                if let Some(chunk) = extractor.extract(frame) {
                    out.push(chunk);
                }
            }
        }
    }
}

impl DocumentExtractor {
    /// Extract chunks from a fully buffered response body.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidJson`] when the body is not a JSON
    /// document.
    pub fn extract_document(&self, body: &str, out: &mut Vec<ChunkResult>) -> Result<(), ClientError> {
        let doc: Value = serde_json::from_str(body)
            .map_err(|e| ClientError::InvalidJson(format!("response body is not JSON: {e}")))?;
        match self {
            DocumentExtractor::OpenAiChat => extract_openai_completion(&doc, out),
            DocumentExtractor::Schema(extractor) => push_non_empty(out, extractor.extract(&doc)),
        }
        Ok(())
    }
}

fn push_non_empty(out: &mut Vec<ChunkResult>, chunk: ChunkResult) {
    if !chunk.is_empty() {
        out.push(chunk);
    }
}

#[derive(Debug, Clone, Default)]
struct UsageSelectors {
    prompt_tokens: Option<JsonPath>,
    completion_tokens: Option<JsonPath>,
    total_tokens: Option<JsonPath>,
}

impl UsageSelectors {
    fn compile(paths: Option<&UsagePaths>) -> Result<Self, PathError> {
        let Some(paths) = paths else {
            return Ok(Self::default());
        };
        Ok(Self {
            prompt_tokens: compile_optional(paths.prompt_tokens.as_deref())?,
            completion_tokens: compile_optional(paths.completion_tokens.as_deref())?,
            total_tokens: compile_optional(paths.total_tokens.as_deref())?,
        })
    }

    fn resolve(&self, doc: &Value) -> Option<Usage> {
        let count = |path: &Option<JsonPath>| {
            path.as_ref()
                .and_then(|path| path.lookup(doc))
                .and_then(value_to_count)
        };
        let usage = Usage {
            prompt_tokens: count(&self.prompt_tokens),
            completion_tokens: count(&self.completion_tokens),
            total_tokens: count(&self.total_tokens),
        };
        (!usage.is_empty()).then_some(usage)
    }
}

/// Blank expressions mean "not configured" rather than "document root".
fn compile_optional(expr: Option<&str>) -> Result<Option<JsonPath>, PathError> {
    match expr.map(str::trim) {
        None | Some("") => Ok(None),
        Some(expr) => JsonPath::parse(expr).map(Some),
    }
}

/// Schema-driven extractor for streamed frames.
#[derive(Debug, Clone)]
pub struct StreamExtractor {
    framing: Framing,
    delta: Option<JsonPath>,
    finish: Option<JsonPath>,
    usage: UsageSelectors,
}

impl StreamExtractor {
    /// # Errors
    ///
    /// Returns [`PathError`] when any configured path fails to parse.
    pub fn compile(schema: &StreamSchema) -> Result<Self, PathError> {
        Ok(Self {
            framing: schema.framing,
            delta: compile_optional(Some(&schema.path_delta))?,
            finish: compile_optional(schema.path_finish.as_deref())?,
            usage: UsageSelectors::compile(schema.path_usage.as_ref())?,
        })
    }

    /// Interpret one frame.
    ///
    /// Non-JSON frames become plain-text deltas under `lines` framing and are
    /// dropped under `sse` framing.
    #[must_use]
    pub fn extract(&self, frame: &str) -> Option<ChunkResult> {
        match serde_json::from_str::<Value>(frame) {
            Ok(doc) => self.extract_json(&doc),
            Err(_) if self.framing == Framing::Lines => Some(ChunkResult::delta(frame)),
            Err(err) => {
                tracing::debug!(error = %err, frame_len = frame.len(), "dropping non-JSON sse frame");
                None
            }
        }
    }

    fn extract_json(&self, doc: &Value) -> Option<ChunkResult> {
        let chunk = ChunkResult {
            delta: resolve_text(self.delta.as_ref(), doc),
            usage: self.usage.resolve(doc),
            finish_reason: resolve_text(self.finish.as_ref(), doc),
        };
        (!chunk.is_empty()).then_some(chunk)
    }
}

/// Schema-driven extractor for single-document responses.
#[derive(Debug, Clone)]
pub struct BufferExtractor {
    text: Option<JsonPath>,
    finish: Option<JsonPath>,
    usage: UsageSelectors,
}

impl BufferExtractor {
    /// # Errors
    ///
    /// Returns [`PathError`] when any configured path fails to parse.
    pub fn compile(schema: &BufferSchema) -> Result<Self, PathError> {
        Ok(Self {
            text: compile_optional(Some(&schema.path_text))?,
            finish: compile_optional(schema.path_finish.as_deref())?,
            usage: UsageSelectors::compile(schema.path_usage.as_ref())?,
        })
    }

    #[must_use]
    pub fn extract(&self, doc: &Value) -> ChunkResult {
        ChunkResult {
            delta: resolve_text(self.text.as_ref(), doc),
            usage: self.usage.resolve(doc),
            finish_reason: resolve_text(self.finish.as_ref(), doc),
        }
    }
}

fn resolve_text(path: Option<&JsonPath>, doc: &Value) -> Option<String> {
    let text = value_to_text(path?.lookup(doc)?);
    (!text.is_empty()).then_some(text)
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .filter(|text| !text.is_empty())
        .map(str::to_owned)
}

fn openai_usage(doc: &Value) -> Option<Usage> {
    let usage = doc.get("usage").filter(|usage| usage.is_object())?;
    let usage = Usage {
        prompt_tokens: usage.get("prompt_tokens").and_then(value_to_count),
        completion_tokens: usage.get("completion_tokens").and_then(value_to_count),
        total_tokens: usage.get("total_tokens").and_then(value_to_count),
    };
    (!usage.is_empty()).then_some(usage)
}

/// One chat-completions stream event: a chunk per `choices[]` entry carrying
/// a delta or finish reason, plus a usage chunk when the event reports one.
pub fn extract_openai_event(frame: &str, out: &mut Vec<ChunkResult>) {
    let doc = match serde_json::from_str::<Value>(frame) {
        Ok(doc) => doc,
        Err(err) => {
            tracing::debug!(error = %err, frame_len = frame.len(), "dropping non-JSON sse frame");
            return;
        }
    };

    if let Some(choices) = doc.get("choices").and_then(Value::as_array) {
        for choice in choices {
            let delta = non_empty_str(choice.get("delta").and_then(|delta| delta.get("content")))
                .or_else(|| non_empty_str(choice.get("text")));
            push_non_empty(
                out,
                ChunkResult {
                    delta,
                    usage: None,
                    finish_reason: non_empty_str(choice.get("finish_reason")),
                },
            );
        }
    }

    if let Some(usage) = openai_usage(&doc) {
        out.push(ChunkResult {
            usage: Some(usage),
            ..ChunkResult::default()
        });
    }
}

/// A non-streamed chat completion document.
pub fn extract_openai_completion(doc: &Value, out: &mut Vec<ChunkResult>) {
    if let Some(choices) = doc.get("choices").and_then(Value::as_array) {
        for choice in choices {
            let delta =
                non_empty_str(choice.get("message").and_then(|message| message.get("content")))
                    .or_else(|| non_empty_str(choice.get("text")));
            push_non_empty(
                out,
                ChunkResult {
                    delta,
                    usage: None,
                    finish_reason: non_empty_str(choice.get("finish_reason")),
                },
            );
        }
    }

    if let Some(usage) = openai_usage(doc) {
        out.push(ChunkResult {
            usage: Some(usage),
            ..ChunkResult::default()
        });
    }
}
