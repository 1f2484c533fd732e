//! Template-driven request rendering.
//!
//! Rendering makes two passes over every leaf string. A leaf that is exactly
//! one placeholder is replaced by the typed value (arrays stay arrays,
//! numbers stay numbers). Any other leaf gets textual substitution followed
//! by `"true"`/`"false"` coercion.

use http::header::AUTHORIZATION;
use http::{HeaderMap, Method};
use serde_json::{Map, Value};

use super::{apply_caller_headers, insert_header, join_url, json_content_type, PreparedRequest};
use crate::error::ClientError;
use crate::protocol::canonical::{ChatMessage, SendOptions};
use crate::protocol::profile::{AuthScheme, EndpointProfile, GenericBackend, ResponseSchema};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placeholder {
    Messages,
    MessageRoles,
    MessageContents,
    Model,
    Temperature,
    MaxTokens,
    Stream,
    AuthToken,
    AuthScheme,
}

impl Placeholder {
    /// Placeholders allowed as a whole-value (typed) substitution.
    fn typed(leaf: &str) -> Option<Self> {
        let placeholder = Self::from_name(leaf.strip_prefix("{{")?.strip_suffix("}}")?)?;
        match placeholder {
            Placeholder::AuthToken | Placeholder::AuthScheme => None,
            typed => Some(typed),
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "messages[]" => Placeholder::Messages,
            "messages:role" => Placeholder::MessageRoles,
            "messages:content" => Placeholder::MessageContents,
            "model" => Placeholder::Model,
            "temperature" => Placeholder::Temperature,
            "max_tokens" => Placeholder::MaxTokens,
            "stream" => Placeholder::Stream,
            "auth_token" => Placeholder::AuthToken,
            "auth_scheme" => Placeholder::AuthScheme,
            _ => return None,
        })
    }
}

/// Values available to a request template for one call.
#[derive(Debug, Clone)]
pub struct RenderingContext<'a> {
    pub model: &'a str,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u64>,
    pub stream: bool,
    pub messages: &'a [ChatMessage],
    pub auth_token: Option<&'a str>,
    pub auth_scheme: Option<AuthScheme>,
}

impl<'a> RenderingContext<'a> {
    #[must_use]
    pub fn new(
        messages: &'a [ChatMessage],
        options: &'a SendOptions,
        profile: &'a EndpointProfile,
        default_stream: bool,
    ) -> Self {
        Self {
            model: options
                .model
                .as_deref()
                .unwrap_or(profile.default_model.as_str()),
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            stream: options
                .stream
                .or(profile.policy.stream)
                .unwrap_or(default_stream),
            messages,
            auth_token: profile.auth.as_ref().map(|auth| auth.token.as_str()),
            auth_scheme: profile.auth.as_ref().map(|auth| auth.scheme),
        }
    }

    fn typed_value(&self, placeholder: Placeholder) -> Option<Value> {
        match placeholder {
            Placeholder::Messages => Some(Value::Array(
                self.messages
                    .iter()
                    .map(|message| {
                        let mut entry = Map::with_capacity(2);
                        entry.insert("role".into(), Value::from(message.role.as_str()));
                        entry.insert("content".into(), Value::from(message.content.as_str()));
                        Value::Object(entry)
                    })
                    .collect(),
            )),
            Placeholder::MessageRoles => Some(Value::Array(
                self.messages
                    .iter()
                    .map(|message| Value::from(message.role.as_str()))
                    .collect(),
            )),
            Placeholder::MessageContents => Some(Value::Array(
                self.messages
                    .iter()
                    .map(|message| Value::from(message.content.as_str()))
                    .collect(),
            )),
            Placeholder::Model => Some(Value::from(self.model)),
            Placeholder::Temperature => self
                .temperature
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number),
            Placeholder::MaxTokens => self.max_tokens.map(Value::from),
            Placeholder::Stream => Some(Value::Bool(self.stream)),
            Placeholder::AuthToken => self.auth_token.map(Value::from),
            Placeholder::AuthScheme => self.auth_scheme.map(|scheme| Value::from(scheme.as_str())),
        }
    }

    fn text_value(&self, placeholder: Placeholder) -> String {
        match self.typed_value(placeholder) {
            Some(Value::String(text)) => text,
            Some(other) => other.to_string(),
            None => String::new(),
        }
    }

    /// Replace every known `{{token}}` in `input`. Unknown tokens and stray
    /// braces are kept verbatim. Substituted text is never rescanned.
    #[must_use]
    pub fn interpolate(&self, input: &str) -> String {
        let mut out = String::with_capacity(input.len());
        let mut rest = input;
        while let Some(open) = rest.find("{{") {
            out.push_str(&rest[..open]);
            let after_open = &rest[open + 2..];
            let token = after_open
                .find("}}")
                .and_then(|close| Some((Placeholder::from_name(&after_open[..close])?, close)));
            match token {
                Some((placeholder, close)) => {
                    out.push_str(&self.text_value(placeholder));
                    rest = &after_open[close + 2..];
                }
                None => {
                    out.push('{');
                    rest = &rest[open + 1..];
                }
            }
        }
        out.push_str(rest);
        out
    }
}

/// Render a template tree. `None` means the value is absent: object entries
/// holding it are dropped and array slots become `null`.
#[must_use]
pub fn render_template(template: &Value, ctx: &RenderingContext<'_>) -> Option<Value> {
    match template {
        Value::String(leaf) => match Placeholder::typed(leaf) {
            Some(placeholder) => ctx.typed_value(placeholder),
            None => Some(coerce_bool(ctx.interpolate(leaf))),
        },
        Value::Array(items) => Some(Value::Array(
            items
                .iter()
                .map(|item| render_template(item, ctx).unwrap_or(Value::Null))
                .collect(),
        )),
        Value::Object(map) => Some(Value::Object(
            map.iter()
                .filter_map(|(key, value)| {
                    render_template(value, ctx).map(|rendered| (key.clone(), rendered))
                })
                .collect(),
        )),
        other => Some(other.clone()),
    }
}

fn coerce_bool(text: String) -> Value {
    match text.as_str() {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(text),
    }
}

/// Build a request for a template-driven backend.
///
/// # Errors
///
/// Returns [`ClientError::Config`] when the profile has no generic backend
/// block, names an unknown HTTP method, or yields an unparsable URL for a
/// query-string request.
pub fn build_template_request(
    messages: &[ChatMessage],
    options: &SendOptions,
    profile: &EndpointProfile,
) -> Result<PreparedRequest, ClientError> {
    let generic = generic_block(profile)?;
    let ctx = RenderingContext::new(
        messages,
        options,
        profile,
        matches!(generic.schema, ResponseSchema::Stream(_)),
    );
    let template = &generic.request;

    let method = match template.method.as_deref().map(str::trim) {
        None | Some("") => Method::POST,
        Some(name) => Method::from_bytes(name.to_ascii_uppercase().as_bytes())
            .map_err(|_| ClientError::Config(format!("unsupported HTTP method '{name}'")))?,
    };

    let mut url = join_url(&profile.base_url, &ctx.interpolate(&template.path));
    let rendered = render_template(&template.body, &ctx).filter(|body| !body.is_null());

    let body = if method == Method::GET {
        match rendered {
            Some(Value::Object(params)) if !params.is_empty() => {
                url = append_query(&url, &params)?;
            }
            Some(Value::Object(_)) | None => {}
            Some(_) => tracing::warn!("ignoring non-object body template for GET request"),
        }
        None
    } else {
        // Serializing a `Value` cannot fail.
        rendered.map(|body| bytes::Bytes::from(serde_json::to_vec(&body).unwrap_or_default()))
    };

    let mut headers = HeaderMap::new();
    if body.is_some() {
        json_content_type(&mut headers);
    }
    if let Some(value) = profile.auth.as_ref().and_then(|auth| auth.header_value()) {
        insert_header(&mut headers, AUTHORIZATION.as_str(), &value);
    }
    for (name, value) in profile.headers.iter().chain(template.headers.iter()) {
        insert_header(&mut headers, name, &ctx.interpolate(value));
    }
    apply_caller_headers(&mut headers, &options.extra_headers);

    Ok(PreparedRequest {
        method,
        url,
        headers,
        body,
    })
}

pub(crate) fn generic_block(profile: &EndpointProfile) -> Result<&GenericBackend, ClientError> {
    profile.generic.as_ref().ok_or_else(|| {
        ClientError::Config("profile has no generic backend configuration".to_string())
    })
}

fn append_query(url: &str, params: &Map<String, Value>) -> Result<String, ClientError> {
    let mut parsed = url::Url::parse(url)
        .map_err(|e| ClientError::Config(format!("invalid endpoint URL '{url}': {e}")))?;
    {
        let mut pairs = parsed.query_pairs_mut();
        for (key, value) in params {
            match value {
                Value::String(text) => pairs.append_pair(key, text),
                other => pairs.append_pair(key, &other.to_string()),
            };
        }
    }
    Ok(parsed.into())
}
