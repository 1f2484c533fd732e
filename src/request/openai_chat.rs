use http::header::AUTHORIZATION;
use http::{HeaderMap, Method};
use serde::Serialize;

use super::{apply_caller_headers, insert_header, join_url, json_content_type, PreparedRequest};
use crate::protocol::canonical::{ChatMessage, SendOptions};
use crate::protocol::profile::EndpointProfile;

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionBody<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<&'a serde_json::Value>,
}

/// Whether the call streams: caller option, then profile preference, then on.
#[must_use]
pub fn wants_stream(options: &SendOptions, profile: &EndpointProfile) -> bool {
    options.stream.or(profile.policy.stream).unwrap_or(true)
}

/// Build a chat-completions request.
#[must_use]
pub fn build_chat_request(
    messages: &[ChatMessage],
    options: &SendOptions,
    profile: &EndpointProfile,
) -> PreparedRequest {
    let model = options
        .model
        .as_deref()
        .unwrap_or(profile.default_model.as_str());
    let body = ChatCompletionBody {
        model,
        messages: messages
            .iter()
            .map(|message| WireMessage {
                role: message.role.as_str(),
                content: &message.content,
            })
            .collect(),
        stream: wants_stream(options, profile),
        temperature: options.temperature,
        max_tokens: options.max_tokens,
        response_format: options.response_format.as_ref(),
    };
    // Serializing plain strings, numbers and a `Value` cannot fail.
    let body = serde_json::to_vec(&body).unwrap_or_default();

    let mut headers = HeaderMap::new();
    json_content_type(&mut headers);
    if let Some(value) = profile.auth.as_ref().and_then(|auth| auth.header_value()) {
        insert_header(&mut headers, AUTHORIZATION.as_str(), &value);
    }
    for (name, value) in &profile.headers {
        insert_header(&mut headers, name, value);
    }
    apply_caller_headers(&mut headers, &options.extra_headers);

    PreparedRequest {
        method: Method::POST,
        url: join_url(&profile.base_url, "chat/completions"),
        headers,
        body: Some(bytes::Bytes::from(body)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::canonical::Role;
    use crate::protocol::profile::AuthScheme;
    use serde_json::json;

    fn body_json(request: &PreparedRequest) -> serde_json::Value {
        serde_json::from_slice(request.body.as_deref().unwrap_or_default()).unwrap()
    }

    #[test]
    fn builds_minimal_body_and_endpoint() {
        let profile = EndpointProfile::openai_chat("https://api.example.com/v1/", "gpt-4o-mini");
        let request = build_chat_request(
            &[ChatMessage::user("hi")],
            &SendOptions::default(),
            &profile,
        );
        assert_eq!(request.method, Method::POST);
        assert_eq!(request.url, "https://api.example.com/v1/chat/completions");
        assert_eq!(
            body_json(&request),
            json!({
                "model": "gpt-4o-mini",
                "messages": [{"role":"user","content":"hi"}],
                "stream": true
            })
        );
        assert_eq!(request.headers.get("content-type").unwrap(), "application/json");
        assert!(request.headers.get(AUTHORIZATION).is_none());
    }

    #[test]
    fn options_override_profile_defaults() {
        let mut profile = EndpointProfile::openai_chat("http://h", "default")
            .with_auth(AuthScheme::Basic, "dXNlcjpwdw==")
            .with_header("X-Org", "acme");
        profile.policy.stream = Some(true);
        let options = SendOptions {
            model: Some("override".into()),
            temperature: Some(0.5),
            max_tokens: Some(64),
            response_format: Some(json!({"type":"json_object"})),
            stream: Some(false),
            extra_headers: [("Authorization".to_string(), "Bearer nope".to_string())]
                .into_iter()
                .collect(),
        };
        let request = build_chat_request(&[ChatMessage::system("be brief")], &options, &profile);
        assert_eq!(
            body_json(&request),
            json!({
                "model": "override",
                "messages": [{"role":"system","content":"be brief"}],
                "stream": false,
                "temperature": 0.5,
                "max_tokens": 64,
                "response_format": {"type":"json_object"}
            })
        );
        assert_eq!(request.headers.get(AUTHORIZATION).unwrap(), "Basic dXNlcjpwdw==");
        assert_eq!(request.headers.get("x-org").unwrap(), "acme");
    }

    #[test]
    fn unrecognised_roles_reach_the_wire() {
        let profile = EndpointProfile::openai_chat("http://h", "m");
        let message = ChatMessage::new(Role::Other("developer".into()), "rules");
        let request = build_chat_request(&[message], &SendOptions::default(), &profile);
        assert_eq!(
            body_json(&request)["messages"],
            json!([{"role":"developer","content":"rules"}])
        );
    }
}
