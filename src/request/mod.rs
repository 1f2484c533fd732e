//! Request building: (messages, options, profile) in, a concrete HTTP
//! request out.

pub mod openai_chat;
pub mod template;

use http::header::{HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use http::{HeaderMap, Method};

pub use template::{render_template, RenderingContext};

/// A fully built upstream request.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<bytes::Bytes>,
}

/// Join `path` onto `base` with exactly one slash between them.
#[must_use]
pub fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        return base.to_owned();
    }
    let mut out = String::with_capacity(base.len() + path.len() + 1);
    out.push_str(base);
    out.push('/');
    out.push_str(path);
    out
}

/// Insert a header, skipping names or values that are not valid on the wire.
pub(crate) fn insert_header(headers: &mut HeaderMap, name: &str, value: &str) {
    let Ok(header_name) = HeaderName::from_bytes(name.trim().as_bytes()) else {
        tracing::warn!(header = name, "skipping invalid header name");
        return;
    };
    let Ok(header_value) = HeaderValue::from_str(value) else {
        tracing::warn!(header = name, "skipping invalid header value");
        return;
    };
    headers.insert(header_name, header_value);
}

pub(crate) fn json_content_type(headers: &mut HeaderMap) {
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
}

/// Caller-supplied headers; they never replace an `Authorization` header
/// that is already set.
pub(crate) fn apply_caller_headers<'a, I>(headers: &mut HeaderMap, extra: I)
where
    I: IntoIterator<Item = (&'a String, &'a String)>,
{
    let has_auth = headers.contains_key(AUTHORIZATION);
    for (name, value) in extra {
        if has_auth && name.trim().eq_ignore_ascii_case(AUTHORIZATION.as_str()) {
            tracing::debug!("ignoring caller Authorization header");
            continue;
        }
        insert_header(headers, name, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn join_url_normalizes_slashes() {
        assert_eq!(join_url("http://h/v1/", "/chat"), "http://h/v1/chat");
        assert_eq!(join_url("http://h/v1", "chat"), "http://h/v1/chat");
        assert_eq!(join_url("http://h/v1//", "//chat"), "http://h/v1/chat");
        assert_eq!(join_url("http://h/v1/", ""), "http://h/v1");
    }

    #[test]
    fn caller_headers_do_not_override_auth() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer real"));
        let extra = BTreeMap::from([
            ("authorization".to_string(), "Bearer spoof".to_string()),
            ("X-Trace".to_string(), "1".to_string()),
        ]);
        apply_caller_headers(&mut headers, &extra);
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer real");
        assert_eq!(headers.get("x-trace").unwrap(), "1");
    }

    #[test]
    fn invalid_headers_are_skipped() {
        let mut headers = HeaderMap::new();
        insert_header(&mut headers, "bad header", "v");
        insert_header(&mut headers, "x-ok", "line\nbreak");
        assert!(headers.is_empty());
    }
}
