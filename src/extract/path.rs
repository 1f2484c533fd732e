//! Dotted/bracket path expressions over JSON documents.
//!
//! Supported forms: `choices[0].delta.content`, `$.output.text`,
//! `data["weird.key"][1]`. Lookups never fail loudly: any missing
//! intermediate yields `None`.

use std::fmt;

use serde_json::Value;
use smallvec::SmallVec;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    Index(usize),
}

/// A compiled path expression.
#[derive(Clone, PartialEq, Eq)]
pub struct JsonPath {
    segments: SmallVec<[Segment; 4]>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid path expression '{expr}': {reason}")]
pub struct PathError {
    pub expr: String,
    pub reason: &'static str,
}

impl JsonPath {
    /// Parse a path expression. An empty expression (or a bare `$`) addresses
    /// the document root.
    ///
    /// # Errors
    ///
    /// Returns [`PathError`] for unterminated brackets or quotes.
    pub fn parse(expr: &str) -> Result<Self, PathError> {
        let err = |reason| PathError {
            expr: expr.to_owned(),
            reason,
        };

        let mut rest = expr.trim();
        if let Some(stripped) = rest.strip_prefix('$') {
            rest = stripped;
        }

        let mut segments = SmallVec::new();
        let mut key = String::new();
        let mut chars = rest.chars().peekable();
        while let Some(ch) = chars.next() {
            match ch {
                '.' => flush_key(&mut key, &mut segments),
                '[' => {
                    flush_key(&mut key, &mut segments);
                    while chars.next_if(|c| c.is_whitespace()).is_some() {}
                    match chars.peek().copied() {
                        Some(quote @ ('"' | '\'')) => {
                            chars.next();
                            let mut quoted = String::new();
                            loop {
                                match chars.next() {
                                    Some(c) if c == quote => break,
                                    Some(c) => quoted.push(c),
                                    None => return Err(err("unterminated quoted key")),
                                }
                            }
                            while chars.next_if(|c| c.is_whitespace()).is_some() {}
                            if chars.next() != Some(']') {
                                return Err(err("expected ']' after quoted key"));
                            }
                            segments.push(Segment::Key(quoted));
                        }
                        _ => {
                            let mut inner = String::new();
                            loop {
                                match chars.next() {
                                    Some(']') => break,
                                    Some(c) => inner.push(c),
                                    None => return Err(err("unterminated '['")),
                                }
                            }
                            let inner = inner.trim();
                            match inner.parse::<usize>() {
                                Ok(index) => segments.push(Segment::Index(index)),
                                Err(_) if inner.is_empty() => {
                                    return Err(err("empty brackets"));
                                }
                                Err(_) => segments.push(Segment::Key(inner.to_owned())),
                            }
                        }
                    }
                }
                _ => key.push(ch),
            }
        }
        flush_key(&mut key, &mut segments);

        Ok(Self { segments })
    }

    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Walk the path through `root`.
    #[must_use]
    pub fn lookup<'a>(&self, root: &'a Value) -> Option<&'a Value> {
        let mut current = root;
        for segment in &self.segments {
            current = match (segment, current) {
                (Segment::Key(key), Value::Object(map)) => map.get(key)?,
                (Segment::Key(key), Value::Array(items)) => items.get(key.parse::<usize>().ok()?)?,
                (Segment::Index(index), Value::Array(items)) => items.get(*index)?,
                (Segment::Index(index), Value::Object(map)) => map.get(&index.to_string())?,
                _ => return None,
            };
        }
        match current {
            Value::Null => None,
            value => Some(value),
        }
    }
}

fn flush_key(key: &mut String, segments: &mut SmallVec<[Segment; 4]>) {
    if key.is_empty() {
        return;
    }
    segments.push(Segment::Key(std::mem::take(key)));
}

impl fmt::Debug for JsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JsonPath(")?;
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Key(key) if i == 0 => write!(f, "{key}")?,
                Segment::Key(key) => write!(f, ".{key}")?,
                Segment::Index(index) => write!(f, "[{index}]")?,
            }
        }
        write!(f, ")")
    }
}

/// Render a resolved value as text: strings verbatim, anything else as JSON.
#[must_use]
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Interpret a resolved value as a token counter.
///
/// Counters are unsigned integers. Non-numeric and negative values are
/// rejected, and fractional values are truncated toward zero (`12.9` reads
/// as `12`).
#[must_use]
pub fn value_to_count(value: &Value) -> Option<u64> {
    let Value::Number(number) = value else {
        return None;
    };
    if let Some(count) = number.as_u64() {
        return Some(count);
    }
    let float = number.as_f64()?;
    if float.is_finite() && float >= 0.0 {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        return Some(float as u64);
    }
    None
}
