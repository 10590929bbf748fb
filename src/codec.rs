//! Content codecs (Component A).
//!
//! Two codecs: [`BytesCodec`] (default, any non-JSON content type) and
//! [`JsonCodec`] (exclusive to `application/json`, normalized). Both
//! implement the same [`Codec`] contract so the store never needs to
//! know which one it's talking to.
//!
//! Registration is an explicit [`CodecRegistry`] built once at startup
//! and handed to the store by value — the spec's stand-in for the
//! source's `ServiceLoader`-based discovery (see design notes).

use serde_json::Value;
use std::sync::Arc;

use crate::error::ErrorKind;

/// Per-stream codec-owned storage. Which variant is live is determined
/// by which [`Codec`] created it; the store treats it opaquely.
#[derive(Debug, Clone)]
pub enum CodecState {
    /// Flat byte stream; position == byte offset.
    Bytes(Vec<u8>),
    /// Flat sequence of messages, each already canonicalized; position
    /// == message index.
    Json(Vec<Vec<u8>>),
}

/// Content codec contract.
pub trait Codec: Send + Sync {
    fn create_empty(&self) -> CodecState;

    /// Apply the optional initial body supplied on `Create`. A no-op on
    /// an empty body; otherwise behaves like [`Codec::append`].
    fn apply_initial(&self, state: &mut CodecState, body: &[u8]) -> Result<(), ErrorKind> {
        if body.is_empty() {
            return Ok(());
        }
        self.append(state, body)
    }

    /// Append a body. Fails with `BadRequest` on an empty body.
    fn append(&self, state: &mut CodecState, body: &[u8]) -> Result<(), ErrorKind>;

    /// Read the range `[start, start + limit)`, clamped to the tail.
    /// Returns `(rendered_bytes, next_position, up_to_date)`.
    fn read(&self, state: &CodecState, start: u64, limit: usize) -> (Vec<u8>, u64, bool);

    /// Current tail position (byte length or message count).
    fn size(&self, state: &CodecState) -> u64;
}

/// Default codec: content is a flat, opaque byte sequence.
pub struct BytesCodec;

impl Codec for BytesCodec {
    fn create_empty(&self) -> CodecState {
        CodecState::Bytes(Vec::new())
    }

    fn append(&self, state: &mut CodecState, body: &[u8]) -> Result<(), ErrorKind> {
        if body.is_empty() {
            return Err(ErrorKind::BadRequest("empty body not allowed".into()));
        }
        match state {
            CodecState::Bytes(buf) => {
                buf.extend_from_slice(body);
                Ok(())
            }
            CodecState::Json(_) => Err(ErrorKind::internal("bytes codec given json state")),
        }
    }

    fn read(&self, state: &CodecState, start: u64, limit: usize) -> (Vec<u8>, u64, bool) {
        let CodecState::Bytes(buf) = state else {
            return (Vec::new(), start, true);
        };
        let len = buf.len() as u64;
        let start = start.min(len) as usize;
        let end = (start + limit).min(buf.len());
        let chunk = buf[start..end].to_vec();
        let next = end as u64;
        (chunk, next, next >= len)
    }

    fn size(&self, state: &CodecState) -> u64 {
        match state {
            CodecState::Bytes(buf) => buf.len() as u64,
            CodecState::Json(_) => 0,
        }
    }
}

/// JSON codec: content is a flat sequence of JSON messages. Array
/// flattening on `append`/`apply_initial`: a top-level array expands to
/// one message per element; any other well-formed JSON value becomes a
/// single message. Reads re-serialize `[start, end)` as a JSON array
/// literal.
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn create_empty(&self) -> CodecState {
        CodecState::Json(Vec::new())
    }

    fn append(&self, state: &mut CodecState, body: &[u8]) -> Result<(), ErrorKind> {
        if body.is_empty() {
            return Err(ErrorKind::BadRequest("empty body not allowed".into()));
        }
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| ErrorKind::BadRequest(format!("malformed JSON: {e}")))?;

        let CodecState::Json(messages) = state else {
            return Err(ErrorKind::internal("json codec given bytes state"));
        };

        match value {
            Value::Array(elements) => {
                if elements.is_empty() {
                    return Err(ErrorKind::BadRequest("empty JSON array not allowed".into()));
                }
                for element in elements {
                    messages.push(canonical_bytes(&element));
                }
            }
            other => messages.push(canonical_bytes(&other)),
        }
        Ok(())
    }

    fn read(&self, state: &CodecState, start: u64, limit: usize) -> (Vec<u8>, u64, bool) {
        let CodecState::Json(messages) = state else {
            return (b"[]".to_vec(), start, true);
        };
        let len = messages.len() as u64;
        let start_idx = start.min(len) as usize;
        let end_idx = (start_idx + limit).min(messages.len());

        let mut out = Vec::with_capacity(2 + end_idx.saturating_sub(start_idx) * 16);
        out.push(b'[');
        for (i, msg) in messages[start_idx..end_idx].iter().enumerate() {
            if i > 0 {
                out.push(b',');
            }
            out.extend_from_slice(msg);
        }
        out.push(b']');

        let next = end_idx as u64;
        (out, next, next >= len)
    }

    fn size(&self, state: &CodecState) -> u64 {
        match state {
            CodecState::Json(messages) => messages.len() as u64,
            CodecState::Bytes(_) => 0,
        }
    }
}

fn canonical_bytes(value: &Value) -> Vec<u8> {
    serde_json::to_vec(value).expect("Value always serializes")
}

/// Normalize a content type by stripping parameters and lowercasing the
/// base type, per the protocol's equality rule.
pub fn normalize_content_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or(content_type)
        .trim()
        .to_ascii_lowercase()
}

/// Explicit codec registry, built once at startup and passed by value —
/// the stand-in for dynamic codec discovery.
#[derive(Clone)]
pub struct CodecRegistry {
    json: Arc<JsonCodec>,
    bytes: Arc<BytesCodec>,
}

impl CodecRegistry {
    pub fn new() -> Self {
        Self {
            json: Arc::new(JsonCodec),
            bytes: Arc::new(BytesCodec),
        }
    }

    /// Resolve the codec for an already-normalized content type.
    pub fn resolve(&self, normalized_content_type: &str) -> Arc<dyn Codec> {
        if normalized_content_type == "application/json" {
            self.json.clone()
        } else {
            self.bytes.clone()
        }
    }

    /// Is this normalized content type SSE-compatible (spec's `live=sse` gate)?
    pub fn is_sse_compatible(normalized_content_type: &str) -> bool {
        normalized_content_type.starts_with("text/") || normalized_content_type == "application/json"
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_append_and_read() {
        let codec = BytesCodec;
        let mut state = codec.create_empty();
        codec.append(&mut state, b"hello").unwrap();
        codec.append(&mut state, b"world").unwrap();
        assert_eq!(codec.size(&state), 10);

        let (chunk, next, up_to_date) = codec.read(&state, 0, 5);
        assert_eq!(chunk, b"hello");
        assert_eq!(next, 5);
        assert!(!up_to_date);

        let (chunk, next, up_to_date) = codec.read(&state, 5, 100);
        assert_eq!(chunk, b"world");
        assert_eq!(next, 10);
        assert!(up_to_date);
    }

    #[test]
    fn bytes_rejects_empty_append() {
        let codec = BytesCodec;
        let mut state = codec.create_empty();
        assert!(codec.append(&mut state, b"").is_err());
    }

    #[test]
    fn json_array_flattening() {
        let codec = JsonCodec;
        let mut state = codec.create_empty();
        codec.append(&mut state, br#"[{"a":1},{"a":2}]"#).unwrap();
        assert_eq!(codec.size(&state), 2);

        let (chunk, next, up_to_date) = codec.read(&state, 0, 10);
        assert_eq!(next, 2);
        assert!(up_to_date);
        let parsed: Value = serde_json::from_slice(&chunk).unwrap();
        assert_eq!(parsed, serde_json::json!([{"a":1},{"a":2}]));
    }

    #[test]
    fn json_single_value_is_one_message() {
        let codec = JsonCodec;
        let mut state = codec.create_empty();
        codec.append(&mut state, br#"{"a":1}"#).unwrap();
        assert_eq!(codec.size(&state), 1);
    }

    #[test]
    fn json_rejects_empty_array() {
        let codec = JsonCodec;
        let mut state = codec.create_empty();
        assert!(matches!(
            codec.append(&mut state, b"[]"),
            Err(ErrorKind::BadRequest(_))
        ));
    }

    #[test]
    fn json_rejects_malformed() {
        let codec = JsonCodec;
        let mut state = codec.create_empty();
        assert!(codec.append(&mut state, b"{not json").is_err());
    }

    #[test]
    fn normalize_strips_parameters() {
        assert_eq!(
            normalize_content_type("application/json; charset=utf-8"),
            "application/json"
        );
        assert_eq!(normalize_content_type("TEXT/Plain"), "text/plain");
    }

    #[test]
    fn sse_compatibility() {
        assert!(CodecRegistry::is_sse_compatible("application/json"));
        assert!(CodecRegistry::is_sse_compatible("text/plain"));
        assert!(!CodecRegistry::is_sse_compatible("application/octet-stream"));
    }
}
