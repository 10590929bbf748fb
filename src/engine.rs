//! Protocol engine (Component F).
//!
//! Framework-agnostic HTTP dispatch: this module never imports `axum`.
//! [`Request`] in, [`HttpOutcome`] out; [`crate::axum_adapter`] is the
//! only place that knows what an axum `Request`/`Response` looks like.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use http::{HeaderMap, Method, StatusCode};
use tracing::{debug, warn};

use crate::codec::CodecRegistry;
use crate::cursor::{format_cursor, parse_cursor, CursorPolicy};
use crate::error::ErrorKind;
use crate::offset::{self, encode_offset};
use crate::policy::{BodySizeLimiter, CacheKind, CachePolicy, RateLimiter};
use crate::store::StreamStore;
use crate::types::{CreateOutcome, ServerOptions, StreamConfig};

/// A framework-agnostic HTTP request.
pub struct Request {
    pub method: Method,
    /// Canonical path (query stripped), e.g. `/stream/my-events`.
    pub path: String,
    pub query: String,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
    /// Opaque id used only for rate-limiting; never authentication.
    pub client_id: String,
}

/// Tagged response body, per spec's `{Empty | Bytes | FileRegion | SseProducer}`.
pub enum ResponseBody {
    Empty,
    Bytes(Vec<u8>),
    /// A live producer of SSE frames. Boxed and pinned so the engine
    /// doesn't need to know the concrete stream type or require it to
    /// be `Unpin`.
    SseProducer(std::pin::Pin<Box<dyn futures::Stream<Item = crate::live::Frame> + Send>>),
}

impl std::fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponseBody::Empty => write!(f, "Empty"),
            ResponseBody::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
            ResponseBody::SseProducer(_) => write!(f, "SseProducer"),
        }
    }
}

/// A response from the engine, framework-agnostic.
#[derive(Debug)]
pub struct HttpOutcome {
    pub status: StatusCode,
    pub headers: Vec<(&'static str, String)>,
    pub body: ResponseBody,
}

impl HttpOutcome {
    fn empty(status: StatusCode) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: ResponseBody::Empty,
        }
    }

    fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    fn with_bytes(mut self, bytes: Vec<u8>) -> Self {
        self.body = ResponseBody::Bytes(bytes);
        self
    }
}

/// Shared engine state, analogous to the teacher's `AppState`.
pub struct Engine {
    pub store: Arc<StreamStore>,
    pub options: ServerOptions,
    pub cursor_policy: Arc<CursorPolicy>,
    pub cache_policy: Arc<dyn CachePolicy>,
    pub rate_limiter: Arc<dyn RateLimiter>,
    body_size_limiter: BodySizeLimiter,
}

struct ParsedQuery {
    offset: Option<String>,
    live: Option<String>,
    cursor: Option<String>,
}

fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
                if let Some(h) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                    out.push(h);
                    i += 3;
                    continue;
                }
                out.push(bytes[i]);
                i += 1;
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Parse the query string per spec §4.F: duplicate `offset` is BadRequest.
fn parse_query(query: &str) -> Result<ParsedQuery, ErrorKind> {
    let mut values: HashMap<String, Vec<String>> = HashMap::new();
    for pair in query.split('&').filter(|s| !s.is_empty()) {
        let (key, value) = match pair.split_once('=') {
            Some((k, v)) => (k, v),
            None => (pair, ""),
        };
        let key = percent_decode(key);
        let value = percent_decode(value);
        values.entry(key).or_default().push(value);
    }

    let mut take_one = |key: &str| -> Result<Option<String>, ErrorKind> {
        match values.remove(key) {
            None => Ok(None),
            Some(v) if v.len() == 1 => Ok(Some(v.into_iter().next().unwrap())),
            Some(_) => Err(ErrorKind::BadRequest(format!("duplicate query parameter: {key}"))),
        }
    };

    Ok(ParsedQuery {
        offset: take_one("offset")?,
        live: take_one("live")?,
        cursor: take_one("cursor")?,
    })
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// `Stream-TTL`: non-negative integer, no leading zeros (other than
/// literal `"0"`), no sign.
fn parse_ttl_header(headers: &HeaderMap) -> Result<Option<u64>, ErrorKind> {
    let Some(raw) = header_str(headers, "stream-ttl") else {
        return Ok(None);
    };
    if raw.is_empty() || (raw.len() > 1 && raw.starts_with('0')) || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ErrorKind::BadRequest("malformed Stream-TTL".into()));
    }
    raw.parse::<u64>()
        .map(Some)
        .map_err(|_| ErrorKind::BadRequest("malformed Stream-TTL".into()))
}

fn parse_expires_at_header(headers: &HeaderMap) -> Result<Option<chrono::DateTime<chrono::Utc>>, ErrorKind> {
    let Some(raw) = header_str(headers, "stream-expires-at") else {
        return Ok(None);
    };
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|dt| Some(dt.with_timezone(&chrono::Utc)))
        .map_err(|_| ErrorKind::BadRequest("malformed Stream-Expires-At".into()))
}

fn etag_for(stream_id: uuid::Uuid, start: u64, end: u64) -> String {
    format!("\"{}:{}:{}\"", stream_id, encode_offset(start), encode_offset(end))
}

impl Engine {
    pub fn new(store: Arc<StreamStore>, options: ServerOptions) -> Self {
        let cursor_policy = Arc::new(CursorPolicy::new(crate::cursor::CursorOptions {
            interval_seconds: options.cursor_interval_seconds,
            epoch: options.cursor_epoch,
        }));
        let body_size_limiter = BodySizeLimiter::new(options.max_body_bytes);
        Self {
            store,
            options,
            cursor_policy,
            cache_policy: Arc::new(crate::policy::DefaultCachePolicy),
            rate_limiter: Arc::new(crate::policy::NoOpRateLimiter),
            body_size_limiter,
        }
    }

    pub fn with_rate_limiter(mut self, limiter: Arc<dyn RateLimiter>) -> Self {
        self.rate_limiter = limiter;
        self
    }

    pub fn with_cache_policy(mut self, policy: Arc<dyn CachePolicy>) -> Self {
        self.cache_policy = policy;
        self
    }

    /// Dispatch one request to `HttpOutcome`, converting any `ErrorKind`
    /// produced along the way into the status-mapping table's response.
    pub async fn dispatch(&self, req: Request) -> HttpOutcome {
        if let Err(e) = self.rate_limiter.check(&req.path, &req.client_id) {
            return self.error_outcome(e);
        }

        if let Err(e) = self.body_size_limiter.check(req.body.len() as u64) {
            return self.error_outcome(e);
        }

        let result = match req.method {
            Method::PUT => self.handle_create(&req),
            Method::POST => self.handle_append(&req),
            Method::DELETE => self.handle_delete(&req),
            Method::HEAD => self.handle_head(&req),
            Method::GET => self.handle_read(&req).await,
            _ => Err(ErrorKind::NotSupported),
        };

        match result {
            Ok(outcome) => outcome,
            Err(e) => self.error_outcome(e),
        }
    }

    fn error_outcome(&self, err: ErrorKind) -> HttpOutcome {
        warn!(error = %err, "request failed");
        let mut outcome = HttpOutcome::empty(err.status())
            .header("cache-control", self.cache_policy.cache_control(CacheKind::Error, false));

        if let Some(x_error) = err.x_error() {
            outcome = outcome.header("x-error", x_error);
        }
        if let ErrorKind::PayloadTooLarge { limit } = &err {
            outcome = outcome.header("x-max-size", limit.to_string());
        }
        if let ErrorKind::RateLimited { retry_after: Some(d) } = &err {
            outcome = outcome.header("retry-after", d.as_secs().to_string());
        }
        outcome
    }

    fn handle_create(&self, req: &Request) -> Result<HttpOutcome, ErrorKind> {
        let content_type = header_str(&req.headers, "content-type").map(str::to_string);
        if content_type.is_none() {
            return Err(ErrorKind::BadRequest("Content-Type is required".into()));
        }
        let ttl_seconds = parse_ttl_header(&req.headers)?;
        let expires_at = parse_expires_at_header(&req.headers)?;

        let initial_data = if req.body.is_empty() { None } else { Some(req.body.clone()) };
        let config = StreamConfig {
            content_type: content_type.clone(),
            ttl_seconds,
            expires_at,
            initial_data,
        };

        let (outcome, next_offset) = self.store.create(&req.path, config)?;
        debug!(path = %req.path, ?outcome, "create dispatched");

        let status = match outcome {
            CreateOutcome::Created => StatusCode::CREATED,
            CreateOutcome::ExistsMatch => StatusCode::OK,
        };

        let mut response = HttpOutcome::empty(status).header("stream-next-offset", encode_offset(next_offset));
        if outcome == CreateOutcome::Created {
            response = response.header("location", req.path.clone());
        }
        if let Some(ct) = content_type {
            response = response.header("content-type", ct);
        }
        Ok(response)
    }

    fn handle_append(&self, req: &Request) -> Result<HttpOutcome, ErrorKind> {
        let content_type = header_str(&req.headers, "content-type");
        if content_type.is_none() {
            return Err(ErrorKind::BadRequest("Content-Type is required".into()));
        }
        let seq = header_str(&req.headers, "stream-seq");

        let next_offset = self.store.append(&req.path, content_type, seq, &req.body)?;
        Ok(HttpOutcome::empty(StatusCode::NO_CONTENT).header("stream-next-offset", encode_offset(next_offset)))
    }

    fn handle_delete(&self, req: &Request) -> Result<HttpOutcome, ErrorKind> {
        if self.store.delete(&req.path) {
            Ok(HttpOutcome::empty(StatusCode::NO_CONTENT))
        } else {
            Err(ErrorKind::NotFound)
        }
    }

    fn handle_head(&self, req: &Request) -> Result<HttpOutcome, ErrorKind> {
        // `cursor` isn't accepted on HEAD; parse_query still rejects a
        // duplicate `offset`/`live` if present, but no cursor is issued here.
        let _query = parse_query(&req.query)?;
        let snapshot = self.store.head(&req.path).ok_or(ErrorKind::NotFound)?;

        let mut response = HttpOutcome::empty(StatusCode::OK)
            .header("stream-next-offset", encode_offset(snapshot.next_offset))
            .header("cache-control", self.cache_policy.cache_control(CacheKind::Head, true));

        if let Some(ct) = &snapshot.content_type {
            response = response.header("content-type", ct.clone());
        }
        if let Some(ttl) = snapshot.ttl_seconds_remaining {
            response = response.header("stream-ttl", ttl.to_string());
        }
        if let Some(expires_at) = snapshot.expires_at {
            response = response.header("stream-expires-at", expires_at.to_rfc3339());
        }
        Ok(response)
    }

    async fn handle_read(&self, req: &Request) -> Result<HttpOutcome, ErrorKind> {
        let query = parse_query(&req.query)?;

        match query.live.as_deref() {
            Some("sse") => {
                let client_cursor = query.cursor.as_deref().and_then(parse_cursor);
                let response_cursor = self.cursor_policy.next_cursor(client_cursor);
                self.handle_sse(req, query.offset, response_cursor)
            }
            Some("long-poll") => {
                let client_cursor = query.cursor.as_deref().and_then(parse_cursor);
                let response_cursor = self.cursor_policy.next_cursor(client_cursor);
                self.handle_long_poll(req, query.offset, response_cursor).await
            }
            Some(other) => Err(ErrorKind::BadRequest(format!("unsupported live mode: {other}"))),
            None => self.handle_catch_up(req, query.offset),
        }
    }

    fn resolve_start_offset(&self, req: &Request, offset: &Option<String>, required: bool) -> Result<(u64, Option<String>), ErrorKind> {
        let snapshot = self.store.head(&req.path).ok_or(ErrorKind::NotFound)?;
        match offset {
            None if required => Err(ErrorKind::BadRequest("offset is required for live reads".into())),
            None => Ok((0, None)),
            Some(token) if token.is_empty() => Err(ErrorKind::BadRequest("empty offset parameter".into())),
            Some(token) => {
                let start = offset::parse_start_offset(Some(token), snapshot.next_offset)?;
                Ok((start, Some(token.clone())))
            }
        }
    }

    fn if_none_match(req: &Request) -> Option<&str> {
        header_str(&req.headers, "if-none-match")
    }

    fn handle_catch_up(&self, req: &Request, offset: Option<String>) -> Result<HttpOutcome, ErrorKind> {
        let (start, _) = self.resolve_start_offset(req, &offset, false)?;
        let result = self.store.read(&req.path, start, self.max_chunk())?;
        let etag = etag_for(result.stream_id, start, result.next_offset);

        if Self::if_none_match(req) == Some(etag.as_str()) {
            return Ok(HttpOutcome::empty(StatusCode::NOT_MODIFIED)
                .header("etag", etag)
                .header("stream-next-offset", encode_offset(result.next_offset))
                .header("cache-control", "no-store"));
        }

        let mut response = HttpOutcome::empty(StatusCode::OK)
            .header("stream-next-offset", encode_offset(result.next_offset))
            .header("etag", etag)
            .header(
                "cache-control",
                self.cache_policy.cache_control(CacheKind::CatchUp, true),
            );
        if result.up_to_date {
            response = response.header("stream-up-to-date", "true");
        }
        if let Some(ct) = &result.content_type {
            response = response.header("content-type", ct.clone());
        }
        Ok(response.with_bytes(result.body))
    }

    async fn handle_long_poll(&self, req: &Request, offset: Option<String>, cursor: i64) -> Result<HttpOutcome, ErrorKind> {
        let (start, _) = self.resolve_start_offset(req, &offset, true)?;
        let result = self.store.read(&req.path, start, self.max_chunk())?;

        if !(result.body.is_empty() && result.up_to_date) {
            return self.render_read_result(result, cursor);
        }

        let timeout = Duration::from_millis(self.options.long_poll_timeout_ms);
        let arrived = self.store.await_tail(&req.path, start, timeout).await;

        if !arrived {
            let snapshot = self.store.head(&req.path);
            let next_offset = snapshot.map(|s| s.next_offset).unwrap_or(start);
            return Ok(HttpOutcome::empty(StatusCode::NO_CONTENT)
                .header("stream-next-offset", encode_offset(next_offset))
                .header("stream-up-to-date", "true")
                .header("stream-cursor", format_cursor(cursor))
                .header("cache-control", self.cache_policy.cache_control(CacheKind::Live, true)));
        }

        let result = self.store.read(&req.path, start, self.max_chunk())?;
        self.render_read_result(result, cursor)
    }

    fn render_read_result(&self, result: crate::types::ReadOutcome, cursor: i64) -> Result<HttpOutcome, ErrorKind> {
        let mut response = HttpOutcome::empty(StatusCode::OK)
            .header("stream-next-offset", encode_offset(result.next_offset))
            .header("stream-cursor", format_cursor(cursor))
            .header("cache-control", self.cache_policy.cache_control(CacheKind::Live, true));
        if result.up_to_date {
            response = response.header("stream-up-to-date", "true");
        }
        if let Some(ct) = &result.content_type {
            response = response.header("content-type", ct.clone());
        }
        Ok(response.with_bytes(result.body))
    }

    fn handle_sse(&self, req: &Request, offset: Option<String>, cursor: i64) -> Result<HttpOutcome, ErrorKind> {
        let (start, _) = self.resolve_start_offset(req, &offset, true)?;

        let snapshot = self.store.head(&req.path).ok_or(ErrorKind::NotFound)?;
        let normalized_ct = snapshot
            .content_type
            .as_deref()
            .map(crate::codec::normalize_content_type)
            .unwrap_or_default();
        if !CodecRegistry::is_sse_compatible(&normalized_ct) {
            return Err(ErrorKind::BadRequest(
                "stream content-type is not SSE-compatible".into(),
            ));
        }

        let session = crate::live::SseSession::new(
            Arc::clone(&self.store),
            req.path.clone(),
            start,
            cursor,
            Arc::clone(&self.cursor_policy),
            self.max_chunk(),
            Duration::from_millis(self.options.sse_subtimeout_ms),
            Duration::from_secs(self.options.sse_max_duration_seconds),
        );

        Ok(HttpOutcome {
            status: StatusCode::OK,
            headers: vec![
                ("content-type", "text/event-stream".to_string()),
                ("cache-control", "no-cache".to_string()),
            ],
            body: ResponseBody::SseProducer(Box::pin(session.into_stream())),
        })
    }

    fn max_chunk(&self) -> usize {
        self.options.max_body_bytes.min(1024 * 1024) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::InMemoryMetadataStore;

    fn new_engine() -> Engine {
        let store = StreamStore::new(InMemoryMetadataStore::new(), CodecRegistry::new());
        Engine::new(store, ServerOptions::default())
    }

    fn req(method: Method, path: &str, query: &str, headers: &[(&str, &str)], body: &[u8]) -> Request {
        let mut hm = HeaderMap::new();
        for (k, v) in headers {
            hm.insert(
                http::HeaderName::from_bytes(k.as_bytes()).unwrap(),
                http::HeaderValue::from_str(v).unwrap(),
            );
        }
        Request {
            method,
            path: path.to_string(),
            query: query.to_string(),
            headers: hm,
            body: body.to_vec(),
            client_id: "test-client".to_string(),
        }
    }

    #[tokio::test]
    async fn create_then_append_then_catch_up() {
        let engine = new_engine();

        let created = engine
            .dispatch(req(Method::PUT, "/s/a", "", &[("content-type", "text/plain")], b""))
            .await;
        assert_eq!(created.status, StatusCode::CREATED);

        let appended = engine
            .dispatch(req(Method::POST, "/s/a", "", &[("content-type", "text/plain")], b"hello"))
            .await;
        assert_eq!(appended.status, StatusCode::NO_CONTENT);

        let read = engine.dispatch(req(Method::GET, "/s/a", "offset=-1", &[], b"")).await;
        assert_eq!(read.status, StatusCode::OK);
        match read.body {
            ResponseBody::Bytes(b) => assert_eq!(b, b"hello"),
            other => panic!("expected bytes, got {other:?}"),
        }
        assert!(read.headers.iter().any(|(k, v)| *k == "stream-up-to-date" && v == "true"));
    }

    #[tokio::test]
    async fn idempotent_create_is_ok_not_created() {
        let engine = new_engine();
        let config_headers = [("content-type", "text/plain")];

        let first = engine.dispatch(req(Method::PUT, "/s/a", "", &config_headers, b"")).await;
        assert_eq!(first.status, StatusCode::CREATED);

        let second = engine.dispatch(req(Method::PUT, "/s/a", "", &config_headers, b"")).await;
        assert_eq!(second.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn create_conflict_on_config_mismatch() {
        let engine = new_engine();
        engine
            .dispatch(req(Method::PUT, "/s/a", "", &[("content-type", "text/plain")], b""))
            .await;
        let conflict = engine
            .dispatch(req(Method::PUT, "/s/a", "", &[("content-type", "application/json")], b""))
            .await;
        assert_eq!(conflict.status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn create_without_content_type_is_400() {
        let engine = new_engine();
        let resp = engine.dispatch(req(Method::PUT, "/s/a", "", &[], b"")).await;
        assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn append_without_content_type_is_400() {
        let engine = new_engine();
        engine
            .dispatch(req(Method::PUT, "/s/a", "", &[("content-type", "text/plain")], b""))
            .await;
        let resp = engine.dispatch(req(Method::POST, "/s/a", "", &[], b"x")).await;
        assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn append_to_missing_stream_is_404() {
        let engine = new_engine();
        let resp = engine
            .dispatch(req(Method::POST, "/missing", "", &[("content-type", "text/plain")], b"x"))
            .await;
        assert_eq!(resp.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn append_content_type_mismatch_is_409() {
        let engine = new_engine();
        engine
            .dispatch(req(Method::PUT, "/s/a", "", &[("content-type", "text/plain")], b""))
            .await;
        let resp = engine
            .dispatch(req(Method::POST, "/s/a", "", &[("content-type", "application/json")], b"{}"))
            .await;
        assert_eq!(resp.status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn both_ttl_and_expires_at_is_400() {
        let engine = new_engine();
        let resp = engine
            .dispatch(req(
                Method::PUT,
                "/s/a",
                "",
                &[
                    ("content-type", "text/plain"),
                    ("stream-ttl", "60"),
                    ("stream-expires-at", "2030-01-01T00:00:00Z"),
                ],
                b"",
            ))
            .await;
        assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn etag_round_trip_returns_304() {
        let engine = new_engine();
        engine
            .dispatch(req(Method::PUT, "/s/a", "", &[("content-type", "text/plain")], b""))
            .await;
        engine
            .dispatch(req(Method::POST, "/s/a", "", &[("content-type", "text/plain")], b"hi"))
            .await;

        let first = engine.dispatch(req(Method::GET, "/s/a", "offset=-1", &[], b"")).await;
        let etag = first
            .headers
            .iter()
            .find(|(k, _)| *k == "etag")
            .map(|(_, v)| v.clone())
            .unwrap();

        let second = engine
            .dispatch(req(Method::GET, "/s/a", "offset=-1", &[("if-none-match", &etag)], b""))
            .await;
        assert_eq!(second.status, StatusCode::NOT_MODIFIED);
    }

    #[tokio::test]
    async fn catch_up_and_head_do_not_carry_a_cursor() {
        let engine = new_engine();
        engine.dispatch(req(Method::PUT, "/s/a", "", &[("content-type", "text/plain")], b"")).await;

        let catch_up = engine.dispatch(req(Method::GET, "/s/a", "offset=-1", &[], b"")).await;
        assert!(!catch_up.headers.iter().any(|(k, _)| *k == "stream-cursor"));

        let head = engine.dispatch(req(Method::HEAD, "/s/a", "", &[], b"")).await;
        assert!(!head.headers.iter().any(|(k, _)| *k == "stream-cursor"));
    }

    #[tokio::test]
    async fn duplicate_offset_query_param_is_400() {
        let engine = new_engine();
        engine.dispatch(req(Method::PUT, "/s/a", "", &[("content-type", "text/plain")], b"")).await;
        let resp = engine
            .dispatch(req(Method::GET, "/s/a", "offset=-1&offset=0000000000000", &[], b""))
            .await;
        assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn sse_requires_compatible_content_type() {
        let engine = new_engine();
        engine
            .dispatch(req(Method::PUT, "/s/bin", "", &[("content-type", "application/octet-stream")], b""))
            .await;
        let resp = engine
            .dispatch(req(Method::GET, "/s/bin", "offset=-1&live=sse", &[], b""))
            .await;
        assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn delete_then_404() {
        let engine = new_engine();
        engine.dispatch(req(Method::PUT, "/s/a", "", &[("content-type", "text/plain")], b"")).await;
        let deleted = engine.dispatch(req(Method::DELETE, "/s/a", "", &[], b"")).await;
        assert_eq!(deleted.status, StatusCode::NO_CONTENT);
        let missing = engine.dispatch(req(Method::DELETE, "/s/a", "", &[], b"")).await;
        assert_eq!(missing.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn json_array_flattening_end_to_end() {
        let engine = new_engine();
        engine
            .dispatch(req(Method::PUT, "/s/j", "", &[("content-type", "application/json")], br#"[{"a":1},{"a":2}]"#))
            .await;

        let read = engine.dispatch(req(Method::GET, "/s/j", "offset=-1", &[], b"")).await;
        assert_eq!(read.status, StatusCode::OK);
        match read.body {
            ResponseBody::Bytes(b) => {
                let value: serde_json::Value = serde_json::from_slice(&b).unwrap();
                assert_eq!(value, serde_json::json!([{"a":1},{"a":2}]));
            }
            other => panic!("expected bytes, got {other:?}"),
        }
    }
}
