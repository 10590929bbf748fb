//! Shared data types (spec §3 Data Model).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Canonical URL (scheme+authority+path with query stripped) identifying
/// a stream. Callers are responsible for canonicalization before this
/// crate sees a path; the store treats it as an opaque map key.
pub type StreamUrl = String;

/// Persisted stream metadata record (spec §3).
///
/// `next_offset` is a raw position counter (byte length for byte
/// streams, message count for JSON streams); encoding to the opaque
/// wire offset happens at the engine boundary via [`crate::offset`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamMetadata {
    /// Internal id, opaque and assigned at creation. Used in ETags so
    /// that a stream recreated at the same URL never collides with a
    /// stale ETag from its predecessor.
    pub id: Uuid,
    pub content_type: Option<String>,
    pub ttl_seconds: Option<u64>,
    pub expires_at: Option<DateTime<Utc>>,
    pub next_offset: u64,
    pub last_seq: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl StreamMetadata {
    pub fn new(content_type: Option<String>, ttl_seconds: Option<u64>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            id: Uuid::new_v4(),
            content_type,
            ttl_seconds,
            expires_at,
            next_offset: 0,
            last_seq: None,
            created_at: Utc::now(),
        }
    }

    /// A stream whose expiration instant has passed behaves as absent.
    pub fn is_expired(&self) -> bool {
        if let Some(expires_at) = self.expires_at {
            return Utc::now() >= expires_at;
        }
        if let Some(ttl_seconds) = self.ttl_seconds {
            let expiry = self.created_at + chrono::Duration::seconds(ttl_seconds as i64);
            return Utc::now() >= expiry;
        }
        false
    }

    /// Remaining TTL in seconds, if the stream was created with one.
    pub fn remaining_ttl_seconds(&self) -> Option<i64> {
        self.ttl_seconds.map(|ttl| {
            let expiry = self.created_at + chrono::Duration::seconds(ttl as i64);
            (expiry - Utc::now()).num_seconds().max(0)
        })
    }

    pub fn normalized_content_type(&self) -> Option<String> {
        self.content_type
            .as_deref()
            .map(crate::codec::normalize_content_type)
    }

    pub fn is_json(&self) -> bool {
        self.normalized_content_type().as_deref() == Some("application/json")
    }

    /// Config equality used by the idempotent-create check: normalized
    /// content type, ttl, and expires-at must all match.
    pub fn config_matches(&self, config: &StreamConfig) -> bool {
        self.normalized_content_type()
            == config.content_type.as_deref().map(crate::codec::normalize_content_type)
            && self.ttl_seconds == config.ttl_seconds
            && self.expires_at == config.expires_at
    }
}

/// Lifecycle event emitted by the store for observability hooks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamLifecycleEvent {
    Created { path: String, content_type: Option<String>, timestamp: DateTime<Utc> },
    Deleted { path: String, timestamp: DateTime<Utc> },
    Expired { path: String, timestamp: DateTime<Utc> },
}

/// Configuration for creating a stream (spec §4.C `Create`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamConfig {
    pub content_type: Option<String>,
    pub ttl_seconds: Option<u64>,
    pub expires_at: Option<DateTime<Utc>>,
    pub initial_data: Option<Vec<u8>>,
}

/// Outcome of [`crate::store::StreamStore::create`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    ExistsMatch,
}

/// Result of a successful [`crate::store::StreamStore::read`].
#[derive(Debug, Clone)]
pub struct ReadOutcome {
    pub body: Vec<u8>,
    pub content_type: Option<String>,
    pub next_offset: u64,
    pub up_to_date: bool,
    pub stream_id: Uuid,
}

/// Snapshot returned by [`crate::store::StreamStore::head`].
#[derive(Debug, Clone)]
pub struct HeadSnapshot {
    pub content_type: Option<String>,
    pub next_offset: u64,
    pub ttl_seconds_remaining: Option<i64>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Server configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerOptions {
    pub port: u16,
    pub host: String,
    /// Long-poll wait timeout.
    pub long_poll_timeout_ms: u64,
    /// Data directory for file-backed metadata storage (None = in-memory).
    pub data_dir: Option<String>,
    pub compression: bool,
    pub cursor_interval_seconds: u64,
    pub cursor_epoch: DateTime<Utc>,
    /// Maximum accepted request body size, in bytes.
    pub max_body_bytes: u64,
    /// Token-bucket capacity per client id (rate limiter).
    pub rate_limit_capacity: u32,
    /// Token-bucket refill rate, tokens/sec (rate limiter).
    pub rate_limit_refill_per_sec: f64,
    /// Maximum wall-clock lifetime of one SSE connection.
    pub sse_max_duration_seconds: u64,
    /// Sub-timeout for the internal Await loop inside the SSE publisher.
    pub sse_subtimeout_ms: u64,
    /// Interval at which the background expiry sweeper scans for dead streams.
    pub expiry_sweep_interval_ms: u64,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            port: 4437,
            host: "127.0.0.1".to_string(),
            long_poll_timeout_ms: 30_000,
            data_dir: None,
            compression: true,
            cursor_interval_seconds: 20,
            cursor_epoch: default_cursor_epoch(),
            max_body_bytes: 10 * 1024 * 1024,
            rate_limit_capacity: 100,
            rate_limit_refill_per_sec: 10.0,
            sse_max_duration_seconds: 60,
            sse_subtimeout_ms: 5_000,
            expiry_sweep_interval_ms: 5_000,
        }
    }
}

fn default_cursor_epoch() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-10-09T00:00:00Z")
        .expect("fixed literal is valid RFC 3339")
        .with_timezone(&Utc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_not_expired_without_ttl_or_expires_at() {
        let meta = StreamMetadata::new(Some("text/plain".into()), None, None);
        assert!(!meta.is_expired());
    }

    #[test]
    fn metadata_config_matches_normalizes_content_type() {
        let meta = StreamMetadata::new(Some("application/json; charset=utf-8".into()), None, None);
        let config = StreamConfig {
            content_type: Some("application/json".into()),
            ..Default::default()
        };
        assert!(meta.config_matches(&config));
    }

    #[test]
    fn metadata_config_mismatch_on_ttl() {
        let meta = StreamMetadata::new(Some("text/plain".into()), Some(10), None);
        let config = StreamConfig {
            content_type: Some("text/plain".into()),
            ttl_seconds: Some(20),
            ..Default::default()
        };
        assert!(!meta.config_matches(&config));
    }
}
