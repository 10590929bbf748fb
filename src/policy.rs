//! Cache, rate-limit and body-size policies (Component E).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::ErrorKind;

/// The kind of response a [`CachePolicy`] is being asked to label,
/// driving the default `Cache-Control` table in spec §4.E.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
    CatchUp,
    Head,
    Live,
    Error,
}

/// Maps a response kind to a `Cache-Control` header value. Per-stream
/// because a future policy could vary by content type or path; the
/// default below ignores the stream and only looks at `kind`.
pub trait CachePolicy: Send + Sync {
    fn cache_control(&self, kind: CacheKind, stream_is_public: bool) -> &'static str;
}

/// Reference cache policy matching the defaults table in spec §4.E.
pub struct DefaultCachePolicy;

impl CachePolicy for DefaultCachePolicy {
    fn cache_control(&self, kind: CacheKind, stream_is_public: bool) -> &'static str {
        match kind {
            CacheKind::CatchUp if stream_is_public => "public, max-age=60, stale-while-revalidate=300",
            CacheKind::CatchUp => "private, max-age=60, stale-while-revalidate=300",
            CacheKind::Head => "no-store",
            CacheKind::Live => "no-cache",
            CacheKind::Error => "no-store",
        }
    }
}

/// `(stream_url, client_id) -> Allowed | Rejected(retry_after?)` gate.
pub trait RateLimiter: Send + Sync {
    fn check(&self, stream_url: &str, client_id: &str) -> Result<(), ErrorKind>;
}

/// Supplied default: allows everything. Used when no rate limiting is configured.
pub struct NoOpRateLimiter;

impl RateLimiter for NoOpRateLimiter {
    fn check(&self, _stream_url: &str, _client_id: &str) -> Result<(), ErrorKind> {
        Ok(())
    }
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Token-bucket rate limiter keyed by client id, capacity `C` tokens,
/// refilling at `R` tokens/sec. Buckets for a URL+client pair are
/// created lazily on first use.
pub struct TokenBucketRateLimiter {
    capacity: f64,
    refill_per_sec: f64,
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl TokenBucketRateLimiter {
    pub fn new(capacity: u32, refill_per_sec: f64) -> Self {
        Self {
            capacity: capacity as f64,
            refill_per_sec,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    fn key(stream_url: &str, client_id: &str) -> String {
        format!("{stream_url}\u{0}{client_id}")
    }
}

impl RateLimiter for TokenBucketRateLimiter {
    fn check(&self, stream_url: &str, client_id: &str) -> Result<(), ErrorKind> {
        let key = Self::key(stream_url, client_id);
        let mut buckets = self.buckets.lock().expect("rate limiter mutex poisoned");
        let now = Instant::now();
        let bucket = buckets.entry(key).or_insert_with(|| Bucket {
            tokens: self.capacity,
            last_refill: now,
        });

        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            Ok(())
        } else {
            let deficit = 1.0 - bucket.tokens;
            let wait_secs = deficit / self.refill_per_sec.max(f64::MIN_POSITIVE);
            Err(ErrorKind::RateLimited {
                retry_after: Some(Duration::from_secs_f64(wait_secs.max(0.0))),
            })
        }
    }
}

/// Enforces a byte cap on a request body; overflow maps to the
/// canonical "payload too large" error (413 with `X-Max-Size`).
pub struct BodySizeLimiter {
    max_bytes: u64,
}

impl BodySizeLimiter {
    pub fn new(max_bytes: u64) -> Self {
        Self { max_bytes }
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    pub fn check(&self, len: u64) -> Result<(), ErrorKind> {
        if len > self.max_bytes {
            Err(ErrorKind::PayloadTooLarge { limit: self.max_bytes })
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_cache_policy_matches_table() {
        let policy = DefaultCachePolicy;
        assert_eq!(
            policy.cache_control(CacheKind::CatchUp, true),
            "public, max-age=60, stale-while-revalidate=300"
        );
        assert_eq!(policy.cache_control(CacheKind::Head, true), "no-store");
        assert_eq!(policy.cache_control(CacheKind::Error, false), "no-store");
    }

    #[test]
    fn no_op_rate_limiter_always_allows() {
        let limiter = NoOpRateLimiter;
        for _ in 0..1000 {
            assert!(limiter.check("/s", "client").is_ok());
        }
    }

    #[test]
    fn token_bucket_exhausts_then_recovers() {
        let limiter = TokenBucketRateLimiter::new(2, 1000.0);
        assert!(limiter.check("/s", "a").is_ok());
        assert!(limiter.check("/s", "a").is_ok());
        assert!(matches!(
            limiter.check("/s", "a"),
            Err(ErrorKind::RateLimited { .. })
        ));
        std::thread::sleep(Duration::from_millis(5));
        assert!(limiter.check("/s", "a").is_ok());
    }

    #[test]
    fn token_bucket_is_per_client() {
        let limiter = TokenBucketRateLimiter::new(1, 0.001);
        assert!(limiter.check("/s", "a").is_ok());
        assert!(limiter.check("/s", "b").is_ok());
    }

    #[test]
    fn body_size_limiter() {
        let limiter = BodySizeLimiter::new(10);
        assert!(limiter.check(10).is_ok());
        assert!(matches!(
            limiter.check(11),
            Err(ErrorKind::PayloadTooLarge { limit: 10 })
        ));
    }
}
