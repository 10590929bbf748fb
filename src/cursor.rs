//! Cursor policy (Component D).
//!
//! A monotonic, per-process cursor generator implementing the anti-
//! collapse rule: CDNs may cache catch-up reads and collapse distinct
//! live reads unless the cursor they see keeps advancing. Unlike a pure
//! function of wall-clock time, this keeps `last_issued` state across
//! calls — the protocol requires every issued cursor to be greater than
//! every cursor previously issued by the server.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};
use rand::Rng;

/// Parameters for the interval recurrence.
#[derive(Debug, Clone)]
pub struct CursorOptions {
    pub interval_seconds: u64,
    pub epoch: DateTime<Utc>,
}

impl Default for CursorOptions {
    fn default() -> Self {
        Self {
            interval_seconds: 20,
            epoch: DateTime::parse_from_rfc3339("2024-10-09T00:00:00Z")
                .expect("fixed literal is valid RFC 3339")
                .with_timezone(&Utc),
        }
    }
}

/// The current interval index for `now`: `max(0, floor((now - epoch) / interval))`.
fn current_interval(options: &CursorOptions) -> i64 {
    let elapsed = Utc::now().signed_duration_since(options.epoch).num_seconds();
    (elapsed.max(0) / options.interval_seconds as i64).max(0)
}

/// Stateful, monotonic cursor generator. One instance per process,
/// shared behind an `Arc` and injected into the engine.
pub struct CursorPolicy {
    options: CursorOptions,
    last_issued: AtomicI64,
}

impl CursorPolicy {
    pub fn new(options: CursorOptions) -> Self {
        Self {
            options,
            last_issued: AtomicI64::new(-1),
        }
    }

    /// Generate the next cursor:
    /// 1. `c <- max(now_interval, last_issued)`
    /// 2. if the client echoed `x >= c`, jitter forward by `max(1, floor(j/I))` for random `j in [1, 3600]`
    /// 3. ensure `c >= last_issued`, update `last_issued`, return it.
    pub fn next_cursor(&self, client_echoed: Option<i64>) -> i64 {
        let now_interval = current_interval(&self.options);
        let prior = self.last_issued.load(Ordering::SeqCst);

        let mut c = now_interval.max(prior);

        if let Some(x) = client_echoed {
            if x >= c {
                let jitter_seconds: u64 = rand::thread_rng().gen_range(1..=3600);
                let jitter_intervals =
                    (jitter_seconds / self.options.interval_seconds.max(1)).max(1) as i64;
                c = x + jitter_intervals;
            }
        }

        c = c.max(prior);

        // Monotonic update even under concurrent callers: only move forward.
        let mut observed = prior;
        loop {
            if c <= observed {
                return observed.max(c);
            }
            match self.last_issued.compare_exchange_weak(
                observed,
                c,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return c,
                Err(actual) => observed = actual,
            }
        }
    }
}

impl Default for CursorPolicy {
    fn default() -> Self {
        Self::new(CursorOptions::default())
    }
}

/// Parse a cursor string into the signed interval counter it encodes.
pub fn parse_cursor(cursor: &str) -> Option<i64> {
    cursor.parse().ok()
}

/// Format a cursor value as the decimal string the wire protocol carries.
pub fn format_cursor(cursor: i64) -> String {
    cursor.to_string()
}
