//! Live publishers (Component G).
//!
//! Long-poll is folded directly into [`crate::engine::Engine::handle_long_poll`] —
//! one `Await` call, one re-read, no loop here. This module owns the one
//! stateful live primitive: the SSE session, a bounded-lifetime producer
//! of [`Frame`]s for a single subscriber.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::cursor::{format_cursor, CursorPolicy};
use crate::offset::encode_offset;
use crate::store::StreamStore;

/// One SSE wire frame: an event name and its (already-JSON-or-text) payload.
#[derive(Debug, Clone)]
pub struct Frame {
    pub event: &'static str,
    pub data: String,
}

/// `Init -> Streaming -> Done` state machine driving one SSE subscriber,
/// per spec's 4-step loop. Cancellation is implicit: dropping the
/// `Stream` this produces (e.g. because the subscriber disconnected)
/// drops the in-flight `await_tail` future with it.
pub struct SseSession {
    store: Arc<StreamStore>,
    url: String,
    offset: u64,
    cursor: i64,
    cursor_policy: Arc<CursorPolicy>,
    max_chunk: usize,
    subtimeout: Duration,
    max_duration: Duration,
    /// The last `streamNextOffset` a control frame was emitted for, so a
    /// repeated no-op wakeup doesn't re-emit an identical control frame.
    last_control_offset: Option<u64>,
}

impl SseSession {
    pub fn new(
        store: Arc<StreamStore>,
        url: String,
        offset: u64,
        cursor: i64,
        cursor_policy: Arc<CursorPolicy>,
        max_chunk: usize,
        subtimeout: Duration,
        max_duration: Duration,
    ) -> Self {
        Self {
            store,
            url,
            offset,
            cursor,
            cursor_policy,
            max_chunk,
            subtimeout,
            max_duration,
            last_control_offset: None,
        }
    }

    fn control_frame(&mut self, next_offset: u64, up_to_date: bool) -> Frame {
        self.cursor = self.cursor_policy.next_cursor(Some(self.cursor));
        self.last_control_offset = Some(next_offset);

        let mut json = String::with_capacity(96);
        json.push('{');
        json.push_str("\"streamNextOffset\":\"");
        json_escape_into(&encode_offset(next_offset), &mut json);
        json.push_str("\",\"streamCursor\":\"");
        json_escape_into(&format_cursor(self.cursor), &mut json);
        json.push('"');
        if up_to_date {
            json.push_str(",\"upToDate\":true");
        }
        json.push('}');

        Frame { event: "control", data: json }
    }

    /// Turn this session into a `Stream<Item = Frame>` implementing the
    /// spec's four-step loop. Built with `async_stream`, the same shape
    /// the teacher uses for its SSE producer.
    pub fn into_stream(mut self) -> impl futures::Stream<Item = Frame> + Send {
        async_stream::stream! {
            let deadline = Instant::now() + self.max_duration;

            loop {
                if Instant::now() >= deadline {
                    debug!(path = %self.url, "sse session reached max duration");
                    break;
                }

                let result = match self.store.read(&self.url, self.offset, self.max_chunk) {
                    Ok(r) => r,
                    Err(_) => break,
                };

                if !result.body.is_empty() {
                    let text = String::from_utf8_lossy(&result.body).into_owned();
                    yield Frame { event: "data", data: text };

                    self.offset = result.next_offset;
                    yield self.control_frame(result.next_offset, result.up_to_date);
                    continue;
                }

                if result.up_to_date {
                    if self.last_control_offset != Some(result.next_offset) {
                        yield self.control_frame(result.next_offset, true);
                    }

                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        break;
                    }
                    let wait = self.subtimeout.min(remaining);

                    let woke = self.store.await_tail(&self.url, self.offset, wait).await;
                    if !woke {
                        // Either a real timeout (loop again to re-check the
                        // deadline/emit keepalive control) or the stream
                        // was deleted (read() will start returning NotFound
                        // and the loop will break above).
                        continue;
                    }
                }
            }
        }
    }
}

/// Escape a string per JSON string-literal rules and append to `out`.
fn json_escape_into(input: &str, out: &mut String) {
    for c in input.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
}
