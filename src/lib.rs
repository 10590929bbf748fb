//! Durable Streams
//!
//! An HTTP-native, append-only, byte-oriented stream service. Each stream
//! is identified by a URL: clients create it with `PUT`, extend it with
//! `POST`, and read it with `GET` in one of three modes — bounded
//! catch-up, long-poll, or Server-Sent Events. Offsets are opaque,
//! strictly increasing, lexicographically sortable strings that let
//! clients resume exactly where they left off.
//!
//! # Features
//!
//! - **Append-only streams**: create and append with guaranteed ordering
//! - **Catch-up / long-poll / SSE reads**: three ways to consume the same log
//! - **TTL / expires-at**: automatic, lazy-and-swept stream expiry
//! - **JSON array-flattening**: a posted JSON array becomes N messages
//! - **Stream-Seq**: per-writer monotonic token rejecting out-of-order appends
//! - **Cursor policy**: monotonic, jittered cursor issuance for CDN collapsing
//!
//! # Example
//!
//! ```rust,no_run
//! use durable_streams::{axum_adapter, types::ServerOptions};
//!
//! #[tokio::main]
//! async fn main() {
//!     let options = ServerOptions {
//!         port: 4437,
//!         host: "127.0.0.1".to_string(),
//!         ..Default::default()
//!     };
//!
//!     axum_adapter::start_server(options).await.unwrap();
//! }
//! ```
//!
//! # Protocol
//!
//! ## Creating a stream
//!
//! ```text
//! PUT /stream/my-events HTTP/1.1
//! Content-Type: application/json
//! Stream-TTL: 3600
//!
//! Response: 201 Created
//! Stream-Next-Offset: 0000000000000
//! ```
//!
//! ## Appending data
//!
//! ```text
//! POST /stream/my-events HTTP/1.1
//! Content-Type: application/json
//!
//! {"event": "user_created", "id": 123}
//!
//! Response: 204 No Content
//! Stream-Next-Offset: 0000000000001
//! ```
//!
//! ## Reading data
//!
//! ```text
//! GET /stream/my-events?offset=-1 HTTP/1.1
//!
//! Response: 200 OK
//! Stream-Next-Offset: 0000000000001
//! Content-Type: application/json
//!
//! [{"event": "user_created", "id": 123}]
//! ```
//!
//! ## Long-polling
//!
//! ```text
//! GET /stream/my-events?offset=0000000000001&live=long-poll HTTP/1.1
//!
//! (waits up to the configured timeout for new data)
//!
//! Response: 204 No Content (if no new data)
//! Stream-Up-To-Date: true
//! Stream-Cursor: 1234
//! ```
//!
//! ## Server-Sent Events
//!
//! ```text
//! GET /stream/my-events?offset=-1&live=sse HTTP/1.1
//! Accept: text/event-stream
//!
//! event: data
//! data: {"event": "user_created", "id": 123}
//!
//! event: control
//! data: {"streamNextOffset":"0000000000001","streamCursor":"1234","upToDate":true}
//! ```

pub mod axum_adapter;
pub mod codec;
pub mod config;
pub mod cursor;
pub mod engine;
pub mod error;
pub mod live;
pub mod metadata;
pub mod offset;
pub mod policy;
pub mod store;
pub mod types;

pub use axum_adapter::{create_router, start_server, AppState};
pub use engine::{Engine, HttpOutcome, Request, ResponseBody};
pub use error::ErrorKind;
pub use store::StreamStore;
pub use types::{ServerOptions, StreamConfig, StreamLifecycleEvent, StreamMetadata};
