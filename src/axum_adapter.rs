//! The one concrete HTTP binding (axum). Thin by design: translates
//! `axum::extract::Request` into `engine::Request` and `engine::HttpOutcome`
//! into `axum::response::Response`. Mirrors the shape of the teacher's
//! `server.rs`, but with the protocol logic itself living in [`crate::engine`].

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, State},
    http::{Request as AxumRequest, StatusCode},
    response::{sse::Event, IntoResponse, Response, Sse},
    routing::{delete, get, head, post, put},
    Router,
};
use futures::StreamExt;
use tower_http::cors::{Any, CorsLayer};

use crate::engine::{Engine, Request, ResponseBody};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PUT,
            axum::http::Method::DELETE,
            axum::http::Method::HEAD,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers(Any)
        .expose_headers(Any);

    Router::new()
        .route("/{*path}", put(handle))
        .route("/{*path}", head(handle))
        .route("/{*path}", get(handle))
        .route("/{*path}", post(handle))
        .route("/{*path}", delete(handle))
        .layer(cors)
        .with_state(state)
}

async fn handle(State(state): State<AppState>, Path(path): Path<String>, req: AxumRequest<Body>) -> Response {
    let method = req.method().clone();
    let query = req.uri().query().unwrap_or("").to_string();
    let headers = req.headers().clone();

    let client_id = headers
        .get("x-client-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("anonymous")
        .to_string();

    // Read unconditionally and let `Engine::dispatch`'s own `BodySizeLimiter`
    // reject an oversized body with the canonical 413 + `X-Max-Size` — a
    // bound applied here would make `to_bytes` itself fail on any body past
    // the cap, with no way to produce that response.
    let body_bytes = match axum::body::to_bytes(req.into_body(), usize::MAX).await {
        Ok(bytes) => bytes.to_vec(),
        Err(_) => return StatusCode::BAD_REQUEST.into_response(),
    };

    let engine_req = Request {
        method,
        path: format!("/{path}"),
        query,
        headers,
        body: body_bytes,
        client_id,
    };

    let outcome = state.engine.dispatch(engine_req).await;
    into_axum_response(outcome)
}

fn into_axum_response(outcome: crate::engine::HttpOutcome) -> Response {
    match outcome.body {
        ResponseBody::SseProducer(stream) => {
            let events = stream.map(|frame| Ok::<Event, std::convert::Infallible>(frame_to_event(frame)));
            Sse::new(events)
                .keep_alive(
                    axum::response::sse::KeepAlive::new()
                        .interval(std::time::Duration::from_secs(15))
                        .text("keepalive"),
                )
                .into_response()
        }
        ResponseBody::Empty => {
            let mut response = Response::builder().status(outcome.status);
            for (name, value) in outcome.headers {
                response = response.header(name, value);
            }
            response.body(Body::empty()).unwrap()
        }
        ResponseBody::Bytes(bytes) => {
            let mut response = Response::builder().status(outcome.status);
            for (name, value) in outcome.headers {
                response = response.header(name, value);
            }
            response.body(Body::from(bytes)).unwrap()
        }
    }
}

fn frame_to_event(frame: crate::live::Frame) -> Event {
    let mut event = Event::default().event(frame.event);
    for line in frame.data.split('\n') {
        event = event.data(line);
    }
    event
}

/// Start the server: bind and serve, mirroring the teacher's `start_server`.
pub async fn start_server(options: crate::types::ServerOptions) -> std::io::Result<()> {
    let metadata_store: Arc<dyn crate::metadata::MetadataStore> = match &options.data_dir {
        #[cfg(feature = "file-storage")]
        Some(dir) => crate::metadata::FileMetadataStore::open(dir)
            .map(|s| s as Arc<dyn crate::metadata::MetadataStore>)
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "failed to open file-backed metadata store, falling back to in-memory");
                crate::metadata::InMemoryMetadataStore::new()
            }),
        #[cfg(not(feature = "file-storage"))]
        Some(_) => {
            tracing::warn!("data_dir configured but file-storage feature is disabled; using in-memory metadata");
            crate::metadata::InMemoryMetadataStore::new()
        }
        None => crate::metadata::InMemoryMetadataStore::new(),
    };

    let store = crate::store::StreamStore::new(metadata_store, crate::codec::CodecRegistry::new());
    store.spawn_expiry_sweeper(std::time::Duration::from_millis(options.expiry_sweep_interval_ms));

    let mut engine = Engine::new(Arc::clone(&store), options.clone());
    if options.rate_limit_capacity > 0 {
        engine = engine.with_rate_limiter(Arc::new(crate::policy::TokenBucketRateLimiter::new(
            options.rate_limit_capacity,
            options.rate_limit_refill_per_sec,
        )));
    }

    let state = AppState { engine: Arc::new(engine) };
    let router = create_router(state);

    let addr = format!("{}:{}", options.host, options.port);
    tracing::info!(%addr, "starting durable streams server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request as AxumRequest;
    use tower::ServiceExt;

    fn test_app() -> Router {
        let store = crate::store::StreamStore::new(
            crate::metadata::InMemoryMetadataStore::new(),
            crate::codec::CodecRegistry::new(),
        );
        let engine = Engine::new(store, crate::types::ServerOptions::default());
        create_router(AppState { engine: Arc::new(engine) })
    }

    fn test_app_with_body_limit(max_body_bytes: u64) -> Router {
        let store = crate::store::StreamStore::new(
            crate::metadata::InMemoryMetadataStore::new(),
            crate::codec::CodecRegistry::new(),
        );
        let engine = Engine::new(
            store,
            crate::types::ServerOptions {
                max_body_bytes,
                ..Default::default()
            },
        );
        create_router(AppState { engine: Arc::new(engine) })
    }

    #[tokio::test]
    async fn create_and_read_via_router() {
        let app = test_app();

        let create = app
            .clone()
            .oneshot(
                AxumRequest::builder()
                    .method("PUT")
                    .uri("/s/a")
                    .header("content-type", "text/plain")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(create.status(), StatusCode::CREATED);

        let append = app
            .clone()
            .oneshot(
                AxumRequest::builder()
                    .method("POST")
                    .uri("/s/a")
                    .header("content-type", "text/plain")
                    .body(Body::from("hello"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(append.status(), StatusCode::NO_CONTENT);

        let read = app
            .oneshot(
                AxumRequest::builder()
                    .method("GET")
                    .uri("/s/a?offset=-1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(read.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn oversized_body_is_413_regardless_of_how_far_over_the_limit() {
        let app = test_app_with_body_limit(16);
        app.clone()
            .oneshot(
                AxumRequest::builder()
                    .method("PUT")
                    .uri("/s/a")
                    .header("content-type", "text/plain")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let oversized_body = vec![b'x'; 1024];
        let resp = app
            .oneshot(
                AxumRequest::builder()
                    .method("POST")
                    .uri("/s/a")
                    .header("content-type", "text/plain")
                    .body(Body::from(oversized_body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(resp.headers().get("x-max-size").unwrap(), "16");
    }
}
