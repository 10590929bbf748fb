//! Minimal runnable binary: loads config, wires up tracing, serves.
//!
//! Not a CLI — packaging and argument parsing are out of scope (see
//! `SPEC_FULL.md` §0). The only external knob is an optional config
//! file path in `DURABLE_STREAMS_CONFIG`.

use durable_streams::types::ServerOptions;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let options = match std::env::var("DURABLE_STREAMS_CONFIG") {
        Ok(path) => ServerOptions::load_from_file(&path).unwrap_or_else(|e| {
            tracing::error!(error = %e, path = %path, "failed to load config, using defaults");
            ServerOptions::default()
        }),
        Err(_) => ServerOptions::default(),
    };

    if let Err(e) = durable_streams::axum_adapter::start_server(options).await {
        tracing::error!(error = %e, "server exited with error");
        std::process::exit(1);
    }
}
