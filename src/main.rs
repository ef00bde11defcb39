use std::sync::Arc;

use docauth_core::{
    api,
    classifier::compiled_runtimes,
    config::Config,
    logging,
    policy::{Analyzer, Capabilities},
    ClassifierState, DecoderSupport,
};
use tokio::net::TcpListener;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ----------------------------------------------------------------
    // 0. Configuration & logging
    // ----------------------------------------------------------------
    let config = Config::from_env()?;
    logging::init_logging(config.log_format)?;
    info!(
        bind = %config.bind_addr(),
        model_path = ?config.model_path,
        max_upload_bytes = config.max_upload_bytes,
        "configuration loaded"
    );

    // ----------------------------------------------------------------
    // 1. Capability probes (once per process)
    // ----------------------------------------------------------------
    let runtimes = compiled_runtimes();
    let runtime_names: Vec<&'static str> = runtimes.iter().map(|p| p.name).collect();
    let capabilities = Capabilities::probe(config.model_path.as_deref(), &runtimes);

    match &capabilities.decoder {
        DecoderSupport::Available { .. } => {
            info!(formats = ?capabilities.decoder.format_names(), "image decoding available")
        }
        DecoderSupport::Missing { reason } => warn!(%reason, "image decoding unavailable, every request will report it"),
    }
    match &capabilities.classifier {
        ClassifierState::Loaded(model) => info!(runtime = model.runtime(), "classifier path enabled"),
        other => info!(
            state = other.status_label(),
            runtimes = ?runtime_names,
            "heuristic-only mode"
        ),
    }

    // ----------------------------------------------------------------
    // 2. Shared state
    // ----------------------------------------------------------------
    let state = Arc::new(api::AppState {
        analyzer: Arc::new(Analyzer::new(capabilities)),
        runtimes: runtime_names,
    });

    // ----------------------------------------------------------------
    // 3. HTTP service
    // ----------------------------------------------------------------
    let app = api::app(state, config.max_upload_bytes);
    let listener = TcpListener::bind(config.bind_addr()).await?;

    info!(addr = %config.bind_addr(), "serving POST /forgery, GET /health");
    axum::serve(listener, app).await?;

    Ok(())
}
