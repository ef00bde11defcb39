use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use base64::{prelude::BASE64_STANDARD, Engine};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

use crate::{decoder::DecoderSupport, envelope::AnalysisResult, fingerprint, policy::Analyzer};

// ==========================================
// 1. Shared state
// ==========================================
// The analyzer is read-only after startup, so requests share it through an
// Arc with no lock.
pub struct AppState {
    pub analyzer: Arc<Analyzer>,
    /// Runtimes compiled into this build, reported by /health.
    pub runtimes: Vec<&'static str>,
}

// ==========================================
// 2. DTOs
// ==========================================

#[derive(Deserialize)]
pub struct ForgeryRequest {
    /// Base64 (standard alphabet) of the encoded document image.
    /// Line breaks and other ASCII whitespace (MIME-style wrapping) are ignored.
    pub image: String,
}

#[derive(Serialize)]
pub struct ForgeryReceipt {
    #[serde(flatten)]
    pub result: AnalysisResult,
    /// Absent when the payload was not valid base64.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_sha256: Option<String>,
    pub analyzed_at: i64,
}

#[derive(Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub decoder: &'static str,
    pub formats: Vec<String>,
    pub classifier: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime: Option<&'static str>,
    pub runtimes: Vec<&'static str>,
}

// ==========================================
// 3. Router
// ==========================================
pub fn app(state: Arc<AppState>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/forgery", post(detect_forgery))
        .route("/forgery/", post(detect_forgery))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ==========================================
// 4. Handlers
// ==========================================

/// Analyze one base64-encoded document image.
///
/// Every analyzer outcome (ok / error / unavailable) is a 200 carrying the
/// envelope; only a lost blocking task is a 500.
async fn detect_forgery(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ForgeryRequest>,
) -> Result<Json<ForgeryReceipt>, (StatusCode, String)> {
    let compact: String = req.image.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = match BASE64_STANDARD.decode(compact) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(error = %e, "rejected non-base64 image payload");
            return Ok(Json(ForgeryReceipt {
                result: AnalysisResult::error(format!("invalid image payload: {e}")),
                document_sha256: None,
                analyzed_at: chrono::Utc::now().timestamp(),
            }));
        }
    };

    let sha = fingerprint::document_sha256(&bytes);
    info!(document_sha256 = %sha, size = bytes.len(), "forgery analysis requested");

    // Decode and metrics are CPU-bound, keep them off the async workers.
    let analyzer = state.analyzer.clone();
    let result = tokio::task::spawn_blocking(move || analyzer.analyze(&bytes))
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("task join error: {e}")))?;

    Ok(Json(ForgeryReceipt {
        result,
        document_sha256: Some(sha),
        analyzed_at: chrono::Utc::now().timestamp(),
    }))
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthReport> {
    let capabilities = state.analyzer.capabilities();
    let decoder = match capabilities.decoder {
        DecoderSupport::Available { .. } => "available",
        DecoderSupport::Missing { .. } => "missing",
    };

    Json(HealthReport {
        status: "ok",
        decoder,
        formats: capabilities.decoder.format_names(),
        classifier: capabilities.classifier.status_label(),
        runtime: capabilities.classifier.runtime(),
        runtimes: state.runtimes.clone(),
    })
}
