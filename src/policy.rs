//! Decision policy: decode, pick a branch, score, decide.
//!
//! ```text
//! Decoding ──(fail)──────────────────────────────► Error
//!    │
//!    ▼
//! PathSelection ── classifier usable? ──yes──► Scoring (classifier, t=0.5) ─┐
//!    │                                                                       ├─► Decided
//!    └──────────── no ─────────────────────► Scoring (heuristic,  t=0.6) ─┘
//! ```
//! No state is retried and the two branches are never blended.

use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

use tracing::{debug, info, warn};

use crate::classifier::{ClassifierState, RuntimeProbe};
use crate::decoder::{self, DecodedImage, DecoderSupport};
use crate::envelope::{AnalysisResult, ModelUsed};
use crate::error::{AnalysisError, Result};
use crate::heuristic;

/// Everything probed once at startup. Immutable afterwards.
#[derive(Debug)]
pub struct Capabilities {
    pub decoder: DecoderSupport,
    pub classifier: ClassifierState,
}

impl Capabilities {
    pub fn new(decoder: DecoderSupport, classifier: ClassifierState) -> Self {
        Self { decoder, classifier }
    }

    /// Probe decoding support and bring up the classifier (if any).
    pub fn probe(model_path: Option<&Path>, runtimes: &[RuntimeProbe]) -> Self {
        let decoder = DecoderSupport::probe();
        let classifier = ClassifierState::initialize(model_path, runtimes);
        Self { decoder, classifier }
    }
}

/// The document authenticity analyzer. Shared read-only across threads.
#[derive(Debug)]
pub struct Analyzer {
    capabilities: Capabilities,
}

impl Analyzer {
    pub fn new(capabilities: Capabilities) -> Self {
        Self { capabilities }
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Analyze one encoded image. Never panics past this boundary and never
    /// returns a partial result.
    pub fn analyze(&self, bytes: &[u8]) -> AnalysisResult {
        if let DecoderSupport::Missing { reason } = &self.capabilities.decoder {
            return AnalysisResult::unavailable(reason.clone());
        }

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.run(bytes)));
        match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                debug!(error = %e, "analysis failed");
                AnalysisResult::error(e.to_string())
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!(error = %message, "analysis panicked");
                AnalysisResult::error(AnalysisError::Internal(message).to_string())
            }
        }
    }

    fn run(&self, bytes: &[u8]) -> Result<AnalysisResult> {
        let image = decoder::decode(bytes)?;

        if let Some(confidence) = self.capabilities.classifier.preprocess_and_infer(&image)? {
            let runtime = self.capabilities.classifier.runtime().map(str::to_string);
            let result = AnalysisResult::decided(confidence, ModelUsed::Classifier, None, runtime);
            log_decision(&result, &image);
            return Ok(result);
        }

        let metrics = heuristic::measure(image.gray());
        debug!(
            sharpness = metrics.sharpness,
            edge_density = metrics.edge_density,
            entropy = metrics.entropy,
            "heuristic metrics"
        );
        let result = AnalysisResult::decided(heuristic::score(&metrics), ModelUsed::Heuristic, Some(metrics), None);
        log_decision(&result, &image);
        Ok(result)
    }
}

fn log_decision(result: &AnalysisResult, image: &DecodedImage) {
    if let AnalysisResult::Ok {
        is_forged,
        confidence,
        model_used,
        ..
    } = result
    {
        info!(
            width = image.width(),
            height = image.height(),
            model_used = ?model_used,
            confidence,
            is_forged,
            "document analyzed"
        );
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
