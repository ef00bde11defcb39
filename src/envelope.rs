use serde::{Deserialize, Serialize};

use crate::heuristic::MetricSet;

/// Which branch produced the confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelUsed {
    Classifier,
    Heuristic,
}

impl ModelUsed {
    /// Decision threshold for this branch. The two branches are calibrated
    /// separately and never share a threshold.
    pub fn threshold(self) -> f64 {
        match self {
            Self::Classifier => 0.5,
            Self::Heuristic => 0.6,
        }
    }
}

/// Outcome of one analysis call. Exactly one of three, never partial.
///
/// Serialised with a `status` tag:
/// `{"status":"ok","is_forged":true,"confidence":1.0,"model_used":"heuristic","metrics":{..}}`,
/// `{"status":"error","error":"unable to decode image"}`,
/// `{"status":"unavailable","error":"..."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum AnalysisResult {
    Unavailable {
        #[serde(rename = "error")]
        reason: String,
    },
    Error {
        #[serde(rename = "error")]
        message: String,
    },
    Ok {
        is_forged: bool,
        confidence: f64,
        model_used: ModelUsed,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metrics: Option<MetricSet>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        runtime: Option<String>,
    },
}

impl AnalysisResult {
    /// Build a decided result: clamp, round to 4 decimals, then compare the
    /// surfaced value against the branch threshold.
    pub fn decided(raw_confidence: f64, model_used: ModelUsed, metrics: Option<MetricSet>, runtime: Option<String>) -> Self {
        let confidence = round4(raw_confidence.clamp(0.0, 1.0));
        Self::Ok {
            is_forged: confidence >= model_used.threshold(),
            confidence,
            model_used,
            metrics,
            runtime,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable { reason: reason.into() }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }

    pub fn confidence(&self) -> Option<f64> {
        match self {
            Self::Ok { confidence, .. } => Some(*confidence),
            _ => None,
        }
    }
}

pub fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
