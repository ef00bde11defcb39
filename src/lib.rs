//! Document image authenticity analysis.
//!
//! Bytes in, one [`AnalysisResult`] out: a pretrained classifier scores the
//! document when one was loaded at startup, otherwise a statistical heuristic
//! over the grayscale grid does.

pub mod api;
pub mod classifier;
pub mod config;
pub mod decoder;
pub mod envelope;
pub mod error;
pub mod fingerprint;
pub mod heuristic;
pub mod logging;
pub mod policy;

#[cfg(test)]
mod test_images;

pub use classifier::{ClassifierState, InferenceBackend, LoadedClassifier, ModelSpec};
pub use decoder::{decode, DecodedImage, DecoderSupport};
pub use envelope::{AnalysisResult, ModelUsed};
pub use heuristic::MetricSet;
pub use policy::{Analyzer, Capabilities};
