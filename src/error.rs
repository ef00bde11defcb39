use thiserror::Error;

/// The payload could not be turned into a pixel grid.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unable to decode image")]
pub struct DecodeError;

/// Why a classifier artifact could not be brought up at startup.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelLoadError {
    #[error("failed to load model with {runtime}: {message}")]
    Load { runtime: &'static str, message: String },

    #[error("model input element type not supported: {0}")]
    UnsupportedInputType(String),
}

/// Per-request failures that end in an `Error` envelope.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("internal analysis failure: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
