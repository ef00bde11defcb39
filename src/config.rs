use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};

const DEFAULT_MODEL_PATH: &str = "forgery_model.tflite";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// `None` runs heuristic-only.
    pub model_path: Option<PathBuf>,
    pub max_upload_bytes: usize,
    pub log_format: LogFormat,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Resolve settings through `lookup`, which returns `None` for unset keys.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let port = match lookup("PORT") {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("PORT must be a number between 0 and 65535, got {raw:?}"))?,
            None => 8000,
        };

        // An explicitly empty path switches the classifier off.
        let model_path = match lookup("FORGERY_MODEL_PATH") {
            Some(raw) if raw.trim().is_empty() => None,
            Some(raw) => Some(PathBuf::from(raw)),
            None => Some(PathBuf::from(DEFAULT_MODEL_PATH)),
        };

        let max_upload_bytes = match lookup("MAX_UPLOAD_BYTES") {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("MAX_UPLOAD_BYTES must be a byte count, got {raw:?}"))?,
            None => DEFAULT_MAX_UPLOAD_BYTES,
        };

        let log_format = match lookup("LOG_FORMAT").as_deref().map(str::trim) {
            None | Some("") | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => anyhow::bail!("LOG_FORMAT must be \"pretty\" or \"json\", got {other:?}"),
        };

        Ok(Self {
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            model_path,
            max_upload_bytes,
            log_format,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
