//! Error types for the anomark-bench crate.

use thiserror::Error;

use anomark_core::CoreError;

/// Top-level error type for sweep orchestration.
#[derive(Debug, Error)]
pub enum BenchError {
    #[error("invalid sweep config: {0}")]
    Config(String),

    /// Execution failure wrapped by the output-capture scope. The message is
    /// the full diagnostic output the run produced before failing; the
    /// original cause hangs off `source()`.
    #[error("{log}")]
    Captured {
        log: String,
        #[source]
        source: Box<BenchError>,
    },

    /// A lane worker process failed.
    #[error("benchmark lane `{lane}` failed: {detail}")]
    Lane { lane: String, detail: String },

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("payload serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl BenchError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
