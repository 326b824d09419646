//! Error types for the epicast pipeline

use thiserror::Error;

/// Errors that can occur while preparing data, calibrating, or forecasting
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Region data unavailable: {0}")]
    Data(String),

    #[error("Fit failed to converge: {0}")]
    Convergence(String),

    #[error("Scale factor is not positive (population {population}, reporting rate {rate})")]
    Scale { population: u64, rate: f64 },

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
