//! epicast - Mobility-driven compartmental forecasting for regional
//! COVID-19 case trajectories
//!
//! epicast fits a compartmental epidemic model against observed mobility
//! and case-count series, then projects forward under hypothetical
//! constant-mobility scenarios. The deterministic pipeline runs: data
//! alignment → per-reporting-rate calibration → scenario forecasting →
//! diagnostics.
//!
//! The dynamical model and the record source are trait collaborators
//! ([`model::ModelBackend`], [`source::RegionDataSource`]); reference
//! implementations ship in [`seir`] and [`source`].

pub mod aligner;
pub mod calibrator;
pub mod config;
pub mod error;
pub mod forecaster;
pub mod model;
pub mod pipeline;
pub mod report;
pub mod seir;
pub mod source;
pub mod types;

pub use config::PipelineConfig;
pub use error::PipelineError;
pub use pipeline::{ForecastPipeline, PipelineOutput};

// Model seam exports
pub use model::{CompartmentModel, ModelBackend};
pub use seir::SeirBackend;

// Source exports
pub use source::{FileSource, MemorySource, RegionDataSource};

/// epicast version embedded in all run artifacts
pub const EPICAST_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for run artifacts
pub const PRODUCER_NAME: &str = "epicast";
