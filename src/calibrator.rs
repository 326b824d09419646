//! Per-reporting-rate model calibration
//!
//! One calibration runs per configured reporting rate: rescale the observed
//! cases by `population * rate`, derive initial conditions from the case
//! count preceding the series, build a fresh model, fit it, and persist the
//! fitted parameters to a rate-specific weights file so runs with different
//! rates never overwrite each other.

use std::path::{Path, PathBuf};

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::model::{CompartmentModel, FitSummary, ModelBackend};
use crate::types::{AlignedSeries, InitialConditions, RegionSelector};

/// A fitted model bound to one reporting rate
pub struct CalibratedModel {
    /// The fitted model; read-only from here on
    pub model: Box<dyn CompartmentModel>,
    /// Reporting rate this model was calibrated under
    pub rate: f64,
    /// `population * rate`, converting between observed and true counts
    pub scale_factor: f64,
    /// Initial conditions the model was constructed with
    pub init: InitialConditions,
    /// Fit diagnostics reported by the simulator
    pub fit: FitSummary,
    /// Where the fitted parameters were persisted
    pub weights_path: PathBuf,
}

/// Compute the observed-to-true conversion factor, rejecting degenerate
/// inputs before they can surface as division failures mid-pipeline
pub fn scale_factor(population: u64, rate: f64) -> Result<f64, PipelineError> {
    let scale = population as f64 * rate;
    if scale <= 0.0 {
        return Err(PipelineError::Scale { population, rate });
    }
    Ok(scale)
}

/// Weights artifact path for one `(county, rate)` pair
pub fn weights_path(weights_dir: &Path, region: &RegionSelector, rate: f64) -> PathBuf {
    weights_dir.join(format!("{}_report{}_weights.json", region.county_stem(), rate))
}

/// Calibrate one model against the aligned series under `rate`.
///
/// Convergence failures are surfaced as-is; the caller decides whether the
/// remaining rates still run.
pub fn calibrate(
    series: &AlignedSeries,
    rate: f64,
    backend: &dyn ModelBackend,
    config: &PipelineConfig,
) -> Result<CalibratedModel, PipelineError> {
    let scale = scale_factor(series.population, rate)?;

    let scaled_cases: Vec<f64> = series.cases.iter().map(|c| c / scale).collect();

    let init = InitialConditions::derive(
        series.prev_cases,
        scale,
        config.estimated_r0,
        config.incubation_days,
    );

    let mut model = backend.build(init);
    let fit = model.fit(
        &series.mobility,
        &scaled_cases,
        config.n_epochs,
        config.lr_step_size,
    )?;

    let path = weights_path(&config.weights_dir, &config.region, rate);
    model.save(&path)?;

    Ok(CalibratedModel {
        model,
        rate,
        scale_factor: scale,
        init,
        fit,
        weights_path: path,
    })
}
