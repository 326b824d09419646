//! Pipeline configuration
//!
//! All knobs of the forecasting pipeline live here and are validated up
//! front, before any data retrieval or fitting happens. Nothing in the
//! pipeline reads ambient global state; paths and schedules are explicit
//! configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::types::{MobilityCorrection, RegionSelector, MOBILITY_CATEGORIES};

/// Default number of days between infection and confirmed-case observation
pub const DEFAULT_DELAY_DAYS: usize = 10;

/// Default number of initial days excluded from the fit window
pub const DEFAULT_START_MODEL: usize = 23;

/// Timestamp used to name per-run artifact directories and files
pub fn run_stamp() -> String {
    chrono::Utc::now().format("%Y_%m_%d_%H_%M").to_string()
}

/// Configuration for one pipeline invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Region to fetch and forecast
    pub region: RegionSelector,
    /// Number of days to project past the observed history
    pub forecast_days: usize,
    /// Assumed fractions of true infections observed as confirmed cases;
    /// one calibration runs per rate
    pub reporting_rates: Vec<f64>,
    /// Hypothetical constant mobility percentages for the forecast horizon
    pub mobility_cases: Vec<f64>,
    /// Fitting iteration budget passed to the simulator
    pub n_epochs: usize,
    /// Learning-rate decay step size passed to the simulator
    pub lr_step_size: usize,
    /// Lag between infection and confirmed-case observation
    pub delay_days: usize,
    /// Days excluded from the start of the fit window
    pub start_model: usize,
    /// Incubation period in days, used to derive the exposed fraction
    pub incubation_days: f64,
    /// Literature estimate of the basic reproduction number
    pub estimated_r0: f64,
    /// Whether to model a mask mandate schedule
    pub mask_modifier: bool,
    /// Raw day index at which the mandate takes effect
    pub mask_day: usize,
    /// Documented raw-data overrides applied by the aligner
    pub corrections: Vec<MobilityCorrection>,
    /// Directory for fitted-weights artifacts
    pub weights_dir: PathBuf,
    /// Directory for plot-data artifacts
    pub results_dir: PathBuf,
    /// Reporting rates used as named confidence bands in plot artifacts,
    /// low to high. Empty means "use the sorted reporting rates".
    pub band_rates: Vec<f64>,
    /// Keep running remaining reporting rates when one calibration fails
    /// to converge, instead of aborting the whole run
    pub skip_failed_rates: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            region: RegionSelector::new("United States", "Texas", "Bexar County"),
            forecast_days: 200,
            reporting_rates: vec![0.05, 0.1, 0.3],
            mobility_cases: vec![25.0, 50.0, 75.0, 100.0],
            n_epochs: 200,
            lr_step_size: 4000,
            delay_days: DEFAULT_DELAY_DAYS,
            start_model: DEFAULT_START_MODEL,
            incubation_days: 5.0,
            estimated_r0: 2.2,
            mask_modifier: false,
            mask_day: 65,
            corrections: Vec::new(),
            weights_dir: PathBuf::from("model_weights").join(run_stamp()),
            results_dir: PathBuf::from("prediction_results"),
            band_rates: Vec::new(),
            skip_failed_rates: false,
        }
    }
}

impl PipelineConfig {
    /// Validate configuration before any data retrieval or fitting.
    ///
    /// Rejects parameter combinations that would otherwise surface as
    /// arithmetic failures or empty slices mid-pipeline.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.forecast_days == 0 {
            return Err(PipelineError::Config(
                "forecast_days must be at least 1".to_string(),
            ));
        }
        if self.reporting_rates.is_empty() {
            return Err(PipelineError::Config(
                "at least one reporting rate is required".to_string(),
            ));
        }
        for &rate in &self.reporting_rates {
            if !(rate > 0.0 && rate <= 1.0) {
                return Err(PipelineError::Config(format!(
                    "reporting rate {rate} is outside (0, 1]"
                )));
            }
        }
        if self.mobility_cases.is_empty() {
            return Err(PipelineError::Config(
                "at least one mobility case is required".to_string(),
            ));
        }
        for &case in &self.mobility_cases {
            if case <= 0.0 {
                return Err(PipelineError::Config(format!(
                    "mobility case {case}% must be positive"
                )));
            }
        }
        if self.n_epochs == 0 {
            return Err(PipelineError::Config(
                "n_epochs must be at least 1".to_string(),
            ));
        }
        if self.lr_step_size == 0 {
            return Err(PipelineError::Config(
                "lr_step_size must be at least 1".to_string(),
            ));
        }
        // The simulator steps one day at a time, so the progression rate
        // 1 / incubation_days must not exceed 1 or compartments go negative
        if self.incubation_days < 1.0 {
            return Err(PipelineError::Config(
                "incubation_days must be at least 1".to_string(),
            ));
        }
        if self.estimated_r0 <= 0.0 {
            return Err(PipelineError::Config(
                "estimated_r0 must be positive".to_string(),
            ));
        }
        for correction in &self.corrections {
            if correction.category >= MOBILITY_CATEGORIES {
                return Err(PipelineError::Config(format!(
                    "mobility correction for {} targets category {}, but only {} exist",
                    correction.date, correction.category, MOBILITY_CATEGORIES
                )));
            }
        }
        for &rate in &self.band_rates {
            if !(rate > 0.0 && rate <= 1.0) {
                return Err(PipelineError::Config(format!(
                    "band rate {rate} is outside (0, 1]"
                )));
            }
        }
        Ok(())
    }

    /// Reporting rates used as confidence bands in plot artifacts, low to
    /// high. Falls back to the sorted reporting rates when none are
    /// configured explicitly.
    pub fn bands(&self) -> Vec<f64> {
        let mut bands = if self.band_rates.is_empty() {
            self.reporting_rates.clone()
        } else {
            self.band_rates.clone()
        };
        bands.sort_by(|a, b| a.total_cmp(b));
        bands
    }
}
