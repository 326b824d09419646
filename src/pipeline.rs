//! Pipeline orchestration
//!
//! This module provides the public API for epicast. It wires the stages
//! together: fetch -> align -> per-reporting-rate calibration ->
//! per-scenario forecasting -> diagnostics, and assembles the run output
//! consumed by the CLI and the plot-artifact writer.

use std::path::PathBuf;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aligner::align;
use crate::calibrator::calibrate;
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::forecaster::forecast;
use crate::model::{FitSummary, ModelBackend};
use crate::report::peak;
use crate::source::RegionDataSource;
use crate::types::{ForecastResult, Peak, RegionSelector};
use crate::EPICAST_VERSION;

/// Identity of one pipeline run, embedded in every artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMeta {
    pub producer: String,
    pub version: String,
    pub run_id: Uuid,
    pub generated_at_utc: String,
}

impl RunMeta {
    fn new() -> Self {
        Self {
            producer: crate::PRODUCER_NAME.to_string(),
            version: EPICAST_VERSION.to_string(),
            run_id: Uuid::new_v4(),
            generated_at_utc: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Everything produced for one reporting rate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateRun {
    /// Reporting rate this calibration assumed
    pub rate: f64,
    /// Fit diagnostics from the simulator
    pub fit: FitSummary,
    /// Where the fitted parameters were persisted
    pub weights_path: PathBuf,
    /// One projection per configured mobility scenario
    pub results: Vec<ForecastResult>,
    /// Peak active cases per scenario, parallel to `results`
    pub peaks: Vec<Option<Peak>>,
}

/// Assembled output of one pipeline invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineOutput {
    pub meta: RunMeta,
    pub region: RegionSelector,
    /// Shared date axis spanning observed history plus forecast horizon
    pub dates: Vec<NaiveDate>,
    /// Observed (aligned) case series, raw units
    pub ground_truth: Vec<f64>,
    /// Per-reporting-rate runs, in configured order
    pub runs: Vec<RateRun>,
    /// Rates dropped under `skip_failed_rates`, with the reported reason
    pub skipped: Vec<SkippedRate>,
}

/// A reporting rate whose calibration failed to converge and was dropped
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedRate {
    pub rate: f64,
    pub reason: String,
}

/// The forecasting pipeline.
///
/// Construction validates the configuration; [`ForecastPipeline::run`]
/// performs the work. The source and model backend are collaborators passed
/// at invocation time, so the pipeline itself carries no I/O or numerical
/// fitting concerns.
pub struct ForecastPipeline {
    config: PipelineConfig,
}

impl ForecastPipeline {
    /// Create a pipeline, rejecting invalid configuration up front
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the full pipeline for the configured region.
    ///
    /// The reporting-rate loop is sequential; each iteration is independent
    /// and writes its own weights artifact. When `skip_failed_rates` is set,
    /// a convergence failure drops that rate and the remaining rates still
    /// run; otherwise the first failure aborts the whole run.
    pub fn run(
        &self,
        source: &dyn RegionDataSource,
        backend: &dyn ModelBackend,
    ) -> Result<PipelineOutput, PipelineError> {
        let records = source.fetch(&self.config.region)?;
        let series = align(&records, &self.config)?;

        // Scoped, idempotent setup for artifact directories
        std::fs::create_dir_all(&self.config.weights_dir)?;
        std::fs::create_dir_all(&self.config.results_dir)?;

        let dates = series.date_axis(self.config.forecast_days);

        let mut runs = Vec::with_capacity(self.config.reporting_rates.len());
        let mut skipped = Vec::new();
        for &rate in &self.config.reporting_rates {
            let calibrated = match calibrate(&series, rate, backend, &self.config) {
                Ok(calibrated) => calibrated,
                Err(PipelineError::Convergence(reason)) if self.config.skip_failed_rates => {
                    skipped.push(SkippedRate { rate, reason });
                    continue;
                }
                Err(e) => return Err(e),
            };

            let results = forecast(&calibrated, &series, &self.config)?;
            let peaks = results
                .iter()
                .map(|result| peak(&result.active, &dates))
                .collect();

            runs.push(RateRun {
                rate,
                fit: calibrated.fit,
                weights_path: calibrated.weights_path,
                results,
                peaks,
            });
        }

        Ok(PipelineOutput {
            meta: RunMeta::new(),
            region: self.config.region.clone(),
            dates,
            ground_truth: series.cases.clone(),
            runs,
            skipped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seir::SeirBackend;
    use crate::source::MemorySource;
    use crate::types::RawDailyRecord;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn make_records(days: usize) -> Vec<RawDailyRecord> {
        (0..days)
            .map(|d| RawDailyRecord {
                date: NaiveDate::from_ymd_opt(2020, 3, 1).unwrap()
                    + chrono::Days::new(d as u64),
                mobility: [-30.0, -25.0, -20.0, -35.0, -40.0, 10.0],
                cases: 40.0 + d as f64 * 15.0,
                population: 1_000_000,
                country: None,
                state: None,
                county: None,
            })
            .collect()
    }

    fn test_config(dir: &std::path::Path) -> PipelineConfig {
        PipelineConfig {
            forecast_days: 20,
            reporting_rates: vec![0.05, 0.1, 0.3],
            mobility_cases: vec![50.0, 100.0],
            n_epochs: 5,
            delay_days: 10,
            start_model: 23,
            weights_dir: dir.join("weights"),
            results_dir: dir.join("results"),
            ..PipelineConfig::default()
        }
    }

    /// Model whose fitting never converges, standing in for a calibration
    /// that diverges on real data
    struct DivergingModel;

    impl crate::model::CompartmentModel for DivergingModel {
        fn fit(
            &mut self,
            _mobility: &[crate::types::MobilityRow],
            _scaled_cases: &[f64],
            _iters: usize,
            _lr_step_size: usize,
        ) -> Result<FitSummary, PipelineError> {
            Err(PipelineError::Convergence(
                "loss became non-finite at iteration 0".to_string(),
            ))
        }

        fn project(&self, _mobility: &[crate::types::MobilityRow]) -> Vec<crate::types::CompartmentState> {
            Vec::new()
        }

        fn save(&self, _path: &std::path::Path) -> Result<(), PipelineError> {
            Ok(())
        }
    }

    /// Backend that hands out diverging models for the first `failures`
    /// builds, then defers to the real one
    struct FlakyBackend {
        inner: SeirBackend,
        failures: std::cell::Cell<usize>,
    }

    impl FlakyBackend {
        fn failing_first(failures: usize) -> Self {
            Self {
                inner: SeirBackend::default(),
                failures: std::cell::Cell::new(failures),
            }
        }
    }

    impl ModelBackend for FlakyBackend {
        fn build(&self, init: crate::types::InitialConditions) -> Box<dyn crate::model::CompartmentModel> {
            if self.failures.get() > 0 {
                self.failures.set(self.failures.get() - 1);
                Box::new(DivergingModel)
            } else {
                self.inner.build(init)
            }
        }
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let mut config = PipelineConfig::default();
        config.reporting_rates = vec![2.0];
        assert!(ForecastPipeline::new(config).is_err());

        let mut config = PipelineConfig::default();
        config.incubation_days = 0.2;
        assert!(ForecastPipeline::new(config).is_err());
    }

    #[test]
    fn test_convergence_failure_aborts_run_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = ForecastPipeline::new(test_config(dir.path())).unwrap();
        let source = MemorySource::new(make_records(40));

        let result = pipeline.run(&source, &FlakyBackend::failing_first(1));
        assert!(matches!(result, Err(PipelineError::Convergence(_))));
    }

    #[test]
    fn test_skip_failed_rates_records_skips_and_continues() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.skip_failed_rates = true;
        let pipeline = ForecastPipeline::new(config).unwrap();
        let source = MemorySource::new(make_records(40));

        let output = pipeline
            .run(&source, &FlakyBackend::failing_first(1))
            .unwrap();

        // The first configured rate failed; the other two still ran
        assert_eq!(output.skipped.len(), 1);
        assert_eq!(output.skipped[0].rate, 0.05);
        assert!(output.skipped[0].reason.contains("non-finite"));

        let rates: Vec<f64> = output.runs.iter().map(|r| r.rate).collect();
        assert_eq!(rates, vec![0.1, 0.3]);
        for run in &output.runs {
            assert!(run.weights_path.exists());
        }
    }

    #[test]
    fn test_end_to_end_run() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let pipeline = ForecastPipeline::new(config.clone()).unwrap();

        let source = MemorySource::new(make_records(40));
        let output = pipeline.run(&source, &SeirBackend::default()).unwrap();

        // 40 raw days minus delay 10 minus offset 23 leaves 7 aligned days
        assert_eq!(output.ground_truth.len(), 7);
        assert_eq!(output.dates.len(), 7 + config.forecast_days);
        assert_eq!(output.runs.len(), 3);

        for run in &output.runs {
            assert_eq!(run.results.len(), 2);
            assert_eq!(run.peaks.len(), 2);
            assert!(run.weights_path.exists());
            for result in &run.results {
                assert_eq!(result.active.len(), output.dates.len());
                for (active, total) in result.active.iter().zip(result.total.iter()) {
                    assert!(total + 1e-9 >= *active);
                }
            }
        }
    }

    #[test]
    fn test_rate_order_does_not_change_per_rate_results() {
        let dir = tempfile::tempdir().unwrap();
        let source = MemorySource::new(make_records(40));
        let backend = SeirBackend::default();

        let forward = ForecastPipeline::new(test_config(dir.path()))
            .unwrap()
            .run(&source, &backend)
            .unwrap();

        let mut reversed_config = test_config(dir.path());
        reversed_config.reporting_rates = vec![0.3, 0.1, 0.05];
        let reversed = ForecastPipeline::new(reversed_config)
            .unwrap()
            .run(&source, &backend)
            .unwrap();

        for run in &forward.runs {
            let other = reversed
                .runs
                .iter()
                .find(|r| r.rate == run.rate)
                .expect("rate present in both runs");
            for (a, b) in run.results.iter().zip(other.results.iter()) {
                assert_eq!(a.active, b.active);
                assert_eq!(a.total, b.total);
            }
        }
    }

    #[test]
    fn test_weights_artifacts_are_rate_specific() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = ForecastPipeline::new(test_config(dir.path())).unwrap();
        let source = MemorySource::new(make_records(40));
        let output = pipeline.run(&source, &SeirBackend::default()).unwrap();

        let mut paths: Vec<_> = output.runs.iter().map(|r| r.weights_path.clone()).collect();
        paths.sort();
        paths.dedup();
        assert_eq!(paths.len(), 3);
    }

    #[test]
    fn test_missing_region_aborts_run() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.region = RegionSelector::new("United States", "Ohio", "Franklin County");
        let pipeline = ForecastPipeline::new(config).unwrap();

        let mut records = make_records(40);
        for record in &mut records {
            record.county = Some("Bexar County".to_string());
        }
        let source = MemorySource::new(records);
        assert!(matches!(
            pipeline.run(&source, &SeirBackend::default()),
            Err(PipelineError::Data(_))
        ));
    }
}
