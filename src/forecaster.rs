//! Counterfactual scenario projection
//!
//! For each configured mobility scenario the observed history is extended
//! with a synthetic constant-mobility future block, the mandate schedule is
//! reapplied across the whole trajectory, and the fitted model is run
//! forward. Projection never updates the model.

use crate::calibrator::CalibratedModel;
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::types::{AlignedSeries, ForecastResult, MobilityRow, MANDATE_COLUMN};

/// Synthetic future block for one scenario: constant `pct/100` in every
/// category, mandate column held at 0 (the schedule is applied afterwards)
pub fn synthetic_block(scenario_pct: f64, forecast_days: usize) -> Vec<MobilityRow> {
    let mut row = [scenario_pct / 100.0; 6];
    row[MANDATE_COLUMN] = 0.0;
    vec![row; forecast_days]
}

/// Observed history concatenated with the synthetic future block, with the
/// mandate column forced to the configured schedule over the whole
/// trajectory.
///
/// The mandate transition uses the aligned-axis index
/// `mask_day - start_model`, the same day the model saw during fitting. A
/// persistent mandate applies to the synthetic block too.
pub fn scenario_trajectory(
    series: &AlignedSeries,
    scenario_pct: f64,
    config: &PipelineConfig,
) -> Vec<MobilityRow> {
    let mut trajectory = series.mobility.clone();
    trajectory.extend(synthetic_block(scenario_pct, config.forecast_days));

    if config.mask_modifier {
        let from = config.mask_day.saturating_sub(config.start_model);
        for row in trajectory.iter_mut().skip(from) {
            row[MANDATE_COLUMN] = 1.0;
        }
    }
    trajectory
}

/// Project one fitted model under every configured mobility scenario,
/// rescaled back to raw case units
pub fn forecast(
    calibrated: &CalibratedModel,
    series: &AlignedSeries,
    config: &PipelineConfig,
) -> Result<Vec<ForecastResult>, PipelineError> {
    let axis_len = series.len() + config.forecast_days;
    if config.mask_modifier {
        let from = config.mask_day.saturating_sub(config.start_model);
        if from >= axis_len {
            return Err(PipelineError::Config(format!(
                "mask_day {} falls outside the {}-day date axis",
                config.mask_day, axis_len
            )));
        }
    }

    let mut results = Vec::with_capacity(config.mobility_cases.len());
    for &scenario in &config.mobility_cases {
        let trajectory = scenario_trajectory(series, scenario, config);
        let states = calibrated.model.project(&trajectory);

        let active: Vec<f64> = states
            .iter()
            .map(|s| s.infectious * calibrated.scale_factor)
            .collect();
        let total: Vec<f64> = states
            .iter()
            .map(|s| (s.infectious + s.removed) * calibrated.scale_factor)
            .collect();

        results.push(ForecastResult {
            scenario,
            active,
            total,
        });
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibrator::calibrate;
    use crate::seir::SeirBackend;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn series(days: usize) -> AlignedSeries {
        AlignedSeries {
            mobility: vec![[0.7, 0.7, 0.7, 0.7, 0.7, 0.0]; days],
            cases: (0..days).map(|d| 50.0 + d as f64 * 20.0).collect(),
            day0: NaiveDate::from_ymd_opt(2020, 4, 3).unwrap(),
            prev_cases: 50.0,
            population: 1_000_000,
        }
    }

    fn calibrated(config: &PipelineConfig) -> CalibratedModel {
        calibrate(&series(15), 0.1, &SeirBackend::default(), config).unwrap()
    }

    fn config(dir: &std::path::Path) -> PipelineConfig {
        PipelineConfig {
            n_epochs: 5,
            forecast_days: 30,
            weights_dir: dir.to_path_buf(),
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn test_full_mobility_scenario_block() {
        let block = synthetic_block(100.0, 4);
        assert_eq!(block.len(), 4);
        for row in &block {
            for (col, value) in row.iter().enumerate() {
                let expected = if col == MANDATE_COLUMN { 0.0 } else { 1.0 };
                assert_eq!(*value, expected);
            }
        }
    }

    #[test]
    fn test_trajectory_concatenates_history_and_future() {
        let cfg = PipelineConfig {
            forecast_days: 10,
            ..PipelineConfig::default()
        };
        let s = series(15);
        let trajectory = scenario_trajectory(&s, 50.0, &cfg);
        assert_eq!(trajectory.len(), 25);
        // history preserved, future constant at 0.5
        assert_eq!(trajectory[0][0], 0.7);
        assert_eq!(trajectory[15][0], 0.5);
    }

    #[test]
    fn test_mandate_applies_retroactively_to_synthetic_block() {
        let mut cfg = PipelineConfig {
            forecast_days: 10,
            ..PipelineConfig::default()
        };
        cfg.mask_modifier = true;
        cfg.mask_day = cfg.start_model + 12;
        let s = series(15);
        let trajectory = scenario_trajectory(&s, 50.0, &cfg);

        for (i, row) in trajectory.iter().enumerate() {
            let expected = if i >= 12 { 1.0 } else { 0.0 };
            assert_eq!(row[MANDATE_COLUMN], expected, "day {i}");
        }
    }

    #[test]
    fn test_total_dominates_active_everywhere() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let model = calibrated(&cfg);
        let results = forecast(&model, &series(15), &cfg).unwrap();

        assert_eq!(results.len(), cfg.mobility_cases.len());
        for result in &results {
            assert_eq!(result.active.len(), 15 + cfg.forecast_days);
            assert_eq!(result.total.len(), result.active.len());
            for (active, total) in result.active.iter().zip(result.total.iter()) {
                assert!(total + 1e-9 >= *active);
            }
        }
    }

    #[test]
    fn test_rescaling_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let model = calibrated(&cfg);
        let s = series(15);
        let results = forecast(&model, &s, &cfg).unwrap();

        let trajectory = scenario_trajectory(&s, cfg.mobility_cases[0], &cfg);
        let states = model.model.project(&trajectory);
        for (day, state) in states.iter().enumerate() {
            let recovered = results[0].active[day] / model.scale_factor;
            assert!((recovered - state.infectious).abs() < 1e-12);
        }
    }

    #[test]
    fn test_mask_day_outside_axis_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        let model = calibrated(&cfg);
        cfg.mask_modifier = true;
        cfg.mask_day = cfg.start_model + 15 + cfg.forecast_days;
        assert!(matches!(
            forecast(&model, &series(15), &cfg),
            Err(PipelineError::Config(_))
        ));
    }
}
