//! Diagnostics and plot-data reporting
//!
//! Stateless helpers over assembled pipeline output: peak extraction for
//! console reporting, and the chart-data contract handed to an external
//! renderer. Per chart, each mobility scenario carries one series per
//! configured confidence band (a reporting rate, low to high) spanning the
//! same date axis as the ground-truth series. Rendering itself is not this
//! crate's concern; the artifacts hold the data a renderer needs.

use std::path::PathBuf;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::pipeline::{PipelineOutput, RunMeta};
use crate::types::{Peak, RegionSelector};

/// Maximum of a projected series: value, first day index of the maximum,
/// and the corresponding date
pub fn peak(values: &[f64], dates: &[NaiveDate]) -> Option<Peak> {
    let mut best: Option<(usize, f64)> = None;
    for (idx, &value) in values.iter().enumerate() {
        match best {
            Some((_, current)) if value <= current => {}
            _ => best = Some((idx, value)),
        }
    }
    let (day_index, value) = best?;
    Some(Peak {
        value,
        day_index,
        date: *dates.get(day_index)?,
    })
}

/// Which case series a chart covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    TotalCases,
    ActiveCases,
}

impl ChartKind {
    fn file_stem(self) -> &'static str {
        match self {
            ChartKind::TotalCases => "Total_Cases",
            ChartKind::ActiveCases => "Active_Cases",
        }
    }
}

/// One confidence band: a reporting rate and its projected series
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartBand {
    pub rate: f64,
    pub values: Vec<f64>,
}

/// All bands for one mobility scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartScenario {
    pub scenario: f64,
    pub bands: Vec<ChartBand>,
}

/// Data contract for one chart, consumed by an external renderer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartData {
    pub meta: RunMeta,
    pub region: RegionSelector,
    pub kind: ChartKind,
    pub dates: Vec<NaiveDate>,
    pub ground_truth: Vec<f64>,
    pub scenarios: Vec<ChartScenario>,
}

/// Assemble the chart-data contract for one chart kind.
///
/// Bands follow the configured band rates (low to high); a band whose rate
/// produced no run (a skipped calibration) is omitted rather than invented.
pub fn chart_data(kind: ChartKind, config: &PipelineConfig, output: &PipelineOutput) -> ChartData {
    let mut scenarios = Vec::with_capacity(config.mobility_cases.len());
    for &scenario in &config.mobility_cases {
        let mut bands = Vec::new();
        for &rate in &config.bands() {
            let Some(run) = output.runs.iter().find(|r| r.rate == rate) else {
                continue;
            };
            let Some(result) = run.results.iter().find(|r| r.scenario == scenario) else {
                continue;
            };
            let values = match kind {
                ChartKind::TotalCases => result.total.clone(),
                ChartKind::ActiveCases => result.active.clone(),
            };
            bands.push(ChartBand { rate, values });
        }
        scenarios.push(ChartScenario { scenario, bands });
    }

    ChartData {
        meta: output.meta.clone(),
        region: output.region.clone(),
        kind,
        dates: output.dates.clone(),
        ground_truth: output.ground_truth.clone(),
        scenarios,
    }
}

/// Write both chart artifacts under the results directory, named with the
/// run stamp. Returns the written paths.
pub fn write_charts(
    config: &PipelineConfig,
    output: &PipelineOutput,
    stamp: &str,
) -> Result<Vec<PathBuf>, PipelineError> {
    std::fs::create_dir_all(&config.results_dir)?;

    let mut paths = Vec::new();
    for kind in [ChartKind::TotalCases, ChartKind::ActiveCases] {
        let data = chart_data(kind, config, output);
        let path = config
            .results_dir
            .join(format!("{}_{}.json", stamp, kind.file_stem()));
        std::fs::write(&path, serde_json::to_string_pretty(&data)?)?;
        paths.push(path);
    }
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ForecastPipeline;
    use crate::seir::SeirBackend;
    use crate::source::MemorySource;
    use crate::types::RawDailyRecord;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_peak_finds_single_maximum() {
        let day0 = NaiveDate::from_ymd_opt(2020, 4, 3).unwrap();
        let dates: Vec<NaiveDate> = (0..6).map(|d| day0 + chrono::Days::new(d)).collect();
        let values = [1.0, 4.0, 9.0, 3.0, 2.0, 0.5];

        let peak = peak(&values, &dates).unwrap();
        assert_eq!(peak.value, 9.0);
        assert_eq!(peak.day_index, 2);
        assert_eq!(peak.date, NaiveDate::from_ymd_opt(2020, 4, 5).unwrap());
    }

    #[test]
    fn test_peak_of_empty_series_is_none() {
        assert_eq!(peak(&[], &[]), None);
    }

    #[test]
    fn test_peak_takes_first_occurrence_of_tied_maximum() {
        let day0 = NaiveDate::from_ymd_opt(2020, 4, 3).unwrap();
        let dates: Vec<NaiveDate> = (0..4).map(|d| day0 + chrono::Days::new(d)).collect();
        let peak = peak(&[1.0, 7.0, 7.0, 2.0], &dates).unwrap();
        assert_eq!(peak.day_index, 1);
    }

    fn run_pipeline(dir: &std::path::Path) -> (PipelineConfig, PipelineOutput) {
        let config = PipelineConfig {
            forecast_days: 15,
            reporting_rates: vec![0.05, 0.1, 0.3],
            mobility_cases: vec![50.0, 100.0],
            n_epochs: 5,
            delay_days: 5,
            start_model: 10,
            weights_dir: dir.join("weights"),
            results_dir: dir.join("results"),
            ..PipelineConfig::default()
        };
        let records: Vec<RawDailyRecord> = (0..40)
            .map(|d| RawDailyRecord {
                date: NaiveDate::from_ymd_opt(2020, 3, 1).unwrap()
                    + chrono::Days::new(d as u64),
                mobility: [-20.0, -15.0, -10.0, -25.0, -30.0, 5.0],
                cases: 30.0 + d as f64 * 12.0,
                population: 1_000_000,
                country: None,
                state: None,
                county: None,
            })
            .collect();
        let output = ForecastPipeline::new(config.clone())
            .unwrap()
            .run(&MemorySource::new(records), &SeirBackend::default())
            .unwrap();
        (config, output)
    }

    #[test]
    fn test_chart_data_bands_are_low_to_high_per_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let (config, output) = run_pipeline(dir.path());

        let data = chart_data(ChartKind::ActiveCases, &config, &output);
        assert_eq!(data.scenarios.len(), 2);
        for scenario in &data.scenarios {
            let rates: Vec<f64> = scenario.bands.iter().map(|b| b.rate).collect();
            assert_eq!(rates, vec![0.05, 0.1, 0.3]);
            for band in &scenario.bands {
                assert_eq!(band.values.len(), data.dates.len());
            }
        }
        assert_eq!(data.ground_truth.len(), 25);
    }

    #[test]
    fn test_chart_data_omits_bands_for_skipped_rates() {
        let dir = tempfile::tempdir().unwrap();
        let (config, mut output) = run_pipeline(dir.path());

        // A rate dropped by the convergence policy has no run to chart
        let dropped = output.runs.remove(0);
        output.skipped.push(crate::pipeline::SkippedRate {
            rate: dropped.rate,
            reason: "loss became non-finite at iteration 0".to_string(),
        });

        let data = chart_data(ChartKind::TotalCases, &config, &output);
        for scenario in &data.scenarios {
            let rates: Vec<f64> = scenario.bands.iter().map(|b| b.rate).collect();
            assert_eq!(rates, vec![0.1, 0.3]);
        }
    }

    #[test]
    fn test_write_charts_produces_both_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let (config, output) = run_pipeline(dir.path());

        let paths = write_charts(&config, &output, "2020_05_01_12_00").unwrap();
        assert_eq!(paths.len(), 2);
        assert!(paths[0].ends_with("2020_05_01_12_00_Total_Cases.json"));
        assert!(paths[1].ends_with("2020_05_01_12_00_Active_Cases.json"));

        let raw = std::fs::read_to_string(&paths[1]).unwrap();
        let parsed: ChartData = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed.kind, ChartKind::ActiveCases);
        assert_eq!(parsed.dates, output.dates);
    }
}
