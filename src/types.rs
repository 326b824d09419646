//! Core types for the epicast pipeline
//!
//! This module defines the data structures that flow through each stage of the
//! pipeline: raw daily records, aligned series, calibration inputs, and
//! forecast outputs.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Number of mobility categories per daily record
pub const MOBILITY_CATEGORIES: usize = 6;

/// Human-readable names of the mobility categories, in column order
pub const MOBILITY_CATEGORY_NAMES: [&str; MOBILITY_CATEGORIES] = [
    "Retail & recreation",
    "Grocery & pharmacy",
    "Parks",
    "Transit stations",
    "Workplace",
    "Residential",
];

/// Column index repurposed as the mandate/mask indicator after alignment
pub const MANDATE_COLUMN: usize = 5;

/// One mobility observation: percent change from baseline per category
/// (raw records), or fraction of baseline activity (aligned series)
pub type MobilityRow = [f64; MOBILITY_CATEGORIES];

/// One calendar day of raw data for a region
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawDailyRecord {
    /// Calendar date of the observation
    pub date: NaiveDate,
    /// Mobility category values (percent change from baseline)
    pub mobility: MobilityRow,
    /// Cumulative confirmed case count
    pub cases: f64,
    /// Region population (constant across a series)
    pub population: u64,
    /// Region selectors carried on the wire format for filtering
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub county: Option<String>,
}

/// Region selector passed to a data source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionSelector {
    pub country: String,
    pub state: String,
    pub county: String,
}

impl RegionSelector {
    pub fn new(country: &str, state: &str, county: &str) -> Self {
        Self {
            country: country.to_string(),
            state: state.to_string(),
            county: county.to_string(),
        }
    }

    /// County name with a trailing " County" suffix stripped, used as the
    /// file stem of weights artifacts
    pub fn county_stem(&self) -> &str {
        self.county
            .strip_suffix(" County")
            .unwrap_or(&self.county)
    }
}

/// Narrowly scoped override of one raw mobility value.
///
/// Applied by the aligner to exactly the record whose date matches. Exists
/// for documented data-quality anomalies in a specific feed; it is not a
/// general transformation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MobilityCorrection {
    /// Date of the record to correct
    pub date: NaiveDate,
    /// Mobility column to overwrite
    pub category: usize,
    /// Replacement raw value (percent change from baseline)
    pub value: f64,
}

/// Trimmed, offset-corrected mobility and case series sharing one time index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlignedSeries {
    /// Mobility rows as fractions of baseline activity; column
    /// [`MANDATE_COLUMN`] holds the 0/1 mandate indicator
    pub mobility: Vec<MobilityRow>,
    /// Case counts aligned to the same day index
    pub cases: Vec<f64>,
    /// Date of day index 0
    pub day0: NaiveDate,
    /// Case count one step before index 0
    pub prev_cases: f64,
    /// Region population
    pub population: u64,
}

impl AlignedSeries {
    /// Number of aligned days
    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    /// Date axis spanning the aligned history plus `forecast_days` ahead
    pub fn date_axis(&self, forecast_days: usize) -> Vec<NaiveDate> {
        (0..self.len() + forecast_days)
            .map(|d| self.day0 + chrono::Days::new(d as u64))
            .collect()
    }
}

/// Initial dynamical-system state derived from the case count preceding the
/// aligned series, expressed as fractions of the population
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InitialConditions {
    /// Fraction exposed at day 0
    pub e0: f64,
    /// Fraction infectious at day 0
    pub i0: f64,
}

impl InitialConditions {
    /// Derive initial conditions from the observed case count preceding the
    /// series start.
    ///
    /// `i0 = prev_cases / scale_factor`; the exposed fraction assumes
    /// `estimated_r0` secondary infections spread over the incubation period.
    pub fn derive(
        prev_cases: f64,
        scale_factor: f64,
        estimated_r0: f64,
        incubation_days: f64,
    ) -> Self {
        let i0 = prev_cases / scale_factor;
        let e0 = estimated_r0 * i0 / incubation_days;
        Self { e0, i0 }
    }
}

/// Per-day compartment values produced by a forward projection, as fractions
/// of the population
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompartmentState {
    /// Currently infectious (active) fraction
    pub infectious: f64,
    /// Resolved (removed) fraction
    pub removed: f64,
}

/// Projected case trajectories for one `(reporting rate, mobility scenario)`
/// pair, rescaled to raw case units
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastResult {
    /// Mobility scenario percentage this projection assumed
    pub scenario: f64,
    /// Active (infectious) cases per day
    pub active: Vec<f64>,
    /// Cumulative (active + resolved) cases per day
    pub total: Vec<f64>,
}

/// Peak of a projected series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Peak {
    /// Maximum value of the series
    pub value: f64,
    /// Day index at which the maximum first occurs
    pub day_index: usize,
    /// Date of the maximum
    pub date: NaiveDate,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_initial_conditions_derivation() {
        // population 1M at reporting rate 0.1 gives scale factor 100_000
        let init = InitialConditions::derive(50.0, 100_000.0, 2.2, 5.0);
        assert_eq!(init.i0, 0.0005);
        assert!((init.e0 - 2.2 * 0.0005 / 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_county_stem_strips_suffix() {
        let region = RegionSelector::new("United States", "Texas", "Bexar County");
        assert_eq!(region.county_stem(), "Bexar");

        let bare = RegionSelector::new("United States", "Texas", "Bexar");
        assert_eq!(bare.county_stem(), "Bexar");
    }

    #[test]
    fn test_date_axis_spans_history_and_horizon() {
        let series = AlignedSeries {
            mobility: vec![[1.0; MOBILITY_CATEGORIES]; 3],
            cases: vec![1.0, 2.0, 3.0],
            day0: NaiveDate::from_ymd_opt(2020, 3, 15).unwrap(),
            prev_cases: 1.0,
            population: 1_000_000,
        };
        let dates = series.date_axis(2);
        assert_eq!(dates.len(), 5);
        assert_eq!(dates[0], NaiveDate::from_ymd_opt(2020, 3, 15).unwrap());
        assert_eq!(dates[4], NaiveDate::from_ymd_opt(2020, 3, 19).unwrap());
    }
}
