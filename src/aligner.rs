//! Time alignment of raw records
//!
//! Raw case counts lag the conditions that caused them, and the earliest days
//! of a series are too noisy to fit. This module reconciles those axes: it
//! shifts the case series back by the reporting delay, converts mobility
//! percentages to fractions of baseline activity, installs the mandate
//! schedule in the indicator column, and discards the warm-up window. The
//! warm-up days stay represented through `prev_cases`, which seeds the
//! initial conditions.

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::types::{AlignedSeries, MobilityRow, RawDailyRecord, MANDATE_COLUMN};

/// Align a raw record stream into length-matched mobility and case series.
///
/// The aligned series covers `records.len() - delay_days - start_model`
/// days. `day0` is the date at raw index `delay_days + start_model`;
/// `prev_cases` is the case count one raw day earlier.
pub fn align(
    records: &[RawDailyRecord],
    config: &PipelineConfig,
) -> Result<AlignedSeries, PipelineError> {
    if records.is_empty() {
        return Err(PipelineError::Data(
            "record stream is empty".to_string(),
        ));
    }

    // The alignment arithmetic assumes one record per day in date order
    // with a single constant population; a caller bypassing the source
    // layer must not silently get a wrong day0 or scale factor.
    for pair in records.windows(2) {
        if pair[1].date <= pair[0].date {
            return Err(PipelineError::Data(format!(
                "record dates are not strictly increasing at {}",
                pair[1].date
            )));
        }
    }
    let population = records[0].population;
    for record in records {
        if record.population != population {
            return Err(PipelineError::Data(format!(
                "population changes mid-series on {} ({} vs {})",
                record.date, record.population, population
            )));
        }
    }

    let total_delay = config.delay_days + config.start_model;
    if total_delay >= records.len() {
        return Err(PipelineError::Config(format!(
            "delay_days ({}) + start_model ({}) leaves no days out of {}",
            config.delay_days,
            config.start_model,
            records.len()
        )));
    }

    let day0 = records[total_delay].date;
    // There is no day before index 0
    let prev_index = total_delay.saturating_sub(1);
    let prev_cases = records[prev_index].cases;

    let mut mobility: Vec<MobilityRow> = records.iter().map(|r| r.mobility).collect();
    apply_corrections(&mut mobility, records, config)?;

    // Treat a case observed `delay_days` later as caused by conditions
    // `delay_days` earlier: drop the first `delay_days` cases and the last
    // `delay_days` mobility rows so both index the same underlying day.
    let mut cases: Vec<f64> = records[config.delay_days..].iter().map(|r| r.cases).collect();
    mobility.truncate(records.len() - config.delay_days);

    // Percent change from baseline -> fraction of baseline activity
    for row in &mut mobility {
        for value in row.iter_mut() {
            *value = 1.0 + *value / 100.0;
        }
    }

    // The last column carries the mandate schedule, not mobility
    for row in &mut mobility {
        row[MANDATE_COLUMN] = 0.0;
    }
    if config.mask_modifier {
        for row in mobility.iter_mut().skip(config.mask_day) {
            row[MANDATE_COLUMN] = 1.0;
        }
    }

    // Discard the warm-up window from the fit
    mobility.drain(..config.start_model);
    cases.drain(..config.start_model);

    debug_assert_eq!(mobility.len(), cases.len());

    Ok(AlignedSeries {
        mobility,
        cases,
        day0,
        prev_cases,
        population,
    })
}

/// Apply configured raw-data overrides to the rows they target.
///
/// A correction must name a date present in the series; a miss is a
/// configuration error rather than a silent no-op.
fn apply_corrections(
    mobility: &mut [MobilityRow],
    records: &[RawDailyRecord],
    config: &PipelineConfig,
) -> Result<(), PipelineError> {
    for correction in &config.corrections {
        let index = records
            .iter()
            .position(|r| r.date == correction.date)
            .ok_or_else(|| {
                PipelineError::Config(format!(
                    "mobility correction targets {}, which is not in the series",
                    correction.date
                ))
            })?;
        mobility[index][correction.category] = correction.value;
    }
    Ok(())
}
