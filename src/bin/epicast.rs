//! epicast CLI - Command-line interface for the forecasting pipeline
//!
//! Commands:
//! - forecast: Run the full pipeline for a region and write run artifacts
//! - validate: Validate raw daily records
//! - schema: Print schema information

use clap::{Parser, Subcommand, ValueEnum};
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::ExitCode;

use epicast::config::{run_stamp, PipelineConfig};
use epicast::report;
use epicast::source::{self, FileFormat, FileSource, MemorySource};
use epicast::types::{RawDailyRecord, RegionSelector};
use epicast::{ForecastPipeline, PipelineError, SeirBackend, EPICAST_VERSION};

/// epicast - Mobility-driven compartmental case forecasting
#[derive(Parser)]
#[command(name = "epicast")]
#[command(version = EPICAST_VERSION)]
#[command(about = "Fit and forecast regional case trajectories under mobility scenarios", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full forecasting pipeline for one region
    Forecast {
        /// Input records file (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Country to look for the state and county in
        #[arg(long, default_value = "United States")]
        country: String,

        /// State to look for the county in
        #[arg(long, default_value = "Texas")]
        state: String,

        /// County to forecast
        #[arg(long, default_value = "Bexar County")]
        county: String,

        /// Number of days to forecast
        #[arg(long, default_value_t = 200)]
        forecast_days: usize,

        /// Portion of cases that are actually detected; repeatable
        #[arg(long, num_args = 1.., default_values_t = [0.05, 0.1, 0.3])]
        reporting_rates: Vec<f64>,

        /// Percentage of mobility assumed in forecasts; repeatable
        #[arg(long, num_args = 1.., default_values_t = [25.0, 50.0, 75.0, 100.0])]
        mobility_cases: Vec<f64>,

        /// Number of fitting iterations
        #[arg(long, default_value_t = 200)]
        n_epochs: usize,

        /// Learning rate decay step size
        #[arg(long, default_value_t = 4000)]
        lr_step_size: usize,

        /// Days between infection and positive confirmation
        #[arg(long, default_value_t = 10)]
        delay_days: usize,

        /// Day where the fit begins (after delay days)
        #[arg(long, default_value_t = 23)]
        start_model: usize,

        /// Incubation period in days
        #[arg(long, default_value_t = 5.0)]
        incubation_days: f64,

        /// Basic reproduction number estimated in literature
        #[arg(long, default_value_t = 2.2)]
        estimated_r0: f64,

        /// Model mobility scenarios considering mask-wearing
        #[arg(long)]
        mask_modifier: bool,

        /// Day of the mask order
        #[arg(long, default_value_t = 65)]
        mask_day: usize,

        /// Directory for fitted weights (defaults to a timestamped
        /// directory under model_weights/)
        #[arg(long)]
        weights_dir: Option<PathBuf>,

        /// Directory for chart-data artifacts
        #[arg(long, default_value = "prediction_results")]
        results_dir: PathBuf,

        /// Keep running remaining reporting rates when one fails to converge
        #[arg(long)]
        skip_failed_rates: bool,

        /// Emit the full run output as JSON on stdout
        #[arg(long)]
        json: bool,
    },

    /// Validate raw daily records
    Validate {
        /// Input records file (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print schema information
    Schema {
        /// Schema to print (input or output)
        #[arg(value_enum)]
        schema_type: SchemaType,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one record per line)
    Ndjson,
    /// JSON array of records
    Json,
}

impl From<InputFormat> for FileFormat {
    fn from(format: InputFormat) -> Self {
        match format {
            InputFormat::Ndjson => FileFormat::Ndjson,
            InputFormat::Json => FileFormat::Json,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum SchemaType {
    /// Input record schema
    Input,
    /// Run output schema
    Output,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), EpicastCliError> {
    match cli.command {
        Commands::Forecast {
            input,
            input_format,
            country,
            state,
            county,
            forecast_days,
            reporting_rates,
            mobility_cases,
            n_epochs,
            lr_step_size,
            delay_days,
            start_model,
            incubation_days,
            estimated_r0,
            mask_modifier,
            mask_day,
            weights_dir,
            results_dir,
            skip_failed_rates,
            json,
        } => {
            let config = PipelineConfig {
                region: RegionSelector::new(&country, &state, &county),
                forecast_days,
                reporting_rates,
                mobility_cases,
                n_epochs,
                lr_step_size,
                delay_days,
                start_model,
                incubation_days,
                estimated_r0,
                mask_modifier,
                mask_day,
                corrections: Vec::new(),
                weights_dir: weights_dir
                    .unwrap_or_else(|| PathBuf::from("model_weights").join(run_stamp())),
                results_dir,
                band_rates: Vec::new(),
                skip_failed_rates,
            };
            cmd_forecast(&input, input_format, config, json)
        }

        Commands::Validate {
            input,
            input_format,
            json,
        } => cmd_validate(&input, input_format, json),

        Commands::Schema { schema_type } => {
            cmd_schema(schema_type);
            Ok(())
        }
    }
}

fn cmd_forecast(
    input: &PathBuf,
    input_format: InputFormat,
    config: PipelineConfig,
    json: bool,
) -> Result<(), EpicastCliError> {
    let backend = SeirBackend {
        incubation_days: config.incubation_days,
        ..SeirBackend::default()
    };
    let pipeline = ForecastPipeline::new(config)?;

    if !json {
        let region = &pipeline.config().region;
        println!(
            "Loading data for {}, {}, {}...",
            region.county, region.state, region.country
        );
    }

    let output = if input.to_string_lossy() == "-" {
        let records = read_stdin_records(input_format)?;
        pipeline.run(&MemorySource::new(records), &backend)?
    } else {
        let source = FileSource::new(input, input_format.into());
        pipeline.run(&source, &backend)?
    };

    let chart_paths = report::write_charts(pipeline.config(), &output, &run_stamp())?;

    if json {
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    for run in &output.runs {
        println!("\nReporting rate {}", run.rate);
        println!("  Weights: {}", run.weights_path.display());
        println!(
            "  Fit loss: {:.6} -> {:.6} over {} iterations",
            run.fit.initial_loss, run.fit.final_loss, run.fit.iterations
        );
        for (result, peak) in run.results.iter().zip(run.peaks.iter()) {
            println!("  Case: {}%", result.scenario);
            match peak {
                Some(peak) => {
                    println!("    Max active: {:.1}", peak.value);
                    println!("    Day: {}, {}", peak.day_index, peak.date);
                }
                None => println!("    No projection"),
            }
        }
    }

    for skipped in &output.skipped {
        println!(
            "\nSkipped reporting rate {}: {}",
            skipped.rate, skipped.reason
        );
    }

    println!("\nChart data written:");
    for path in &chart_paths {
        println!("  {}", path.display());
    }

    Ok(())
}

fn read_stdin_records(format: InputFormat) -> Result<Vec<RawDailyRecord>, EpicastCliError> {
    let mut buffer = String::new();
    io::stdin().read_to_string(&mut buffer)?;
    let records = match format {
        InputFormat::Ndjson => source::parse_ndjson(&buffer)?,
        InputFormat::Json => source::parse_array(&buffer)?,
    };
    Ok(records)
}

fn cmd_validate(
    input: &PathBuf,
    input_format: InputFormat,
    json: bool,
) -> Result<(), EpicastCliError> {
    let raw = if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        std::fs::read_to_string(input)?
    };

    let records = match input_format {
        InputFormat::Ndjson => source::parse_ndjson(&raw)?,
        InputFormat::Json => source::parse_array(&raw)?,
    };

    if records.is_empty() {
        return Err(EpicastCliError::NoRecords);
    }

    let errors = validate_records(&records);
    // A record can fail more than one check; count records, not errors
    let invalid_records = errors
        .iter()
        .map(|e| e.index)
        .collect::<std::collections::BTreeSet<_>>()
        .len();
    let report = ValidationReport {
        total_records: records.len(),
        valid_records: records.len() - invalid_records,
        invalid_records,
        errors,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Total records:   {}", report.total_records);
        println!("Valid records:   {}", report.valid_records);
        println!("Invalid records: {}", report.invalid_records);

        if !report.errors.is_empty() {
            println!("\nErrors:");
            for err in &report.errors {
                println!("  - {} (index {}): {}", err.date, err.index, err.error);
            }
        }
    }

    if report.invalid_records > 0 {
        Err(EpicastCliError::ValidationFailed(report.invalid_records))
    } else {
        Ok(())
    }
}

fn validate_records(records: &[RawDailyRecord]) -> Vec<ValidationErrorDetail> {
    let mut errors = Vec::new();
    let population = records[0].population;

    for (index, record) in records.iter().enumerate() {
        let mut push = |error: String| {
            errors.push(ValidationErrorDetail {
                index,
                date: record.date.to_string(),
                error,
            })
        };

        if record.population == 0 {
            push("population is zero".to_string());
        } else if record.population != population {
            push(format!(
                "population {} differs from first record ({})",
                record.population, population
            ));
        }
        if record.cases < 0.0 {
            push(format!("negative case count {}", record.cases));
        }
        if record.mobility.iter().any(|v| !v.is_finite()) {
            push("non-finite mobility value".to_string());
        }
    }
    errors
}

fn cmd_schema(schema_type: SchemaType) {
    match schema_type {
        SchemaType::Input => {
            println!("Input record schema (one calendar day per record)");
            println!();
            println!("  date        ISO date, YYYY-MM-DD");
            println!("  mobility    6 numbers, percent change from baseline:");
            for (i, name) in epicast::types::MOBILITY_CATEGORY_NAMES.iter().enumerate() {
                println!("                [{i}] {name}");
            }
            println!("  cases       cumulative confirmed case count (non-negative)");
            println!("  population  region population (positive, constant across a series)");
            println!("  country, state, county   optional region tags used for filtering");
            println!();
            println!("Accepted as NDJSON (one record per line) or a JSON array.");
        }
        SchemaType::Output => {
            println!("Run output schema");
            println!();
            println!("- meta: {{ producer, version, run_id, generated_at_utc }}");
            println!("- region: {{ country, state, county }}");
            println!("- dates: shared axis, observed history plus forecast horizon");
            println!("- ground_truth: aligned observed case series");
            println!("- runs: one entry per reporting rate:");
            println!("  - rate, fit {{ iterations, initial_loss, final_loss }}, weights_path");
            println!("  - results: per mobility scenario {{ scenario, active[], total[] }}");
            println!("  - peaks: per scenario {{ value, day_index, date }}");
            println!("- skipped: rates dropped under --skip-failed-rates");
            println!();
            println!("Chart artifacts (<stamp>_Total_Cases.json, <stamp>_Active_Cases.json)");
            println!("carry, per scenario, one series per configured reporting-rate band");
            println!("plus the ground-truth series over the same date axis.");
        }
    }
}

// Error types

#[derive(Debug)]
enum EpicastCliError {
    Io(io::Error),
    Pipeline(PipelineError),
    Json(serde_json::Error),
    NoRecords,
    ValidationFailed(usize),
}

impl From<io::Error> for EpicastCliError {
    fn from(e: io::Error) -> Self {
        EpicastCliError::Io(e)
    }
}

impl From<PipelineError> for EpicastCliError {
    fn from(e: PipelineError) -> Self {
        EpicastCliError::Pipeline(e)
    }
}

impl From<serde_json::Error> for EpicastCliError {
    fn from(e: serde_json::Error) -> Self {
        EpicastCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<EpicastCliError> for CliError {
    fn from(e: EpicastCliError) -> Self {
        match e {
            EpicastCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            EpicastCliError::Pipeline(e) => {
                let code = match &e {
                    PipelineError::Config(_) => "CONFIG_ERROR",
                    PipelineError::Data(_) => "DATA_ERROR",
                    PipelineError::Convergence(_) => "CONVERGENCE_ERROR",
                    PipelineError::Scale { .. } => "SCALE_ERROR",
                    _ => "PIPELINE_ERROR",
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: None,
                }
            }
            EpicastCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            EpicastCliError::NoRecords => CliError {
                code: "NO_RECORDS".to_string(),
                message: "No records found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            EpicastCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{count} records failed validation"),
                hint: Some("Fix validation errors and retry".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct ValidationReport {
    total_records: usize,
    valid_records: usize,
    invalid_records: usize,
    errors: Vec<ValidationErrorDetail>,
}

#[derive(serde::Serialize)]
struct ValidationErrorDetail {
    index: usize,
    date: String,
    error: String,
}
