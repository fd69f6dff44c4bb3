//! Cradle CLI - Command-line interface for Cradle Fusion
//!
//! Commands:
//! - decide: Decide a batch of sensor readings
//! - run: Decide readings streamed on stdin (one per line)
//! - validate: Range-check sensor readings
//! - doctor: Diagnose model and configuration health
//! - schema: Print input/output schema information

use clap::{Parser, Subcommand, ValueEnum};
use log::{debug, info, LevelFilter};
use std::fs;
use std::io::{self, BufRead, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use cradle_fusion::config::FusionConfig;
use cradle_fusion::engine::FusionEngine;
use cradle_fusion::model::{ForestModel, ProbabilityModel, FOREST_FORMAT};
use cradle_fusion::reading::{ReadingAdapter, SensorReading};
use cradle_fusion::types::DecisionReport;
use cradle_fusion::{FusionError, ENGINE_VERSION, PRODUCER_NAME};

/// Cradle - Infant state decision fusion from cry audio and biometrics
#[derive(Parser)]
#[command(name = "cradle")]
#[command(version = ENGINE_VERSION)]
#[command(about = "Decide infant state from fused sensor readings", long_about = None)]
struct Cli {
    /// Log at info level regardless of RUST_LOG
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decide a batch of readings
    Decide {
        /// Forest model artifact (cradle.forest.v1 JSON)
        #[arg(short, long)]
        model: PathBuf,

        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long)]
        output: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,

        /// Threshold overrides (JSON)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Decide readings streamed on stdin, one JSON object per line
    Run {
        /// Forest model artifact (cradle.forest.v1 JSON)
        #[arg(short, long)]
        model: PathBuf,

        /// Threshold overrides (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Skip malformed lines instead of stopping
        #[arg(long)]
        skip_invalid: bool,

        /// Buffer output instead of flushing after each record
        #[arg(long)]
        no_flush: bool,
    },

    /// Range-check sensor readings
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Diagnose model and configuration health
    Doctor {
        /// Forest model artifact to check
        #[arg(short, long)]
        model: Option<PathBuf>,

        /// Threshold overrides to check
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print schema information
    Schema {
        /// Schema to print (input or output)
        #[arg(value_enum)]
        schema_type: SchemaType,

        /// Output as JSON schema
        #[arg(long)]
        json_schema: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one reading per line)
    Ndjson,
    /// JSON array of readings
    Json,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one report per line)
    Ndjson,
    /// JSON array of reports
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

#[derive(Clone, ValueEnum)]
enum SchemaType {
    /// Sensor reading
    Input,
    /// Decision report
    Output,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.verbose {
        env_logger::builder().filter_level(LevelFilter::Info).init();
        info!("Verbose output enabled (ignoring RUST_LOG environment variable)");
    } else {
        env_logger::init();
        debug!("Logging configured from environment variables");
    }

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

fn run(cli: Cli) -> Result<(), CradleCliError> {
    match cli.command {
        Commands::Decide {
            model,
            input,
            output,
            input_format,
            output_format,
            config,
        } => cmd_decide(
            &model,
            &input,
            &output,
            input_format,
            output_format,
            config.as_deref(),
        ),

        Commands::Run {
            model,
            config,
            skip_invalid,
            no_flush,
        } => cmd_run(&model, config.as_deref(), skip_invalid, !no_flush),

        Commands::Validate {
            input,
            input_format,
            json,
        } => cmd_validate(&input, input_format, json),

        Commands::Doctor {
            model,
            config,
            json,
        } => cmd_doctor(model.as_deref(), config.as_deref(), json),

        Commands::Schema {
            schema_type,
            json_schema,
        } => cmd_schema(schema_type, json_schema),
    }
}

fn load_engine(model: &Path, config: Option<&Path>) -> Result<FusionEngine, CradleCliError> {
    let config = match config {
        Some(path) => Some(FusionConfig::from_path(path)?),
        None => None,
    };
    Ok(FusionEngine::from_model_path(model, config)?)
}

fn read_input(input: &Path) -> Result<String, CradleCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn parse_readings(data: &str, format: &InputFormat) -> Result<Vec<SensorReading>, CradleCliError> {
    let readings = match format {
        InputFormat::Ndjson => ReadingAdapter::parse_ndjson(data)?,
        InputFormat::Json => ReadingAdapter::parse_array(data)?,
    };
    Ok(readings)
}

fn cmd_decide(
    model: &Path,
    input: &Path,
    output: &Path,
    input_format: InputFormat,
    output_format: OutputFormat,
    config: Option<&Path>,
) -> Result<(), CradleCliError> {
    // Load the model before touching the input so a bad artifact fails fast
    let engine = load_engine(model, config)?;

    let input_data = read_input(input)?;
    let readings = parse_readings(&input_data, &input_format)?;

    if readings.is_empty() {
        return Err(CradleCliError::NoReadings);
    }

    let reports = engine.report_batch(&readings);
    let degraded = reports.iter().filter(|r| r.diagnostic.is_some()).count();
    info!(
        "Decided {} readings ({} with classifier failures)",
        reports.len(),
        degraded
    );

    let output_data = format_output(&reports, &output_format)?;

    if output.to_string_lossy() == "-" {
        print!("{}", output_data);
    } else {
        fs::write(output, output_data)?;
    }

    Ok(())
}

fn cmd_run(
    model: &Path,
    config: Option<&Path>,
    skip_invalid: bool,
    flush: bool,
) -> Result<(), CradleCliError> {
    let engine = load_engine(model, config)?;

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for (line_num, line) in stdin.lock().lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();

        if trimmed.is_empty() {
            continue;
        }

        let reading: SensorReading = match serde_json::from_str(trimmed) {
            Ok(reading) => reading,
            Err(e) if skip_invalid => {
                log::warn!("Skipping line {}: {}", line_num + 1, e);
                continue;
            }
            Err(e) => {
                return Err(CradleCliError::ParseError(format!(
                    "Failed to parse reading on line {}: {}",
                    line_num + 1,
                    e
                )));
            }
        };

        let report = engine.report(&reading);
        writeln!(stdout, "{}", serde_json::to_string(&report)?)?;
        if flush {
            stdout.flush()?;
        }
    }

    stdout.flush()?;
    Ok(())
}

fn cmd_validate(input: &Path, input_format: InputFormat, json: bool) -> Result<(), CradleCliError> {
    let input_data = read_input(input)?;
    let readings = parse_readings(&input_data, &input_format)?;

    let results = ReadingAdapter::validate_readings(&readings);

    let report = ValidationReport {
        total_readings: readings.len(),
        valid_readings: readings.len() - results.len(),
        invalid_readings: results.len(),
        errors: results
            .iter()
            .map(|r| ValidationErrorDetail {
                index: r.index,
                error: r.issue.to_string(),
            })
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Total readings:   {}", report.total_readings);
        println!("Valid readings:   {}", report.valid_readings);
        println!("Invalid readings: {}", report.invalid_readings);

        if !report.errors.is_empty() {
            println!("\nErrors:");
            for err in &report.errors {
                println!("  - Reading {}: {}", err.index, err.error);
            }
        }
    }

    if report.invalid_readings > 0 {
        Err(CradleCliError::ValidationFailed(report.invalid_readings))
    } else {
        Ok(())
    }
}

fn cmd_doctor(model: Option<&Path>, config: Option<&Path>, json: bool) -> Result<(), CradleCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "engine_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Cradle Fusion version {}", ENGINE_VERSION),
    });

    match model {
        Some(path) if !path.exists() => checks.push(DoctorCheck {
            name: "model".to_string(),
            status: CheckStatus::Error,
            message: format!("Model file {} does not exist", path.display()),
        }),
        Some(path) => match ForestModel::from_path(path) {
            Ok(forest) => checks.push(DoctorCheck {
                name: "model".to_string(),
                status: CheckStatus::Ok,
                message: forest.describe(),
            }),
            Err(e) => checks.push(DoctorCheck {
                name: "model".to_string(),
                status: CheckStatus::Error,
                message: e.to_string(),
            }),
        },
        None => checks.push(DoctorCheck {
            name: "model".to_string(),
            status: CheckStatus::Warning,
            message: format!("No model given; decide/run need a {} artifact", FOREST_FORMAT),
        }),
    }

    if let Some(path) = config {
        match FusionConfig::from_path(path) {
            Ok(cfg) if cfg.is_default() => checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Ok,
                message: "Thresholds match trained defaults".to_string(),
            }),
            Ok(_) => checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Warning,
                message: "Thresholds differ from trained defaults".to_string(),
            }),
            Err(e) => checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Error,
                message: e.to_string(),
            }),
        }
    }

    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (interactive mode)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (streaming mode ready)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: ENGINE_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Cradle Doctor Report");
        println!("====================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report
        .checks
        .iter()
        .any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(CradleCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn cmd_schema(schema_type: SchemaType, json_schema: bool) -> Result<(), CradleCliError> {
    match schema_type {
        SchemaType::Input => {
            if json_schema {
                println!("{}", get_input_json_schema());
            } else {
                println!("Input: one sensor reading per record");
                println!();
                println!("- cry_volume: number, 0-1");
                println!("- cry_frequency: number, >= 0 (normalized spectral measure)");
                println!("- motion_intensity: number, 0-1");
                println!("- restlessness: number, 0-1");
                println!("- heart_rate: integer bpm, > 0");
                println!("- heart_rate_trend: integer bpm delta");
                println!("- hr_variability: number, >= 0");
            }
        }
        SchemaType::Output => {
            if json_schema {
                println!("{}", get_output_json_schema());
            } else {
                println!("Output: one decision report per reading");
                println!();
                println!("- timestamp: RFC 3339 UTC");
                println!("- state: Idle | Hungry | Sleepy | Discomfort | Stress | Uncertain");
                println!("- confidence: number, 0-1, two decimals");
                println!("- bpm: heart rate from the reading");
                println!("- rule: no_cry | stress_override | sleepy_confirmation | low_confidence | trust_classifier");
                println!("- diagnostic: present only when the classifier failed");
                println!("- producer: {{ name, version, instance_id }}");
            }
        }
    }

    Ok(())
}

// Helper functions

fn format_output(
    reports: &[DecisionReport],
    format: &OutputFormat,
) -> Result<String, CradleCliError> {
    match format {
        OutputFormat::Ndjson => {
            let mut lines: Vec<String> = Vec::new();
            for report in reports {
                lines.push(serde_json::to_string(report)?);
            }
            Ok(lines.join("\n") + "\n")
        }
        OutputFormat::Json => Ok(serde_json::to_string(reports)?),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(reports)?),
    }
}

fn get_input_json_schema() -> String {
    serde_json::json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "cradle.sensor_reading",
        "description": "Fused audio and biometric sample from the baby band",
        "type": "object",
        "required": [
            "cry_volume", "cry_frequency", "motion_intensity", "restlessness",
            "heart_rate", "heart_rate_trend", "hr_variability"
        ],
        "properties": {
            "cry_volume": { "type": "number", "minimum": 0, "maximum": 1 },
            "cry_frequency": { "type": "number", "minimum": 0 },
            "motion_intensity": { "type": "number", "minimum": 0, "maximum": 1 },
            "restlessness": { "type": "number", "minimum": 0, "maximum": 1 },
            "heart_rate": { "type": "integer", "exclusiveMinimum": 0 },
            "heart_rate_trend": { "type": "integer" },
            "hr_variability": { "type": "number", "minimum": 0 }
        }
    })
    .to_string()
}

fn get_output_json_schema() -> String {
    serde_json::json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "cradle.decision_report",
        "description": "Fused infant state decision",
        "type": "object",
        "required": ["timestamp", "state", "confidence", "bpm", "rule", "producer"],
        "properties": {
            "timestamp": { "type": "string", "format": "date-time" },
            "state": {
                "type": "string",
                "enum": ["Idle", "Hungry", "Sleepy", "Discomfort", "Stress", "Uncertain"]
            },
            "confidence": { "type": "number", "minimum": 0, "maximum": 1 },
            "bpm": { "type": "integer" },
            "rule": {
                "type": "string",
                "enum": [
                    "no_cry", "stress_override", "sleepy_confirmation",
                    "low_confidence", "trust_classifier"
                ]
            },
            "diagnostic": {
                "type": "object",
                "properties": {
                    "kind": { "type": "string" },
                    "message": { "type": "string" }
                }
            },
            "producer": {
                "type": "object",
                "properties": {
                    "name": { "type": "string" },
                    "version": { "type": "string" },
                    "instance_id": { "type": "string" }
                }
            }
        }
    })
    .to_string()
}

// Error types

#[derive(Debug)]
enum CradleCliError {
    Io(io::Error),
    Engine(FusionError),
    Json(serde_json::Error),
    NoReadings,
    ValidationFailed(usize),
    DoctorFailed,
    ParseError(String),
}

impl From<io::Error> for CradleCliError {
    fn from(e: io::Error) -> Self {
        CradleCliError::Io(e)
    }
}

impl From<FusionError> for CradleCliError {
    fn from(e: FusionError) -> Self {
        CradleCliError::Engine(e)
    }
}

impl From<serde_json::Error> for CradleCliError {
    fn from(e: serde_json::Error) -> Self {
        CradleCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<CradleCliError> for CliError {
    fn from(e: CradleCliError) -> Self {
        match e {
            CradleCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            CradleCliError::Engine(e) => {
                let (code, hint) = match &e {
                    FusionError::ModelLoad(_) => (
                        "MODEL_LOAD_ERROR",
                        "Run 'cradle doctor --model <path>' to inspect the artifact",
                    ),
                    FusionError::Config(_) => {
                        ("CONFIG_ERROR", "Check threshold names and ranges")
                    }
                    FusionError::InvalidReading(_) | FusionError::Json(_) => (
                        "PARSE_ERROR",
                        "Run 'cradle schema input' for the expected fields",
                    ),
                    FusionError::Classification(_) => {
                        ("CLASSIFICATION_ERROR", "Check the reading's cry features")
                    }
                    FusionError::Io(_) => ("IO_ERROR", "Check file paths and permissions"),
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            CradleCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            CradleCliError::NoReadings => CliError {
                code: "NO_READINGS".to_string(),
                message: "No readings found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            CradleCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} readings failed validation", count),
                hint: Some("Fix validation errors and retry".to_string()),
            },
            CradleCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
            CradleCliError::ParseError(msg) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: msg,
                hint: Some("Check input format".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct ValidationReport {
    total_readings: usize,
    valid_readings: usize,
    invalid_readings: usize,
    errors: Vec<ValidationErrorDetail>,
}

#[derive(serde::Serialize)]
struct ValidationErrorDetail {
    index: usize,
    error: String,
}

#[derive(serde::Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
