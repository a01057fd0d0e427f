//! Forecast CLI - Command-line interface for ABA Forecast
//!
//! Commands:
//! - generate: Sample a synthetic labeled dataset
//! - train: Fit the model and write artifact + metrics
//! - predict: Score one prediction request (file or stdin)
//! - doctor: Diagnose dataset, model and metrics health

use chrono::{DateTime, FixedOffset, Local};
use clap::{Parser, Subcommand};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use aba_forecast::dataset::{self, DATASET_FILENAME, DEFAULT_DATA_DIR};
use aba_forecast::model::MODEL_FILENAME;
use aba_forecast::training::{DEFAULT_MODEL_DIR, METRICS_FILENAME};
use aba_forecast::types::Variability;
use aba_forecast::{
    generate_samples, train, ForecastError, MetricsReport, Predictor, SamplerConfig, TrainConfig,
    TrainedModel, WeatherSnapshot, FEATURE_NAMES, FORECAST_VERSION, PRODUCER_NAME,
};

/// Forecast - behavioral escalation risk forecasting
#[derive(Parser)]
#[command(name = "forecast")]
#[command(version = FORECAST_VERSION)]
#[command(about = "Generate data, train and serve the escalation risk model", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sample a synthetic labeled dataset
    Generate {
        /// Number of samples
        #[arg(long, default_value = "7000")]
        samples: usize,

        /// Random seed
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Noise spread: tight, baseline or wide
        #[arg(long, default_value = "baseline")]
        variability: Variability,

        /// Output directory
        #[arg(long, default_value = DEFAULT_DATA_DIR)]
        output_dir: PathBuf,

        /// Print the dataset summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Train the model and write artifact + metrics
    Train {
        /// Training config file (JSON); flags below override it
        #[arg(long)]
        config: Option<PathBuf>,

        /// Dataset path
        #[arg(long)]
        data_path: Option<PathBuf>,

        /// Output directory for model and metrics
        #[arg(long)]
        model_dir: Option<PathBuf>,

        /// Validation fraction
        #[arg(long)]
        test_size: Option<f64>,

        /// Random seed for split and forest
        #[arg(long)]
        seed: Option<u64>,

        /// Number of trees
        #[arg(long)]
        trees: Option<usize>,

        /// Print the metrics report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Score one prediction request
    Predict {
        /// Model directory
        #[arg(long, default_value = DEFAULT_MODEL_DIR)]
        model_dir: PathBuf,

        /// Request file (use - for stdin)
        #[arg(short, long, default_value = "-")]
        input: PathBuf,

        /// Weather snapshot file (flat or OpenWeather JSON)
        #[arg(long)]
        weather: Option<PathBuf>,

        /// Reference time (RFC3339); defaults to the local clock
        #[arg(long)]
        now: Option<String>,

        /// Pretty-print the response
        #[arg(long)]
        pretty: bool,
    },

    /// Diagnose dataset, model and metrics health
    Doctor {
        /// Data directory
        #[arg(long, default_value = DEFAULT_DATA_DIR)]
        data_dir: PathBuf,

        /// Model directory
        #[arg(long, default_value = DEFAULT_MODEL_DIR)]
        model_dir: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let body = serde_json::to_string(&CliError::from(e))
                .unwrap_or_else(|_| "Unknown error".to_string());
            eprintln!("{}", body);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), ForecastCliError> {
    match cli.command {
        Commands::Generate {
            samples,
            seed,
            variability,
            output_dir,
            json,
        } => cmd_generate(
            SamplerConfig {
                samples,
                seed,
                variability,
            },
            &output_dir,
            json,
        ),

        Commands::Train {
            config,
            data_path,
            model_dir,
            test_size,
            seed,
            trees,
            json,
        } => {
            let mut train_config = match config {
                Some(path) => TrainConfig::from_file(&path)?,
                None => TrainConfig::default(),
            };
            if let Some(data_path) = data_path {
                train_config.data_path = data_path;
            }
            if let Some(model_dir) = model_dir {
                train_config.model_dir = model_dir;
            }
            if let Some(test_size) = test_size {
                train_config.test_size = test_size;
            }
            if let Some(seed) = seed {
                train_config.random_seed = seed;
            }
            if let Some(trees) = trees {
                train_config.forest.n_trees = trees;
            }
            cmd_train(&train_config, json)
        }

        Commands::Predict {
            model_dir,
            input,
            weather,
            now,
            pretty,
        } => cmd_predict(&model_dir, &input, weather.as_deref(), now.as_deref(), pretty),

        Commands::Doctor {
            data_dir,
            model_dir,
            json,
        } => cmd_doctor(&data_dir, &model_dir, json),
    }
}

fn cmd_generate(
    config: SamplerConfig,
    output_dir: &Path,
    json: bool,
) -> Result<(), ForecastCliError> {
    let samples = generate_samples(&config)?;
    let path = dataset::save_dataset(&samples, output_dir)?;
    let summary = dataset::summarize(&samples);

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("Generated {} samples -> {}", summary.samples, path.display());
        println!("  Variability:      {}", config.variability);
        println!("  Accident rate:    {:.3}", summary.accident_rate);
        println!("  Escalation rate:  {:.3}", summary.escalation_rate);
        println!(
            "  Sleep quality:    mean {:.3}, std {:.3}",
            summary.sleep_quality_mean, summary.sleep_quality_std
        );
    }
    Ok(())
}

fn cmd_train(config: &TrainConfig, json: bool) -> Result<(), ForecastCliError> {
    let report = train(config)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_training_summary(&report);
    }
    Ok(())
}

fn print_training_summary(report: &MetricsReport) {
    println!("Training complete (run {})", report.run_id);
    println!("  Accuracy:           {:.2}%", report.accuracy * 100.0);
    println!("  Macro F1:           {:.2}%", report.macro_f1 * 100.0);
    println!("  Decision threshold: {:.3}", report.decision_threshold);
    println!(
        "  Samples:            {} train / {} validation",
        report.train_samples, report.val_samples
    );

    println!("\nClass distribution:");
    for (label, share) in &report.class_distribution {
        println!("  {}: {:.2}%", label, share * 100.0);
    }

    println!("\nClassification report:");
    print!("{}", report.classification_report);

    println!("\nTop feature importance:");
    for (rank, item) in report.top_feature_importance.iter().enumerate() {
        println!(
            "  {:>2}. {:<34} {:.4} ({:.1}%)",
            rank + 1,
            item.feature,
            item.importance,
            item.relative_importance * 100.0
        );
    }
    println!("\nModel saved to {}", report.model_path);
}

fn cmd_predict(
    model_dir: &Path,
    input: &Path,
    weather: Option<&Path>,
    now: Option<&str>,
    pretty: bool,
) -> Result<(), ForecastCliError> {
    // Read request
    let body = if input.to_string_lossy() == "-" {
        if atty::is(atty::Stream::Stdin) {
            return Err(ForecastCliError::InvalidArgument(
                "no request on stdin; pipe a JSON request or pass --input <file>".to_string(),
            ));
        }
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        fs::read_to_string(input)?
    };

    let snapshot = match weather {
        Some(path) => Some(WeatherSnapshot::from_json(&fs::read_to_string(path)?)?),
        None => None,
    };

    let now = resolve_now(now)?;
    let predictor = Predictor::load(model_dir)?;
    let response = predictor.predict_json(&body, snapshot.as_ref(), now)?;

    if pretty {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        println!("{}", serde_json::to_string(&response)?);
    }
    Ok(())
}

fn resolve_now(now: Option<&str>) -> Result<DateTime<FixedOffset>, ForecastCliError> {
    match now {
        Some(raw) => DateTime::parse_from_rfc3339(raw).map_err(|e| {
            ForecastCliError::InvalidArgument(format!("--now must be RFC3339 ({raw}): {e}"))
        }),
        None => {
            let local = Local::now();
            Ok(local.with_timezone(local.offset()))
        }
    }
}

fn cmd_doctor(data_dir: &Path, model_dir: &Path, json: bool) -> Result<(), ForecastCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "forecast_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Forecast version {}", FORECAST_VERSION),
    });

    checks.push(DoctorCheck {
        name: "feature_schema".to_string(),
        status: CheckStatus::Ok,
        message: format!("{} features: {}", FEATURE_NAMES.len(), FEATURE_NAMES.join(", ")),
    });

    // Dataset
    let data_path = data_dir.join(DATASET_FILENAME);
    checks.push(if data_path.exists() {
        match dataset::read_samples(&data_path) {
            Ok(samples) => {
                let summary = dataset::summarize(&samples);
                DoctorCheck {
                    name: "dataset".to_string(),
                    status: if summary.samples == 0 {
                        CheckStatus::Warning
                    } else {
                        CheckStatus::Ok
                    },
                    message: format!(
                        "{} rows, escalation rate {:.3}",
                        summary.samples, summary.escalation_rate
                    ),
                }
            }
            Err(e) => DoctorCheck {
                name: "dataset".to_string(),
                status: CheckStatus::Error,
                message: format!("Cannot read dataset: {}", e),
            },
        }
    } else {
        DoctorCheck {
            name: "dataset".to_string(),
            status: CheckStatus::Warning,
            message: format!("{} does not exist; run 'forecast generate'", data_path.display()),
        }
    });

    // Model artifact
    let model_path = model_dir.join(MODEL_FILENAME);
    checks.push(if model_path.exists() {
        match TrainedModel::load(&model_path) {
            Ok(model) => DoctorCheck {
                name: "model".to_string(),
                status: CheckStatus::Ok,
                message: format!(
                    "run {} ({} trees, threshold {:.3}, trained {})",
                    model.run_id,
                    model.forest.trees().len(),
                    model.decision_threshold,
                    model.trained_at.format("%Y-%m-%d %H:%M UTC")
                ),
            },
            Err(e) => DoctorCheck {
                name: "model".to_string(),
                status: CheckStatus::Error,
                message: e.to_string(),
            },
        }
    } else {
        DoctorCheck {
            name: "model".to_string(),
            status: CheckStatus::Warning,
            message: format!("{} does not exist; run 'forecast train'", model_path.display()),
        }
    });

    // Metrics report
    let metrics_path = model_dir.join(METRICS_FILENAME);
    checks.push(if metrics_path.exists() {
        match fs::read_to_string(&metrics_path)
            .map_err(ForecastError::from)
            .and_then(|content| Ok(serde_json::from_str::<serde_json::Value>(&content)?))
        {
            Ok(value) => {
                let metric = |key: &str| value.get(key).and_then(|v| v.as_f64()).unwrap_or(0.0);
                DoctorCheck {
                    name: "metrics".to_string(),
                    status: CheckStatus::Ok,
                    message: format!(
                        "accuracy {:.4}, macro F1 {:.4}",
                        metric("accuracy"),
                        metric("macro_f1")
                    ),
                }
            }
            Err(e) => DoctorCheck {
                name: "metrics".to_string(),
                status: CheckStatus::Error,
                message: format!("Invalid metrics report: {}", e),
            },
        }
    } else {
        DoctorCheck {
            name: "metrics".to_string(),
            status: CheckStatus::Warning,
            message: "Metrics report does not exist".to_string(),
        }
    });

    // stdin is where predict reads requests by default
    checks.push(DoctorCheck {
        name: "stdin".to_string(),
        status: CheckStatus::Ok,
        message: if atty::is(atty::Stream::Stdin) {
            "stdin is a TTY (pass --input to predict)".to_string()
        } else {
            "stdin is a pipe (predict ready)".to_string()
        },
    });

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: FORECAST_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Forecast Doctor Report");
        println!("======================");
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

    let has_errors = report.checks.iter().any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(ForecastCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

// Error types

#[derive(Debug)]
enum ForecastCliError {
    Io(io::Error),
    Forecast(ForecastError),
    Json(serde_json::Error),
    InvalidArgument(String),
    DoctorFailed,
}

impl From<io::Error> for ForecastCliError {
    fn from(e: io::Error) -> Self {
        ForecastCliError::Io(e)
    }
}

impl From<ForecastError> for ForecastCliError {
    fn from(e: ForecastError) -> Self {
        ForecastCliError::Forecast(e)
    }
}

impl From<serde_json::Error> for ForecastCliError {
    fn from(e: serde_json::Error) -> Self {
        ForecastCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<ForecastCliError> for CliError {
    fn from(e: ForecastCliError) -> Self {
        match e {
            ForecastCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            ForecastCliError::Forecast(e) => {
                let (code, hint) = match &e {
                    ForecastError::DatasetNotFound { .. } => {
                        ("DATASET_NOT_FOUND", Some("Run 'forecast generate' first"))
                    }
                    ForecastError::MissingColumn(_) | ForecastError::InvalidValue { .. } => {
                        ("DATASET_ERROR", Some("Regenerate the dataset with 'forecast generate'"))
                    }
                    ForecastError::EmptyDataset | ForecastError::SingleClass => {
                        ("DATASET_ERROR", Some("Generate more samples"))
                    }
                    ForecastError::InvalidConfig(_) => {
                        ("CONFIG_ERROR", Some("Check training options"))
                    }
                    ForecastError::ModelFit(_) => {
                        ("TRAINING_ERROR", Some("Check forest options and dataset"))
                    }
                    ForecastError::Artifact(_) => (
                        "ARTIFACT_ERROR",
                        Some("Run 'forecast train' to rebuild the model"),
                    ),
                    ForecastError::SchemaMismatch { .. } => {
                        ("SCHEMA_MISMATCH", Some("Retrain the model with 'forecast train'"))
                    }
                    ForecastError::ParseError(_) | ForecastError::JsonError(_) => {
                        ("PARSE_ERROR", Some("Requests must be a JSON object"))
                    }
                    ForecastError::Io(_) => ("IO_ERROR", Some("Check file paths and permissions")),
                    ForecastError::CsvError(_) => ("CSV_ERROR", Some("Check the dataset file")),
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: hint.map(str::to_string),
                }
            }
            ForecastCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            ForecastCliError::InvalidArgument(msg) => CliError {
                code: "INVALID_ARGUMENT".to_string(),
                message: msg,
                hint: Some("See 'forecast --help'".to_string()),
            },
            ForecastCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

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
