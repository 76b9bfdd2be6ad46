use std::{fs, path::PathBuf, time::Instant};

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::Parser;
use stockcast::{
    data::{clean::CleaningConfig, domain::Split, ingest::load_inputs},
    features::FeatureConfig,
    harness::Pipeline,
    model::ModelKind,
    report::RunReport,
    split::{SplitConfig, SplitFractions, SplitMode},
    PipelineConfig,
};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Walk-forward minimum training rows when `--folds` is given without `--min-train-rows`.
const DEFAULT_MIN_TRAIN_ROWS: usize = 100;

/// Next-day direction classification for stock indices.
///
/// Reads daily OHLCV CSV files, engineers leakage-free features, evaluates the
/// configured classifiers on chronological splits and writes comparison reports.
#[derive(Parser, Debug)]
#[command(name = "stockcast", version)]
struct Args {
    /// CSV files or directories containing CSV files.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// JSON configuration file. Command line flags override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for the report files.
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Rolling window for mean and volatility features.
    #[arg(long)]
    window: Option<usize>,

    /// Number of lagged returns.
    #[arg(long)]
    lags: Option<usize>,

    /// Add EMA, RSI, MACD and month features.
    #[arg(long)]
    technical: bool,

    #[arg(long)]
    train: Option<f64>,

    #[arg(long)]
    validation: Option<f64>,

    #[arg(long)]
    test: Option<f64>,

    /// Switch to walk-forward validation with this many folds.
    #[arg(long)]
    folds: Option<usize>,

    #[arg(long, requires = "folds")]
    min_train_rows: Option<usize>,

    /// Minimum clean rows per index.
    #[arg(long)]
    min_rows: Option<usize>,

    /// Minimum rows per train, validation and test block.
    #[arg(long)]
    min_split_rows: Option<usize>,

    #[arg(long)]
    seed: Option<u64>,

    /// Comma separated: logistic_regression, decision_tree, knn, xgboost.
    #[arg(long, value_delimiter = ',')]
    models: Option<Vec<ModelKind>>,

    /// Comma separated index identifiers. Defaults to every index in the input.
    #[arg(long, value_delimiter = ',')]
    indices: Option<Vec<String>>,

    /// Keep default hyperparameters instead of selecting them on validation data.
    #[arg(long)]
    no_tune: bool,

    #[arg(long)]
    threads: Option<usize>,

    /// Only keep rows on or after this date (YYYY-MM-DD).
    #[arg(long)]
    start_date: Option<NaiveDate>,

    /// Only keep rows on or before this date (YYYY-MM-DD).
    #[arg(long)]
    end_date: Option<NaiveDate>,

    /// Drop rows whose volume is exactly zero.
    #[arg(long)]
    drop_zero_volume: bool,

    /// Emit JSON logs.
    #[arg(long)]
    json_logs: bool,

    /// Write JSON logs to a file in this directory instead of stderr.
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Show a progress bar over indices.
    #[arg(long)]
    progress: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let _guard = init_tracing(args.json_logs, args.log_dir.as_ref())?;

    let config = pipeline_config(&args)?;
    let pipeline = Pipeline::new(config)
        .context("Invalid configuration")?
        .with_progress(args.progress);

    let load_start = Instant::now();
    let dataset = load_inputs(&args.inputs).context("Failed to load input data")?;
    info!(
        indices = dataset.series().len(),
        rows = dataset.total_rows(),
        elapsed = ?load_start.elapsed(),
        "Input Loaded"
    );

    let run_start = Instant::now();
    let report = pipeline.run(&dataset).context("Pipeline run failed")?;
    let run_time = run_start.elapsed();

    let dir = pipeline.config().output_dir();
    let written = report
        .write(dir)
        .with_context(|| format!("Failed to write reports to {}", dir.display()))?;

    print_summary(&report);
    println!("\nReports written to {} ({} files) in {run_time:?}", dir.display(), written.len());

    // The WorkerGuard ensures all buffered logs are flushed when dropped.
    drop(_guard);

    Ok(())
}

// ================================================================================================
// Configuration
// ================================================================================================

fn pipeline_config(args: &Args) -> Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    let cleaning = config.cleaning().clone();
    config = config.with_cleaning(CleaningConfig {
        min_rows: args.min_rows.unwrap_or(cleaning.min_rows),
        drop_zero_volume: args.drop_zero_volume || cleaning.drop_zero_volume,
        start_date: args.start_date.or(cleaning.start_date),
        end_date: args.end_date.or(cleaning.end_date),
    });

    let features = config.features().clone();
    config = config.with_features(FeatureConfig {
        window: args.window.unwrap_or(features.window),
        lags: args.lags.unwrap_or(features.lags),
        technical: args.technical || features.technical,
        ..features
    });

    let split = *config.split();
    let fractions = SplitFractions::new(
        args.train.unwrap_or(split.fractions.train),
        args.validation.unwrap_or(split.fractions.validation),
        args.test.unwrap_or(split.fractions.test),
    );
    let mode = match (args.folds, split.mode) {
        (Some(folds), SplitMode::WalkForward { min_train_rows, .. }) => SplitMode::WalkForward {
            folds,
            min_train_rows: args.min_train_rows.unwrap_or(min_train_rows),
        },
        (Some(folds), SplitMode::Holdout) => SplitMode::WalkForward {
            folds,
            min_train_rows: args.min_train_rows.unwrap_or(DEFAULT_MIN_TRAIN_ROWS),
        },
        (None, mode) => mode,
    };
    config = config.with_split(
        SplitConfig::default()
            .with_fractions(fractions)
            .with_mode(mode)
            .with_min_split_rows(args.min_split_rows.unwrap_or(split.min_split_rows)),
    );

    if let Some(models) = &args.models {
        config = config.with_models(models.clone());
    }
    if let Some(indices) = &args.indices {
        config = config.with_indices(indices.iter().map(String::as_str));
    }
    if let Some(seed) = args.seed {
        config = config.with_seed(seed);
    }
    if args.no_tune {
        config = config.with_tune(false);
    }
    if args.threads.is_some() {
        config = config.with_threads(args.threads);
    }
    if let Some(output) = &args.output {
        config = config.with_output_dir(output);
    }

    Ok(config)
}

// ================================================================================================
// Tracing Configuration
// ================================================================================================

fn init_tracing(json: bool, log_dir: Option<&PathBuf>) -> Result<Option<WorkerGuard>> {
    let app_name = "stockcast";
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if let Some(log_dir) = log_dir {
        fs::create_dir_all(log_dir)
            .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;

        let timestamp = Utc::now().format("%Y%m%d-%H%M%S");
        let file_name = format!("{app_name}-{timestamp}.log");
        let file_appender = tracing_appender::rolling::never(log_dir, &file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(non_blocking)
            .with_span_events(tracing_subscriber::fmt::format::FmtSpan::NONE)
            .with_current_span(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
            .init();

        info!(log_file = %log_dir.join(&file_name).display(), "Logging to file");
        return Ok(Some(guard));
    }

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .with_current_span(true)
            .with_thread_ids(true)
            .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
    }
    Ok(None)
}

// ================================================================================================
// Console Output
// ================================================================================================

fn print_summary(report: &RunReport) {
    println!("\n--- Test Split Comparison ---");
    println!(
        "{:<20} {:>7} {:>9} {:>9} {:>9} {:>9} {:>9}",
        "model", "indices", "accuracy", "precision", "recall", "f1", "roc_auc"
    );
    for row in report.comparison_for(Split::Test) {
        let roc_auc = row
            .roc_auc
            .map_or_else(|| "n/a".to_string(), |v| format!("{v:.4}"));
        println!(
            "{:<20} {:>7} {:>9.4} {:>9.4} {:>9.4} {:>9.4} {:>9}",
            row.model.as_str(),
            row.n_indices,
            row.accuracy,
            row.precision,
            row.recall,
            row.f1,
            roc_auc
        );
    }

    if !report.exclusions.is_empty() {
        println!("\n--- Excluded Indices ---");
        for exclusion in &report.exclusions {
            println!(
                "{:<12} {:<14} {:<28} {}",
                exclusion.index.as_str(),
                exclusion.index.display_name(),
                exclusion.reason.as_str(),
                exclusion.detail
            );
        }
    }

    if !report.failures.is_empty() {
        println!("\n--- Model Failures ---");
        for failure in &report.failures {
            println!(
                "{:<12} {:<14} {:<20} {}",
                failure.index.as_str(),
                failure.index.display_name(),
                failure.model.as_str(),
                failure.reason.as_str()
            );
        }
    }

    if !report.rejected_files.is_empty() {
        println!("\n--- Rejected Files ---");
        for file in &report.rejected_files {
            println!("{} {}", file.path.display(), file.reason);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(["stockcast", "data.csv"].into_iter().chain(args.iter().copied()))
            .expect("valid args")
    }

    fn write_config(dir: &std::path::Path, json: &str) -> PathBuf {
        let path = dir.join("config.json");
        fs::write(&path, json).expect("write config");
        path
    }

    #[test]
    fn test_defaults_without_flags() {
        let config = pipeline_config(&parse(&[])).expect("config");
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn test_folds_without_min_train_rows_uses_default() {
        let config = pipeline_config(&parse(&["--folds", "3"])).expect("config");
        assert_eq!(
            config.split().mode,
            SplitMode::WalkForward {
                folds: 3,
                min_train_rows: DEFAULT_MIN_TRAIN_ROWS
            }
        );
    }

    #[test]
    fn test_min_train_rows_requires_folds() {
        assert!(Args::try_parse_from(["stockcast", "data.csv", "--min-train-rows", "50"]).is_err());
    }

    #[test]
    fn test_cli_flags_override_json() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = write_config(
            dir.path(),
            r#"{
                "features": { "window": 10 },
                "split": { "mode": { "kind": "walk_forward", "folds": 4, "min_train_rows": 50 } },
                "models": ["xgboost", "knn"],
                "seed": 7
            }"#,
        );
        let path = path.to_str().expect("utf-8 path");

        let config = pipeline_config(&parse(&[
            "--config", path, "--window", "8", "--folds", "6", "--seed", "11", "--models", "knn",
        ]))
        .expect("config");

        assert_eq!(config.features().window, 8);
        assert_eq!(config.features().lags, FeatureConfig::default().lags);
        assert_eq!(
            config.split().mode,
            SplitMode::WalkForward {
                folds: 6,
                min_train_rows: 50
            }
        );
        assert_eq!(config.seed(), 11);
        assert_eq!(config.models(), &[ModelKind::Knn]);
    }

    #[test]
    fn test_json_values_survive_without_flags() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = write_config(
            dir.path(),
            r#"{
                "cleaning": { "drop_zero_volume": true, "min_rows": 60 },
                "features": { "technical": true },
                "models": ["xgboost", "knn"],
                "tune": false
            }"#,
        );
        let path = path.to_str().expect("utf-8 path");

        let config = pipeline_config(&parse(&["--config", path])).expect("config");
        assert!(config.cleaning().drop_zero_volume);
        assert_eq!(config.cleaning().min_rows, 60);
        assert!(config.features().technical);
        assert!(!config.tune());
        assert_eq!(
            config.models(),
            &[ModelKind::GradientBoosting, ModelKind::Knn]
        );
        assert_eq!(config.split().mode, SplitMode::Holdout);
    }

    #[test]
    fn test_boolean_flags_switch_on_over_json() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = write_config(
            dir.path(),
            r#"{ "cleaning": { "drop_zero_volume": false }, "features": { "technical": false } }"#,
        );
        let path = path.to_str().expect("utf-8 path");

        let config = pipeline_config(&parse(&[
            "--config",
            path,
            "--technical",
            "--drop-zero-volume",
            "--no-tune",
        ]))
        .expect("config");
        assert!(config.cleaning().drop_zero_volume);
        assert!(config.features().technical);
        assert!(!config.tune());
    }

    #[test]
    fn test_unreadable_config_fails() {
        let args = parse(&["--config", "/definitely/not/here.json"]);
        assert!(pipeline_config(&args).is_err());
    }
}
