#![allow(dead_code)]

use std::{
    fmt::Write as _,
    fs,
    path::{Path, PathBuf},
};

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use rand::{Rng, SeedableRng, rngs::StdRng};
use stockcast::{PipelineConfig, model::ModelKind};

pub const HEADER: &str = "Index,Date,Open,High,Low,Close,Adj Close,Volume";

/// Daily bars of one synthetic index: a seeded random walk on weekdays.
pub fn random_walk_lines(index: &str, rows: usize, seed: u64) -> Vec<String> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut date = NaiveDate::from_ymd_opt(2015, 1, 5).expect("valid start date");
    let mut close = 1_000.0_f64;

    let mut lines = Vec::with_capacity(rows);
    for _ in 0..rows {
        while matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            date += Duration::days(1);
        }
        let open = close;
        close = (close * (1.0 + rng.random_range(-0.02..0.02))).max(1.0);
        let high = open.max(close) * (1.0 + rng.random_range(0.0..0.005));
        let low = open.min(close) * (1.0 - rng.random_range(0.0..0.005));
        let volume = rng.random_range(1_000..100_000);

        let mut line = String::new();
        write!(
            line,
            "{index},{date},{open:.4},{high:.4},{low:.4},{close:.4},{close:.4},{volume}",
            date = date.format("%Y-%m-%d")
        )
        .expect("write to string");
        lines.push(line);
        date += Duration::days(1);
    }
    lines
}

/// Writes one CSV holding every `(index, rows, seed)` series.
pub fn write_combined_csv(dir: &Path, file: &str, series: &[(&str, usize, u64)]) -> PathBuf {
    let mut content = String::from(HEADER);
    content.push('\n');
    for (index, rows, seed) in series {
        for line in random_walk_lines(index, *rows, *seed) {
            content.push_str(&line);
            content.push('\n');
        }
    }
    let path = dir.join(file);
    fs::write(&path, content).expect("write synthetic csv");
    path
}

/// Writes a per-index CSV without an index column; the file stem names the series.
pub fn write_single_index_csv(dir: &Path, index: &str, rows: usize, seed: u64) -> PathBuf {
    let mut content = String::from("Date,Open,High,Low,Close,Adj Close,Volume\n");
    for line in random_walk_lines(index, rows, seed) {
        let (_, rest) = line.split_once(',').expect("index column");
        content.push_str(rest);
        content.push('\n');
    }
    let path = dir.join(format!("{index}.csv"));
    fs::write(&path, content).expect("write synthetic csv");
    path
}

/// Writes a per-index CSV whose close never moves, so every label is DOWN.
pub fn write_flat_index_csv(dir: &Path, index: &str, rows: usize) -> PathBuf {
    let mut content = String::from("Date,Open,Close\n");
    let mut date = NaiveDate::from_ymd_opt(2015, 1, 5).expect("valid start date");
    for _ in 0..rows {
        while matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            date += Duration::days(1);
        }
        writeln!(content, "{},100.0,100.0", date.format("%Y-%m-%d")).expect("write to string");
        date += Duration::days(1);
    }
    let path = dir.join(format!("{index}.csv"));
    fs::write(&path, content).expect("write synthetic csv");
    path
}

/// A configuration that keeps integration runs quick.
pub fn fast_config(output_dir: &Path) -> PipelineConfig {
    PipelineConfig::default()
        .with_models(vec![
            ModelKind::LogisticRegression,
            ModelKind::DecisionTree,
            ModelKind::Knn,
        ])
        .with_output_dir(output_dir)
        .with_seed(7)
}
