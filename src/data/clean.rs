use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    data::{
        domain::{IndexId, PriceRecord},
        ingest::RawPriceRow,
    },
    error::{ConfigError, DataError, StockcastResult},
};

/// Tokens treated as a missing cell (case-insensitive), besides the empty string.
const MISSING_TOKENS: [&str; 4] = ["null", "nan", "na", "n/a"];

// ================================================================================================
// Configuration
// ================================================================================================

/// Row-level cleaning policy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct CleaningConfig {
    /// Indices with fewer valid rows are excluded (`insufficient data`).
    pub min_rows: usize,

    /// Drop rows whose volume is exactly zero.
    pub drop_zero_volume: bool,

    /// Inclusive lower date bound. `None` means unbounded.
    pub start_date: Option<NaiveDate>,

    /// Inclusive upper date bound. `None` means unbounded.
    pub end_date: Option<NaiveDate>,
}

impl Default for CleaningConfig {
    fn default() -> Self {
        Self {
            min_rows: 30,
            drop_zero_volume: false,
            start_date: None,
            end_date: None,
        }
    }
}

impl CleaningConfig {
    pub fn validate(&self) -> StockcastResult<()> {
        if self.min_rows == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "min_rows",
                msg: "must be positive".to_string(),
            }
            .into());
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date)
            && start > end
        {
            return Err(ConfigError::InvalidDateRange {
                start: start.to_string(),
                end: end.to_string(),
            }
            .into());
        }
        Ok(())
    }

    fn in_range(&self, date: NaiveDate) -> bool {
        self.start_date.is_none_or(|s| date >= s) && self.end_date.is_none_or(|e| date <= e)
    }
}

// ================================================================================================
// Audit
// ================================================================================================

/// Per-index record of what cleaning dropped and filled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleaningAudit {
    pub rows_read: usize,
    pub dropped_unparseable_date: usize,
    pub dropped_unparseable_price: usize,
    pub dropped_invalid_price: usize,
    pub dropped_duplicate_date: usize,
    pub dropped_zero_volume: usize,
    pub dropped_no_prior_value: usize,
    pub filtered_out_of_range: usize,
    pub filled_open: usize,
    pub filled_close: usize,
    pub rows_kept: usize,
    /// Largest calendar gap between consecutive kept rows, in days.
    pub largest_gap_days: i64,
}

impl CleaningAudit {
    pub fn dropped(&self) -> usize {
        self.dropped_unparseable_date
            + self.dropped_unparseable_price
            + self.dropped_invalid_price
            + self.dropped_duplicate_date
            + self.dropped_zero_volume
            + self.dropped_no_prior_value
    }

    pub fn filled(&self) -> usize {
        self.filled_open + self.filled_close
    }
}

// ================================================================================================
// Cleaned Series
// ================================================================================================

/// Date-ordered, de-duplicated price history of one index with no missing open/close.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanedSeries {
    index: IndexId,
    records: Vec<PriceRecord>,
}

impl CleanedSeries {
    /// Builds a series, rejecting records that break the ordering or price invariants.
    pub fn new(index: IndexId, records: Vec<PriceRecord>) -> StockcastResult<Self> {
        let violation = |msg: String| DataError::SeriesInvariant {
            index: index.to_string(),
            msg,
        };

        for (i, r) in records.iter().enumerate() {
            if r.index != index {
                return Err(violation(format!("record {i} belongs to '{}'", r.index)).into());
            }
            if !is_valid_price(r.open) || !is_valid_price(r.close) {
                return Err(violation(format!("record {i} has an invalid open/close")).into());
            }
        }
        if let Some(i) = records
            .windows(2)
            .position(|pair| pair[0].date >= pair[1].date)
        {
            return Err(violation(format!(
                "dates not strictly ascending at {} -> {}",
                records[i].date,
                records[i + 1].date
            ))
            .into());
        }

        Ok(Self { index, records })
    }

    pub fn index(&self) -> &IndexId {
        &self.index
    }

    pub fn records(&self) -> &[PriceRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn close(&self, position: usize) -> Option<f64> {
        self.records.get(position).map(|r| r.close)
    }
}

// ================================================================================================
// Cleaning
// ================================================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
enum Cell {
    Missing,
    Value(f64),
    Garbage,
}

struct ParsedRow {
    date: NaiveDate,
    open: Cell,
    close: Cell,
    high: Option<f64>,
    low: Option<f64>,
    volume: Option<f64>,
}

/// Cleans the raw rows of one index.
///
/// Rows are parsed, range-filtered, stably sorted by date and de-duplicated
/// (first occurrence in file order wins). Missing open/close cells are then
/// forward-filled from the previous kept row; rows with nothing to fill from are dropped.
pub fn clean_series(
    index: &IndexId,
    rows: &[RawPriceRow],
    cfg: &CleaningConfig,
) -> StockcastResult<(CleanedSeries, CleaningAudit)> {
    let mut audit = CleaningAudit {
        rows_read: rows.len(),
        ..Default::default()
    };

    let mut parsed = Vec::with_capacity(rows.len());
    for row in rows {
        let Some(date) = row.date.as_deref().and_then(parse_date) else {
            audit.dropped_unparseable_date += 1;
            continue;
        };

        let open = parse_cell(row.open.as_deref());
        let close = parse_cell(row.close.as_deref());
        if open == Cell::Garbage || close == Cell::Garbage {
            audit.dropped_unparseable_price += 1;
            continue;
        }
        let invalid = |c: Cell| matches!(c, Cell::Value(v) if !is_valid_price(v));
        if invalid(open) || invalid(close) {
            audit.dropped_invalid_price += 1;
            continue;
        }

        if !cfg.in_range(date) {
            audit.filtered_out_of_range += 1;
            continue;
        }

        parsed.push(ParsedRow {
            date,
            open,
            close,
            high: parse_cell(row.high.as_deref()).value(),
            low: parse_cell(row.low.as_deref()).value(),
            volume: parse_cell(row.volume.as_deref()).value(),
        });
    }

    // Stable: equal dates keep file order.
    parsed.sort_by_key(|r| r.date);
    let before = parsed.len();
    parsed.dedup_by_key(|r| r.date);
    audit.dropped_duplicate_date = before - parsed.len();

    if cfg.drop_zero_volume {
        let before = parsed.len();
        parsed.retain(|r| r.volume != Some(0.0));
        audit.dropped_zero_volume = before - parsed.len();
    }

    let mut records: Vec<PriceRecord> = Vec::with_capacity(parsed.len());
    for row in parsed {
        let prior = records.last();
        let open = match (row.open, prior) {
            (Cell::Value(v), _) => v,
            (_, Some(p)) => {
                audit.filled_open += 1;
                p.open
            }
            (_, None) => {
                audit.dropped_no_prior_value += 1;
                continue;
            }
        };
        let close = match (row.close, prior) {
            (Cell::Value(v), _) => v,
            (_, Some(p)) => {
                audit.filled_close += 1;
                p.close
            }
            (_, None) => {
                audit.dropped_no_prior_value += 1;
                continue;
            }
        };

        records.push(PriceRecord {
            index: index.clone(),
            date: row.date,
            open,
            high: row.high,
            low: row.low,
            close,
            volume: row.volume,
        });
    }

    audit.rows_kept = records.len();
    audit.largest_gap_days = records
        .windows(2)
        .map(|pair| (pair[1].date - pair[0].date).num_days())
        .max()
        .unwrap_or(0);

    debug!(
        index = %index,
        rows_read = audit.rows_read,
        rows_kept = audit.rows_kept,
        dropped = audit.dropped(),
        filled = audit.filled(),
        "Cleaned series"
    );

    let series = CleanedSeries::new(index.clone(), records)?;
    Ok((series, audit))
}

impl Cell {
    fn value(self) -> Option<f64> {
        match self {
            Cell::Value(v) if v.is_finite() => Some(v),
            _ => None,
        }
    }
}

fn is_valid_price(v: f64) -> bool {
    v.is_finite() && v > 0.0
}

fn parse_cell(raw: Option<&str>) -> Cell {
    let Some(text) = raw.map(str::trim) else {
        return Cell::Missing;
    };
    if text.is_empty() || MISSING_TOKENS.iter().any(|t| text.eq_ignore_ascii_case(t)) {
        return Cell::Missing;
    }
    match text.parse::<f64>() {
        Ok(v) => Cell::Value(v),
        Err(_) => Cell::Garbage,
    }
}

/// Parses `YYYY-MM-DD`, tolerating a trailing time part (`T...` or ` ...`).
pub(crate) fn parse_date(raw: &str) -> Option<NaiveDate> {
    let text = raw.trim();
    let day_part = match text.char_indices().nth(10) {
        Some((i, 'T')) | Some((i, ' ')) => &text[..i],
        Some(_) => return None,
        None => text,
    };
    NaiveDate::parse_from_str(day_part, "%Y-%m-%d").ok()
}
