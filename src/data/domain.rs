use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumCount, EnumIter, EnumString, IntoStaticStr};

// ================================================================================================
// Index Identifier
// ================================================================================================

/// Identifier of a stock index as it appears in the source data (e.g. `NYA`, `N225`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndexId(String);

impl IndexId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Human readable market name for the well-known tickers of the index dataset.
    ///
    /// Unknown identifiers are returned unchanged.
    pub fn display_name(&self) -> &str {
        match self.0.as_str() {
            "NYA" => "New York",
            "IXIC" => "NASDAQ",
            "HSI" => "Hong Kong",
            "000001.SS" => "Shanghai",
            "N225" => "Tokyo",
            "N100" => "Euronext",
            "399001.SZ" => "Shenzhen",
            "GSPTSE" => "Toronto",
            "NSEI" => "India",
            "GDAXI" => "Frankfurt",
            "KS11" => "Korea",
            "SSMI" => "Switzerland",
            "TWII" => "Taiwan",
            "J203.JO" => "Johannesburg",
            other => other,
        }
    }
}

impl fmt::Display for IndexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for IndexId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for IndexId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

// ================================================================================================
// Price Record
// ================================================================================================

/// A single cleaned daily bar. Immutable once ingested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    pub index: IndexId,
    pub date: NaiveDate,
    pub open: f64,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: f64,
    pub volume: Option<f64>,
}

// ================================================================================================
// Direction & Split
// ================================================================================================

/// Binary next-period direction.
///
/// A zero price change is `Down`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn from_change(current_close: f64, next_close: f64) -> Self {
        if next_close - current_close > 0.0 {
            Direction::Up
        } else {
            Direction::Down
        }
    }

    /// Numeric class label used by the classifiers (`Up` = 1.0).
    pub fn as_label(&self) -> f64 {
        match self {
            Direction::Up => 1.0,
            Direction::Down => 0.0,
        }
    }
}

/// Chronological partition of a labeled series. Variants are ordered by time.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    EnumIter,
    EnumCount,
    IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Split {
    Train,
    Validation,
    Test,
}

impl Split {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}
