use std::{fmt, ops::Range};

use serde::{Deserialize, Serialize};

use crate::{
    data::domain::Split,
    error::{ConfigError, StockcastResult},
};

/// Tolerance for the fraction sum and for flooring `n * fraction`.
const FRACTION_EPS: f64 = 1e-9;

// ================================================================================================
// Configuration
// ================================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitFractions {
    pub train: f64,
    pub validation: f64,
    pub test: f64,
}

impl Default for SplitFractions {
    fn default() -> Self {
        Self {
            train: 0.7,
            validation: 0.15,
            test: 0.15,
        }
    }
}

impl SplitFractions {
    pub fn new(train: f64, validation: f64, test: f64) -> Self {
        Self {
            train,
            validation,
            test,
        }
    }

    pub fn validate(&self) -> StockcastResult<()> {
        for (name, value) in [
            ("train", self.train),
            ("validation", self.validation),
            ("test", self.test),
        ] {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidSplitFraction {
                    name,
                    value,
                    msg: "must lie in [0, 1]",
                }
                .into());
            }
        }
        if self.train <= 0.0 {
            return Err(ConfigError::InvalidSplitFraction {
                name: "train",
                value: self.train,
                msg: "must be positive",
            }
            .into());
        }
        if self.test <= 0.0 {
            return Err(ConfigError::InvalidSplitFraction {
                name: "test",
                value: self.test,
                msg: "must be positive",
            }
            .into());
        }

        let sum = self.train + self.validation + self.test;
        if (sum - 1.0).abs() > FRACTION_EPS {
            return Err(ConfigError::SplitFractionsSum {
                train: self.train,
                validation: self.validation,
                test: self.test,
                sum,
            }
            .into());
        }
        Ok(())
    }
}

/// How the development region (train + validation) is used for model selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SplitMode {
    /// One contiguous validation block after the training prefix.
    #[default]
    Holdout,

    /// Expanding-window folds over the development region.
    WalkForward { folds: usize, min_train_rows: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    pub fractions: SplitFractions,
    pub mode: SplitMode,
    /// Minimum rows for the train and test blocks, and for a non-empty validation block.
    pub min_split_rows: usize,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            fractions: SplitFractions::default(),
            mode: SplitMode::Holdout,
            min_split_rows: 10,
        }
    }
}

impl SplitConfig {
    pub fn with_fractions(self, fractions: SplitFractions) -> Self {
        Self { fractions, ..self }
    }

    pub fn with_mode(self, mode: SplitMode) -> Self {
        Self { mode, ..self }
    }

    pub fn with_min_split_rows(self, min_split_rows: usize) -> Self {
        Self {
            min_split_rows,
            ..self
        }
    }

    pub fn validate(&self) -> StockcastResult<()> {
        self.fractions.validate()?;
        if self.min_split_rows == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "min_split_rows",
                msg: "must be positive".to_string(),
            }
            .into());
        }
        if let SplitMode::WalkForward {
            folds,
            min_train_rows,
        } = self.mode
        {
            if folds == 0 {
                return Err(ConfigError::InvalidParameter {
                    name: "folds",
                    msg: "walk-forward needs at least one fold".to_string(),
                }
                .into());
            }
            if min_train_rows < self.min_split_rows {
                return Err(ConfigError::InvalidParameter {
                    name: "min_train_rows",
                    msg: format!(
                        "{min_train_rows} is below min_split_rows ({})",
                        self.min_split_rows
                    ),
                }
                .into());
            }
        }
        Ok(())
    }
}

// ================================================================================================
// Plans
// ================================================================================================

/// Contiguous, chronologically ordered row ranges of one labeled series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoldoutPlan {
    pub train: Range<usize>,
    pub validation: Range<usize>,
    pub test: Range<usize>,
}

impl HoldoutPlan {
    pub fn range(&self, split: Split) -> Range<usize> {
        match split {
            Split::Train => self.train.clone(),
            Split::Validation => self.validation.clone(),
            Split::Test => self.test.clone(),
        }
    }

    /// Train and validation together; everything before the test block.
    pub fn development(&self) -> Range<usize> {
        self.train.start..self.validation.end
    }

    pub fn assignment(&self, row: usize) -> Option<Split> {
        if self.train.contains(&row) {
            Some(Split::Train)
        } else if self.validation.contains(&row) {
            Some(Split::Validation)
        } else if self.test.contains(&row) {
            Some(Split::Test)
        } else {
            None
        }
    }
}

/// One walk-forward step: train on a prefix, validate on the block right after it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fold {
    /// 1-based fold number.
    pub number: usize,
    pub train: Range<usize>,
    pub validation: Range<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationPlan {
    pub holdout: HoldoutPlan,
    /// Empty in holdout mode.
    pub folds: Vec<Fold>,
}

impl EvaluationPlan {
    pub fn is_walk_forward(&self) -> bool {
        !self.folds.is_empty()
    }

    /// Rows used for the final fit.
    pub fn final_training(&self) -> Range<usize> {
        if self.is_walk_forward() {
            self.holdout.development()
        } else {
            self.holdout.train.clone()
        }
    }

    pub fn has_validation(&self) -> bool {
        self.is_walk_forward() || !self.holdout.validation.is_empty()
    }
}

/// Why a series is too short to be split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitShortfall {
    pub split: Split,
    pub required: usize,
    pub available: usize,
}

impl fmt::Display for SplitShortfall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} block needs {} rows, got {}",
            self.split, self.required, self.available
        )
    }
}

/// Plans the splits of a labeled series with `n` rows.
pub fn plan(n: usize, cfg: &SplitConfig) -> Result<EvaluationPlan, SplitShortfall> {
    let holdout = plan_holdout(n, &cfg.fractions);
    let min = cfg.min_split_rows;

    let check = |split: Split, available: usize, required: usize| {
        if available < required {
            Err(SplitShortfall {
                split,
                required,
                available,
            })
        } else {
            Ok(())
        }
    };

    check(Split::Test, holdout.test.len(), min)?;

    match cfg.mode {
        SplitMode::Holdout => {
            check(Split::Train, holdout.train.len(), min)?;
            if !holdout.validation.is_empty() {
                check(Split::Validation, holdout.validation.len(), min)?;
            }
            Ok(EvaluationPlan {
                holdout,
                folds: Vec::new(),
            })
        }
        SplitMode::WalkForward {
            folds,
            min_train_rows,
        } => {
            let development = holdout.development();
            check(
                Split::Validation,
                development.len(),
                min_train_rows + folds,
            )?;
            let folds = walk_forward_folds(development.len(), folds, min_train_rows);
            Ok(EvaluationPlan { holdout, folds })
        }
    }
}

/// Prefix / block / remainder partition. No shuffling.
pub fn plan_holdout(n: usize, fractions: &SplitFractions) -> HoldoutPlan {
    let count = |fraction: f64| ((n as f64) * fraction + FRACTION_EPS).floor() as usize;
    let n_train = count(fractions.train).min(n);
    let n_val = count(fractions.validation).min(n - n_train);

    HoldoutPlan {
        train: 0..n_train,
        validation: n_train..n_train + n_val,
        test: n_train + n_val..n,
    }
}

/// Expanding-window folds over the first `n_dev` rows.
///
/// With `b = (n_dev - min_train_rows) / folds`, fold `f` (0-based) trains on
/// `[0, min_train_rows + f * b)` and validates on the next `b` rows. Returns no
/// folds when `b` would be zero.
pub fn walk_forward_folds(n_dev: usize, folds: usize, min_train_rows: usize) -> Vec<Fold> {
    if folds == 0 || n_dev < min_train_rows {
        return Vec::new();
    }
    let block = (n_dev - min_train_rows) / folds;
    if block == 0 {
        return Vec::new();
    }

    (0..folds)
        .map(|f| {
            let train_end = min_train_rows + f * block;
            Fold {
                number: f + 1,
                train: 0..train_end,
                validation: train_end..train_end + block,
            }
        })
        .collect()
}
