use std::ops::Range;

use ndarray::Array1;
use tracing::{debug, info, warn};

use crate::{
    config::PipelineConfig,
    data::{
        clean::{CleaningAudit, clean_series},
        domain::{IndexId, Split},
        ingest::RawPriceRow,
    },
    error::{StockcastResult, SystemError},
    features::engineer,
    harness::{
        ExclusionReason, IndexExclusion, ModelFailure, ModelResult, ModelSelection,
        ReliabilityTable,
    },
    labels::label,
    metrics::{ClassificationMetrics, RELIABILITY_BINS, ReliabilityBin, reliability_table},
    model::{self, Classifier, ModelKind, ModelParams, design::DesignMatrix},
    split::{self, EvaluationPlan},
};

/// Everything one index contributes to the run.
#[derive(Debug)]
pub(crate) struct IndexOutcome {
    pub index: IndexId,
    pub audit: CleaningAudit,
    pub exclusion: Option<IndexExclusion>,
    pub results: Vec<ModelResult>,
    pub failures: Vec<ModelFailure>,
    pub selections: Vec<ModelSelection>,
    pub reliability: Vec<ReliabilityTable>,
}

impl IndexOutcome {
    fn new(index: IndexId, audit: CleaningAudit) -> Self {
        Self {
            index,
            audit,
            exclusion: None,
            results: Vec::new(),
            failures: Vec::new(),
            selections: Vec::new(),
            reliability: Vec::new(),
        }
    }

    fn exclude(mut self, reason: ExclusionReason, detail: String) -> Self {
        warn!(reason = %reason, %detail, "Index Excluded");
        self.exclusion = Some(IndexExclusion {
            index: self.index.clone(),
            reason,
            detail,
        });
        self
    }
}

/// Cleans, featurizes, splits and evaluates every configured model on one index.
///
/// Short histories become exclusions and model errors become failures; only
/// internal errors are returned.
#[tracing::instrument(skip(rows, config), fields(index = %index))]
pub(crate) fn evaluate_index(
    index: &IndexId,
    rows: &[RawPriceRow],
    config: &PipelineConfig,
) -> StockcastResult<IndexOutcome> {
    let (series, audit) = clean_series(index, rows, config.cleaning())?;
    debug!(
        rows_read = audit.rows_read,
        rows_kept = audit.rows_kept,
        dropped = audit.dropped(),
        filled = audit.filled(),
        "Series Cleaned"
    );

    let mut outcome = IndexOutcome::new(index.clone(), audit);
    let min_rows = config.cleaning().min_rows;
    if series.len() < min_rows {
        let detail = format!("{} clean rows, at least {min_rows} required", series.len());
        return Ok(outcome.exclude(ExclusionReason::InsufficientData, detail));
    }

    let features = engineer(&series, config.features());
    let examples = label(&series, features);
    let design = DesignMatrix::from_examples(&examples, config.features());

    let plan = match split::plan(design.n_rows(), config.split()) {
        Ok(plan) => plan,
        Err(shortfall) => {
            return Ok(outcome.exclude(
                ExclusionReason::InsufficientDataForSplit,
                shortfall.to_string(),
            ));
        }
    };

    for &kind in config.models() {
        let seed = config.derived_seed(index, kind);
        match evaluate_model(kind, &design, &plan, config.tune(), seed) {
            Ok(evaluation) => outcome.record(kind, evaluation),
            Err(e) => {
                let failure = ModelFailure::new(index.clone(), kind, &e);
                warn!(model = %kind, reason = %failure.reason, error = %e, "Model Failed");
                outcome.failures.push(failure);
            }
        }
    }

    info!(
        examples = design.n_rows(),
        features = design.feature_names.len(),
        walk_forward = plan.is_walk_forward(),
        failures = outcome.failures.len(),
        "Index Evaluated"
    );
    Ok(outcome)
}

// ================================================================================================
// Per-Model Evaluation
// ================================================================================================

struct ModelEvaluation {
    params: ModelParams,
    validation_accuracy: Option<f64>,
    candidates_evaluated: usize,
    metrics: Vec<(Split, Option<usize>, ClassificationMetrics)>,
    reliability: Option<Vec<ReliabilityBin>>,
}

impl IndexOutcome {
    fn record(&mut self, kind: ModelKind, evaluation: ModelEvaluation) {
        debug!(
            model = %kind,
            params = ?evaluation.params,
            validation_accuracy = ?evaluation.validation_accuracy,
            candidates = evaluation.candidates_evaluated,
            "Model Selected"
        );

        self.selections.push(ModelSelection {
            index: self.index.clone(),
            model: kind,
            params: evaluation.params,
            validation_accuracy: evaluation.validation_accuracy,
            candidates_evaluated: evaluation.candidates_evaluated,
        });
        self.results
            .extend(evaluation.metrics.into_iter().map(|(split, fold, metrics)| {
                ModelResult {
                    index: self.index.clone(),
                    model: kind,
                    split,
                    fold,
                    metrics,
                }
            }));
        if let Some(bins) = evaluation.reliability {
            self.reliability.push(ReliabilityTable {
                index: self.index.clone(),
                model: kind,
                bins,
            });
        }
    }
}

/// One hyperparameter candidate scored on validation data.
struct Candidate {
    params: ModelParams,
    validation_accuracy: Option<f64>,
    validation: Vec<(Option<usize>, ClassificationMetrics)>,
    /// Holdout mode fits the candidate on the final training rows already.
    fitted: Option<Box<dyn Classifier>>,
}

fn evaluate_model(
    kind: ModelKind,
    design: &DesignMatrix,
    plan: &EvaluationPlan,
    tune: bool,
    seed: u64,
) -> StockcastResult<ModelEvaluation> {
    let grid = if tune && plan.has_validation() {
        kind.candidate_grid()
    } else {
        vec![kind.default_params()]
    };
    let candidates_evaluated = grid.len();

    let mut best: Option<Candidate> = None;
    for params in grid {
        let candidate = score_candidate(params, design, plan, seed)?;
        let better = match (&best, candidate.validation_accuracy) {
            (None, _) => true,
            (Some(b), Some(accuracy)) => b.validation_accuracy.is_some_and(|a| accuracy > a),
            (Some(_), None) => false,
        };
        if better {
            best = Some(candidate);
        }
    }
    let best = best.ok_or_else(|| {
        SystemError::InvariantViolation(format!("empty candidate grid for {kind}"))
    })?;

    let training = plan.final_training();
    let model = match best.fitted {
        Some(model) => model,
        None => fit(best.params, design, training.clone(), seed)?,
    };

    let mut metrics = Vec::with_capacity(best.validation.len() + 2);
    let (train_metrics, _) = score(model.as_ref(), design, training)?;
    metrics.push((Split::Train, None, train_metrics));
    metrics.extend(
        best.validation
            .into_iter()
            .map(|(fold, m)| (Split::Validation, fold, m)),
    );

    let test = plan.holdout.test.clone();
    let (_, y_test) = design.rows(test.clone());
    let (test_metrics, test_proba) = score(model.as_ref(), design, test)?;
    metrics.push((Split::Test, None, test_metrics));
    let reliability = test_proba.map(|p| reliability_table(&y_test, &p, RELIABILITY_BINS));

    Ok(ModelEvaluation {
        params: best.params,
        validation_accuracy: best.validation_accuracy,
        candidates_evaluated,
        metrics,
        reliability,
    })
}

fn score_candidate(
    params: ModelParams,
    design: &DesignMatrix,
    plan: &EvaluationPlan,
    seed: u64,
) -> StockcastResult<Candidate> {
    if plan.is_walk_forward() {
        let mut validation = Vec::with_capacity(plan.folds.len());
        for fold in &plan.folds {
            let model = fit(params, design, fold.train.clone(), seed)?;
            let (metrics, _) = score(model.as_ref(), design, fold.validation.clone())?;
            validation.push((Some(fold.number), metrics));
        }
        let accuracy =
            validation.iter().map(|(_, m)| m.accuracy).sum::<f64>() / validation.len() as f64;

        return Ok(Candidate {
            params,
            validation_accuracy: Some(accuracy),
            validation,
            fitted: None,
        });
    }

    let model = fit(params, design, plan.holdout.train.clone(), seed)?;
    let validation = if plan.holdout.validation.is_empty() {
        Vec::new()
    } else {
        let (metrics, _) = score(model.as_ref(), design, plan.holdout.validation.clone())?;
        vec![(None, metrics)]
    };

    Ok(Candidate {
        params,
        validation_accuracy: validation.first().map(|(_, m)| m.accuracy),
        validation,
        fitted: Some(model),
    })
}

fn fit(
    params: ModelParams,
    design: &DesignMatrix,
    rows: Range<usize>,
    seed: u64,
) -> StockcastResult<Box<dyn Classifier>> {
    let (x, y) = design.rows(rows);
    let mut model = model::build(params, seed);
    model.fit(&x, &y)?;
    Ok(model)
}

fn score(
    model: &dyn Classifier,
    design: &DesignMatrix,
    rows: Range<usize>,
) -> StockcastResult<(ClassificationMetrics, Option<Array1<f64>>)> {
    let (x, y) = design.rows(rows);
    let predicted = model.predict(&x)?;
    let proba = model.predict_probability(&x)?;
    let metrics = ClassificationMetrics::calculate(&y, &predicted, proba.as_ref());
    Ok((metrics, proba))
}
