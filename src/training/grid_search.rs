//! Hyperparameter search over (alpha, l1_ratio) with inner cross-validation.

use crate::data::split::{FoldIndices, StratifiedKFold};
use crate::error::{ClassifyError, Result};
use crate::model::metrics::{average_precision_score, roc_auc_score};
use crate::model::{ModelConfig, SgdClassifier};
use ndarray::{Array1, ArrayView2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Inner CV scoring function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scoring {
    RocAuc,
    AveragePrecision,
}

impl Scoring {
    pub fn score(&self, y_true: &[u8], scores: &[f64]) -> Result<f64> {
        match self {
            Scoring::RocAuc => roc_auc_score(y_true, scores),
            Scoring::AveragePrecision => average_precision_score(y_true, scores),
        }
    }
}

/// Mean inner CV score of one grid point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridPoint {
    pub alpha: f64,
    pub l1_ratio: f64,
    /// NaN when any inner fold could not be fitted or scored
    pub mean_score: f64,
}

/// Best model refitted on all training data, plus the full grid
#[derive(Debug, Clone)]
pub struct GridSearchResult {
    pub best_model: SgdClassifier,
    pub best: GridPoint,
    pub grid: Vec<GridPoint>,
}

/// Exhaustive search over `alphas x l1_ratios`
#[derive(Debug, Clone)]
pub struct GridSearch {
    pub alphas: Vec<f64>,
    pub l1_ratios: Vec<f64>,
    pub inner_folds: usize,
    pub scoring: Scoring,
    /// Settings shared by every candidate model
    pub base: ModelConfig,
}

fn rows(x: ArrayView2<f64>, idx: &[usize]) -> ndarray::Array2<f64> {
    x.select(Axis(0), idx)
}

fn labels(y: &[u8], idx: &[usize]) -> Vec<u8> {
    idx.iter().map(|&i| y[i]).collect()
}

impl GridSearch {
    pub fn new(alphas: Vec<f64>, l1_ratios: Vec<f64>, inner_folds: usize, base: ModelConfig) -> Self {
        Self {
            alphas,
            l1_ratios,
            inner_folds,
            scoring: Scoring::RocAuc,
            base,
        }
    }

    pub fn with_scoring(mut self, scoring: Scoring) -> Self {
        self.scoring = scoring;
        self
    }

    /// Grid points in search order (alpha outer, l1_ratio inner)
    fn candidates(&self) -> Vec<(f64, f64)> {
        self.alphas
            .iter()
            .flat_map(|&a| self.l1_ratios.iter().map(move |&l| (a, l)))
            .collect()
    }

    fn score_candidate(
        &self,
        config: &ModelConfig,
        x: ArrayView2<f64>,
        y: &[u8],
        folds: &[FoldIndices],
    ) -> f64 {
        let mut total = 0.0;
        for (train, test) in folds {
            let mut model = SgdClassifier::new(config.clone());
            let scored = model
                .fit(rows(x, train).view(), &labels(y, train))
                .and_then(|m| m.decision_function(rows(x, test).view()))
                .and_then(|s| self.scoring.score(&labels(y, test), &s.to_vec()));
            match scored {
                Ok(score) => total += score,
                Err(e) => {
                    debug!("alpha={} l1_ratio={}: {}", config.alpha, config.l1_ratio, e);
                    return f64::NAN;
                }
            }
        }
        total / folds.len() as f64
    }

    /// Search the grid on `(x, y)` and refit the best point on all of it
    pub fn fit(&self, x: ArrayView2<f64>, y: &[u8]) -> Result<GridSearchResult> {
        if self.alphas.is_empty() || self.l1_ratios.is_empty() {
            return Err(ClassifyError::invalid_parameter("grid", "empty"));
        }
        let positives = y.iter().filter(|&&v| v == 1).count();
        if positives == 0 || positives == y.len() {
            return Err(ClassifyError::one_class(""));
        }

        let folds = StratifiedKFold::new(self.inner_folds, false, self.base.seed).split(y)?;

        let grid: Vec<GridPoint> = self
            .candidates()
            .into_par_iter()
            .map(|(alpha, l1_ratio)| {
                let config = self.base.clone().with_alpha(alpha).with_l1_ratio(l1_ratio);
                GridPoint {
                    alpha,
                    l1_ratio,
                    mean_score: self.score_candidate(&config, x, y, &folds),
                }
            })
            .collect();

        // first point with the highest score wins ties
        let best = grid
            .iter()
            .filter(|p| !p.mean_score.is_nan())
            .fold(None::<GridPoint>, |acc, p| match acc {
                Some(b) if b.mean_score >= p.mean_score => Some(b),
                _ => Some(*p),
            })
            .ok_or_else(|| ClassifyError::one_class(""))?;

        info!(
            "Best grid point: alpha={}, l1_ratio={}, {:?}={:.4}",
            best.alpha, best.l1_ratio, self.scoring, best.mean_score
        );

        let mut best_model =
            SgdClassifier::new(self.base.clone().with_alpha(best.alpha).with_l1_ratio(best.l1_ratio));
        best_model.fit(x, y)?;

        Ok(GridSearchResult {
            best_model,
            best,
            grid,
        })
    }
}

/// Out-of-fold decision values from non-shuffled stratified folds
pub fn cross_val_predict(
    config: &ModelConfig,
    x: ArrayView2<f64>,
    y: &[u8],
    n_folds: usize,
) -> Result<Array1<f64>> {
    let folds = StratifiedKFold::new(n_folds, false, config.seed).split(y)?;
    let mut predictions = Array1::<f64>::from_elem(y.len(), f64::NAN);
    for (train, test) in &folds {
        let mut model = SgdClassifier::new(config.clone());
        model.fit(rows(x, train).view(), &labels(y, train))?;
        let scores = model.decision_function(rows(x, test).view())?;
        for (&i, &s) in test.iter().zip(scores.iter()) {
            predictions[i] = s;
        }
    }
    Ok(predictions)
}
