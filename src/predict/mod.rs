use crate::data::{FeatureMatrix, StatusTable};
use crate::error::{ClassifyError, Result};
use crate::model::SgdClassifier;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Held-out prediction for a single sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplePrediction {
    /// Sample ID
    pub sample_id: String,
    /// Observed label
    pub true_class: u8,
    /// Decision function value
    pub score: f64,
    /// Predicted probability of the positive class
    pub positive_prob: f64,
    /// Outer CV fold the sample was held out in
    pub fold: usize,
}

impl SamplePrediction {
    /// Binary prediction (0 or 1)
    pub fn predicted_class(&self) -> u8 {
        (self.score > 0.0) as u8
    }

    pub fn is_correct(&self) -> bool {
        self.predicted_class() == self.true_class
    }
}

/// Score every test sample with a fitted model
pub fn predict_samples(
    model: &SgdClassifier,
    x: &FeatureMatrix,
    y: &StatusTable,
    fold: usize,
) -> Result<Vec<SamplePrediction>> {
    if x.n_samples() != y.len() {
        return Err(ClassifyError::invalid_dimensions(format!(
            "{} samples but {} labels",
            x.n_samples(),
            y.len()
        )));
    }
    let scores = model.decision_function(x.values.view())?;
    let probs = model.predict_proba(x.values.view())?;

    Ok(y.records
        .iter()
        .zip(scores.iter().zip(probs.iter()))
        .map(|(record, (&score, &positive_prob))| SamplePrediction {
            sample_id: record.sample_id.clone(),
            true_class: record.status,
            score,
            positive_prob,
            fold,
        })
        .collect())
}

/// Prediction summary statistics
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PredictionSummary {
    /// Total number of predictions
    pub total_predictions: usize,
    /// Number of positive predictions
    pub positive_predictions: usize,
    /// Number of correct hard predictions
    pub correct_predictions: usize,
    /// Fraction of correct hard predictions
    pub accuracy: f64,
    /// Average positive-class probability
    pub avg_probability: f64,
    /// Predictions per fold
    pub per_fold: BTreeMap<usize, usize>,
}

impl PredictionSummary {
    pub fn from_predictions(predictions: &[SamplePrediction]) -> Self {
        let total = predictions.len();
        let positive = predictions.iter().filter(|p| p.predicted_class() == 1).count();
        let correct = predictions.iter().filter(|p| p.is_correct()).count();
        let mut per_fold = BTreeMap::new();
        for p in predictions {
            *per_fold.entry(p.fold).or_insert(0) += 1;
        }

        let mean = |sum: f64| if total > 0 { sum / total as f64 } else { 0.0 };
        Self {
            total_predictions: total,
            positive_predictions: positive,
            correct_predictions: correct,
            accuracy: mean(correct as f64),
            avg_probability: mean(predictions.iter().map(|p| p.positive_prob).sum()),
            per_fold,
        }
    }

    /// Log the summary at debug level
    pub fn log(&self, identifier: &str) {
        tracing::debug!(
            "{} predictions: {} total, {} positive, {} correct ({:.2}%), mean probability {:.4}",
            identifier,
            self.total_predictions,
            self.positive_predictions,
            self.correct_predictions,
            self.accuracy * 100.0,
            self.avg_probability
        );
        for (fold, n) in &self.per_fold {
            tracing::debug!("  fold {}: {} samples", fold, n);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::StatusRecord;
    use crate::model::ModelConfig;
    use ndarray::array;

    fn prediction(score: f64, true_class: u8, fold: usize) -> SamplePrediction {
        SamplePrediction {
            sample_id: format!("S{}", fold),
            true_class,
            score,
            positive_prob: 1.0 / (1.0 + (-score).exp()),
            fold,
        }
    }

    #[test]
    fn test_sample_prediction() {
        let pred = prediction(1.5, 1, 0);
        assert_eq!(pred.predicted_class(), 1);
        assert!(pred.is_correct());
        assert!(!prediction(-0.2, 1, 0).is_correct());
    }

    #[test]
    fn test_summary() {
        let preds = vec![prediction(1.0, 1, 0), prediction(-1.0, 1, 0), prediction(-2.0, 0, 1)];
        let summary = PredictionSummary::from_predictions(&preds);
        assert_eq!(summary.total_predictions, 3);
        assert_eq!(summary.positive_predictions, 1);
        assert_eq!(summary.correct_predictions, 2);
        assert_eq!(summary.per_fold[&0], 2);
        assert_eq!(summary.per_fold[&1], 1);
    }

    #[test]
    fn test_predict_samples() {
        let x = FeatureMatrix::new(
            vec!["A".into(), "B".into(), "C".into(), "D".into()],
            vec!["G".into()],
            array![[-1.0], [-0.8], [0.9], [1.1]],
        )
        .unwrap();
        let y = StatusTable::new(
            ["A", "B", "C", "D"]
                .iter()
                .enumerate()
                .map(|(i, s)| StatusRecord {
                    sample_id: s.to_string(),
                    status: (i >= 2) as u8,
                    disease: "BRCA".into(),
                    log10_mut: 0.0,
                })
                .collect(),
        );

        let mut model = SgdClassifier::new(ModelConfig::default().with_alpha(1e-2));
        model.fit(x.values.view(), &y.statuses()).unwrap();
        let preds = predict_samples(&model, &x, &y, 2).unwrap();

        assert_eq!(preds.len(), 4);
        assert_eq!(preds[3].sample_id, "D");
        assert!(preds.iter().all(|p| p.fold == 2));
        assert!(preds[3].positive_prob > preds[0].positive_prob);
    }
}
