pub mod callbacks;
pub mod grid_search;
pub mod scheduler;
pub mod trainer;

use crate::config::PipelineConfig;
use crate::model::metrics::ThresholdMetrics;
use crate::predict::SamplePrediction;
use serde::{Deserialize, Serialize};

pub use grid_search::Scoring;

/// Cross-validation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CvConfig {
    /// Training data type, recorded in every result row
    pub training_data: String,
    /// Number of outer CV folds
    pub num_folds: usize,
    /// Number of inner CV folds for hyperparameter search
    pub inner_folds: usize,
    /// SGD regularization strengths to search
    pub alphas: Vec<f64>,
    /// Elastic net mixing values to search
    pub l1_ratios: Vec<f64>,
    /// Maximum SGD epochs
    pub max_iter: usize,
    /// SGD stopping tolerance
    pub tol: f64,
    /// Inner CV scoring function
    pub scoring: Scoring,
    /// Random seed
    pub seed: u64,
    /// Number of gene features kept by MAD (0 = all)
    pub subset_mad_genes: usize,
    /// Z-score gene features
    pub standardize_columns: bool,
    /// Resample training cancer types to equal size
    pub subsample_to_smallest: bool,
    /// Keep per-sample test predictions
    pub save_predictions: bool,
}

impl Default for CvConfig {
    fn default() -> Self {
        Self::from_pipeline(&PipelineConfig::default(), "expression")
    }
}

impl CvConfig {
    /// Defaults taken from the pipeline configuration
    pub fn from_pipeline(config: &PipelineConfig, training_data: &str) -> Self {
        Self {
            training_data: training_data.to_string(),
            num_folds: 4,
            inner_folds: config.inner_folds,
            alphas: config.alphas.clone(),
            l1_ratios: config.l1_ratios.clone(),
            max_iter: config.max_iter,
            tol: config.tol,
            scoring: Scoring::RocAuc,
            seed: config.default_seed,
            subset_mad_genes: config.num_features_raw,
            standardize_columns: config.should_standardize(training_data),
            subsample_to_smallest: false,
            save_predictions: false,
        }
    }

    /// Create configuration for quick testing
    pub fn quick_test() -> Self {
        Self {
            num_folds: 2,
            inner_folds: 2,
            alphas: vec![1e-2, 1e-1],
            l1_ratios: vec![0.0, 0.5],
            max_iter: 100,
            subset_mad_genes: 0,
            ..Default::default()
        }
    }
}

/// "signal" for real labels, "shuffled" for the permuted-label control
pub fn signal_name(shuffle_labels: bool) -> &'static str {
    if shuffle_labels {
        "shuffled"
    } else {
        "signal"
    }
}

/// Which samples a metric was computed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Train,
    Cv,
    Test,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Train => "train",
            DataType::Cv => "cv",
            DataType::Test => "test",
        }
    }
}

/// Columns shared by every metric row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowMeta {
    pub identifier: String,
    pub training_data: String,
    pub signal: String,
    pub seed: u64,
    pub data_type: DataType,
    pub fold: usize,
}

/// Summary metrics for one data type of one fold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsRow {
    pub auroc: f64,
    pub aupr: f64,
    #[serde(flatten)]
    pub meta: RowMeta,
}

/// One ROC curve point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RocRow {
    pub fpr: f64,
    pub tpr: f64,
    pub threshold: f64,
    #[serde(flatten)]
    pub meta: RowMeta,
}

/// One precision-recall curve point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrRow {
    pub precision: f64,
    pub recall: f64,
    pub threshold: f64,
    #[serde(flatten)]
    pub meta: RowMeta,
}

/// A fitted model weight
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoefficientRow {
    pub feature: String,
    pub weight: f64,
    pub abs: f64,
    pub signal: String,
    pub seed: u64,
    pub fold: usize,
    pub identifier: String,
}

/// Outputs of one outer fold
#[derive(Debug, Clone)]
pub struct FoldResult {
    pub fold: usize,
    pub alpha: f64,
    pub l1_ratio: f64,
    /// Mean inner CV score of the selected grid point
    pub best_score: f64,
    pub train: ThresholdMetrics,
    pub cv: ThresholdMetrics,
    pub test: ThresholdMetrics,
    pub coefficients: Vec<CoefficientRow>,
    pub predictions: Vec<SamplePrediction>,
}

impl FoldResult {
    fn metrics_for(&self, data_type: DataType) -> &ThresholdMetrics {
        match data_type {
            DataType::Train => &self.train,
            DataType::Cv => &self.cv,
            DataType::Test => &self.test,
        }
    }
}

/// Result tables for one experiment, aggregated over folds
#[derive(Debug, Clone, Default)]
pub struct ExperimentResults {
    pub metrics: Vec<MetricsRow>,
    pub auc: Vec<RocRow>,
    pub aupr: Vec<PrRow>,
    pub coefficients: Vec<CoefficientRow>,
    pub predictions: Option<Vec<SamplePrediction>>,
}

impl ExperimentResults {
    /// Append the rows for one fold
    pub fn push_fold(
        &mut self,
        fold: FoldResult,
        identifier: &str,
        training_data: &str,
        signal: &str,
        seed: u64,
        keep_predictions: bool,
    ) {
        for data_type in [DataType::Train, DataType::Cv, DataType::Test] {
            let meta = RowMeta {
                identifier: identifier.to_string(),
                training_data: training_data.to_string(),
                signal: signal.to_string(),
                seed,
                data_type,
                fold: fold.fold,
            };
            let metrics = fold.metrics_for(data_type);
            self.metrics.push(MetricsRow {
                auroc: metrics.auroc,
                aupr: metrics.aupr,
                meta: meta.clone(),
            });
            self.auc.extend(metrics.roc.iter().map(|p| RocRow {
                fpr: p.fpr,
                tpr: p.tpr,
                threshold: p.threshold,
                meta: meta.clone(),
            }));
            self.aupr.extend(metrics.pr.iter().map(|p| PrRow {
                precision: p.precision,
                recall: p.recall,
                threshold: p.threshold,
                meta: meta.clone(),
            }));
        }
        self.coefficients.extend(fold.coefficients);
        if keep_predictions {
            self.predictions
                .get_or_insert_with(Vec::new)
                .extend(fold.predictions);
        }
    }

    /// Mean test AUROC and AUPR over folds
    pub fn mean_test_metrics(&self) -> Option<(f64, f64)> {
        let test: Vec<&MetricsRow> = self
            .metrics
            .iter()
            .filter(|r| r.meta.data_type == DataType::Test)
            .collect();
        if test.is_empty() {
            return None;
        }
        let n = test.len() as f64;
        Some((
            test.iter().map(|r| r.auroc).sum::<f64>() / n,
            test.iter().map(|r| r.aupr).sum::<f64>() / n,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::metrics::ThresholdMetrics;

    fn fold(n: usize) -> FoldResult {
        let metrics = ThresholdMetrics::compute(&[0, 0, 1, 1], &[0.1, 0.4, 0.35, 0.8]).unwrap();
        FoldResult {
            fold: n,
            alpha: 0.1,
            l1_ratio: 0.5,
            best_score: 0.7,
            train: metrics.clone(),
            cv: metrics.clone(),
            test: metrics,
            coefficients: vec![CoefficientRow {
                feature: "G1".into(),
                weight: -0.5,
                abs: 0.5,
                signal: "signal".into(),
                seed: 42,
                fold: n,
                identifier: "TP53".into(),
            }],
            predictions: Vec::new(),
        }
    }

    #[test]
    fn test_cv_config_defaults() {
        let config = CvConfig::default();
        assert_eq!(config.num_folds, 4);
        assert_eq!(config.inner_folds, 4);
        assert!(config.standardize_columns);
        assert_eq!(config.subset_mad_genes, 8000);

        let me = CvConfig::from_pipeline(&PipelineConfig::default(), "me_27k");
        assert!(!me.standardize_columns);
    }

    #[test]
    fn test_push_fold_rows() {
        let mut results = ExperimentResults::default();
        results.push_fold(fold(0), "TP53", "expression", signal_name(false), 42, false);
        results.push_fold(fold(1), "TP53", "expression", signal_name(false), 42, false);

        assert_eq!(results.metrics.len(), 6);
        assert_eq!(results.coefficients.len(), 2);
        assert_eq!(results.auc.len(), 2 * 3 * 5);
        assert_eq!(results.aupr.len(), 2 * 3 * 4);
        assert!(results.predictions.is_none());
        assert_eq!(results.metrics[2].meta.data_type, DataType::Test);
        assert_eq!(results.metrics[2].meta.signal, "signal");

        let (auroc, _) = results.mean_test_metrics().unwrap();
        assert!((auroc - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_signal_name() {
        assert_eq!(signal_name(true), "shuffled");
        assert_eq!(DataType::Cv.as_str(), "cv");
    }
}
