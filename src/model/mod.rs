pub mod metrics;
pub mod sgd;

pub use sgd::SgdClassifier;

use serde::{Deserialize, Serialize};

/// Classifier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Regularization strength
    pub alpha: f64,
    /// Elastic net mixing: 0 = pure L2, 1 = pure L1
    pub l1_ratio: f64,
    /// Maximum number of epochs
    pub max_iter: usize,
    /// Stopping tolerance on the epoch loss
    pub tol: f64,
    /// Epochs without improvement before stopping
    pub n_iter_no_change: usize,
    /// Weight classes inversely to their frequency
    pub balanced: bool,
    /// Fit an intercept term
    pub fit_intercept: bool,
    /// Reshuffle samples every epoch
    pub shuffle: bool,
    /// Seed for the per-epoch shuffle
    pub seed: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            alpha: 1e-4,
            l1_ratio: 0.15,
            max_iter: 1000,
            tol: 1e-3,
            n_iter_no_change: 5,
            balanced: true,
            fit_intercept: true,
            shuffle: true,
            seed: crate::config::DEFAULT_SEED,
        }
    }
}

impl ModelConfig {
    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_l1_ratio(mut self, l1_ratio: f64) -> Self {
        self.l1_ratio = l1_ratio;
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Check parameter ranges
    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::ClassifyError;
        if self.alpha.is_nan() || self.alpha <= 0.0 {
            return Err(ClassifyError::invalid_parameter("alpha", self.alpha.to_string()));
        }
        if !(0.0..=1.0).contains(&self.l1_ratio) {
            return Err(ClassifyError::invalid_parameter("l1_ratio", self.l1_ratio.to_string()));
        }
        if self.max_iter == 0 {
            return Err(ClassifyError::invalid_parameter("max_iter", "0"));
        }
        Ok(())
    }
}
