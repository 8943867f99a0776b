//! Elastic-net logistic regression fitted by stochastic gradient descent.

use crate::error::{ClassifyError, Result};
use crate::model::ModelConfig;
use crate::training::scheduler::LearningRate;
use crate::utils::random::seeded_rng;
use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::seq::SliceRandom;
use tracing::{debug, warn};

const MAX_DLOSS: f64 = 1e12;

/// Log loss for margin `p` and label `y` in {-1, 1}
fn log_loss(p: f64, y: f64) -> f64 {
    let z = p * y;
    if z > 18.0 {
        (-z).exp()
    } else if z < -18.0 {
        -z
    } else {
        (-z).exp().ln_1p()
    }
}

/// Derivative of the log loss with respect to `p`
fn log_dloss(p: f64, y: f64) -> f64 {
    let z = p * y;
    if z > 18.0 {
        -y * (-z).exp()
    } else if z < -18.0 {
        -y
    } else {
        -y / (z.exp() + 1.0)
    }
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// Binary logistic regression with elastic-net penalty trained by SGD
///
/// The L2 part shrinks the weights every step; the L1 part is applied with
/// the cumulative truncated-gradient penalty so weights can reach exactly zero.
#[derive(Debug, Clone)]
pub struct SgdClassifier {
    config: ModelConfig,
    coefficients: Option<Array1<f64>>,
    intercept: f64,
}

impl SgdClassifier {
    pub fn new(config: ModelConfig) -> Self {
        Self {
            config,
            coefficients: None,
            intercept: 0.0,
        }
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Fit on a samples x features matrix and 0/1 labels
    pub fn fit(&mut self, x: ArrayView2<f64>, y: &[u8]) -> Result<&mut Self> {
        self.config.validate()?;
        let (n_samples, n_features) = x.dim();
        if n_samples != y.len() {
            return Err(ClassifyError::invalid_dimensions(format!(
                "{} rows but {} labels",
                n_samples,
                y.len()
            )));
        }
        if n_samples == 0 {
            return Err(ClassifyError::no_train_samples(""));
        }
        if x.iter().any(|v| !v.is_finite()) {
            return Err(ClassifyError::invalid_parameter("x", "contains NaN or infinite values"));
        }

        let n_pos = y.iter().filter(|&&v| v == 1).count();
        let n_neg = n_samples - n_pos;
        if n_pos == 0 || n_neg == 0 {
            return Err(ClassifyError::one_class(""));
        }

        let (weight_pos, weight_neg) = if self.config.balanced {
            (
                n_samples as f64 / (2.0 * n_pos as f64),
                n_samples as f64 / (2.0 * n_neg as f64),
            )
        } else {
            (1.0, 1.0)
        };

        let alpha = self.config.alpha;
        let l1_ratio = self.config.l1_ratio;
        let schedule = LearningRate::optimal(alpha);
        let targets: Vec<f64> = y.iter().map(|&v| if v == 1 { 1.0 } else { -1.0 }).collect();

        let mut w = Array1::<f64>::zeros(n_features);
        let mut intercept = 0.0;
        // accumulated L1 penalty, total and per weight
        let mut u = 0.0;
        let mut q = Array1::<f64>::zeros(n_features);

        let mut rng = seeded_rng(self.config.seed);
        let mut order: Vec<usize> = (0..n_samples).collect();
        let mut t = 1.0;
        let mut best_loss = f64::INFINITY;
        let mut no_improvement = 0usize;
        let mut epochs = 0usize;
        let mut converged = false;

        for _epoch in 0..self.config.max_iter {
            epochs += 1;
            if self.config.shuffle {
                order.shuffle(&mut rng);
            }

            let mut sumloss = 0.0;
            for &i in &order {
                let xi = x.row(i);
                let yi = targets[i];
                let p = w.dot(&xi) + intercept;
                let eta = schedule.get_lr(t);

                sumloss += log_loss(p, yi);
                let class_weight = if yi > 0.0 { weight_pos } else { weight_neg };
                let dloss = log_dloss(p, yi).clamp(-MAX_DLOSS, MAX_DLOSS);
                let update = -eta * dloss * class_weight;

                let shrink = (1.0 - (1.0 - l1_ratio) * eta * alpha).max(0.0);
                w.mapv_inplace(|v| v * shrink);

                if update != 0.0 {
                    w.scaled_add(update, &xi);
                    if self.config.fit_intercept {
                        intercept += update;
                    }
                }

                if l1_ratio > 0.0 {
                    u += l1_ratio * eta * alpha;
                    apply_l1_penalty(&mut w, &mut q, u);
                }
                t += 1.0;
            }

            if sumloss > best_loss - self.config.tol * n_samples as f64 {
                no_improvement += 1;
            } else {
                no_improvement = 0;
            }
            if sumloss < best_loss {
                best_loss = sumloss;
            }
            if no_improvement >= self.config.n_iter_no_change {
                converged = true;
                break;
            }
        }

        if !converged {
            warn!(
                "SGD reached max_iter={} without converging (alpha={}, l1_ratio={})",
                self.config.max_iter, alpha, l1_ratio
            );
        }
        debug!(
            "SGD fit: {} epochs, loss {:.4}, {} nonzero weights",
            epochs,
            best_loss / n_samples as f64,
            w.iter().filter(|&&v| v != 0.0).count()
        );

        self.coefficients = Some(w);
        self.intercept = intercept;
        Ok(self)
    }

    /// Linear scores `x . w + b`
    pub fn decision_function(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
        let w = self.coefficients.as_ref().ok_or(ClassifyError::ModelNotFitted)?;
        if x.ncols() != w.len() {
            return Err(ClassifyError::invalid_dimensions(format!(
                "model has {} features, got {}",
                w.len(),
                x.ncols()
            )));
        }
        Ok(x.dot(w) + self.intercept)
    }

    /// Probability of the positive class
    pub fn predict_proba(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
        Ok(self.decision_function(x)?.mapv(sigmoid))
    }

    /// Hard 0/1 predictions
    pub fn predict(&self, x: ArrayView2<f64>) -> Result<Vec<u8>> {
        Ok(self
            .decision_function(x)?
            .iter()
            .map(|&s| (s > 0.0) as u8)
            .collect())
    }

    pub fn coefficients(&self) -> Result<ArrayView1<'_, f64>> {
        self.coefficients
            .as_ref()
            .map(|w| w.view())
            .ok_or(ClassifyError::ModelNotFitted)
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    pub fn is_fitted(&self) -> bool {
        self.coefficients.is_some()
    }
}

/// Clip each weight toward zero by the L1 penalty it has not received yet
fn apply_l1_penalty(w: &mut Array1<f64>, q: &mut Array1<f64>, u: f64) {
    for (wj, qj) in w.iter_mut().zip(q.iter_mut()) {
        let z = *wj;
        if z > 0.0 {
            *wj = (z - (u + *qj)).max(0.0);
        } else if z < 0.0 {
            *wj = (z + (u - *qj)).min(0.0);
        }
        *qj += *wj - z;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array2;

    /// Two gaussian-ish blobs separated along the first feature
    fn blobs(n: usize) -> (Array2<f64>, Vec<u8>) {
        let x = Array2::from_shape_fn((n, 3), |(i, j)| {
            let label = (i % 2) as f64;
            let jitter = ((i * 7 + j * 13) % 11) as f64 / 11.0 - 0.5;
            match j {
                0 => 2.0 * label - 1.0 + 0.3 * jitter,
                _ => jitter,
            }
        });
        let y = (0..n).map(|i| (i % 2) as u8).collect();
        (x, y)
    }

    #[test]
    fn test_loss_functions() {
        assert_relative_eq!(log_loss(0.0, 1.0), 2f64.ln());
        assert_relative_eq!(log_loss(20.0, 1.0), (-20f64).exp());
        assert_relative_eq!(log_loss(-20.0, 1.0), 20.0);
        assert_relative_eq!(log_dloss(0.0, 1.0), -0.5);
        assert_relative_eq!(log_dloss(0.0, -1.0), 0.5);
        assert_relative_eq!(sigmoid(0.0), 0.5);
        assert!(sigmoid(-800.0) >= 0.0);
    }

    #[test]
    fn test_l1_penalty_truncates_at_zero() {
        let mut w = Array1::from(vec![0.5, -0.05, 0.0]);
        let mut q = Array1::zeros(3);
        apply_l1_penalty(&mut w, &mut q, 0.1);
        assert_relative_eq!(w[0], 0.4, epsilon = 1e-12);
        assert_eq!(w[1], 0.0);
        assert_eq!(w[2], 0.0);
        assert_relative_eq!(q[0], -0.1, epsilon = 1e-12);
        assert_relative_eq!(q[1], 0.05, epsilon = 1e-12);
    }

    #[test]
    fn test_fit_separable_data() {
        let (x, y) = blobs(80);
        let mut model = SgdClassifier::new(ModelConfig::default().with_alpha(1e-3).with_l1_ratio(0.15));
        model.fit(x.view(), &y).unwrap();

        let predictions = model.predict(x.view()).unwrap();
        let correct = predictions.iter().zip(&y).filter(|(p, t)| p == t).count();
        assert!(correct >= 76, "only {} of 80 correct", correct);
        assert!(model.coefficients().unwrap()[0] > 0.0);

        let proba = model.predict_proba(x.view()).unwrap();
        assert!(proba.iter().all(|&p| (0.0..=1.0).contains(&p)));
    }

    #[test]
    fn test_fit_is_deterministic() {
        let (x, y) = blobs(40);
        let config = ModelConfig::default().with_alpha(1e-2).with_seed(3);
        let mut a = SgdClassifier::new(config.clone());
        let mut b = SgdClassifier::new(config);
        a.fit(x.view(), &y).unwrap();
        b.fit(x.view(), &y).unwrap();
        assert_eq!(a.coefficients().unwrap(), b.coefficients().unwrap());
        assert_eq!(a.intercept(), b.intercept());
    }

    #[test]
    fn test_strong_l1_zeroes_noise_features() {
        let (x, y) = blobs(80);
        let mut model = SgdClassifier::new(ModelConfig::default().with_alpha(0.1).with_l1_ratio(1.0));
        model.fit(x.view(), &y).unwrap();
        let w = model.coefficients().unwrap();
        assert_eq!(w[1], 0.0);
        assert_eq!(w[2], 0.0);
    }

    #[test]
    fn test_one_class_and_unfitted() {
        let (x, _) = blobs(10);
        let mut model = SgdClassifier::new(ModelConfig::default());
        assert!(matches!(model.decision_function(x.view()), Err(ClassifyError::ModelNotFitted)));
        assert!(matches!(
            model.fit(x.view(), &[1u8; 10]),
            Err(ClassifyError::OneClass { .. })
        ));
        assert!(model.fit(x.view(), &[1u8; 3]).is_err());
    }
}
