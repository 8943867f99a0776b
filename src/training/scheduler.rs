/// Per-sample step size for SGD with an L2-scaled log loss
///
/// `t` counts samples seen so far, starting at 1; the step is
/// `1 / (alpha * (t0 + t - 1))`, with `t0` chosen from the penalty.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LearningRate {
    alpha: f64,
    t0: f64,
}

impl LearningRate {
    /// Optimal schedule for log loss with regularization strength `alpha`
    ///
    /// The initial step is the typical weight magnitude `sqrt(1 / sqrt(alpha))`
    /// divided by the log loss gradient bound (1).
    pub fn optimal(alpha: f64) -> Self {
        let typw = (1.0 / alpha.sqrt()).sqrt();
        Self {
            alpha,
            t0: 1.0 / (typw * alpha),
        }
    }

    /// Step size for sample count `t`
    pub fn get_lr(&self, t: f64) -> f64 {
        1.0 / (self.alpha * (self.t0 + t - 1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_optimal_schedule() {
        let schedule = LearningRate::optimal(1.0);
        // typw = 1, t0 = 1, so the first step is 1 / alpha
        assert_relative_eq!(schedule.get_lr(1.0), 1.0);
        assert_relative_eq!(schedule.get_lr(4.0), 0.25);
    }

    #[test]
    fn test_small_alpha_starts_later() {
        let small = LearningRate::optimal(1e-4);
        // typw = 10, so the first step is 10 and t0 = 1000
        assert_relative_eq!(small.get_lr(1.0), 10.0, epsilon = 1e-9);
        assert_relative_eq!(small.get_lr(1001.0), 5.0, epsilon = 1e-9);
    }
}
