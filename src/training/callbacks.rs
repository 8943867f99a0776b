use crate::predict::PredictionSummary;
use crate::training::{ExperimentResults, FoldResult};
use std::time::{Duration, Instant};

/// Cross-validation callback trait
///
/// Callbacks allow custom actions at fold and experiment boundaries.
pub trait CvCallback: Send + Sync {
    /// Called before the first fold
    fn on_experiment_begin(&mut self, _identifier: &str, _num_folds: usize) {}

    /// Called at the start of each outer fold
    fn on_fold_begin(&mut self, _fold: usize) {}

    /// Called once a fold has been fitted and evaluated
    fn on_fold_end(&mut self, _fold: usize, _result: &FoldResult) {}

    /// Called after the last fold
    fn on_experiment_end(&mut self, _results: &ExperimentResults) {}
}

/// Callback manager that handles multiple callbacks
#[derive(Default)]
pub struct CallbackManager {
    callbacks: Vec<Box<dyn CvCallback>>,
}

impl CallbackManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a callback
    pub fn add_callback<C: CvCallback + 'static>(&mut self, callback: C) {
        self.callbacks.push(Box::new(callback));
    }

    /// Logging and timing callbacks used by the command-line runners
    pub fn with_defaults() -> Self {
        let mut manager = Self::new();
        manager.add_callback(ProgressLoggerCallback::default());
        manager.add_callback(TimerCallback::new());
        manager
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    pub fn on_experiment_begin(&mut self, identifier: &str, num_folds: usize) {
        for callback in &mut self.callbacks {
            callback.on_experiment_begin(identifier, num_folds);
        }
    }

    pub fn on_fold_begin(&mut self, fold: usize) {
        for callback in &mut self.callbacks {
            callback.on_fold_begin(fold);
        }
    }

    pub fn on_fold_end(&mut self, fold: usize, result: &FoldResult) {
        for callback in &mut self.callbacks {
            callback.on_fold_end(fold, result);
        }
    }

    pub fn on_experiment_end(&mut self, results: &ExperimentResults) {
        for callback in &mut self.callbacks {
            callback.on_experiment_end(results);
        }
    }
}

/// Logs selected hyperparameters and test metrics per fold
#[derive(Debug, Default)]
pub struct ProgressLoggerCallback {
    identifier: String,
    num_folds: usize,
}

impl CvCallback for ProgressLoggerCallback {
    fn on_experiment_begin(&mut self, identifier: &str, num_folds: usize) {
        self.identifier = identifier.to_string();
        self.num_folds = num_folds;
    }

    fn on_fold_end(&mut self, fold: usize, result: &FoldResult) {
        tracing::info!(
            "{} fold {}/{} - alpha: {}, l1_ratio: {}, train AUROC: {:.4}, test AUROC: {:.4}, test AUPR: {:.4}",
            self.identifier,
            fold + 1,
            self.num_folds,
            result.alpha,
            result.l1_ratio,
            result.train.auroc,
            result.test.auroc,
            result.test.aupr
        );
    }

    fn on_experiment_end(&mut self, results: &ExperimentResults) {
        if let Some((auroc, aupr)) = results.mean_test_metrics() {
            tracing::info!(
                "{} mean test AUROC: {:.4}, AUPR: {:.4}",
                self.identifier,
                auroc,
                aupr
            );
        }
        if let Some(predictions) = &results.predictions {
            PredictionSummary::from_predictions(predictions).log(&self.identifier);
        }
    }
}

/// Timer callback that tracks per-fold wall time
#[derive(Debug, Default)]
pub struct TimerCallback {
    start_time: Option<Instant>,
    fold_start: Option<Instant>,
    fold_times: Vec<Duration>,
}

impl TimerCallback {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get average fold time
    pub fn average_fold_time(&self) -> Option<Duration> {
        if self.fold_times.is_empty() {
            None
        } else {
            let total: Duration = self.fold_times.iter().sum();
            Some(total / self.fold_times.len() as u32)
        }
    }

    pub fn folds_timed(&self) -> usize {
        self.fold_times.len()
    }

    /// Time since the experiment started
    pub fn total_time(&self) -> Option<Duration> {
        self.start_time.map(|t| t.elapsed())
    }
}

impl CvCallback for TimerCallback {
    fn on_experiment_begin(&mut self, _identifier: &str, _num_folds: usize) {
        self.start_time = Some(Instant::now());
        self.fold_times.clear();
    }

    fn on_fold_begin(&mut self, _fold: usize) {
        self.fold_start = Some(Instant::now());
    }

    fn on_fold_end(&mut self, fold: usize, _result: &FoldResult) {
        if let Some(start) = self.fold_start.take() {
            let elapsed = start.elapsed();
            tracing::debug!("Fold {} completed in {:.2?}", fold, elapsed);
            self.fold_times.push(elapsed);
        }
    }

    fn on_experiment_end(&mut self, _results: &ExperimentResults) {
        if let Some(start) = self.start_time {
            tracing::info!(
                "Experiment completed in {} ({} folds)",
                crate::utils::format_duration(start.elapsed().as_secs_f64()),
                self.fold_times.len()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::metrics::ThresholdMetrics;

    fn fold_result(fold: usize) -> FoldResult {
        let metrics = ThresholdMetrics::compute(&[0, 1, 0, 1], &[0.1, 0.9, 0.2, 0.7]).unwrap();
        FoldResult {
            fold,
            alpha: 0.01,
            l1_ratio: 0.15,
            best_score: 1.0,
            train: metrics.clone(),
            cv: metrics.clone(),
            test: metrics,
            coefficients: Vec::new(),
            predictions: Vec::new(),
        }
    }

    #[test]
    fn test_timer_records_each_fold() {
        let mut timer = TimerCallback::new();
        timer.on_experiment_begin("TP53", 2);
        for fold in 0..2 {
            timer.on_fold_begin(fold);
            timer.on_fold_end(fold, &fold_result(fold));
        }
        assert_eq!(timer.folds_timed(), 2);
        assert!(timer.average_fold_time().is_some());
        assert!(timer.total_time().is_some());
    }

    #[test]
    fn test_fold_end_without_begin_is_ignored() {
        let mut timer = TimerCallback::new();
        timer.on_fold_end(0, &fold_result(0));
        assert_eq!(timer.folds_timed(), 0);
        assert!(timer.average_fold_time().is_none());
    }

    #[test]
    fn test_callback_manager() {
        let mut manager = CallbackManager::with_defaults();
        assert_eq!(manager.len(), 2);

        manager.on_experiment_begin("TP53", 1);
        manager.on_fold_begin(0);
        manager.on_fold_end(0, &fold_result(0));
        manager.on_experiment_end(&ExperimentResults::default());
    }
}
