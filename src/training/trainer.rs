//! Outer cross-validation loop: split, preprocess, search, evaluate.

use crate::data::preprocessing::{
    preprocess_data, shuffle_by_cancer_type, subsample_to_smallest_cancer_type,
};
use crate::data::split::split_stratified;
use crate::data::tcga::{ExperimentData, TcgaDataModel};
use crate::data::{FeatureMatrix, StatusTable};
use crate::error::{ClassifyError, Result};
use crate::model::metrics::ThresholdMetrics;
use crate::model::{ModelConfig, SgdClassifier};
use crate::predict::predict_samples;
use crate::training::callbacks::CallbackManager;
use crate::training::grid_search::{cross_val_predict, GridSearch};
use crate::training::{signal_name, CoefficientRow, CvConfig, ExperimentResults, FoldResult};
use std::time::Instant;
use tracing::{debug, info};

/// Train and test matrices for one outer fold, before preprocessing
struct FoldData {
    x_train: FeatureMatrix,
    x_test: FeatureMatrix,
    y_train: StatusTable,
    y_test: StatusTable,
}

fn split_fold(
    data_model: &TcgaDataModel,
    experiment: &ExperimentData,
    config: &CvConfig,
    fold: usize,
) -> Result<FoldData> {
    let identifier = experiment.identifier.as_str();
    let (train_rows, test_rows) = split_stratified(
        &experiment.x,
        &data_model.sample_info,
        config.num_folds,
        fold,
        config.seed,
    )
    .map_err(|e| e.with_identifier(identifier))?;

    if train_rows.is_empty() {
        return Err(ClassifyError::no_train_samples(identifier));
    }
    if test_rows.is_empty() {
        return Err(ClassifyError::no_test_samples(identifier, format!("fold {} is empty", fold)));
    }

    let x_train = experiment.x.select_rows(&train_rows);
    let x_test = experiment.x.select_rows(&test_rows);
    let y_train = experiment.y.reindex(&x_train.samples);
    let y_test = experiment.y.reindex(&x_test.samples);

    let (x_train, y_train) = if config.subsample_to_smallest {
        subsample_to_smallest_cancer_type(&x_train, &y_train, &data_model.sample_info, config.seed)?
    } else {
        (x_train, y_train)
    };

    if experiment.shuffle_labels {
        // train and test are permuted independently
        Ok(FoldData {
            y_train: shuffle_by_cancer_type(&y_train, config.seed),
            y_test: shuffle_by_cancer_type(&y_test, config.seed),
            x_train,
            x_test,
        })
    } else {
        Ok(FoldData {
            x_train,
            x_test,
            y_train,
            y_test,
        })
    }
}

/// Fitted weights sorted by absolute value, largest first
fn coefficient_rows(
    model: &SgdClassifier,
    features: &[String],
    identifier: &str,
    signal: &str,
    seed: u64,
    fold: usize,
) -> Result<Vec<CoefficientRow>> {
    let weights = model.coefficients()?;
    let mut rows: Vec<CoefficientRow> = features
        .iter()
        .zip(weights.iter())
        .map(|(feature, &weight)| CoefficientRow {
            feature: feature.clone(),
            weight,
            abs: weight.abs(),
            signal: signal.to_string(),
            seed,
            fold,
            identifier: identifier.to_string(),
        })
        .collect();
    rows.sort_by(|a, b| b.abs.total_cmp(&a.abs));
    Ok(rows)
}

fn run_fold(
    data_model: &TcgaDataModel,
    experiment: &ExperimentData,
    config: &CvConfig,
    fold: usize,
) -> Result<FoldResult> {
    let identifier = experiment.identifier.as_str();
    let data = split_fold(data_model, experiment, config, fold)?;

    let (x_train, x_test) = preprocess_data(
        &data.x_train,
        &data.x_test,
        config.standardize_columns,
        config.subset_mad_genes,
    );
    let y_train = data.y_train.statuses();
    let y_test = data.y_test.statuses();
    debug!(
        "{} fold {}: {} train ({} positive), {} test ({} positive), {} features",
        identifier,
        fold,
        y_train.len(),
        data.y_train.positive_count(),
        y_test.len(),
        data.y_test.positive_count(),
        x_train.n_features()
    );

    let base = ModelConfig::default()
        .with_max_iter(config.max_iter)
        .with_tol(config.tol)
        .with_seed(config.seed);
    let search = GridSearch::new(
        config.alphas.clone(),
        config.l1_ratios.clone(),
        config.inner_folds,
        base,
    )
    .with_scoring(config.scoring);

    let attach = |e: ClassifyError| e.with_identifier(identifier);
    let result = search.fit(x_train.values.view(), &y_train).map_err(attach)?;
    let model = &result.best_model;

    let train_scores = model.decision_function(x_train.values.view())?;
    let cv_scores = cross_val_predict(
        model.config(),
        x_train.values.view(),
        &y_train,
        config.inner_folds,
    )
    .map_err(attach)?;
    let test_scores = model.decision_function(x_test.values.view())?;

    let train = ThresholdMetrics::compute(&y_train, &train_scores.to_vec()).map_err(attach)?;
    let cv = ThresholdMetrics::compute(&y_train, &cv_scores.to_vec()).map_err(attach)?;
    let test = ThresholdMetrics::compute(&y_test, &test_scores.to_vec()).map_err(attach)?;

    let signal = signal_name(experiment.shuffle_labels);
    let coefficients = coefficient_rows(model, &x_train.features, identifier, signal, config.seed, fold)?;
    let predictions = if config.save_predictions {
        predict_samples(model, &x_test, &data.y_test, fold)?
    } else {
        Vec::new()
    };

    Ok(FoldResult {
        fold,
        alpha: result.best.alpha,
        l1_ratio: result.best.l1_ratio,
        best_score: result.best.mean_score,
        train,
        cv,
        test,
        coefficients,
        predictions,
    })
}

/// Run stratified outer cross-validation for one experiment
///
/// Any fold failing with a skip condition aborts the experiment; the error
/// carries the experiment identifier.
pub fn run_cv_stratified(
    data_model: &TcgaDataModel,
    experiment: &ExperimentData,
    config: &CvConfig,
    callbacks: &mut CallbackManager,
) -> Result<ExperimentResults> {
    let identifier = experiment.identifier.as_str();
    let signal = signal_name(experiment.shuffle_labels);
    info!(
        "Running {}-fold CV for {} ({}, {}, {} samples)",
        config.num_folds,
        identifier,
        config.training_data,
        signal,
        experiment.y.len()
    );

    let start = Instant::now();
    let mut results = ExperimentResults::default();
    callbacks.on_experiment_begin(identifier, config.num_folds);

    for fold in 0..config.num_folds {
        callbacks.on_fold_begin(fold);
        let fold_result = run_fold(data_model, experiment, config, fold)?;
        callbacks.on_fold_end(fold, &fold_result);
        results.push_fold(
            fold_result,
            identifier,
            &config.training_data,
            signal,
            config.seed,
            config.save_predictions,
        );
    }

    callbacks.on_experiment_end(&results);
    debug!("{} CV finished in {:.2?}", identifier, start.elapsed());
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::data::{SampleInfo, SampleInfoTable, StatusRecord};
    use crate::training::DataType;
    use ndarray::Array2;

    /// 80 samples over two cancer types; G0 carries the label
    fn fixture(identifier: &str, shuffle_labels: bool) -> (TcgaDataModel, ExperimentData) {
        let n = 80;
        let samples: Vec<String> = (0..n).map(|i| format!("TCGA-{:02}", i)).collect();
        let disease = |i: usize| if i % 2 == 0 { "BRCA" } else { "LUAD" };
        let status = |i: usize| ((i / 2) % 3 == 0) as u8;

        let x = FeatureMatrix::new(
            samples.clone(),
            vec!["G0".into(), "G1".into(), "G2".into()],
            Array2::from_shape_fn((n, 3), |(i, j)| {
                let noise = ((i * 37 + j * 11) % 17) as f64 / 17.0;
                if j == 0 {
                    3.0 * status(i) as f64 + noise
                } else {
                    noise
                }
            }),
        )
        .unwrap();
        let y = StatusTable::new(
            (0..n)
                .map(|i| StatusRecord {
                    sample_id: samples[i].clone(),
                    status: status(i),
                    disease: disease(i).into(),
                    log10_mut: 0.0,
                })
                .collect(),
        );
        let sample_info = SampleInfoTable::new(
            (0..n)
                .map(|i| SampleInfo::new(samples[i].clone(), "Primary Solid Tumor".into(), disease(i).into()))
                .collect(),
        );

        let mut config = PipelineConfig::default();
        config.overlap_data_types.clear();
        let model = TcgaDataModel::from_parts(&config, "expression", 42, x.clone(), sample_info, None);
        let experiment = ExperimentData {
            identifier: identifier.into(),
            x,
            y,
            shuffle_labels,
        };
        (model, experiment)
    }

    #[test]
    fn test_run_cv_signal() {
        let (model, experiment) = fixture("TP53", false);
        let mut config = CvConfig::quick_test();
        config.save_predictions = true;

        let results = run_cv_stratified(&model, &experiment, &config, &mut CallbackManager::new()).unwrap();

        assert_eq!(results.metrics.len(), 2 * 3);
        assert!(results.metrics.iter().all(|r| r.meta.identifier == "TP53"));
        let (auroc, _) = results.mean_test_metrics().unwrap();
        assert!(auroc > 0.9, "test AUROC {}", auroc);

        // every sample is held out exactly once
        let predictions = results.predictions.unwrap();
        assert_eq!(predictions.len(), 80);

        // 3 features per fold, sorted by |weight|
        assert_eq!(results.coefficients.len(), 2 * 3);
        assert!(results.coefficients[0].abs >= results.coefficients[1].abs);
        assert_eq!(results.coefficients[0].feature, "G0");
    }

    #[test]
    fn test_shuffled_labels_are_marked() {
        let (model, experiment) = fixture("TP53", true);
        let results =
            run_cv_stratified(&model, &experiment, &CvConfig::quick_test(), &mut CallbackManager::new()).unwrap();
        assert!(results.metrics.iter().all(|r| r.meta.signal == "shuffled"));
        assert!(results.predictions.is_none());
        assert_eq!(
            results.metrics.iter().filter(|r| r.meta.data_type == DataType::Cv).count(),
            2
        );
    }

    #[test]
    fn test_one_class_carries_identifier() {
        let (model, mut experiment) = fixture("KRAS", false);
        experiment.y = experiment.y.with_statuses(&vec![0u8; 80]).unwrap();
        let err = run_cv_stratified(&model, &experiment, &CvConfig::quick_test(), &mut CallbackManager::new())
            .unwrap_err();
        match err {
            ClassifyError::OneClass { identifier } => assert_eq!(identifier, "KRAS"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_too_many_folds() {
        let (model, mut experiment) = fixture("TP53", false);
        experiment.x = experiment.x.select_rows(&[0, 1, 2]);
        experiment.y = experiment.y.reindex(&experiment.x.samples);
        let mut config = CvConfig::quick_test();
        config.num_folds = 4;
        let err = run_cv_stratified(&model, &experiment, &config, &mut CallbackManager::new()).unwrap_err();
        assert!(err.skip_reason().is_some());
    }

    #[test]
    fn test_subsample_to_smallest_balances_training_cancer_types() {
        let (model, mut experiment) = fixture("TP53", false);
        // all 40 BRCA samples, only 20 LUAD
        let rows: Vec<usize> = (0..80).filter(|&i| i % 2 == 0 || i < 40).collect();
        experiment.x = experiment.x.select_rows(&rows);
        experiment.y = experiment.y.reindex(&experiment.x.samples);
        let mut config = CvConfig::quick_test();
        config.subsample_to_smallest = true;

        let data = split_fold(&model, &experiment, &config, 0).unwrap();
        let brca = data.y_train.records.iter().filter(|r| r.disease == "BRCA").count();
        let luad = data.y_train.len() - brca;
        // the training half holds 20 BRCA and 10 LUAD before resampling
        assert_eq!((brca, luad), (10, 10));
        assert_eq!(data.x_train.samples, data.y_train.sample_ids());
        assert_eq!(data.y_test.len(), 30);

        let results = run_cv_stratified(&model, &experiment, &config, &mut CallbackManager::new()).unwrap();
        assert_eq!(results.metrics.len(), 2 * 3);
    }
}
