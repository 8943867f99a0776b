//! TCGA data model: holds one training data type and builds the
//! features/labels for each experiment.

use crate::config::PipelineConfig;
use crate::data::labels::{
    process_y_matrix, process_y_matrix_cancertype, process_y_matrix_purity, CopyNumberRule,
    LabelFilter, StatusCounts,
};
use crate::data::loader;
use crate::data::preprocessing::{align_matrices, filter_to_cross_data_samples};
use crate::data::{FeatureMatrix, SampleInfoTable, StatusTable};
use crate::output::write_disease_stats;
use crate::utils::random::seeded_rng;
use anyhow::{Context, Result};
use rand::seq::SliceRandom;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

/// Pan-cancer label inputs, loaded on first use
#[derive(Debug, Clone)]
pub struct PancancerData {
    pub sample_freeze: Vec<(String, String)>,
    pub mutations: FeatureMatrix,
    pub copy_gain: FeatureMatrix,
    pub copy_loss: FeatureMatrix,
    pub mutation_burden: HashMap<String, f64>,
}

impl PancancerData {
    pub fn load(config: &PipelineConfig) -> Result<Self> {
        info!("Loading pan-cancer label data");
        Ok(Self {
            sample_freeze: loader::read_sample_freeze(&config.sample_freeze)?,
            mutations: loader::read_matrix(&config.mutations)?,
            copy_gain: loader::read_matrix(&config.copy_gain)?,
            copy_loss: loader::read_matrix(&config.copy_loss)?,
            mutation_burden: loader::read_mutation_burden(&config.mutation_burden)?,
        })
    }
}

/// Features and labels for a single experiment
#[derive(Debug, Clone)]
pub struct ExperimentData {
    /// Gene, cancer type or "purity"
    pub identifier: String,
    /// Aligned feature matrix with covariates appended
    pub x: FeatureMatrix,
    /// Labels in the row order of `x`
    pub y: StatusTable,
    /// Shuffled-label control: labels get permuted within cancer type
    /// during CV (cancer type experiments are also permuted globally)
    pub shuffle_labels: bool,
}

impl ExperimentData {
    pub fn gene_features(&self) -> &[bool] {
        &self.x.gene_features
    }
}

/// TCGA training data plus lazily loaded label inputs
pub struct TcgaDataModel {
    config: PipelineConfig,
    /// Training data type (key into `config.data_types`)
    pub training_data: String,
    /// Seeds the label permutation of cancer type controls
    pub seed: u64,
    /// Full feature matrix for the training data type
    pub features: FeatureMatrix,
    pub sample_info: SampleInfoTable,
    pancan: Option<PancancerData>,
    purity: Option<Vec<(String, f64)>>,
    overlap_samples: Option<Vec<String>>,
}

impl TcgaDataModel {
    /// Load the training matrix and sample info for `training_data`
    pub fn load(config: &PipelineConfig, training_data: &str, seed: u64) -> Result<Self> {
        let data_file = config.data_file(training_data)?;
        info!("Loading {} data from {:?}", training_data, data_file);
        let features = loader::read_matrix(data_file)?;
        let sample_info = loader::read_sample_info(config.sample_info_file(training_data))
            .with_context(|| format!("No sample info for {}", training_data))?;

        info!(
            "Loaded {} samples x {} features, {} sample info records",
            features.n_samples(),
            features.n_features(),
            sample_info.len()
        );

        Ok(Self {
            config: config.clone(),
            training_data: training_data.to_string(),
            seed,
            features,
            sample_info,
            pancan: None,
            purity: None,
            overlap_samples: None,
        })
    }

    /// Build a model from in-memory data
    pub fn from_parts(
        config: &PipelineConfig,
        training_data: &str,
        seed: u64,
        features: FeatureMatrix,
        sample_info: SampleInfoTable,
        pancan: Option<PancancerData>,
    ) -> Self {
        Self {
            config: config.clone(),
            training_data: training_data.to_string(),
            seed,
            features,
            sample_info,
            pancan,
            purity: None,
            overlap_samples: None,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn label_filter(&self) -> LabelFilter {
        LabelFilter {
            filter_count: self.config.filter_count,
            filter_prop: self.config.filter_prop,
            hyper_filter: self.config.hyper_filter,
        }
    }

    fn pancan(&mut self) -> Result<&PancancerData> {
        if self.pancan.is_none() {
            self.pancan = Some(PancancerData::load(&self.config)?);
        }
        self.pancan
            .as_ref()
            .context("pan-cancer data unavailable")
    }

    fn overlap_samples(&mut self) -> Result<Option<&[String]>> {
        if self.config.overlap_data_types.is_empty() {
            return Ok(None);
        }
        if self.overlap_samples.is_none() {
            let files = self.config.overlap_files()?;
            self.overlap_samples = Some(loader::read_overlap_samples(&files)?);
        }
        Ok(self.overlap_samples.as_deref())
    }

    /// Align labels with the features, then restrict to overlap samples
    fn filter_data(
        &mut self,
        y: &StatusTable,
        add_cancertype_covariate: bool,
    ) -> Result<(FeatureMatrix, StatusTable)> {
        let aligned = align_matrices(&self.features, y, add_cancertype_covariate, true)?;
        let features = aligned.x;
        let labels = aligned.y;
        match self.overlap_samples()? {
            Some(valid) => Ok(filter_to_cross_data_samples(&features, &labels, valid)),
            None => Ok((features, labels)),
        }
    }

    /// Labels and features for predicting alteration status of `gene`
    ///
    /// Writes `{gene}_filtered_cancertypes.tsv` to `output_dir` when given.
    pub fn process_data_for_gene(
        &mut self,
        gene: &str,
        classification: &str,
        output_dir: Option<&Path>,
        shuffle_labels: bool,
    ) -> Result<ExperimentData> {
        let filter = self.label_filter();
        let pancan = self.pancan()?;
        let copy = match CopyNumberRule::from_classification(classification) {
            CopyNumberRule::Gain => Some(&pancan.copy_gain),
            CopyNumberRule::Loss => Some(&pancan.copy_loss),
            CopyNumberRule::MutationOnly => None,
        };
        let labels = process_y_matrix(
            &pancan.mutations,
            copy,
            gene,
            &pancan.sample_freeze,
            &pancan.mutation_burden,
            &filter,
        )?;

        if let Some(dir) = output_dir {
            write_disease_stats(dir, gene, &labels.disease_stats)?;
        }

        let (x, y) = self.filter_data(&labels.table, true)?;
        debug!("{}: {} samples after filtering", gene, y.len());
        Ok(ExperimentData {
            identifier: gene.to_string(),
            x,
            y,
            shuffle_labels,
        })
    }

    /// Labels and features for one-vs-rest prediction of `cancer_type`
    ///
    /// No cancer type covariate is added, it would give the label away.
    /// Labels are constant within a cancer type, so the shuffled control
    /// permutes them across the whole cohort.
    pub fn process_data_for_cancer_type(
        &mut self,
        cancer_type: &str,
        shuffle_labels: bool,
    ) -> Result<(ExperimentData, StatusCounts)> {
        let hyper_filter = self.config.hyper_filter;
        let pancan = self.pancan()?;
        let (table, counts) = process_y_matrix_cancertype(
            cancer_type,
            &pancan.sample_freeze,
            &pancan.mutation_burden,
            hyper_filter,
        );
        info!(
            "{}: {} positives, {} negatives",
            cancer_type, counts.positives, counts.negatives
        );

        let (x, mut y) = self.filter_data(&table, false)?;
        if shuffle_labels {
            let mut statuses = y.statuses();
            statuses.shuffle(&mut seeded_rng(self.seed));
            y = y.with_statuses(&statuses)?;
        }
        Ok((
            ExperimentData {
                identifier: cancer_type.to_string(),
                x,
                y,
                shuffle_labels,
            },
            counts,
        ))
    }

    /// Labels and features for above/below median tumor purity
    pub fn process_purity_data(&mut self, shuffle_labels: bool) -> Result<ExperimentData> {
        if self.purity.is_none() {
            self.purity = Some(loader::read_purity(&self.config.purity)?);
        }
        let hyper_filter = self.config.hyper_filter;
        let burden = &self.pancan()?.mutation_burden.clone();
        let purity = self.purity.as_deref().unwrap_or_default();
        let table = process_y_matrix_purity(purity, &self.sample_info, burden, hyper_filter)?;

        let (x, y) = self.filter_data(&table, true)?;
        Ok(ExperimentData {
            identifier: "purity".to_string(),
            x,
            y,
            shuffle_labels,
        })
    }
}
