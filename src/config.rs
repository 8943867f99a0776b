//! Pipeline configuration: data locations and fixed hyperparameter ranges.
//!
//! Everything here has a default so the tool runs against a conventional
//! `data/` layout without a config file. A TOML file passed with `--config`
//! overrides any subset of the fields.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Default random seed for splits, shuffles and SGD
pub const DEFAULT_SEED: u64 = 42;

/// Default number of gene features kept after MAD selection
pub const NUM_FEATURES_RAW: usize = 8000;

/// Pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Training data name -> feature matrix (samples x features)
    pub data_types: BTreeMap<String, PathBuf>,
    /// Data types whose sample sets are intersected before training
    pub overlap_data_types: Vec<String>,
    /// Data types whose gene features get z-scored
    pub standardize_data_types: Vec<String>,

    /// Directory holding `tcga_{training_data}_sample_identifiers.tsv`
    pub sample_info_dir: PathBuf,
    /// Sample freeze table (SAMPLE_BARCODE, DISEASE)
    pub sample_freeze: PathBuf,
    /// Binary mutation calls (samples x genes)
    pub mutations: PathBuf,
    /// Binary copy gain calls (samples x genes)
    pub copy_gain: PathBuf,
    /// Binary copy loss calls (samples x genes)
    pub copy_loss: PathBuf,
    /// log10 mutation burden per sample
    pub mutation_burden: PathBuf,
    /// Genes to predict with their oncogene/TSG classification
    pub gene_list: PathBuf,
    /// Tumor purity estimates
    pub purity: PathBuf,
    /// Where results are written
    pub results_dir: PathBuf,

    /// SGD regularization strengths searched by the inner CV
    pub alphas: Vec<f64>,
    /// Elastic net mixing values searched by the inner CV
    pub l1_ratios: Vec<f64>,
    /// Number of inner CV folds for hyperparameter search
    pub inner_folds: usize,
    /// Maximum SGD epochs
    pub max_iter: usize,
    /// SGD stopping tolerance
    pub tol: f64,

    /// Random seed
    pub default_seed: u64,
    /// Number of gene features kept by MAD (0 = keep all)
    pub num_features_raw: usize,
    /// Minimum positives per cancer type (strictly greater than)
    pub filter_count: usize,
    /// Minimum positive proportion per cancer type (strictly greater than)
    pub filter_prop: f64,
    /// Samples with log10 burden above this many std devs are dropped
    pub hyper_filter: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let data_dir = PathBuf::from("data");
        let pancan_dir = data_dir.join("pancancer");

        let mut data_types = BTreeMap::new();
        data_types.insert(
            "expression".to_string(),
            data_dir.join("tcga_expression_matrix_processed.tsv.gz"),
        );
        data_types.insert(
            "me_27k".to_string(),
            data_dir.join("me_preprocessed").join("methylation_processed_n10_i5.tsv.gz"),
        );
        data_types.insert(
            "me_450k".to_string(),
            data_dir.join("methylation_450k_f10_i5_mad100000.tsv.gz"),
        );

        Self {
            data_types,
            overlap_data_types: vec![
                "expression".to_string(),
                "me_27k".to_string(),
                "me_450k".to_string(),
            ],
            standardize_data_types: vec!["expression".to_string()],
            sample_info_dir: data_dir.join("sample_info"),
            sample_freeze: pancan_dir.join("sample_freeze.tsv"),
            mutations: pancan_dir.join("mutation_matrix.tsv.gz"),
            copy_gain: pancan_dir.join("copy_number_gain_status.tsv.gz"),
            copy_loss: pancan_dir.join("copy_number_loss_status.tsv.gz"),
            mutation_burden: pancan_dir.join("mutation_burden_freeze.tsv"),
            gene_list: data_dir.join("genes.tsv"),
            purity: data_dir.join("TCGA_mastercalls.abs_tables_JSedit.fixed.txt"),
            results_dir: PathBuf::from("results"),
            alphas: vec![1e-4, 1e-3, 1e-2, 1e-1, 1.0, 10.0],
            l1_ratios: vec![0.0, 0.05, 0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 1.0],
            inner_folds: 4,
            max_iter: 1000,
            tol: 1e-3,
            default_seed: DEFAULT_SEED,
            num_features_raw: NUM_FEATURES_RAW,
            filter_count: 15,
            filter_prop: 0.05,
            hyper_filter: 5.0,
        }
    }
}

impl PipelineConfig {
    /// Load from a TOML file; missing keys fall back to defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        let config: Self = toml::from_str(&text)
            .with_context(|| format!("Failed to parse config file {:?}", path))?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Load from an optional path, using defaults when absent
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => Ok(Self::default()),
        }
    }

    /// Feature matrix path for a training data type
    pub fn data_file(&self, training_data: &str) -> Result<&Path> {
        self.data_types
            .get(training_data)
            .map(PathBuf::as_path)
            .with_context(|| {
                format!(
                    "Unknown training data type {:?} (known: {:?})",
                    training_data,
                    self.data_types.keys().collect::<Vec<_>>()
                )
            })
    }

    /// Sample info file for a training data type
    pub fn sample_info_file(&self, training_data: &str) -> PathBuf {
        self.sample_info_dir
            .join(format!("tcga_{}_sample_identifiers.tsv", training_data))
    }

    /// Whether gene features of this data type are standardized
    pub fn should_standardize(&self, training_data: &str) -> bool {
        self.standardize_data_types.iter().any(|d| d == training_data)
    }

    /// Overlap data types paired with their matrix paths
    pub fn overlap_files(&self) -> Result<Vec<(String, PathBuf)>> {
        self.overlap_data_types
            .iter()
            .map(|name| Ok((name.clone(), self.data_file(name)?.to_path_buf())))
            .collect()
    }
}
