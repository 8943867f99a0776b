//! # mpmp: multimodal pan-cancer mutation prediction
//!
//! Predicts gene alteration status, cancer type and tumor purity from TCGA
//! omics matrices (gene expression, DNA methylation) with elastic-net
//! logistic regression, evaluated by stratified cross-validation against a
//! shuffled-label control.
//!
//! ## Features
//!
//! - Mutation + copy number label construction with cancer type filtering
//! - Alignment of feature matrices across data types
//! - MAD feature selection and per-split standardization
//! - Nested CV: outer stratified folds, inner grid search over alpha/l1_ratio
//! - Paired comparisons of saved results with FDR correction
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use mpmp::config::PipelineConfig;
//! use mpmp::data::tcga::TcgaDataModel;
//! use mpmp::training::{callbacks::CallbackManager, trainer::run_cv_stratified, CvConfig};
//!
//! let config = PipelineConfig::default();
//! let mut data_model = TcgaDataModel::load(&config, "expression", 42).unwrap();
//! let experiment = data_model
//!     .process_data_for_gene("TP53", "TSG", None, false)
//!     .unwrap();
//!
//! let cv_config = CvConfig::from_pipeline(&config, "expression");
//! let results = run_cv_stratified(
//!     &data_model,
//!     &experiment,
//!     &cv_config,
//!     &mut CallbackManager::with_defaults(),
//! )
//! .unwrap();
//! println!("{:?}", results.mean_test_metrics());
//! ```

pub mod analysis;
pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod model;
pub mod output;
pub mod predict;
pub mod training;
pub mod utils;

/// Re-export commonly used types
pub use config::PipelineConfig;
pub use data::tcga::{ExperimentData, TcgaDataModel};
pub use data::{FeatureMatrix, SampleInfoTable, StatusTable};
pub use error::ClassifyError;
pub use model::{ModelConfig, SgdClassifier};
pub use predict::{PredictionSummary, SamplePrediction};
pub use training::{CvConfig, ExperimentResults};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get library information
pub fn info() -> String {
    format!(
        "{} v{} - pan-cancer mutation prediction from TCGA omics data",
        NAME, VERSION
    )
}
