pub mod runner;

use crate::analysis::Metric;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// mpmp: pan-cancer mutation prediction from TCGA omics data
#[derive(Parser, Debug)]
#[command(name = "mpmp")]
#[command(about = "Pan-cancer mutation prediction from TCGA omics data")]
#[command(version)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Pipeline configuration file (TOML)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Predict gene alteration status (mutation + copy number)
    Mutation(MutationArgs),

    /// One-vs-rest cancer type prediction
    CancerType(CancerTypeArgs),

    /// Predict above/below median tumor purity
    Purity(PurityArgs),

    /// Compare saved results against the shuffled-label control
    Compare(CompareArgs),

    /// Decode sample barcodes into sample info tables
    SampleInfo(SampleInfoArgs),
}

/// Options shared by every classification run
#[derive(Args, Debug, Clone)]
pub struct ExperimentArgs {
    /// Training data type
    #[arg(short, long, default_value = "expression")]
    pub training_data: String,

    /// Number of outer CV folds
    #[arg(long, default_value = "4")]
    pub num_folds: usize,

    /// Random seed (defaults to the configured seed)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Keep this many gene features by MAD, 0 for all (defaults to config)
    #[arg(long)]
    pub subset_mad_genes: Option<usize>,

    /// Where to write results (defaults to config)
    #[arg(short, long)]
    pub results_dir: Option<PathBuf>,

    /// Skip log file (defaults to {results_dir}/log_skipped.tsv)
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Also save per-sample test predictions
    #[arg(long)]
    pub output_preds: bool,

    /// Resample training cancer types to the smallest one's size
    #[arg(long)]
    pub subsample_to_smallest: bool,

    /// Score inner CV by average precision instead of ROC AUC
    #[arg(long)]
    pub average_precision: bool,
}

/// Mutation prediction arguments
#[derive(Args, Debug)]
pub struct MutationArgs {
    #[command(flatten)]
    pub experiment: ExperimentArgs,

    /// Genes to run (defaults to every gene in the gene list)
    #[arg(short, long, num_args = 1..)]
    pub genes: Option<Vec<String>>,
}

/// Cancer type prediction arguments
#[derive(Args, Debug)]
pub struct CancerTypeArgs {
    #[command(flatten)]
    pub experiment: ExperimentArgs,

    /// Cancer types to run (defaults to every type in the sample info)
    #[arg(long, num_args = 1..)]
    pub cancer_types: Option<Vec<String>>,
}

/// Purity prediction arguments
#[derive(Args, Debug)]
pub struct PurityArgs {
    #[command(flatten)]
    pub experiment: ExperimentArgs,
}

/// Comparison arguments
#[derive(Args, Debug)]
pub struct CompareArgs {
    /// Directory tree holding `*classify_metrics.tsv.gz` files
    #[arg(short, long, required = true)]
    pub results_dir: PathBuf,

    /// Compare against this results tree instead of the shuffled control
    #[arg(long)]
    pub baseline_dir: Option<PathBuf>,

    /// Metric to compare (auroc, aupr)
    #[arg(short, long, default_value = "aupr")]
    pub metric: Metric,

    /// FDR significance cutoff
    #[arg(long, default_value = "0.05")]
    pub alpha: f64,

    /// Output TSV
    #[arg(short, long, default_value = "comparison.tsv")]
    pub output: PathBuf,
}

/// Sample info arguments
#[derive(Args, Debug)]
pub struct SampleInfoArgs {
    /// Training data type whose matrix supplies the barcodes
    #[arg(short, long, default_value = "expression")]
    pub training_data: String,

    /// Sample type code table
    #[arg(long, required = true)]
    pub sample_type_codes: PathBuf,

    /// Cancer type (TSS) code table
    #[arg(long, required = true)]
    pub cancer_type_codes: PathBuf,

    /// Output directory (defaults to the configured sample info dir)
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,
}

/// Parse CLI arguments
pub fn parse_args() -> Cli {
    Cli::parse()
}

/// Setup logging based on verbosity
pub fn setup_logging(verbose: bool) {
    let filter = if verbose {
        "debug"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
