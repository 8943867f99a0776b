use anyhow::{bail, Context, Result};
use mpmp::analysis;
use mpmp::cli::runner::run_identifiers;
use mpmp::cli::{
    parse_args, setup_logging, CancerTypeArgs, Commands, CompareArgs, ExperimentArgs, MutationArgs,
    PurityArgs, SampleInfoArgs,
};
use mpmp::config::PipelineConfig;
use mpmp::data::loader::{read_code_table, read_gene_list, read_sample_ids};
use mpmp::data::sample_info::{build_sample_info, write_sample_info};
use mpmp::data::tcga::TcgaDataModel;
use mpmp::output::{
    check_output_file, make_output_dir, save_model_options, save_results, ResultFiles, SkipLog,
};
use mpmp::training::callbacks::CallbackManager;
use mpmp::training::trainer::run_cv_stratified;
use mpmp::training::{CvConfig, Scoring};
use mpmp::utils::{ensure_dir, format_number};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// Columns of the sample type code table
const SAMPLE_TYPE_COLUMNS: (&str, &str) = ("Code", "Definition");

/// Columns of the TSS code table
const CANCER_TYPE_COLUMNS: (&str, &str) = ("TSS Code", "acronym");

fn main() {
    let cli = parse_args();

    setup_logging(cli.verbose);

    info!("{}", mpmp::info());

    let result = PipelineConfig::load(cli.config.as_deref()).and_then(|config| match cli.command {
        Commands::Mutation(args) => run_mutation(config, args),
        Commands::CancerType(args) => run_cancer_type(config, args),
        Commands::Purity(args) => run_purity(config, args),
        Commands::Compare(args) => run_compare(args),
        Commands::SampleInfo(args) => run_sample_info(config, args),
    });

    if let Err(e) = result {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

/// Directories, CV settings and skip log for one kind of experiment
struct RunContext {
    experiment_dir: PathBuf,
    cv_config: CvConfig,
    skip_log: SkipLog,
}

impl RunContext {
    fn new(
        config: &PipelineConfig,
        args: &ExperimentArgs,
        experiment: &str,
        identifier_column: &str,
    ) -> Result<Self> {
        let mut cv_config = CvConfig::from_pipeline(config, &args.training_data);
        cv_config.num_folds = args.num_folds;
        cv_config.save_predictions = args.output_preds;
        cv_config.subsample_to_smallest = args.subsample_to_smallest;
        if let Some(seed) = args.seed {
            cv_config.seed = seed;
        }
        if let Some(n) = args.subset_mad_genes {
            cv_config.subset_mad_genes = n;
        }
        if args.average_precision {
            cv_config.scoring = Scoring::AveragePrecision;
        }

        let results_dir = args
            .results_dir
            .clone()
            .unwrap_or_else(|| config.results_dir.clone());
        let experiment_dir = results_dir.join(experiment);
        ensure_dir(&experiment_dir)?;
        let options = save_model_options(&experiment_dir, &cv_config)?;
        info!("Model options saved to {:?}", options);

        let log_file = args
            .log_file
            .clone()
            .unwrap_or_else(|| results_dir.join("log_skipped.tsv"));
        let skip_log = SkipLog::open(&log_file, identifier_column)?;

        Ok(Self {
            experiment_dir,
            cv_config,
            skip_log,
        })
    }

    fn load_data_model(&self, config: &PipelineConfig) -> Result<TcgaDataModel> {
        TcgaDataModel::load(config, &self.cv_config.training_data, self.cv_config.seed)
    }

    /// Run `experiment` for every identifier, real labels first then shuffled
    fn run_all<F>(&self, label: &str, identifiers: &[String], experiment: F) -> Result<()>
    where
        F: FnMut(&str, bool) -> Result<()>,
    {
        run_identifiers(
            &self.skip_log,
            &self.cv_config.training_data,
            label,
            identifiers,
            experiment,
        )
    }

    /// Check for existing results, run CV and save; nothing is written on failure
    fn run_one<F>(
        &self,
        data_model: &mut TcgaDataModel,
        callbacks: &mut CallbackManager,
        identifier: &str,
        shuffle_labels: bool,
        build: F,
    ) -> Result<()>
    where
        F: FnOnce(&mut TcgaDataModel, &Path) -> Result<mpmp::ExperimentData>,
    {
        let output_dir = make_output_dir(&self.experiment_dir, identifier)?;
        let files = ResultFiles::new(&output_dir, identifier, &self.cv_config, shuffle_labels);
        let check_file = check_output_file(&files)?;

        let experiment = build(data_model, &output_dir)?;
        let results = run_cv_stratified(data_model, &experiment, &self.cv_config, callbacks)?;
        save_results(&files, &check_file, &results)
    }
}

fn run_mutation(config: PipelineConfig, args: MutationArgs) -> Result<()> {
    let ctx = RunContext::new(&config, &args.experiment, "gene", "gene")?;

    let gene_list = read_gene_list(&config.gene_list)
        .with_context(|| format!("Failed to load gene list from {:?}", config.gene_list))?;
    let classifications: HashMap<String, String> = gene_list
        .into_iter()
        .map(|g| (g.gene, g.classification))
        .collect();

    let genes: Vec<String> = match &args.genes {
        Some(requested) => {
            let missing: Vec<&String> = requested
                .iter()
                .filter(|g| !classifications.contains_key(*g))
                .collect();
            if !missing.is_empty() {
                bail!("Genes not in gene list: {:?}", missing);
            }
            requested.clone()
        }
        None => {
            let mut all: Vec<String> = classifications.keys().cloned().collect();
            all.sort();
            all
        }
    };
    info!("Running mutation prediction for {} genes", format_number(genes.len()));

    let mut data_model = ctx.load_data_model(&config)?;
    let mut callbacks = CallbackManager::with_defaults();

    ctx.run_all("gene", &genes, |gene, shuffle_labels| {
        let classification = classifications.get(gene).map(String::as_str).unwrap_or_default();
        ctx.run_one(&mut data_model, &mut callbacks, gene, shuffle_labels, |model, dir| {
            model.process_data_for_gene(gene, classification, Some(dir), shuffle_labels)
        })
    })
}

fn run_cancer_type(config: PipelineConfig, args: CancerTypeArgs) -> Result<()> {
    let ctx = RunContext::new(&config, &args.experiment, "cancer_type", "cancer_type")?;
    let mut data_model = ctx.load_data_model(&config)?;

    let available = data_model.sample_info.cancer_types();
    let cancer_types = match &args.cancer_types {
        Some(requested) => {
            let missing: Vec<&String> = requested.iter().filter(|c| !available.contains(c)).collect();
            if !missing.is_empty() {
                bail!("Cancer types not present in TCGA: {:?}", missing);
            }
            requested.clone()
        }
        None => available,
    };
    info!("Running cancer type prediction for {} cancer types", cancer_types.len());

    let mut callbacks = CallbackManager::with_defaults();
    ctx.run_all("cancer type", &cancer_types, |cancer_type, shuffle_labels| {
        ctx.run_one(&mut data_model, &mut callbacks, cancer_type, shuffle_labels, |model, _| {
            let (experiment, counts) = model.process_data_for_cancer_type(cancer_type, shuffle_labels)?;
            info!(
                "{}: {} positive / {} negative samples",
                cancer_type, counts.positives, counts.negatives
            );
            Ok(experiment)
        })
    })
}

fn run_purity(config: PipelineConfig, args: PurityArgs) -> Result<()> {
    let ctx = RunContext::new(&config, &args.experiment, "purity", "identifier")?;
    let mut data_model = ctx.load_data_model(&config)?;
    let mut callbacks = CallbackManager::with_defaults();

    ctx.run_all("purity", &["purity".to_string()], |identifier, shuffle_labels| {
        ctx.run_one(&mut data_model, &mut callbacks, identifier, shuffle_labels, |model, _| {
            model.process_purity_data(shuffle_labels)
        })
    })
}

fn run_compare(args: CompareArgs) -> Result<()> {
    info!("Loading results from {:?}", args.results_dir);
    let results = analysis::load_prediction_results(&args.results_dir)?;
    if results.is_empty() {
        bail!("No classify_metrics files found under {:?}", args.results_dir);
    }

    let comparisons = match &args.baseline_dir {
        Some(baseline_dir) => {
            let baseline = analysis::load_prediction_results(baseline_dir)?;
            let mut rows = analysis::compare_experiment(&baseline, &results, args.metric);
            analysis::apply_correction(&mut rows, args.alpha);
            rows
        }
        None => analysis::compare_all_control(&results, args.metric, args.alpha),
    };

    let rejected = comparisons.iter().filter(|r| r.reject_null).count();
    info!(
        "{} identifiers compared, {} significant at FDR {}",
        comparisons.len(),
        rejected,
        args.alpha
    );
    analysis::write_comparisons(&args.output, &comparisons)
}

fn run_sample_info(config: PipelineConfig, args: SampleInfoArgs) -> Result<()> {
    let data_file = config.data_file(&args.training_data)?;
    let sample_ids = read_sample_ids(data_file)?;
    info!("Read {} sample ids from {:?}", format_number(sample_ids.len()), data_file);

    let sample_types = read_code_table(&args.sample_type_codes, SAMPLE_TYPE_COLUMNS.0, SAMPLE_TYPE_COLUMNS.1)?;
    let cancer_types = read_code_table(&args.cancer_type_codes, CANCER_TYPE_COLUMNS.0, CANCER_TYPE_COLUMNS.1)?;

    let table = build_sample_info(&sample_ids, &sample_types, &cancer_types);
    let output_dir = args.output_dir.unwrap_or_else(|| config.sample_info_dir.clone());
    write_sample_info(&output_dir, &args.training_data, &table)?;
    Ok(())
}
