//! Result files: naming, gzipped TSV tables, model options and the skip log.

use crate::data::labels::DiseaseStats;
use crate::error::{ClassifyError, Result as ClassifyResult};
use crate::predict::SamplePrediction;
use crate::training::{
    signal_name, CoefficientRow, CvConfig, ExperimentResults, MetricsRow, PrRow, RocRow, RowMeta,
};
use crate::utils::ensure_dir;
use anyhow::{anyhow, Context, Result};
use csv::WriterBuilder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Format a float like printf `%.5g`; NaN becomes an empty field
pub fn format_float(value: f64) -> String {
    if value.is_nan() {
        return String::new();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf".into() } else { "-inf".into() };
    }
    if value == 0.0 {
        return "0".into();
    }

    let sci = format!("{:.4e}", value);
    let (mantissa, exp) = match sci.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => (sci.as_str(), 0),
    };

    if !(-4..5).contains(&exp) {
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", trim_zeros(mantissa), sign, exp.abs())
    } else {
        let decimals = (4 - exp) as usize;
        trim_zeros(&format!("{:.*}", decimals, value)).to_string()
    }
}

fn trim_zeros(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

/// A row of one of the result tables
pub trait TsvRow {
    const HEADER: &'static [&'static str];

    fn fields(&self) -> Vec<String>;
}

fn meta_fields(meta: &RowMeta) -> [String; 6] {
    [
        meta.identifier.clone(),
        meta.training_data.clone(),
        meta.signal.clone(),
        meta.seed.to_string(),
        meta.data_type.as_str().to_string(),
        meta.fold.to_string(),
    ]
}

impl TsvRow for MetricsRow {
    const HEADER: &'static [&'static str] = &[
        "auroc", "aupr", "identifier", "training_data", "signal", "seed", "data_type", "fold",
    ];

    fn fields(&self) -> Vec<String> {
        let mut out = vec![format_float(self.auroc), format_float(self.aupr)];
        out.extend(meta_fields(&self.meta));
        out
    }
}

impl TsvRow for RocRow {
    const HEADER: &'static [&'static str] = &[
        "fpr", "tpr", "threshold", "identifier", "training_data", "signal", "seed", "data_type", "fold",
    ];

    fn fields(&self) -> Vec<String> {
        let mut out = vec![
            format_float(self.fpr),
            format_float(self.tpr),
            format_float(self.threshold),
        ];
        out.extend(meta_fields(&self.meta));
        out
    }
}

impl TsvRow for PrRow {
    const HEADER: &'static [&'static str] = &[
        "precision", "recall", "threshold", "identifier", "training_data", "signal", "seed", "data_type", "fold",
    ];

    fn fields(&self) -> Vec<String> {
        let mut out = vec![
            format_float(self.precision),
            format_float(self.recall),
            format_float(self.threshold),
        ];
        out.extend(meta_fields(&self.meta));
        out
    }
}

impl TsvRow for CoefficientRow {
    const HEADER: &'static [&'static str] =
        &["feature", "weight", "abs", "signal", "seed", "fold", "identifier"];

    fn fields(&self) -> Vec<String> {
        vec![
            self.feature.clone(),
            format_float(self.weight),
            format_float(self.abs),
            self.signal.clone(),
            self.seed.to_string(),
            self.fold.to_string(),
            self.identifier.clone(),
        ]
    }
}

impl TsvRow for SamplePrediction {
    const HEADER: &'static [&'static str] =
        &["sample_id", "true_class", "score", "positive_prob", "fold"];

    fn fields(&self) -> Vec<String> {
        vec![
            self.sample_id.clone(),
            self.true_class.to_string(),
            format_float(self.score),
            format_float(self.positive_prob),
            self.fold.to_string(),
        ]
    }
}

/// Write rows to a gzip-compressed TSV with a header line
pub fn write_tsv_gz<R: TsvRow>(path: &Path, rows: &[R]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {:?}", path))?;
    let mut writer = WriterBuilder::new()
        .delimiter(b'\t')
        .from_writer(GzEncoder::new(file, Compression::default()));

    writer.write_record(R::HEADER)?;
    for row in rows {
        writer.write_record(row.fields())?;
    }
    writer.flush()?;
    writer
        .into_inner()
        .map_err(|e| anyhow!("Failed to flush {:?}: {}", path, e.error()))?
        .finish()
        .with_context(|| format!("Failed to finish gzip stream for {:?}", path))?;

    debug!("Wrote {} rows to {:?}", rows.len(), path);
    Ok(())
}

/// Build `{dir}/{args}_{kwargs}_{descriptor}{extension}`
///
/// `kwargs` are rendered as `{key}{value}`; `None` values are skipped and
/// empty sections are left out.
pub fn construct_filename(
    dir: &Path,
    descriptor: &str,
    extension: &str,
    args: &[&str],
    kwargs: &[(&str, Option<String>)],
) -> PathBuf {
    let mut parts: Vec<String> = Vec::new();
    if !args.is_empty() {
        parts.push(args.join("_"));
    }
    let kw: Vec<String> = kwargs
        .iter()
        .filter_map(|(k, v)| v.as_ref().map(|v| format!("{}{}", k, v)))
        .collect();
    if !kw.is_empty() {
        parts.push(kw.join("_"));
    }
    parts.push(format!("{}{}", descriptor, extension));
    dir.join(parts.join("_"))
}

/// Naming parameters shared by every result file of one experiment
#[derive(Debug, Clone)]
pub struct ResultFiles {
    pub dir: PathBuf,
    pub identifier: String,
    pub training_data: String,
    pub shuffle_labels: bool,
    pub seed: u64,
    /// Reduced dimension, when features were compressed
    pub n_dim: Option<usize>,
}

impl ResultFiles {
    pub fn new(dir: &Path, identifier: &str, config: &CvConfig, shuffle_labels: bool) -> Self {
        Self {
            dir: dir.to_path_buf(),
            identifier: identifier.to_string(),
            training_data: config.training_data.clone(),
            shuffle_labels,
            seed: config.seed,
            n_dim: None,
        }
    }

    /// Path of the `{descriptor}.tsv.gz` table for this experiment
    pub fn path(&self, descriptor: &str) -> PathBuf {
        construct_filename(
            &self.dir,
            descriptor,
            ".tsv.gz",
            &[&self.identifier, &self.training_data, signal_name(self.shuffle_labels)],
            &[
                ("s", Some(self.seed.to_string())),
                ("n", self.n_dim.map(|n| n.to_string())),
            ],
        )
    }
}

/// Create `{experiment_dir}/{identifier}`
pub fn make_output_dir(experiment_dir: &Path, identifier: &str) -> Result<PathBuf> {
    let dir = experiment_dir.join(identifier);
    ensure_dir(&dir)?;
    Ok(dir)
}

/// Path of the coefficients file, or `ResultsFileExists` if already written
pub fn check_output_file(files: &ResultFiles) -> ClassifyResult<PathBuf> {
    let check_file = files.path("coefficients");
    if check_file.is_file() {
        return Err(ClassifyError::results_file_exists(check_file));
    }
    Ok(check_file)
}

/// Write every result table of one experiment
pub fn save_results(files: &ResultFiles, check_file: &Path, results: &ExperimentResults) -> Result<()> {
    write_tsv_gz(check_file, &results.coefficients)?;
    write_tsv_gz(&files.path("auc_threshold_metrics"), &results.auc)?;
    write_tsv_gz(&files.path("aupr_threshold_metrics"), &results.aupr)?;
    write_tsv_gz(&files.path("classify_metrics"), &results.metrics)?;
    if let Some(preds) = &results.predictions {
        write_tsv_gz(&files.path("preds"), preds)?;
    }
    info!("Saved results for {} to {:?}", files.identifier, files.dir);
    Ok(())
}

/// Persist the CV configuration as `{training_data}_s{seed}_model_options.json`
pub fn save_model_options(dir: &Path, config: &CvConfig) -> Result<PathBuf> {
    ensure_dir(dir)?;
    let path = construct_filename(
        dir,
        "model_options",
        ".json",
        &[&config.training_data],
        &[("s", Some(config.seed.to_string()))],
    );
    let json = serde_json::to_string_pretty(config).context("Failed to serialize model options")?;
    std::fs::write(&path, json).with_context(|| format!("Failed to write {:?}", path))?;
    Ok(path)
}

/// Append-only TSV of skipped experiments
#[derive(Debug, Clone)]
pub struct SkipLog {
    path: PathBuf,
}

impl SkipLog {
    /// Open the log, writing the header if the file is new
    pub fn open(path: &Path, identifier_column: &str) -> Result<Self> {
        if let Some(parent) = path.parent() {
            ensure_dir(parent)?;
        }
        if !path.is_file() {
            let mut writer = WriterBuilder::new()
                .delimiter(b'\t')
                .from_path(path)
                .with_context(|| format!("Failed to create skip log {:?}", path))?;
            writer.write_record([identifier_column, "training_data", "shuffle_labels", "skip_reason"])?;
            writer.flush()?;
        }
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn append(
        &self,
        identifier: &str,
        training_data: &str,
        shuffle_labels: bool,
        reason: &str,
    ) -> Result<()> {
        let file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open skip log {:?}", self.path))?;
        let mut writer = WriterBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .from_writer(file);
        let shuffle = if shuffle_labels { "True" } else { "False" };
        writer.write_record([identifier, training_data, shuffle, reason])?;
        writer.flush()?;
        Ok(())
    }
}

/// Write `{gene}_filtered_cancertypes.tsv`
pub fn write_disease_stats(dir: &Path, gene: &str, stats: &[DiseaseStats]) -> Result<()> {
    ensure_dir(dir)?;
    let path = dir.join(format!("{}_filtered_cancertypes.tsv", gene));
    let mut writer = WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(&path)
        .with_context(|| format!("Failed to create {:?}", path))?;
    for row in stats {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::loader::read_table;
    use crate::model::metrics::ThresholdMetrics;
    use crate::training::FoldResult;
    use tempfile::TempDir;

    #[test]
    fn test_format_float() {
        assert_eq!(format_float(0.123456), "0.12346");
        assert_eq!(format_float(42.0), "42");
        assert_eq!(format_float(0.5), "0.5");
        assert_eq!(format_float(-3.25), "-3.25");
        assert_eq!(format_float(123456.0), "1.2346e+05");
        assert_eq!(format_float(0.00001), "1e-05");
        assert_eq!(format_float(0.0001), "0.0001");
        assert_eq!(format_float(99999.0), "99999");
        assert_eq!(format_float(0.0), "0");
        assert_eq!(format_float(f64::INFINITY), "inf");
        assert_eq!(format_float(f64::NAN), "");
    }

    #[test]
    fn test_construct_filename() {
        let dir = Path::new("out");
        assert_eq!(
            construct_filename(
                dir,
                "output",
                ".tsv",
                &["expression", "signal"],
                &[("s", Some("42".into())), ("n", Some("5000".into()))]
            ),
            PathBuf::from("out/expression_signal_s42_n5000_output.tsv")
        );
        assert_eq!(
            construct_filename(dir, "output", ".tsv", &["TP53"], &[("n", None)]),
            PathBuf::from("out/TP53_output.tsv")
        );
        assert_eq!(
            construct_filename(dir, "model_options", ".json", &[], &[("s", Some("1".into()))]),
            PathBuf::from("out/s1_model_options.json")
        );
        assert_eq!(
            construct_filename(dir, "log", ".tsv", &[], &[]),
            PathBuf::from("out/log.tsv")
        );
    }

    fn results() -> ExperimentResults {
        let metrics = ThresholdMetrics::compute(&[0, 1, 1, 0], &[0.2, 0.6, 0.9, 0.1]).unwrap();
        let mut results = ExperimentResults::default();
        results.push_fold(
            FoldResult {
                fold: 0,
                alpha: 0.1,
                l1_ratio: 0.0,
                best_score: 1.0,
                train: metrics.clone(),
                cv: metrics.clone(),
                test: metrics,
                coefficients: vec![CoefficientRow {
                    feature: "G1".into(),
                    weight: 0.123456,
                    abs: 0.123456,
                    signal: "signal".into(),
                    seed: 42,
                    fold: 0,
                    identifier: "TP53".into(),
                }],
                predictions: Vec::new(),
            },
            "TP53",
            "expression",
            "signal",
            42,
            false,
        );
        results
    }

    #[test]
    fn test_save_results_and_check_file() {
        let dir = TempDir::new().unwrap();
        let out = make_output_dir(dir.path(), "TP53").unwrap();
        let files = ResultFiles::new(&out, "TP53", &CvConfig::default(), false);

        let check_file = check_output_file(&files).unwrap();
        assert!(check_file.ends_with("TP53_expression_signal_s42_coefficients.tsv.gz"));

        save_results(&files, &check_file, &results()).unwrap();
        assert!(matches!(
            check_output_file(&files),
            Err(ClassifyError::ResultsFileExists { .. })
        ));
        assert!(!files.path("preds").exists());

        let metrics = read_table(files.path("classify_metrics")).unwrap();
        assert_eq!(metrics.headers[0], "auroc");
        assert_eq!(metrics.records.len(), 3);
        assert_eq!(&metrics.records[0][0], "1");
        assert_eq!(&metrics.records[2][6], "test");

        let coefs = read_table(&check_file).unwrap();
        assert_eq!(&coefs.records[0][1], "0.12346");

        // first ROC row carries the infinite threshold
        let auc = read_table(files.path("auc_threshold_metrics")).unwrap();
        assert_eq!(&auc.records[0][2], "inf");
    }

    #[test]
    fn test_skip_log_appends() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log_skipped.tsv");
        let log = SkipLog::open(&path, "gene").unwrap();
        log.append("TP53", "expression", false, "one_class").unwrap();

        // reopening keeps existing rows and does not repeat the header
        let log = SkipLog::open(&path, "gene").unwrap();
        log.append("KRAS", "expression", true, "file_exists").unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "gene\ttraining_data\tshuffle_labels\tskip_reason");
        assert_eq!(lines[2], "KRAS\texpression\tTrue\tfile_exists");
    }

    #[test]
    fn test_save_model_options() {
        let dir = TempDir::new().unwrap();
        let path = save_model_options(dir.path(), &CvConfig::default()).unwrap();
        assert!(path.ends_with("expression_s42_model_options.json"));
        let parsed: CvConfig = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed.seed, 42);
    }
}
