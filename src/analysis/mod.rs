//! Post-hoc comparison of saved classification metrics: signal vs shuffled
//! control and one data type vs another, with FDR correction.

use crate::data::loader::read_table;
use crate::training::{DataType, MetricsRow, RowMeta};
use anyhow::{Context, Result};
use csv::WriterBuilder;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, StudentsT};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

const METRICS_SUFFIX: &str = "classify_metrics.tsv.gz";

/// Which summary metric to compare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Auroc,
    Aupr,
}

impl Metric {
    pub fn of(&self, row: &MetricsRow) -> f64 {
        match self {
            Metric::Auroc => row.auroc,
            Metric::Aupr => row.aupr,
        }
    }
}

impl FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auroc" => Ok(Metric::Auroc),
            "aupr" => Ok(Metric::Aupr),
            other => Err(format!("unknown metric {:?} (expected auroc or aupr)", other)),
        }
    }
}

/// One identifier's comparison result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonRow {
    pub identifier: String,
    pub delta_mean: f64,
    pub p_value: f64,
    pub corr_pval: f64,
    pub reject_null: bool,
    pub training_data: String,
}

fn parse_data_type(s: &str) -> Result<DataType> {
    match s {
        "train" => Ok(DataType::Train),
        "cv" => Ok(DataType::Cv),
        "test" => Ok(DataType::Test),
        other => Err(anyhow::anyhow!("Unknown data_type {:?}", other)),
    }
}

fn read_metrics_file(path: &Path) -> Result<Vec<MetricsRow>> {
    let table = read_table(path)?;
    let cols = [
        "auroc", "aupr", "identifier", "training_data", "signal", "seed", "data_type", "fold",
    ]
    .map(|c| table.column(c));
    let [auroc, aupr, identifier, training_data, signal, seed, data_type, fold] = cols;
    let (auroc, aupr, identifier, training_data) = (auroc?, aupr?, identifier?, training_data?);
    let (signal, seed, data_type, fold) = (signal?, seed?, data_type?, fold?);

    let float = |s: &str| s.trim().parse::<f64>().unwrap_or(f64::NAN);
    table
        .records
        .iter()
        .map(|r| {
            let field = |i: usize| r.get(i).unwrap_or("");
            Ok(MetricsRow {
                auroc: float(field(auroc)),
                aupr: float(field(aupr)),
                meta: RowMeta {
                    identifier: field(identifier).to_string(),
                    training_data: field(training_data).to_string(),
                    signal: field(signal).to_string(),
                    seed: field(seed).parse().with_context(|| format!("Bad seed in {:?}", path))?,
                    data_type: parse_data_type(field(data_type))?,
                    fold: field(fold).parse().with_context(|| format!("Bad fold in {:?}", path))?,
                },
            })
        })
        .collect()
}

/// Read every `*classify_metrics.tsv.gz` below `dir`
pub fn load_prediction_results(dir: &Path) -> Result<Vec<MetricsRow>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir) {
        let entry = entry.with_context(|| format!("Failed to walk {:?}", dir))?;
        let is_metrics = entry
            .file_name()
            .to_str()
            .is_some_and(|n| n.ends_with(METRICS_SUFFIX));
        if entry.file_type().is_file() && is_metrics {
            files.push(entry.into_path());
        }
    }
    files.sort();

    let mut rows = Vec::new();
    for file in &files {
        rows.extend(read_metrics_file(file)?);
    }
    info!("Loaded {} metric rows from {} files", rows.len(), files.len());
    Ok(rows)
}

/// Two-sided paired t-test on differences `d`
fn paired_t_test(d: &[f64]) -> f64 {
    let n = d.len() as f64;
    if d.len() < 2 {
        return f64::NAN;
    }
    let mean = d.iter().sum::<f64>() / n;
    let var = d.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);
    if var == 0.0 {
        return if mean == 0.0 { 1.0 } else { 0.0 };
    }
    let t = mean / (var / n).sqrt();
    match StudentsT::new(0.0, 1.0, n - 1.0) {
        Ok(dist) => 2.0 * (1.0 - dist.cdf(t.abs())),
        Err(_) => f64::NAN,
    }
}

/// Test-set metric values keyed on (seed, fold)
fn by_seed_fold<'a>(
    rows: impl Iterator<Item = &'a MetricsRow>,
    metric: Metric,
) -> BTreeMap<(u64, usize), f64> {
    rows.map(|r| ((r.meta.seed, r.meta.fold), metric.of(r))).collect()
}

/// Mean paired difference `b - a` and its p-value, `None` when unmatched
fn compare_paired(
    identifier: &str,
    a: &BTreeMap<(u64, usize), f64>,
    b: &BTreeMap<(u64, usize), f64>,
) -> Option<(f64, f64)> {
    if a.is_empty() || a.len() != b.len() || !a.keys().eq(b.keys()) {
        debug!(
            "Skipping {}: {} vs {} matched rows",
            identifier,
            a.len(),
            b.len()
        );
        return None;
    }
    let deltas: Vec<f64> = a.iter().map(|(k, va)| b[k] - va).collect();
    if deltas.iter().all(|&d| d == 0.0) {
        return Some((0.0, 1.0));
    }
    let delta_mean = deltas.iter().sum::<f64>() / deltas.len() as f64;
    Some((delta_mean, paired_t_test(&deltas)))
}

fn test_rows<'a>(results: &'a [MetricsRow], identifier: &'a str, signal: &'a str) -> impl Iterator<Item = &'a MetricsRow> {
    results.iter().filter(move |r| {
        r.meta.data_type == DataType::Test && r.meta.identifier == identifier && r.meta.signal == signal
    })
}

fn identifiers(results: &[MetricsRow]) -> BTreeSet<&str> {
    results.iter().map(|r| r.meta.identifier.as_str()).collect()
}

/// Signal vs shuffled-label control for every identifier
///
/// `delta_mean` is `signal - shuffled`. Identifiers whose signal and
/// shuffled rows don't pair up on (seed, fold) are left out.
pub fn compare_control(results: &[MetricsRow], metric: Metric) -> Vec<ComparisonRow> {
    let mut out = Vec::new();
    for identifier in identifiers(results) {
        let signal = by_seed_fold(test_rows(results, identifier, "signal"), metric);
        let shuffled = by_seed_fold(test_rows(results, identifier, "shuffled"), metric);
        let training_data = test_rows(results, identifier, "signal")
            .next()
            .map(|r| r.meta.training_data.clone())
            .unwrap_or_default();
        if let Some((delta_mean, p_value)) = compare_paired(identifier, &shuffled, &signal) {
            out.push(ComparisonRow {
                identifier: identifier.to_string(),
                delta_mean,
                p_value,
                corr_pval: p_value,
                reject_null: false,
                training_data,
            });
        }
    }
    out
}

/// Signal results of `other` vs `baseline`, `delta_mean = other - baseline`
pub fn compare_experiment(
    baseline: &[MetricsRow],
    other: &[MetricsRow],
    metric: Metric,
) -> Vec<ComparisonRow> {
    let other_ids = identifiers(other);
    let mut out = Vec::new();
    for identifier in identifiers(baseline).intersection(&other_ids) {
        let a = by_seed_fold(test_rows(baseline, identifier, "signal"), metric);
        let b = by_seed_fold(test_rows(other, identifier, "signal"), metric);
        let training_data = test_rows(other, identifier, "signal")
            .next()
            .map(|r| r.meta.training_data.clone())
            .unwrap_or_default();
        if let Some((delta_mean, p_value)) = compare_paired(identifier, &a, &b) {
            out.push(ComparisonRow {
                identifier: identifier.to_string(),
                delta_mean,
                p_value,
                corr_pval: p_value,
                reject_null: false,
                training_data,
            });
        }
    }
    out
}

/// Benjamini-Hochberg adjusted p-values and rejection flags at `alpha`
///
/// NaN p-values are ignored in the ranking and never rejected.
pub fn benjamini_hochberg(p_values: &[f64], alpha: f64) -> (Vec<f64>, Vec<bool>) {
    let mut order: Vec<usize> = (0..p_values.len()).filter(|&i| !p_values[i].is_nan()).collect();
    order.sort_by(|&a, &b| p_values[a].total_cmp(&p_values[b]));
    let m = order.len() as f64;

    let mut adjusted = vec![f64::NAN; p_values.len()];
    let mut running_min = 1.0f64;
    for (rank, &i) in order.iter().enumerate().rev() {
        let value = (p_values[i] * m / (rank + 1) as f64).min(1.0);
        running_min = running_min.min(value);
        adjusted[i] = running_min;
    }
    let reject = adjusted.iter().map(|&p| !p.is_nan() && p <= alpha).collect();
    (adjusted, reject)
}

/// Fill `corr_pval` and `reject_null` in place
pub fn apply_correction(rows: &mut [ComparisonRow], alpha: f64) {
    let p: Vec<f64> = rows.iter().map(|r| r.p_value).collect();
    let (adjusted, reject) = benjamini_hochberg(&p, alpha);
    for ((row, corr), rej) in rows.iter_mut().zip(adjusted).zip(reject) {
        row.corr_pval = corr;
        row.reject_null = rej;
    }
}

/// Control comparison per training data type, FDR-corrected within each
pub fn compare_all_control(results: &[MetricsRow], metric: Metric, alpha: f64) -> Vec<ComparisonRow> {
    let data_types: BTreeSet<&str> = results.iter().map(|r| r.meta.training_data.as_str()).collect();
    let mut out = Vec::new();
    for data_type in data_types {
        let subset: Vec<MetricsRow> = results
            .iter()
            .filter(|r| r.meta.training_data == data_type)
            .cloned()
            .collect();
        let mut rows = compare_control(&subset, metric);
        if rows.is_empty() {
            warn!("No comparable identifiers for {}", data_type);
        }
        apply_correction(&mut rows, alpha);
        out.extend(rows);
    }
    out
}

/// Write comparisons as a plain TSV
pub fn write_comparisons(path: &Path, rows: &[ComparisonRow]) -> Result<()> {
    if let Some(parent) = path.parent() {
        crate::utils::ensure_dir(parent)?;
    }
    let mut writer = WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(path)
        .with_context(|| format!("Failed to create {:?}", path))?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    info!("Wrote {} comparisons to {:?}", rows.len(), path);
    Ok(())
}
