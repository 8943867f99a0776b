//! Label construction: binary status vectors for mutation, cancer type and
//! purity experiments, with cancer-type balance and mutation burden filters.

use crate::data::{FeatureMatrix, StatusRecord, StatusTable};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

/// Thresholds applied while building labels
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LabelFilter {
    /// Cancer types need strictly more positives than this
    pub filter_count: usize,
    /// Cancer types need a strictly larger positive proportion than this
    pub filter_prop: f64,
    /// Samples with log10 burden >= hyper_filter * std are dropped
    pub hyper_filter: f64,
}

impl Default for LabelFilter {
    fn default() -> Self {
        Self {
            filter_count: 15,
            filter_prop: 0.05,
            hyper_filter: 5.0,
        }
    }
}

/// Which copy number calls count toward a gene's status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyNumberRule {
    /// Oncogenes: copy gain counts as an alteration
    Gain,
    /// Tumor suppressors: copy loss counts as an alteration
    Loss,
    /// Point mutations only
    MutationOnly,
}

impl CopyNumberRule {
    pub fn from_classification(classification: &str) -> Self {
        match classification {
            "Oncogene" => Self::Gain,
            "TSG" => Self::Loss,
            _ => Self::MutationOnly,
        }
    }
}

/// Per-cancer-type positive counts and whether the type is kept
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiseaseStats {
    #[serde(rename = "DISEASE")]
    pub disease: String,
    #[serde(rename = "status_count")]
    pub count: usize,
    #[serde(rename = "status_proportion")]
    pub proportion: f64,
    #[serde(rename = "disease_included")]
    pub included: bool,
}

/// Output of the mutation label builder
#[derive(Debug, Clone)]
pub struct MutationLabels {
    pub table: StatusTable,
    pub disease_stats: Vec<DiseaseStats>,
}

/// Counts of negative/positive samples for a one-vs-rest label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub negatives: usize,
    pub positives: usize,
}

impl StatusCounts {
    pub fn from_table(table: &StatusTable) -> Self {
        let positives = table.positive_count();
        Self {
            negatives: table.len() - positives,
            positives,
        }
    }
}

/// Sample standard deviation (ddof = 1); NaN for fewer than two values
pub fn sample_std(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return f64::NAN;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let ss = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>();
    (ss / (n - 1) as f64).sqrt()
}

/// Drop samples at or above `cutoff` log10 mutation burden
fn apply_burden_cutoff(records: Vec<StatusRecord>, cutoff: f64) -> Vec<StatusRecord> {
    let before = records.len();
    let kept: Vec<StatusRecord> = records
        .into_iter()
        .filter(|r| r.log10_mut < cutoff)
        .collect();
    debug!(
        "Burden filter (cutoff {:.3}) kept {}/{} samples",
        cutoff,
        kept.len(),
        before
    );
    kept
}

/// Drop samples whose mutation burden is an outlier among `records`
fn burden_filter(records: Vec<StatusRecord>, hyper_filter: f64) -> Vec<StatusRecord> {
    let burdens: Vec<f64> = records.iter().map(|r| r.log10_mut).collect();
    let cutoff = hyper_filter * sample_std(&burdens);
    apply_burden_cutoff(records, cutoff)
}

fn lookup(matrix: &FeatureMatrix, gene: &str) -> Option<usize> {
    matrix.features.iter().position(|f| f == gene)
}

/// Combine mutation and copy number calls for `gene` and filter cancer types
///
/// `copy` is the gain or loss matrix selected by the gene's
/// [`CopyNumberRule`]; pass `None` for mutation-only genes. Samples without a
/// copy call are treated as unaltered.
pub fn process_y_matrix(
    mutations: &FeatureMatrix,
    copy: Option<&FeatureMatrix>,
    gene: &str,
    sample_freeze: &[(String, String)],
    mutation_burden: &HashMap<String, f64>,
    filter: &LabelFilter,
) -> Result<MutationLabels> {
    let mut_col = lookup(mutations, gene)
        .with_context(|| format!("Gene {} not found in mutation data", gene))?;
    let copy_lookup = match copy {
        Some(matrix) => {
            let col = lookup(matrix, gene)
                .with_context(|| format!("Gene {} not found in copy number data", gene))?;
            Some((matrix.sample_index(), matrix, col))
        }
        None => None,
    };

    let freeze: HashMap<&str, &str> = sample_freeze
        .iter()
        .map(|(s, d)| (s.as_str(), d.as_str()))
        .collect();

    // the burden cutoff covers every profiled sample, with or without a freeze entry
    let cohort_burdens: Vec<f64> = mutations
        .samples
        .iter()
        .filter_map(|s| mutation_burden.get(s).copied())
        .collect();
    let cutoff = filter.hyper_filter * sample_std(&cohort_burdens);

    let mut records = Vec::new();
    for (i, sample) in mutations.samples.iter().enumerate() {
        let mutated = mutations.values[[i, mut_col]];
        let mut value = if mutated.is_nan() { 0.0 } else { mutated };
        if let Some((index, matrix, col)) = &copy_lookup {
            if let Some(&row) = index.get(sample.as_str()) {
                let copied = matrix.values[[row, *col]];
                if !copied.is_nan() {
                    value += copied;
                }
            }
        }
        let status = if value >= 1.0 { 1 } else { 0 };

        let (Some(disease), Some(&log10_mut)) =
            (freeze.get(sample.as_str()), mutation_burden.get(sample))
        else {
            continue;
        };
        records.push(StatusRecord {
            sample_id: sample.clone(),
            status,
            disease: disease.to_string(),
            log10_mut,
        });
    }

    let disease_stats = disease_statistics(&records, filter);
    let included: Vec<&str> = disease_stats
        .iter()
        .filter(|d| d.included)
        .map(|d| d.disease.as_str())
        .collect();

    let records = apply_burden_cutoff(records, cutoff)
        .into_iter()
        .filter(|r| included.contains(&r.disease.as_str()))
        .collect::<Vec<_>>();

    info!(
        "{}: {} samples in {} cancer types, {} positives",
        gene,
        records.len(),
        included.len(),
        records.iter().filter(|r| r.status == 1).count()
    );

    Ok(MutationLabels {
        table: StatusTable::new(records),
        disease_stats,
    })
}

fn disease_statistics(records: &[StatusRecord], filter: &LabelFilter) -> Vec<DiseaseStats> {
    let mut counts: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
    for r in records {
        let entry = counts.entry(r.disease.as_str()).or_default();
        entry.0 += r.status as usize;
        entry.1 += 1;
    }

    counts
        .into_iter()
        .map(|(disease, (positives, total))| {
            let proportion = positives as f64 / total as f64;
            DiseaseStats {
                disease: disease.to_string(),
                count: positives,
                proportion,
                included: positives > filter.filter_count && proportion > filter.filter_prop,
            }
        })
        .collect()
}

/// One-vs-rest labels for membership in cancer type `acronym`
pub fn process_y_matrix_cancertype(
    acronym: &str,
    sample_freeze: &[(String, String)],
    mutation_burden: &HashMap<String, f64>,
    hyper_filter: f64,
) -> (StatusTable, StatusCounts) {
    let records = sample_freeze
        .iter()
        .filter_map(|(sample, disease)| {
            let &log10_mut = mutation_burden.get(sample)?;
            Some(StatusRecord {
                sample_id: sample.clone(),
                status: (disease == acronym) as u8,
                disease: disease.clone(),
                log10_mut,
            })
        })
        .collect();

    let table = StatusTable::new(burden_filter(records, hyper_filter));
    let counts = StatusCounts::from_table(&table);
    (table, counts)
}

/// Binarized purity labels: 1 when purity exceeds the cohort median
pub fn process_y_matrix_purity(
    purity: &[(String, f64)],
    sample_info: &crate::data::SampleInfoTable,
    mutation_burden: &HashMap<String, f64>,
    hyper_filter: f64,
) -> Result<StatusTable> {
    if purity.is_empty() {
        anyhow::bail!("No purity values loaded");
    }
    let median = crate::utils::median(purity.iter().map(|(_, p)| *p).collect());

    let records = purity
        .iter()
        .filter_map(|(sample, value)| {
            let info = sample_info.get(sample)?;
            let &log10_mut = mutation_burden.get(sample)?;
            Some(StatusRecord {
                sample_id: sample.clone(),
                status: (*value > median) as u8,
                disease: info.cancer_type.clone(),
                log10_mut,
            })
        })
        .collect();

    let table = StatusTable::new(burden_filter(records, hyper_filter));
    info!(
        "Purity labels: median {:.3}, {} samples, {} above median",
        median,
        table.len(),
        table.positive_count()
    );
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{SampleInfo, SampleInfoTable};
    use approx::assert_relative_eq;
    use ndarray::Array2;

    fn cohort() -> (FeatureMatrix, FeatureMatrix, Vec<(String, String)>, HashMap<String, f64>) {
        // 40 samples: 20 BRCA, 20 LUAD. TP53 mutated in 18 BRCA and 2 LUAD.
        let samples: Vec<String> = (0..40).map(|i| format!("S{:02}", i)).collect();
        let mut_values: Vec<f64> = (0..40)
            .map(|i| if i < 18 || i == 20 || i == 21 { 1.0 } else { 0.0 })
            .collect();
        let mutations = FeatureMatrix::new(
            samples.clone(),
            vec!["TP53".into()],
            Array2::from_shape_vec((40, 1), mut_values).unwrap(),
        )
        .unwrap();

        // copy loss on S00 (already mutated) and S22
        let copy_values: Vec<f64> = (0..40).map(|i| if i == 0 || i == 22 { 1.0 } else { 0.0 }).collect();
        let copy = FeatureMatrix::new(
            samples.clone(),
            vec!["TP53".into()],
            Array2::from_shape_vec((40, 1), copy_values).unwrap(),
        )
        .unwrap();

        let freeze = samples
            .iter()
            .enumerate()
            .map(|(i, s)| (s.clone(), if i < 20 { "BRCA" } else { "LUAD" }.to_string()))
            .collect();
        let burden = samples
            .iter()
            .enumerate()
            .map(|(i, s)| (s.clone(), (i % 5) as f64 * 0.1))
            .collect();
        (mutations, copy, freeze, burden)
    }

    #[test]
    fn test_copy_number_rule() {
        assert_eq!(CopyNumberRule::from_classification("Oncogene"), CopyNumberRule::Gain);
        assert_eq!(CopyNumberRule::from_classification("TSG"), CopyNumberRule::Loss);
        assert_eq!(
            CopyNumberRule::from_classification("Oncogene, TSG"),
            CopyNumberRule::MutationOnly
        );
    }

    #[test]
    fn test_sample_std() {
        assert_relative_eq!(sample_std(&[1.0, 2.0, 3.0, 4.0]), 1.2909944487358056, epsilon = 1e-12);
        assert!(sample_std(&[1.0]).is_nan());
    }

    #[test]
    fn test_process_y_matrix_filters_cancer_types() {
        let (mutations, copy, freeze, burden) = cohort();
        let filter = LabelFilter { filter_count: 5, filter_prop: 0.05, hyper_filter: 5.0 };

        let labels =
            process_y_matrix(&mutations, Some(&copy), "TP53", &freeze, &burden, &filter).unwrap();

        assert_eq!(labels.disease_stats.len(), 2);
        let brca = &labels.disease_stats[0];
        assert_eq!(brca.disease, "BRCA");
        assert_eq!(brca.count, 18);
        assert!(brca.included);
        let luad = &labels.disease_stats[1];
        assert_eq!(luad.count, 3); // 2 mutations + 1 copy loss
        assert!(!luad.included);

        assert_eq!(labels.table.len(), 20);
        assert!(labels.table.records.iter().all(|r| r.disease == "BRCA"));
        // S00 has both a mutation and a copy loss, status is clipped to 1
        assert_eq!(labels.table.records[0].status, 1);
    }

    #[test]
    fn test_missing_gene_is_error() {
        let (mutations, _, freeze, burden) = cohort();
        let result = process_y_matrix(&mutations, None, "KRAS", &freeze, &burden, &LabelFilter::default());
        assert!(result.is_err());
    }

    #[test]
    fn test_burden_outlier_removed() {
        let (_, _, freeze, mut burden) = cohort();
        burden.insert("S05".to_string(), 1000.0);

        let (table, counts) = process_y_matrix_cancertype("BRCA", &freeze, &burden, 5.0);
        // the outlier inflates the std but still exceeds 5 * std
        assert!(table.records.iter().all(|r| r.sample_id != "S05"));
        assert_eq!(counts.positives, 19);
        assert_eq!(counts.negatives, 20);
    }

    #[test]
    fn test_purity_labels() {
        let purity = vec![
            ("A".to_string(), 0.2),
            ("B".to_string(), 0.5),
            ("C".to_string(), 0.9),
            ("D".to_string(), 0.7),
        ];
        let info = SampleInfoTable::new(
            ["A", "B", "C", "D"]
                .iter()
                .map(|s| SampleInfo::new(s.to_string(), "Primary Solid Tumor".into(), "BRCA".into()))
                .collect(),
        );
        let burden: HashMap<String, f64> =
            ["A", "B", "C", "D"].iter().map(|s| (s.to_string(), 1.0)).collect();

        let table = process_y_matrix_purity(&purity, &info, &burden, 5.0).unwrap();
        // std of identical burdens is 0, so the cutoff removes everything
        assert!(table.is_empty());

        let burden: HashMap<String, f64> = [("A", 1.0), ("B", 1.2), ("C", 1.1), ("D", 0.9)]
            .iter()
            .map(|(s, b)| (s.to_string(), *b))
            .collect();
        let table = process_y_matrix_purity(&purity, &info, &burden, 100.0).unwrap();
        assert_eq!(table.statuses(), vec![0, 0, 1, 1]);
    }

    #[test]
    fn test_burden_cutoff_counts_samples_outside_freeze() {
        let samples: Vec<String> = (0..6).map(|i| format!("S{}", i)).collect();
        let mutations = FeatureMatrix::new(
            samples.clone(),
            vec!["TP53".into()],
            Array2::from_shape_vec((6, 1), vec![1.0, 0.0, 1.0, 0.0, 1.0, 0.0]).unwrap(),
        )
        .unwrap();
        // S5 has a burden but no freeze entry
        let freeze: Vec<(String, String)> =
            samples[..5].iter().map(|s| (s.clone(), "BRCA".to_string())).collect();
        let burden: HashMap<String, f64> = samples
            .iter()
            .cloned()
            .zip([0.0, 0.0, 0.0, 0.0, 1.0, 3.0])
            .collect();
        let filter = LabelFilter { filter_count: 0, filter_prop: 0.0, hyper_filter: 2.0 };

        let labels = process_y_matrix(&mutations, None, "TP53", &freeze, &burden, &filter).unwrap();
        // over the five frozen samples alone the cutoff would be 0.89 and drop S4
        assert_eq!(labels.table.sample_ids(), samples[..5].to_vec());
    }
}
