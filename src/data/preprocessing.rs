use crate::data::{FeatureMatrix, SampleInfoTable, StatusTable, MUTATION_COVARIATE};
use crate::error::{ClassifyError, Result};
use crate::utils::random::seeded_rng;
use ndarray::Array2;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Per-column statistics over the gene features of a matrix
///
/// NaN cells are skipped. `stds` is the population standard deviation and
/// `mads` the mean absolute deviation around the mean.
#[derive(Debug, Clone)]
pub struct FeatureStats {
    /// Column index in the source matrix
    pub columns: Vec<usize>,
    /// Mean value for each gene feature
    pub means: Vec<f64>,
    /// Standard deviation (ddof = 0) for each gene feature
    pub stds: Vec<f64>,
    /// Mean absolute deviation for each gene feature
    pub mads: Vec<f64>,
}

impl FeatureStats {
    /// Compute statistics for every gene feature column
    pub fn compute(matrix: &FeatureMatrix) -> Self {
        let columns: Vec<usize> = matrix
            .gene_features
            .iter()
            .enumerate()
            .filter(|(_, &g)| g)
            .map(|(j, _)| j)
            .collect();

        let mut means = Vec::with_capacity(columns.len());
        let mut stds = Vec::with_capacity(columns.len());
        let mut mads = Vec::with_capacity(columns.len());

        for &j in &columns {
            let values: Vec<f64> = matrix
                .values
                .column(j)
                .iter()
                .copied()
                .filter(|v| !v.is_nan())
                .collect();
            if values.is_empty() {
                means.push(f64::NAN);
                stds.push(f64::NAN);
                mads.push(f64::NAN);
                continue;
            }
            let n = values.len() as f64;
            let mean = values.iter().sum::<f64>() / n;
            let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
            let mad = values.iter().map(|v| (v - mean).abs()).sum::<f64>() / n;
            means.push(mean);
            stds.push(var.sqrt());
            mads.push(mad);
        }

        Self {
            columns,
            means,
            stds,
            mads,
        }
    }
}

/// Aligned features and labels
#[derive(Debug, Clone)]
pub struct AlignedData {
    /// Samples present in both inputs, in label order
    pub samples: Vec<String>,
    pub x: FeatureMatrix,
    pub y: StatusTable,
}

/// Restrict features and labels to shared samples and append covariates
///
/// Samples follow the label table's order. Covariates are flagged as
/// non-gene features: one-hot cancer type columns (sorted by name) and the
/// log10 mutation burden.
pub fn align_matrices(
    x: &FeatureMatrix,
    y: &StatusTable,
    add_cancertype_covariate: bool,
    add_mutation_covariate: bool,
) -> Result<AlignedData> {
    let x_index = x.sample_index();
    let samples: Vec<String> = y
        .sample_ids()
        .into_iter()
        .filter(|s| x_index.contains_key(s.as_str()))
        .collect();

    let mut x_aligned = x.reindex(&samples);
    let y_aligned = y.reindex(&samples);

    if add_cancertype_covariate {
        let diseases = y_aligned.diseases();
        let mut one_hot = Array2::<f64>::zeros((samples.len(), diseases.len()));
        for (i, record) in y_aligned.records.iter().enumerate() {
            if let Ok(j) = diseases.binary_search(&record.disease) {
                one_hot[[i, j]] = 1.0;
            }
        }
        x_aligned.append_covariates(diseases, one_hot)?;
    }

    if add_mutation_covariate {
        let burden = Array2::from_shape_vec(
            (samples.len(), 1),
            y_aligned.records.iter().map(|r| r.log10_mut).collect(),
        )
        .map_err(|e| ClassifyError::invalid_dimensions(e.to_string()))?;
        x_aligned.append_covariates(vec![MUTATION_COVARIATE.to_string()], burden)?;
    }

    debug!(
        "Aligned {} samples, {} features ({} gene features)",
        samples.len(),
        x_aligned.n_features(),
        x_aligned.n_gene_features()
    );

    Ok(AlignedData {
        samples,
        x: x_aligned,
        y: y_aligned,
    })
}

/// Keep only samples present in every overlap data type
///
/// `valid_samples` is the intersection from
/// [`read_overlap_samples`](crate::data::loader::read_overlap_samples); its
/// order is kept.
pub fn filter_to_cross_data_samples(
    x: &FeatureMatrix,
    y: &StatusTable,
    valid_samples: &[String],
) -> (FeatureMatrix, StatusTable) {
    let x_filtered = x.reindex(valid_samples);
    let y_filtered = y.reindex(valid_samples);
    info!(
        "Cross-data filter kept {}/{} feature samples, {}/{} labels",
        x_filtered.n_samples(),
        x.n_samples(),
        y_filtered.len(),
        y.len()
    );
    (x_filtered, y_filtered)
}

/// Keep the `k` gene features with largest mean absolute deviation on the
/// training set, followed by all covariates
pub fn subset_by_mad(
    train: &FeatureMatrix,
    test: &FeatureMatrix,
    k: usize,
) -> (FeatureMatrix, FeatureMatrix) {
    let stats = FeatureStats::compute(train);

    let mut order: Vec<usize> = (0..stats.columns.len()).collect();
    // stable sort keeps file order among ties; NaN sorts last
    order.sort_by(|&a, &b| {
        let (ma, mb) = (stats.mads[a], stats.mads[b]);
        match (ma.is_nan(), mb.is_nan()) {
            (true, true) => std::cmp::Ordering::Equal,
            (true, false) => std::cmp::Ordering::Greater,
            (false, true) => std::cmp::Ordering::Less,
            (false, false) => mb.total_cmp(&ma),
        }
    });

    let mut keep: Vec<usize> = order
        .into_iter()
        .take(k)
        .map(|i| stats.columns[i])
        .collect();
    keep.extend(
        train
            .gene_features
            .iter()
            .enumerate()
            .filter(|(_, &g)| !g)
            .map(|(j, _)| j),
    );

    debug!(
        "MAD selection kept {} of {} gene features",
        keep.len() - (train.n_features() - train.n_gene_features()),
        train.n_gene_features()
    );
    (train.select_features(&keep), test.select_features(&keep))
}

/// Z-score gene features using this matrix's own statistics
///
/// Constant columns are centered but not scaled. Covariates are untouched.
pub fn standardize_gene_features(x: &FeatureMatrix) -> FeatureMatrix {
    let stats = FeatureStats::compute(x);
    let mut out = x.clone();
    for (i, &j) in stats.columns.iter().enumerate() {
        let mean = stats.means[i];
        let std = if stats.stds[i] == 0.0 || stats.stds[i].is_nan() {
            1.0
        } else {
            stats.stds[i]
        };
        out.values.column_mut(j).mapv_inplace(|v| (v - mean) / std);
    }
    out
}

/// Feature selection then standardization, applied to train and test
/// independently
pub fn preprocess_data(
    train: &FeatureMatrix,
    test: &FeatureMatrix,
    standardize_columns: bool,
    subset_mad_genes: usize,
) -> (FeatureMatrix, FeatureMatrix) {
    let (train, test) = if subset_mad_genes > 0 {
        subset_by_mad(train, test, subset_mad_genes)
    } else {
        (train.clone(), test.clone())
    };

    if standardize_columns {
        (
            standardize_gene_features(&train),
            standardize_gene_features(&test),
        )
    } else {
        (train, test)
    }
}

/// Resample every cancer type (with replacement) to the size of the smallest
///
/// `x` and `y` must be row-aligned. Samples without sample info are dropped.
pub fn subsample_to_smallest_cancer_type(
    x: &FeatureMatrix,
    y: &StatusTable,
    sample_info: &SampleInfoTable,
    seed: u64,
) -> Result<(FeatureMatrix, StatusTable)> {
    if x.n_samples() != y.len() {
        return Err(ClassifyError::invalid_dimensions(format!(
            "{} feature rows for {} labels",
            x.n_samples(),
            y.len()
        )));
    }

    let mut groups: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (i, sample) in x.samples.iter().enumerate() {
        match sample_info.get(sample) {
            Some(info) => groups.entry(info.cancer_type.as_str()).or_default().push(i),
            None => warn!("No sample info for {}, dropping from subsample", sample),
        }
    }

    let mut rng = seeded_rng(seed);
    let smallest = groups.values().map(Vec::len).min().unwrap_or(0);
    let rows: Vec<usize> = groups
        .values()
        .flat_map(|members| {
            (0..smallest)
                .map(|_| members[rng.gen_range(0..members.len())])
                .collect::<Vec<_>>()
        })
        .collect();

    info!(
        "Subsampled {} cancer types to {} samples each",
        groups.len(),
        smallest
    );
    Ok((x.select_rows(&rows), y.select_rows(&rows)))
}

/// Permute labels within each cancer type
///
/// Keeps per-cancer-type label balance while breaking the link between
/// features and labels.
pub fn shuffle_by_cancer_type(y: &StatusTable, seed: u64) -> StatusTable {
    let mut rng = seeded_rng(seed);
    let mut statuses = y.statuses();

    for disease in y.diseases() {
        let members: Vec<usize> = y
            .records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.disease == disease)
            .map(|(i, _)| i)
            .collect();
        let mut values: Vec<u8> = members.iter().map(|&i| statuses[i]).collect();
        values.shuffle(&mut rng);
        for (&i, v) in members.iter().zip(values) {
            statuses[i] = v;
        }
    }

    let mut out = y.clone();
    for (record, status) in out.records.iter_mut().zip(statuses) {
        record.status = status;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{SampleInfo, StatusRecord};
    use approx::assert_relative_eq;
    use ndarray::array;

    fn labels() -> StatusTable {
        StatusTable::new(vec![
            StatusRecord { sample_id: "S3".into(), status: 1, disease: "LUAD".into(), log10_mut: 2.0 },
            StatusRecord { sample_id: "S1".into(), status: 0, disease: "BRCA".into(), log10_mut: 1.0 },
            StatusRecord { sample_id: "S9".into(), status: 1, disease: "BRCA".into(), log10_mut: 1.5 },
        ])
    }

    fn features() -> FeatureMatrix {
        FeatureMatrix::new(
            vec!["S1".into(), "S2".into(), "S3".into()],
            vec!["G1".into(), "G2".into()],
            array![[1.0, 10.0], [2.0, 20.0], [3.0, 30.0]],
        )
        .unwrap()
    }

    #[test]
    fn test_align_matrices_with_covariates() {
        let aligned = align_matrices(&features(), &labels(), true, true).unwrap();

        assert_eq!(aligned.samples, vec!["S3", "S1"]);
        assert_eq!(aligned.x.features, vec!["G1", "G2", "BRCA", "LUAD", "log10_mut"]);
        assert_eq!(aligned.x.gene_features, vec![true, true, false, false, false]);
        assert_eq!(
            aligned.x.values,
            array![[3.0, 30.0, 0.0, 1.0, 2.0], [1.0, 10.0, 1.0, 0.0, 1.0]]
        );
        assert_eq!(aligned.y.sample_ids(), vec!["S3", "S1"]);
    }

    #[test]
    fn test_align_without_covariates() {
        let aligned = align_matrices(&features(), &labels(), false, false).unwrap();
        assert_eq!(aligned.x.n_features(), 2);
        assert_eq!(aligned.x.n_gene_features(), 2);
    }

    #[test]
    fn test_cross_data_filter() {
        let valid = vec!["S3".to_string(), "S2".to_string()];
        let (x, y) = filter_to_cross_data_samples(&features(), &labels(), &valid);
        assert_eq!(x.samples, vec!["S3", "S2"]);
        assert_eq!(y.sample_ids(), vec!["S3"]);
    }

    #[test]
    fn test_feature_stats() {
        let stats = FeatureStats::compute(&features());
        assert_relative_eq!(stats.means[0], 2.0);
        assert_relative_eq!(stats.stds[0], (2.0f64 / 3.0).sqrt(), epsilon = 1e-12);
        assert_relative_eq!(stats.mads[1], 20.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_subset_by_mad_keeps_covariates() {
        let mut train = FeatureMatrix::new(
            vec!["A".into(), "B".into(), "C".into()],
            vec!["low".into(), "high".into(), "mid".into()],
            array![[0.0, 0.0, 0.0], [0.1, 10.0, 1.0], [0.2, 20.0, 2.0]],
        )
        .unwrap();
        train
            .append_covariates(vec!["log10_mut".into()], array![[1.0], [2.0], [3.0]])
            .unwrap();
        let test = train.select_rows(&[0]);

        let (tr, te) = subset_by_mad(&train, &test, 2);
        assert_eq!(tr.features, vec!["high", "mid", "log10_mut"]);
        assert_eq!(tr.gene_features, vec![true, true, false]);
        assert_eq!(te.features, tr.features);
    }

    #[test]
    fn test_standardize_leaves_covariates() {
        let mut x = features();
        x.append_covariates(vec!["c".into()], array![[5.0], [5.0], [7.0]])
            .unwrap();
        let z = standardize_gene_features(&x);

        let col = z.column(0);
        assert_relative_eq!(col.sum(), 0.0, epsilon = 1e-12);
        assert_relative_eq!(col[2], 1.0 / (2.0f64 / 3.0).sqrt(), epsilon = 1e-12);
        assert_eq!(z.column(2), array![5.0, 5.0, 7.0]);
    }

    #[test]
    fn test_standardize_constant_column() {
        let x = FeatureMatrix::new(
            vec!["A".into(), "B".into()],
            vec!["G".into()],
            array![[3.0], [3.0]],
        )
        .unwrap();
        let z = standardize_gene_features(&x);
        assert_eq!(z.column(0), array![0.0, 0.0]);
    }

    #[test]
    fn test_preprocess_data_mad_then_standardize() {
        let train = features();
        let test = features().select_rows(&[0, 1]);
        let (tr, te) = preprocess_data(&train, &test, true, 1);
        assert_eq!(tr.features, vec!["G2"]);
        assert_eq!(te.n_features(), 1);
        assert_relative_eq!(te.column(0).sum(), 0.0, epsilon = 1e-12);

        let (tr, _) = preprocess_data(&train, &test, false, 0);
        assert_eq!(tr.values, train.values);
    }

    #[test]
    fn test_subsample_to_smallest() {
        let samples: Vec<String> = (0..7).map(|i| format!("S{}", i)).collect();
        let x = FeatureMatrix::new(
            samples.clone(),
            vec!["G".into()],
            Array2::from_shape_fn((7, 1), |(i, _)| i as f64),
        )
        .unwrap();
        let y = StatusTable::new(
            samples
                .iter()
                .map(|s| StatusRecord { sample_id: s.clone(), status: 0, disease: "X".into(), log10_mut: 0.0 })
                .collect(),
        );
        let info = SampleInfoTable::new(
            samples
                .iter()
                .enumerate()
                .map(|(i, s)| {
                    let ct = if i < 2 { "BRCA" } else { "LUAD" };
                    SampleInfo::new(s.clone(), "Primary Solid Tumor".into(), ct.into())
                })
                .collect(),
        );

        let (xs, ys) = subsample_to_smallest_cancer_type(&x, &y, &info, 1).unwrap();
        assert_eq!(xs.n_samples(), 4);
        assert_eq!(ys.sample_ids(), xs.samples);
        let brca = xs
            .samples
            .iter()
            .filter(|s| info.get(s).unwrap().cancer_type == "BRCA")
            .count();
        assert_eq!(brca, 2);
    }

    #[test]
    fn test_shuffle_keeps_per_disease_counts() {
        let records: Vec<StatusRecord> = (0..20)
            .map(|i| StatusRecord {
                sample_id: format!("S{}", i),
                status: (i % 4 == 0) as u8,
                disease: if i < 10 { "BRCA" } else { "LUAD" }.into(),
                log10_mut: 0.0,
            })
            .collect();
        let y = StatusTable::new(records);

        let shuffled = shuffle_by_cancer_type(&y, 42);
        let again = shuffle_by_cancer_type(&y, 42);
        assert_eq!(shuffled.statuses(), again.statuses());

        for disease in ["BRCA", "LUAD"] {
            let count = |t: &StatusTable| {
                t.records.iter().filter(|r| r.disease == disease && r.status == 1).count()
            };
            assert_eq!(count(&shuffled), count(&y));
        }
        assert_eq!(shuffled.sample_ids(), y.sample_ids());
    }
}
