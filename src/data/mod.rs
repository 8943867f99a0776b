pub mod labels;
pub mod loader;
pub mod preprocessing;
pub mod sample_info;
pub mod split;
pub mod tcga;

use crate::error::{ClassifyError, Result};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Name of the mutation burden covariate column
pub const MUTATION_COVARIATE: &str = "log10_mut";

/// Stratification id given to rare cancer/sample type combinations
pub const OTHER_STRATUM: &str = "other";

/// Per-sample cancer type and sample type information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleInfo {
    /// TCGA sample barcode
    pub sample_id: String,
    /// Sample type (e.g. "Primary Solid Tumor")
    pub sample_type: String,
    /// Cancer type acronym (e.g. "BRCA")
    pub cancer_type: String,
    /// Cancer type concatenated with sample type
    pub id_for_stratification: String,
}

impl SampleInfo {
    /// Create a record, deriving the stratification id
    pub fn new(sample_id: String, sample_type: String, cancer_type: String) -> Self {
        let id_for_stratification = format!("{}{}", cancer_type, sample_type);
        Self {
            sample_id,
            sample_type,
            cancer_type,
            id_for_stratification,
        }
    }
}

/// Sample info keyed by sample id
#[derive(Debug, Clone, Default)]
pub struct SampleInfoTable {
    records: Vec<SampleInfo>,
    index: HashMap<String, usize>,
}

impl SampleInfoTable {
    pub fn new(records: Vec<SampleInfo>) -> Self {
        let index = records
            .iter()
            .enumerate()
            .map(|(i, r)| (r.sample_id.clone(), i))
            .collect();
        Self { records, index }
    }

    pub fn get(&self, sample_id: &str) -> Option<&SampleInfo> {
        self.index.get(sample_id).map(|&i| &self.records[i])
    }

    pub fn records(&self) -> &[SampleInfo] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Sorted unique cancer types
    pub fn cancer_types(&self) -> Vec<String> {
        self.records
            .iter()
            .map(|r| r.cancer_type.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// Samples x features matrix with covariate bookkeeping
#[derive(Debug, Clone)]
pub struct FeatureMatrix {
    /// Row labels (sample ids)
    pub samples: Vec<String>,
    /// Column labels (gene, CpG site or covariate names)
    pub features: Vec<String>,
    /// Values, one row per sample
    pub values: Array2<f64>,
    /// True for real-valued omics features, false for appended covariates
    pub gene_features: Vec<bool>,
}

impl FeatureMatrix {
    /// Build a matrix where every column is a gene feature
    pub fn new(samples: Vec<String>, features: Vec<String>, values: Array2<f64>) -> Result<Self> {
        let gene_features = vec![true; features.len()];
        Self::with_gene_features(samples, features, values, gene_features)
    }

    pub fn with_gene_features(
        samples: Vec<String>,
        features: Vec<String>,
        values: Array2<f64>,
        gene_features: Vec<bool>,
    ) -> Result<Self> {
        if values.nrows() != samples.len() {
            return Err(ClassifyError::invalid_dimensions(format!(
                "matrix rows ({}) != samples ({})",
                values.nrows(),
                samples.len()
            )));
        }
        if values.ncols() != features.len() || gene_features.len() != features.len() {
            return Err(ClassifyError::invalid_dimensions(format!(
                "matrix cols ({}) != features ({}) / gene flags ({})",
                values.ncols(),
                features.len(),
                gene_features.len()
            )));
        }
        Ok(Self {
            samples,
            features,
            values,
            gene_features,
        })
    }

    pub fn n_samples(&self) -> usize {
        self.samples.len()
    }

    pub fn n_features(&self) -> usize {
        self.features.len()
    }

    /// Number of gene (non-covariate) features
    pub fn n_gene_features(&self) -> usize {
        self.gene_features.iter().filter(|&&g| g).count()
    }

    /// Sample id -> row position
    pub fn sample_index(&self) -> HashMap<&str, usize> {
        self.samples
            .iter()
            .enumerate()
            .map(|(i, s)| (s.as_str(), i))
            .collect()
    }

    /// Keep the given rows, in the given order
    pub fn select_rows(&self, rows: &[usize]) -> Self {
        Self {
            samples: rows.iter().map(|&i| self.samples[i].clone()).collect(),
            features: self.features.clone(),
            values: self.values.select(Axis(0), rows),
            gene_features: self.gene_features.clone(),
        }
    }

    /// Keep the given columns, in the given order
    pub fn select_features(&self, cols: &[usize]) -> Self {
        Self {
            samples: self.samples.clone(),
            features: cols.iter().map(|&j| self.features[j].clone()).collect(),
            values: self.values.select(Axis(1), cols),
            gene_features: cols.iter().map(|&j| self.gene_features[j]).collect(),
        }
    }

    /// Reorder rows to `sample_ids`; ids not in the matrix are dropped
    pub fn reindex(&self, sample_ids: &[String]) -> Self {
        let index = self.sample_index();
        let rows: Vec<usize> = sample_ids
            .iter()
            .filter_map(|s| index.get(s.as_str()).copied())
            .collect();
        self.select_rows(&rows)
    }

    /// Append covariate columns (flagged as non-gene features)
    pub fn append_covariates(&mut self, names: Vec<String>, columns: Array2<f64>) -> Result<()> {
        if columns.nrows() != self.n_samples() || columns.ncols() != names.len() {
            return Err(ClassifyError::invalid_dimensions(format!(
                "covariate block {:?} doesn't fit {} samples x {} names",
                columns.dim(),
                self.n_samples(),
                names.len()
            )));
        }
        let values = ndarray::concatenate(Axis(1), &[self.values.view(), columns.view()])
            .map_err(|e| ClassifyError::invalid_dimensions(e.to_string()))?;
        self.values = values;
        self.gene_features.extend(std::iter::repeat(false).take(names.len()));
        self.features.extend(names);
        Ok(())
    }

    /// Copy of one column
    pub fn column(&self, j: usize) -> Array1<f64> {
        self.values.column(j).to_owned()
    }
}

/// One row of the label table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusRecord {
    /// Sample id
    pub sample_id: String,
    /// Binary label
    pub status: u8,
    /// Cancer type of the sample
    pub disease: String,
    /// log10 mutation burden
    pub log10_mut: f64,
}

/// Binary labels plus the per-sample covariates used during alignment
#[derive(Debug, Clone, Default)]
pub struct StatusTable {
    pub records: Vec<StatusRecord>,
}

impl StatusTable {
    pub fn new(records: Vec<StatusRecord>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn sample_ids(&self) -> Vec<String> {
        self.records.iter().map(|r| r.sample_id.clone()).collect()
    }

    pub fn statuses(&self) -> Vec<u8> {
        self.records.iter().map(|r| r.status).collect()
    }

    pub fn positive_count(&self) -> usize {
        self.records.iter().filter(|r| r.status == 1).count()
    }

    /// Sorted unique diseases
    pub fn diseases(&self) -> Vec<String> {
        self.records
            .iter()
            .map(|r| r.disease.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Reorder to `sample_ids`; ids without a label are dropped
    pub fn reindex(&self, sample_ids: &[String]) -> Self {
        let index: HashMap<&str, &StatusRecord> = self
            .records
            .iter()
            .map(|r| (r.sample_id.as_str(), r))
            .collect();
        Self::new(
            sample_ids
                .iter()
                .filter_map(|s| index.get(s.as_str()).map(|&r| r.clone()))
                .collect(),
        )
    }

    /// Keep the given rows, in the given order
    pub fn select_rows(&self, rows: &[usize]) -> Self {
        Self::new(rows.iter().map(|&i| self.records[i].clone()).collect())
    }

    /// Replace status values in row order
    pub fn with_statuses(&self, statuses: &[u8]) -> Result<Self> {
        if statuses.len() != self.len() {
            return Err(ClassifyError::invalid_dimensions(format!(
                "{} statuses for {} samples",
                statuses.len(),
                self.len()
            )));
        }
        Ok(Self::new(
            self.records
                .iter()
                .zip(statuses)
                .map(|(r, &status)| StatusRecord { status, ..r.clone() })
                .collect(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn matrix() -> FeatureMatrix {
        FeatureMatrix::new(
            vec!["S1".into(), "S2".into(), "S3".into()],
            vec!["G1".into(), "G2".into()],
            array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]],
        )
        .unwrap()
    }

    #[test]
    fn test_stratification_id() {
        let info = SampleInfo::new("TCGA-02-0047-01".into(), "Primary Solid Tumor".into(), "GBM".into());
        assert_eq!(info.id_for_stratification, "GBMPrimary Solid Tumor");
    }

    #[test]
    fn test_matrix_shape_checked() {
        let result = FeatureMatrix::new(
            vec!["S1".into()],
            vec!["G1".into(), "G2".into()],
            array![[1.0, 2.0], [3.0, 4.0]],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_reindex_drops_missing() {
        let m = matrix();
        let r = m.reindex(&["S3".to_string(), "S9".to_string(), "S1".to_string()]);
        assert_eq!(r.samples, vec!["S3", "S1"]);
        assert_eq!(r.values, array![[5.0, 6.0], [1.0, 2.0]]);
    }

    #[test]
    fn test_append_covariates() {
        let mut m = matrix();
        m.append_covariates(vec!["BRCA".into()], array![[1.0], [0.0], [1.0]])
            .unwrap();
        assert_eq!(m.n_features(), 3);
        assert_eq!(m.gene_features, vec![true, true, false]);
        assert_eq!(m.n_gene_features(), 2);
        assert!(m.append_covariates(vec!["x".into()], array![[1.0]]).is_err());
    }

    #[test]
    fn test_status_table_reindex() {
        let table = StatusTable::new(vec![
            StatusRecord { sample_id: "S1".into(), status: 1, disease: "BRCA".into(), log10_mut: 1.0 },
            StatusRecord { sample_id: "S2".into(), status: 0, disease: "LUAD".into(), log10_mut: 2.0 },
        ]);
        let r = table.reindex(&["S2".to_string(), "S3".to_string()]);
        assert_eq!(r.len(), 1);
        assert_eq!(r.records[0].sample_id, "S2");
        assert_eq!(table.diseases(), vec!["BRCA", "LUAD"]);
        assert_eq!(table.positive_count(), 1);
        assert!(table.with_statuses(&[1]).is_err());
    }
}
