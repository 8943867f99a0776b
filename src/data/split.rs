//! Stratified k-fold splitting.

use crate::data::{FeatureMatrix, SampleInfoTable, OTHER_STRATUM};
use crate::error::{ClassifyError, Result};
use crate::utils::random::seeded_rng;
use rand::seq::SliceRandom;
use std::collections::HashMap;
use std::hash::Hash;
use tracing::{debug, warn};

/// Train and test row indices of one fold
pub type FoldIndices = (Vec<usize>, Vec<usize>);

/// K-fold splitter that preserves class proportions in each fold
///
/// Members of each class are dealt across folds as evenly as possible; with
/// `shuffle` the fold order within each class is randomized.
#[derive(Debug, Clone, Copy)]
pub struct StratifiedKFold {
    pub n_splits: usize,
    pub shuffle: bool,
    pub seed: u64,
}

impl StratifiedKFold {
    pub fn new(n_splits: usize, shuffle: bool, seed: u64) -> Self {
        Self {
            n_splits,
            shuffle,
            seed,
        }
    }

    /// Fold number assigned to every sample
    pub fn test_folds<L: Eq + Hash + Clone>(&self, labels: &[L]) -> Result<Vec<usize>> {
        let n = labels.len();
        if self.n_splits < 2 {
            return Err(ClassifyError::invalid_parameter(
                "n_splits",
                self.n_splits.to_string(),
            ));
        }
        if self.n_splits > n {
            return Err(ClassifyError::no_test_samples(
                "",
                format!("cannot have n_splits={} greater than n_samples={}", self.n_splits, n),
            ));
        }

        // classes are numbered in order of first appearance
        let mut class_ids: HashMap<L, usize> = HashMap::new();
        let encoded: Vec<usize> = labels
            .iter()
            .map(|l| {
                let next = class_ids.len();
                *class_ids.entry(l.clone()).or_insert(next)
            })
            .collect();
        let n_classes = class_ids.len();

        let mut counts = vec![0usize; n_classes];
        for &c in &encoded {
            counts[c] += 1;
        }
        if counts.iter().all(|&c| c < self.n_splits) {
            return Err(ClassifyError::no_test_samples(
                "",
                format!(
                    "n_splits={} cannot be greater than the number of members in each class",
                    self.n_splits
                ),
            ));
        }
        if counts.iter().any(|&c| c < self.n_splits) {
            debug!(
                "Least populated class has {} members, fewer than n_splits={}",
                counts.iter().min().copied().unwrap_or(0),
                self.n_splits
            );
        }

        // deal the sorted labels round-robin to get per-fold class allocation
        let mut sorted = encoded.clone();
        sorted.sort_unstable();
        let mut allocation = vec![vec![0usize; n_classes]; self.n_splits];
        for (i, &c) in sorted.iter().enumerate() {
            allocation[i % self.n_splits][c] += 1;
        }

        let mut rng = seeded_rng(self.seed);
        let mut folds = vec![0usize; n];
        for class in 0..n_classes {
            let mut class_folds: Vec<usize> = (0..self.n_splits)
                .flat_map(|fold| std::iter::repeat(fold).take(allocation[fold][class]))
                .collect();
            if self.shuffle {
                class_folds.shuffle(&mut rng);
            }
            let members = encoded
                .iter()
                .enumerate()
                .filter(|(_, &c)| c == class)
                .map(|(i, _)| i);
            for (i, fold) in members.zip(class_folds) {
                folds[i] = fold;
            }
        }
        Ok(folds)
    }

    /// Train/test indices for every fold
    pub fn split<L: Eq + Hash + Clone>(&self, labels: &[L]) -> Result<Vec<FoldIndices>> {
        let folds = self.test_folds(labels)?;
        Ok((0..self.n_splits)
            .map(|k| {
                let (test, train): (Vec<usize>, Vec<usize>) =
                    (0..folds.len()).partition(|&i| folds[i] == k);
                (train, test)
            })
            .collect())
    }
}

/// Stratification ids for the samples of `x`, rare ids recoded to `"other"`
pub fn stratification_labels(
    x: &FeatureMatrix,
    sample_info: &SampleInfoTable,
    num_folds: usize,
) -> Vec<String> {
    let mut missing = 0usize;
    let ids: Vec<String> = x
        .samples
        .iter()
        .map(|s| match sample_info.get(s) {
            Some(info) => info.id_for_stratification.clone(),
            None => {
                missing += 1;
                OTHER_STRATUM.to_string()
            }
        })
        .collect();
    if missing > 0 {
        warn!("{} samples have no sample info, stratified as {:?}", missing, OTHER_STRATUM);
    }

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for id in &ids {
        *counts.entry(id.as_str()).or_default() += 1;
    }
    ids.iter()
        .map(|id| {
            if counts[id.as_str()] < num_folds {
                OTHER_STRATUM.to_string()
            } else {
                id.clone()
            }
        })
        .collect()
}

/// Rows of fold `fold_no` from a shuffled stratified split of `x`
pub fn split_stratified(
    x: &FeatureMatrix,
    sample_info: &SampleInfoTable,
    num_folds: usize,
    fold_no: usize,
    seed: u64,
) -> Result<FoldIndices> {
    if x.n_samples() == 0 {
        return Err(ClassifyError::no_train_samples(""));
    }
    if fold_no >= num_folds {
        return Err(ClassifyError::invalid_parameter("fold_no", fold_no.to_string()));
    }

    let labels = stratification_labels(x, sample_info, num_folds);
    let mut folds = StratifiedKFold::new(num_folds, true, seed).split(&labels)?;
    let (train, test) = folds.swap_remove(fold_no);
    debug!(
        "Fold {}: {} train / {} test samples",
        fold_no,
        train.len(),
        test.len()
    );
    Ok((train, test))
}
