use crate::error::{ClassifyError, Result};
use serde::{Deserialize, Serialize};

/// One point on a ROC curve
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RocPoint {
    pub fpr: f64,
    pub tpr: f64,
    pub threshold: f64,
}

/// One point on a precision-recall curve
///
/// The final (precision 1, recall 0) point has no threshold and carries NaN.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PrPoint {
    pub precision: f64,
    pub recall: f64,
    pub threshold: f64,
}

/// Cumulative false/true positive counts at each distinct score threshold
///
/// Scores are visited in decreasing order; returns `(fps, tps, thresholds)`.
fn binary_clf_curve(y_true: &[u8], scores: &[f64]) -> Result<(Vec<f64>, Vec<f64>, Vec<f64>)> {
    if y_true.len() != scores.len() {
        return Err(ClassifyError::invalid_dimensions(format!(
            "{} labels but {} scores",
            y_true.len(),
            scores.len()
        )));
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    // stable descending sort; ties keep input order
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let mut fps = Vec::new();
    let mut tps = Vec::new();
    let mut thresholds = Vec::new();
    let mut tp = 0.0;
    for (k, &i) in order.iter().enumerate() {
        tp += y_true[i] as f64;
        let last_of_run = order
            .get(k + 1)
            .map_or(true, |&next| scores[next] != scores[i]);
        if last_of_run {
            tps.push(tp);
            fps.push((k + 1) as f64 - tp);
            thresholds.push(scores[i]);
        }
    }
    Ok((fps, tps, thresholds))
}

fn check_both_classes(y_true: &[u8]) -> Result<()> {
    let positives = y_true.iter().filter(|&&y| y == 1).count();
    if positives == 0 || positives == y_true.len() {
        return Err(ClassifyError::one_class(""));
    }
    Ok(())
}

/// Drop interior points that lie on a straight segment of the ROC curve
fn drop_collinear(
    (fps, tps, thresholds): (Vec<f64>, Vec<f64>, Vec<f64>),
) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let n = fps.len();
    if n <= 2 {
        return (fps, tps, thresholds);
    }
    let keep: Vec<usize> = (0..n)
        .filter(|&i| {
            i == 0
                || i == n - 1
                || fps[i + 1] - 2.0 * fps[i] + fps[i - 1] != 0.0
                || tps[i + 1] - 2.0 * tps[i] + tps[i - 1] != 0.0
        })
        .collect();
    (
        keep.iter().map(|&i| fps[i]).collect(),
        keep.iter().map(|&i| tps[i]).collect(),
        keep.iter().map(|&i| thresholds[i]).collect(),
    )
}

fn roc_area(curve: &[RocPoint]) -> f64 {
    curve
        .windows(2)
        .map(|w| (w[1].fpr - w[0].fpr) * (w[1].tpr + w[0].tpr) / 2.0)
        .sum()
}

fn pr_average_precision(curve: &[PrPoint]) -> f64 {
    // curve runs from full recall down to recall 0
    -curve
        .windows(2)
        .map(|w| (w[1].recall - w[0].recall) * w[0].precision)
        .sum::<f64>()
}

/// ROC curve, starting at (0, 0) with an infinite threshold
///
/// Collinear intermediate points are dropped.
pub fn roc_curve(y_true: &[u8], scores: &[f64]) -> Result<Vec<RocPoint>> {
    check_both_classes(y_true)?;
    let (fps, tps, thresholds) = drop_collinear(binary_clf_curve(y_true, scores)?);
    let (total_fp, total_tp) = match (fps.last(), tps.last()) {
        (Some(&f), Some(&t)) => (f, t),
        _ => return Err(ClassifyError::one_class("")),
    };

    let mut curve = Vec::with_capacity(fps.len() + 1);
    curve.push(RocPoint {
        fpr: 0.0,
        tpr: 0.0,
        threshold: f64::INFINITY,
    });
    for ((fp, tp), threshold) in fps.iter().zip(&tps).zip(&thresholds) {
        curve.push(RocPoint {
            fpr: fp / total_fp,
            tpr: tp / total_tp,
            threshold: *threshold,
        });
    }
    Ok(curve)
}

/// Precision-recall curve in order of increasing threshold
///
/// Stops once full recall is reached and ends with (precision 1, recall 0).
pub fn precision_recall_curve(y_true: &[u8], scores: &[f64]) -> Result<Vec<PrPoint>> {
    check_both_classes(y_true)?;
    let (fps, tps, thresholds) = binary_clf_curve(y_true, scores)?;
    let total_tp = tps.last().copied().unwrap_or(0.0);

    // first index reaching full recall
    let last = tps
        .iter()
        .position(|&tp| tp >= total_tp)
        .unwrap_or(tps.len().saturating_sub(1));

    let mut curve: Vec<PrPoint> = (0..=last)
        .rev()
        .map(|i| {
            let predicted = tps[i] + fps[i];
            PrPoint {
                precision: if predicted > 0.0 { tps[i] / predicted } else { 0.0 },
                recall: tps[i] / total_tp,
                threshold: thresholds[i],
            }
        })
        .collect();
    curve.push(PrPoint {
        precision: 1.0,
        recall: 0.0,
        threshold: f64::NAN,
    });
    Ok(curve)
}

/// Area under the ROC curve (trapezoidal rule)
pub fn roc_auc_score(y_true: &[u8], scores: &[f64]) -> Result<f64> {
    Ok(roc_area(&roc_curve(y_true, scores)?))
}

/// Average precision: sum of precisions weighted by recall increments
pub fn average_precision_score(y_true: &[u8], scores: &[f64]) -> Result<f64> {
    Ok(pr_average_precision(&precision_recall_curve(y_true, scores)?))
}

/// AUROC, AUPR and both curves for one set of scores
#[derive(Debug, Clone)]
pub struct ThresholdMetrics {
    pub auroc: f64,
    pub aupr: f64,
    pub roc: Vec<RocPoint>,
    pub pr: Vec<PrPoint>,
}

impl ThresholdMetrics {
    pub fn compute(y_true: &[u8], scores: &[f64]) -> Result<Self> {
        let roc = roc_curve(y_true, scores)?;
        let pr = precision_recall_curve(y_true, scores)?;
        let auroc = roc_area(&roc);
        let aupr = pr_average_precision(&pr);
        Ok(Self {
            auroc,
            aupr,
            roc,
            pr,
        })
    }
}
