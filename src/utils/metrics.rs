// src/utils/metrics.rs

//! Scoring functions for permutation importance.

use crate::core::{ExplainError, Result};
use ndarray::ArrayView1;

fn check_lengths(y_true: ArrayView1<f64>, y_score: ArrayView1<f64>) -> Result<()> {
    if y_true.len() != y_score.len() {
        return Err(ExplainError::Shape(format!(
            "{} targets but {} predictions.",
            y_true.len(),
            y_score.len()
        )));
    }
    if y_true.is_empty() {
        return Err(ExplainError::Shape("Cannot score an empty sample.".to_string()));
    }
    Ok(())
}

/// Area under the ROC curve for binary labels (`1.0` is positive).
///
/// Uses the rank-sum formulation with tied scores sharing their average rank.
pub fn roc_auc_score(y_true: ArrayView1<f64>, y_score: ArrayView1<f64>) -> Result<f64> {
    check_lengths(y_true, y_score)?;
    let n = y_true.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| y_score[a].total_cmp(&y_score[b]));

    let mut ranks = vec![0.0; n];
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && y_score[order[j + 1]] == y_score[order[i]] {
            j += 1;
        }
        let avg_rank = (i + j) as f64 / 2.0 + 1.0;
        for k in i..=j {
            ranks[order[k]] = avg_rank;
        }
        i = j + 1;
    }

    let n_pos = y_true.iter().filter(|&&y| y == 1.0).count();
    let n_neg = n - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return Err(ExplainError::Configuration(
            "ROC AUC needs both positive and negative labels.".to_string(),
        ));
    }
    let pos_rank_sum: f64 = y_true
        .iter()
        .zip(&ranks)
        .filter(|&(&y, _)| y == 1.0)
        .map(|(_, &r)| r)
        .sum();
    let u = pos_rank_sum - (n_pos * (n_pos + 1)) as f64 / 2.0;
    Ok(u / (n_pos * n_neg) as f64)
}

/// Coefficient of determination.
pub fn r2_score(y_true: ArrayView1<f64>, y_pred: ArrayView1<f64>) -> Result<f64> {
    check_lengths(y_true, y_pred)?;
    let mean = y_true.mean().unwrap_or(0.0);
    let ss_res: f64 = y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(t, p)| (t - p).powi(2))
        .sum();
    let ss_tot: f64 = y_true.iter().map(|t| (t - mean).powi(2)).sum();
    if ss_tot == 0.0 {
        return Ok(if ss_res == 0.0 { 1.0 } else { 0.0 });
    }
    Ok(1.0 - ss_res / ss_tot)
}

/// Fraction of exact matches.
pub fn accuracy_score(y_true: ArrayView1<f64>, y_pred: ArrayView1<f64>) -> Result<f64> {
    check_lengths(y_true, y_pred)?;
    let hits = y_true
        .iter()
        .zip(y_pred.iter())
        .filter(|(t, p)| t == p)
        .count();
    Ok(hits as f64 / y_true.len() as f64)
}
