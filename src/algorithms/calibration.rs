// src/algorithms/calibration.rs

//! Binning predicted probabilities against observed outcome frequency.

use crate::core::{ExplainError, Result};
use crate::utils::quantile_sorted;
use ndarray::{ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

/// Exactly one of `bin_width` and `quantiles` must be set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub bin_width: Option<f64>,
    pub quantiles: Option<usize>,
}

impl CalibrationConfig {
    pub fn fixed_width(width: f64) -> Self {
        CalibrationConfig {
            bin_width: Some(width),
            quantiles: None,
        }
    }

    pub fn quantiles(count: usize) -> Self {
        CalibrationConfig {
            bin_width: None,
            quantiles: Some(count),
        }
    }

    pub fn binning(&self) -> Result<Binning> {
        match (self.bin_width, self.quantiles) {
            (Some(width), None) => {
                if !(width > 0.0 && width <= 1.0) {
                    return Err(ExplainError::Configuration(format!(
                        "bin_width must be in (0, 1], got {}.",
                        width
                    )));
                }
                Ok(Binning::FixedWidth(width))
            }
            (None, Some(count)) => {
                if count == 0 {
                    return Err(ExplainError::Configuration(
                        "quantiles must be at least 1.".to_string(),
                    ));
                }
                Ok(Binning::Quantiles(count))
            }
            (Some(_), Some(_)) => Err(ExplainError::Configuration(
                "Pass either bin_width or quantiles, not both.".to_string(),
            )),
            (None, None) => Err(ExplainError::Configuration(
                "One of bin_width or quantiles is required.".to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Binning {
    FixedWidth(f64),
    Quantiles(usize),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibrationBin {
    pub p_min: f64,
    pub p_max: f64,
    pub p_avg: f64,
    pub bin_width: f64,
    /// Mean label of the members; `None` when the bin is empty.
    pub precision: Option<f64>,
    pub count: usize,
}

fn lower_thresholds(pred_probas: ArrayView1<f64>, binning: Binning) -> Result<Vec<f64>> {
    match binning {
        Binning::FixedWidth(width) => {
            let n = (1.0 / width).ceil() as usize;
            Ok((0..n)
                .map(|i| i as f64 * width)
                .filter(|&t| t < 1.0)
                .collect())
        }
        Binning::Quantiles(count) => {
            if pred_probas.is_empty() {
                return Err(ExplainError::Shape(
                    "Quantile bins need at least one prediction.".to_string(),
                ));
            }
            let mut sorted = pred_probas.to_vec();
            sorted.sort_by(|a, b| a.total_cmp(b));
            Ok((0..count)
                .map(|i| quantile_sorted(&sorted, i as f64 / count as f64))
                .collect())
        }
    }
}

/// Observed positive rate per probability bin.
///
/// The first bin is closed on both ends; every later bin is `(p_min, p_max]`.
/// Zero-width bins (repeated quantiles) are skipped.
pub fn precision_table(
    pred_probas: ArrayView1<f64>,
    labels: ArrayView1<f64>,
    config: &CalibrationConfig,
) -> Result<Vec<CalibrationBin>> {
    let binning = config.binning()?;
    if pred_probas.len() != labels.len() {
        return Err(ExplainError::Shape(format!(
            "{} predictions but {} labels.",
            pred_probas.len(),
            labels.len()
        )));
    }

    let lowers = lower_thresholds(pred_probas, binning)?;
    let uppers = lowers.iter().skip(1).copied().chain(std::iter::once(1.0));

    let mut bins = Vec::with_capacity(lowers.len());
    for (&p_min, p_max) in lowers.iter().zip(uppers) {
        if p_min == p_max {
            log::debug!("skipping zero-width calibration bin at {}", p_min);
            continue;
        }
        let closed_below = bins.is_empty();
        let (count, hits) = pred_probas
            .iter()
            .zip(labels.iter())
            .filter(|(&p, _)| (p > p_min || (closed_below && p == p_min)) && p <= p_max)
            .fold((0usize, 0.0), |(n, sum), (_, &y)| (n + 1, sum + y));
        bins.push(CalibrationBin {
            p_min,
            p_max,
            p_avg: p_min + (p_max - p_min) / 2.0,
            bin_width: p_max - p_min,
            precision: if count > 0 { Some(hits / count as f64) } else { None },
            count,
        });
    }
    Ok(bins)
}

/// Like [`precision_table`] for a `[n_samples, n_classes]` probability
/// matrix; the column `pos_label` is used.
pub fn precision_table_from_matrix(
    pred_probas: ArrayView2<f64>,
    labels: ArrayView1<f64>,
    pos_label: usize,
    config: &CalibrationConfig,
) -> Result<Vec<CalibrationBin>> {
    if pos_label >= pred_probas.ncols() {
        return Err(ExplainError::Shape(format!(
            "Positive class {} requested from a matrix with {} classes.",
            pos_label,
            pred_probas.ncols()
        )));
    }
    precision_table(pred_probas.column(pos_label), labels, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn exactly_one_binning_option() {
        let both = CalibrationConfig {
            bin_width: Some(0.1),
            quantiles: Some(4),
        };
        assert!(matches!(both.binning(), Err(ExplainError::Configuration(_))));
        assert!(matches!(
            CalibrationConfig::default().binning(),
            Err(ExplainError::Configuration(_))
        ));
        assert!(CalibrationConfig::fixed_width(0.0).binning().is_err());
        assert!(CalibrationConfig::quantiles(0).binning().is_err());
    }

    #[test]
    fn fixed_width_bins_partition_unit_interval() -> Result<()> {
        let preds = array![0.05, 0.15, 0.95];
        let labels = array![1.0, 0.0, 1.0];
        let bins = precision_table(preds.view(), labels.view(), &CalibrationConfig::fixed_width(0.1))?;
        assert_eq!(bins.len(), 10);
        assert_abs_diff_eq!(bins[0].p_min, 0.0);
        assert_abs_diff_eq!(bins[9].p_max, 1.0);
        for pair in bins.windows(2) {
            assert_eq!(pair[0].p_max, pair[1].p_min);
        }

        assert_eq!(bins[0].count, 1);
        assert_eq!(bins[0].precision, Some(1.0));
        assert_eq!(bins[1].count, 1);
        assert_eq!(bins[1].precision, Some(0.0));
        assert_eq!(bins[9].count, 1);
        assert_eq!(bins[9].precision, Some(1.0));
        assert_eq!(bins[4].count, 0);
        assert_eq!(bins[4].precision, None);
        Ok(())
    }

    #[test]
    fn boundaries_are_counted_once() -> Result<()> {
        let preds = array![0.0, 0.5, 1.0];
        let labels = array![0.0, 1.0, 1.0];
        let bins = precision_table(preds.view(), labels.view(), &CalibrationConfig::fixed_width(0.5))?;
        assert_eq!(bins.len(), 2);
        assert_eq!(bins[0].count, 2);
        assert_eq!(bins[1].count, 1);
        let total: usize = bins.iter().map(|b| b.count).sum();
        assert_eq!(total, preds.len());
        Ok(())
    }

    #[test]
    fn quantile_bins_skip_degenerate_edges() -> Result<()> {
        let preds = array![0.2, 0.2, 0.2, 0.8];
        let labels = array![0.0, 1.0, 0.0, 1.0];
        let bins = precision_table(preds.view(), labels.view(), &CalibrationConfig::quantiles(4))?;
        // quantiles at 0, .25, .5 are all 0.2 and .75 is 0.35
        assert_eq!(bins.len(), 2);
        assert_abs_diff_eq!(bins[0].p_min, 0.2);
        assert_abs_diff_eq!(bins[0].p_max, 0.35, epsilon = 1e-12);
        assert_eq!(bins[0].count, 3);
        assert_abs_diff_eq!(bins[0].precision.unwrap(), 1.0 / 3.0, epsilon = 1e-12);
        assert_eq!(bins[1].count, 1);
        Ok(())
    }

    #[test]
    fn matrix_input_uses_positive_column() -> Result<()> {
        let probas = array![[0.95, 0.05], [0.85, 0.15], [0.05, 0.95]];
        let labels = array![1.0, 0.0, 1.0];
        let config = CalibrationConfig::fixed_width(0.1);
        let bins = precision_table_from_matrix(probas.view(), labels.view(), 1, &config)?;
        assert_eq!(bins[0].count, 1);
        assert_eq!(bins[9].count, 1);
        assert!(precision_table_from_matrix(probas.view(), labels.view(), 2, &config).is_err());
        Ok(())
    }

    #[test]
    fn label_length_must_match() {
        let err = precision_table(
            array![0.1, 0.2].view(),
            array![1.0].view(),
            &CalibrationConfig::fixed_width(0.1),
        )
        .unwrap_err();
        assert!(matches!(err, ExplainError::Shape(_)));
    }
}
