// src/algorithms/contributions.rs

//! Waterfall-style contribution tables for a single prediction.

use crate::core::{ExplainError, FeatureRows, FeatureValue, Result};
use crate::utils::format_rounded;
use ndarray::ArrayView1;
use serde::Serialize;
use std::fmt;

pub const BASE_VALUE_LABEL: &str = "base_value";
pub const REST_LABEL: &str = "REST";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContributionRow {
    pub label: String,
    pub contribution: f64,
    /// Observed feature value; `None` for the synthetic base and REST rows.
    pub value: Option<FeatureValue>,
    /// Running total after this row.
    pub cumulative: f64,
    /// Running total before this row (where the bar starts).
    pub base: f64,
}

impl ContributionRow {
    fn synthetic(label: &str, contribution: f64, cumulative: f64) -> Self {
        ContributionRow {
            label: label.to_string(),
            contribution,
            value: None,
            cumulative,
            base: cumulative - contribution,
        }
    }

    pub fn value_display(&self) -> String {
        self.value
            .as_ref()
            .map_or_else(|| "-".to_string(), ToString::to_string)
    }
}

/// Ordered contribution rows: the base value first, features by descending
/// magnitude, and an optional trailing REST row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContributionTable {
    rows: Vec<ContributionRow>,
}

impl ContributionTable {
    pub fn rows(&self) -> &[ContributionRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn base_value(&self) -> f64 {
        self.rows.first().map_or(0.0, |r| r.contribution)
    }

    /// Final cumulative value, i.e. the model output being explained.
    pub fn prediction(&self) -> f64 {
        self.rows.last().map_or(0.0, |r| r.cumulative)
    }

    pub fn has_rest(&self) -> bool {
        self.rows.last().map_or(false, |r| r.label == REST_LABEL)
    }
}

impl fmt::Display for ContributionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Contributions:")?;
        for row in &self.rows {
            writeln!(
                f,
                "  {:<30} {:>10.4}  (value: {}, cumulative: {:.4})",
                row.label,
                row.contribution,
                row.value_display(),
                row.cumulative
            )?;
        }
        Ok(())
    }
}

/// Build the contribution table for one observation.
///
/// `observation` must hold exactly one row whose columns line up with
/// `attributions`. `topx` counts rows including the base value row. With
/// `cutoff`, rows are kept up to the last one whose absolute contribution is
/// at least `cutoff`; when both are given the tighter limit wins. Anything
/// truncated is folded into a REST row so the final cumulative still equals
/// `base_value + attributions.sum()`.
pub fn contribution_table<F: FeatureRows>(
    base_value: f64,
    attributions: ArrayView1<f64>,
    observation: &F,
    topx: Option<usize>,
    cutoff: Option<f64>,
) -> Result<ContributionTable> {
    if observation.nrows() != 1 {
        return Err(ExplainError::Shape(format!(
            "Expected a single observation row, got {} rows.",
            observation.nrows()
        )));
    }
    let names = observation.column_names();
    if names.len() != attributions.len() {
        return Err(ExplainError::Shape(format!(
            "Observation has {} columns but {} attributions were given.",
            names.len(),
            attributions.len()
        )));
    }

    let mut order: Vec<usize> = (0..names.len()).collect();
    order.sort_by(|&a, &b| attributions[b].abs().total_cmp(&attributions[a].abs()));

    let mut rows = Vec::with_capacity(names.len() + 2);
    rows.push(ContributionRow::synthetic(BASE_VALUE_LABEL, base_value, base_value));
    let mut cumulative = base_value;
    for idx in order {
        let contribution = attributions[idx];
        cumulative += contribution;
        rows.push(ContributionRow {
            label: names[idx].clone(),
            contribution,
            value: Some(observation.value(0, idx)),
            cumulative,
            base: cumulative - contribution,
        });
    }

    let mut limit = topx;
    if let Some(cutoff) = cutoff {
        // the base row always survives
        let last_kept = rows
            .iter()
            .rposition(|r| r.contribution.abs() >= cutoff)
            .unwrap_or(0);
        let ceiling = last_kept + 1;
        limit = Some(limit.map_or(ceiling, |t| t.min(ceiling)));
    }

    if let Some(limit) = limit {
        let limit = limit.max(1);
        if limit < rows.len() {
            let total = cumulative;
            let kept = rows[limit - 1].cumulative;
            rows.truncate(limit);
            rows.push(ContributionRow::synthetic(REST_LABEL, total - kept, total));
        }
    }

    Ok(ContributionTable { rows })
}

/// One `(reason, effect)` line of a contribution summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContributionSummaryRow {
    pub reason: String,
    pub effect: String,
}

/// Human-readable reasons and effects, skipping the base value row.
///
/// Classifier effects are rendered as percentages.
pub fn contribution_summary(
    table: &ContributionTable,
    classification: bool,
    round_digits: u32,
) -> Vec<ContributionSummaryRow> {
    table
        .rows()
        .iter()
        .filter(|row| row.label != BASE_VALUE_LABEL)
        .map(|row| {
            let sign = if row.contribution >= 0.0 { "+" } else { "" };
            let effect = if classification {
                format!("{}{}%", sign, format_rounded(100.0 * row.contribution, round_digits))
            } else {
                format!("{}{}", sign, format_rounded(row.contribution, round_digits))
            };
            ContributionSummaryRow {
                reason: format!("{} = {}", row.label, row.value_display()),
                effect,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CollapsedFrame, Column, Frame};
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn observation() -> Frame {
        Frame::new(vec!["Age", "Fare", "Pclass", "SibSp"], array![[30.0, 15.5, 3.0, 1.0]]).unwrap()
    }

    #[test]
    fn rows_are_sorted_by_magnitude_with_running_totals() -> Result<()> {
        let shap = array![0.1, -0.4, 0.25, 0.05];
        let table = contribution_table(0.3, shap.view(), &observation(), None, None)?;
        let labels: Vec<&str> = table.rows().iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, vec!["base_value", "Fare", "Pclass", "Age", "SibSp"]);
        assert_eq!(table.rows()[0].value, None);
        assert_eq!(table.rows()[1].value, Some(FeatureValue::Number(15.5)));
        assert_abs_diff_eq!(table.rows()[1].cumulative, -0.1, epsilon = 1e-12);
        assert_abs_diff_eq!(table.rows()[1].base, 0.3, epsilon = 1e-12);
        assert_abs_diff_eq!(table.prediction(), 0.3 + shap.sum(), epsilon = 1e-12);
        assert!(!table.has_rest());
        Ok(())
    }

    #[test]
    fn topx_folds_the_tail_into_rest() -> Result<()> {
        let shap = array![0.1, -0.4, 0.25, 0.05];
        let table = contribution_table(0.3, shap.view(), &observation(), Some(3), None)?;
        assert_eq!(table.len(), 4);
        let rest = &table.rows()[3];
        assert_eq!(rest.label, REST_LABEL);
        assert_abs_diff_eq!(rest.contribution, 0.15, epsilon = 1e-12);
        assert_abs_diff_eq!(rest.cumulative, 0.3 + shap.sum(), epsilon = 1e-12);
        assert_abs_diff_eq!(rest.base, 0.15, epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn cutoff_limits_rows_and_keeps_total() -> Result<()> {
        let shap = array![0.1, -0.4, 0.25, 0.05];
        let table = contribution_table(0.3, shap.view(), &observation(), None, Some(0.2))?;
        let labels: Vec<&str> = table.rows().iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, vec!["base_value", "Fare", "Pclass", "REST"]);
        assert_abs_diff_eq!(table.prediction(), 0.3 + shap.sum(), epsilon = 1e-12);

        // the tighter of topx and cutoff wins
        let table = contribution_table(0.3, shap.view(), &observation(), Some(2), Some(0.2))?;
        assert_eq!(table.len(), 3);
        assert_abs_diff_eq!(table.prediction(), 0.3 + shap.sum(), epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn generous_topx_adds_no_rest() -> Result<()> {
        let shap = array![0.1, -0.4, 0.25, 0.05];
        let table = contribution_table(0.3, shap.view(), &observation(), Some(50), None)?;
        assert_eq!(table.len(), 5);
        assert!(!table.has_rest());
        Ok(())
    }

    #[test]
    fn multi_row_observation_is_rejected() {
        let frame = Frame::new(vec!["a"], array![[1.0], [2.0]]).unwrap();
        let err = contribution_table(0.0, array![0.1].view(), &frame, None, None).unwrap_err();
        assert!(matches!(err, ExplainError::Shape(_)));
    }

    #[test]
    fn attribution_length_must_match() {
        let err = contribution_table(0.0, array![0.1].view(), &observation(), None, None)
            .unwrap_err();
        assert!(matches!(err, ExplainError::Shape(_)));
    }

    #[test]
    fn summaries_format_by_task() -> Result<()> {
        let frame = CollapsedFrame::new(
            vec!["Sex".into(), "Age".into()],
            vec![
                Column::Categorical(vec!["female".into()]),
                Column::Numeric(array![29.0]),
            ],
        )?;
        let table = contribution_table(0.38, array![0.2512, -0.031].view(), &frame, None, None)?;

        let summary = contribution_summary(&table, true, 1);
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].reason, "Sex = female");
        assert_eq!(summary[0].effect, "+25.1%");
        assert_eq!(summary[1].reason, "Age = 29");
        assert_eq!(summary[1].effect, "-3.1%");

        let summary = contribution_summary(&table, false, 2);
        assert_eq!(summary[0].effect, "+0.25");
        assert_eq!(summary[1].effect, "-0.03");
        Ok(())
    }
}
