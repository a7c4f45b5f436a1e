// src/algorithms/explainer.rs

use crate::algorithms::collapse::{
    collapse_attribution_vector_with, collapse_attributions_with, collapse_frame_with,
    collapse_interactions_with, normalize_interactions,
};
use crate::algorithms::contributions::{
    contribution_summary, contribution_table, ContributionSummaryRow, ContributionTable,
};
use crate::algorithms::feature_groups::FeatureGroupIndex;
use crate::algorithms::importance::{ranked_mean_abs, ImportanceRow};
use crate::core::{ExplainConfig, ExplainError, Frame, InteractionTensor, Result};
use crate::traits::AttributionEngine;
use ndarray::{Array2, Axis};

/// Attributions for a tabular dataset, computed once and served in either the
/// expanded (one-hot) or the collapsed feature space.
///
/// Every view method takes a `cats` flag: `true` folds each categorical
/// group into a single feature.
#[derive(Debug, Clone)]
pub struct TabularExplainer {
    frame: Frame,
    index: FeatureGroupIndex,
    base_value: f64,
    attributions: Array2<f64>,
    interactions: Option<InteractionTensor>,
    config: ExplainConfig,
}

impl TabularExplainer {
    pub fn new<E: AttributionEngine, P: AsRef<str>>(
        frame: Frame,
        engine: &E,
        cats: Option<&[P]>,
        config: Option<ExplainConfig>,
    ) -> Result<Self> {
        let config = config.unwrap_or_default();
        let index = FeatureGroupIndex::build(frame.columns(), cats, config.prefix_policy)?;

        let explained = engine.explain(&frame)?;
        let expected = (frame.values().nrows(), frame.ncols());
        if explained.values.dim() != expected {
            return Err(ExplainError::Shape(format!(
                "Engine returned attributions of shape {:?} for a frame of shape {:?}.",
                explained.values.dim(),
                expected
            )));
        }
        if let Some(interactions) = &explained.interactions {
            if interactions.dim() != (expected.0, expected.1, expected.1) {
                return Err(ExplainError::Shape(format!(
                    "Engine returned interactions of shape {:?} for a frame of shape {:?}.",
                    interactions.dim(),
                    expected
                )));
            }
        }
        log::debug!(
            "explained {} rows over {} columns ({} collapsed features)",
            expected.0,
            expected.1,
            index.len()
        );

        Ok(TabularExplainer {
            frame,
            index,
            base_value: explained.base_value,
            attributions: explained.values,
            interactions: explained.interactions,
            config,
        })
    }

    pub fn base_value(&self) -> f64 {
        self.base_value
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn feature_groups(&self) -> &FeatureGroupIndex {
        &self.index
    }

    pub fn config(&self) -> &ExplainConfig {
        &self.config
    }

    pub fn has_interactions(&self) -> bool {
        self.interactions.is_some()
    }

    pub fn columns(&self, cats: bool) -> Vec<String> {
        if cats {
            self.index.names()
        } else {
            self.frame.columns().to_vec()
        }
    }

    pub fn attributions(&self, cats: bool) -> Result<Array2<f64>> {
        if cats {
            collapse_attributions_with(&self.index, self.frame.columns(), self.attributions.view())
        } else {
            Ok(self.attributions.clone())
        }
    }

    pub fn mean_abs_attributions(&self, cats: bool) -> Result<Vec<ImportanceRow>> {
        let values = self.attributions(cats)?;
        Ok(ranked_mean_abs(&self.columns(cats), values.view()))
    }

    /// Column names ordered by mean absolute attribution, highest first.
    pub fn columns_ranked_by_attribution(&self, cats: bool) -> Result<Vec<String>> {
        Ok(self
            .mean_abs_attributions(cats)?
            .into_iter()
            .map(|row| row.feature)
            .collect())
    }

    /// Interaction tensor with corrected diagonals, optionally collapsed.
    pub fn interactions(&self, cats: bool) -> Result<InteractionTensor> {
        let raw = self.interactions.as_ref().ok_or_else(|| {
            ExplainError::ModelCapability(
                "The attribution engine did not provide interaction values.".to_string(),
            )
        })?;
        let normalized = normalize_interactions(raw.view(), Some(self.attributions.view()))?;
        if cats {
            collapse_interactions_with(&self.index, self.frame.columns(), normalized.view())
        } else {
            Ok(normalized)
        }
    }

    /// Features ranked by mean absolute interaction with `column`.
    pub fn interactions_ranked(&self, column: &str, cats: bool) -> Result<Vec<ImportanceRow>> {
        let columns = self.columns(cats);
        let position = columns.iter().position(|c| c == column).ok_or_else(|| {
            ExplainError::Schema(format!("'{}' is not a feature of this explainer.", column))
        })?;
        let interactions = self.interactions(cats)?;
        Ok(ranked_mean_abs(
            &columns,
            interactions.index_axis(Axis(1), position),
        ))
    }

    /// Contribution table for row `index`.
    pub fn contributions(
        &self,
        index: usize,
        topx: Option<usize>,
        cutoff: Option<f64>,
        cats: bool,
    ) -> Result<ContributionTable> {
        let row = self.frame.row_frame(index)?;
        let attributions = self.attributions.row(index);
        if cats {
            let collapsed_row = collapse_frame_with(&row, &self.index, Some(&self.config))?;
            let collapsed =
                collapse_attribution_vector_with(&self.index, self.frame.columns(), attributions)?;
            contribution_table(self.base_value, collapsed.view(), &collapsed_row, topx, cutoff)
        } else {
            contribution_table(self.base_value, attributions, &row, topx, cutoff)
        }
    }

    pub fn contribution_summary(
        &self,
        index: usize,
        topx: Option<usize>,
        cutoff: Option<f64>,
        cats: bool,
        classification: bool,
    ) -> Result<Vec<ContributionSummaryRow>> {
        let table = self.contributions(index, topx, cutoff, cats)?;
        Ok(contribution_summary(
            &table,
            classification,
            self.config.round_digits,
        ))
    }
}
