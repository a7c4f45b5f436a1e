// src/algorithms/collapse.rs

//! Folding one-hot column groups back into their semantic features, for
//! feature tables, attribution matrices and interaction tensors.

use crate::algorithms::feature_groups::{recover_group_labels, FeatureGroupIndex};
use crate::core::{
    CollapsedFrame, Column, ExplainConfig, ExplainError, Frame, InteractionTensor, PrefixPolicy,
    Result,
};
use ndarray::{Array, Array1, Array2, ArrayView, ArrayView1, ArrayView2, ArrayView3, Axis, RemoveAxis};

/// Sum the lanes of `values` along `axis` per group of positions.
///
/// The output has `positions.len()` entries along `axis`; every other axis is
/// left untouched.
fn sum_groups_along<D: RemoveAxis>(
    values: ArrayView<f64, D>,
    axis: Axis,
    positions: &[Vec<usize>],
) -> Array<f64, D> {
    let mut shape = values.raw_dim();
    shape[axis.index()] = positions.len();
    let mut out = Array::zeros(shape);
    for (g, members) in positions.iter().enumerate() {
        let mut lane = out.index_axis_mut(axis, g);
        for &m in members {
            lane += &values.index_axis(axis, m);
        }
    }
    out
}

fn resolve_config(config: Option<&ExplainConfig>) -> ExplainConfig {
    config.cloned().unwrap_or_default()
}

/// Replace each categorical group of `frame` by one label column.
pub fn collapse_frame_with(
    frame: &Frame,
    index: &FeatureGroupIndex,
    config: Option<&ExplainConfig>,
) -> Result<CollapsedFrame> {
    let config = resolve_config(config);
    let mut names = Vec::with_capacity(index.len());
    let mut data = Vec::with_capacity(index.len());
    for (name, members) in index.iter() {
        let column = if index.is_categorical(name) {
            Column::Categorical(recover_group_labels(frame, name, members, &config)?)
        } else {
            let values = frame.column(&members[0]).ok_or_else(|| {
                ExplainError::Schema(format!("Column '{}' is not in the frame.", members[0]))
            })?;
            Column::Numeric(values.to_owned())
        };
        names.push(name.to_string());
        data.push(column);
    }
    CollapsedFrame::new(names, data)
}

/// Collapse `frame` for the categorical prefixes `cats`.
pub fn collapse_frame<P: AsRef<str>>(
    frame: &Frame,
    cats: Option<&[P]>,
    config: Option<&ExplainConfig>,
) -> Result<CollapsedFrame> {
    let policy = config.map(|c| c.prefix_policy).unwrap_or(PrefixPolicy::Strict);
    let index = FeatureGroupIndex::build(frame.columns(), cats, policy)?;
    collapse_frame_with(frame, &index, config)
}

fn check_width(columns: usize, width: usize, what: &str) -> Result<()> {
    if columns != width {
        return Err(ExplainError::Shape(format!(
            "{} has {} columns but the schema has {}.",
            what, width, columns
        )));
    }
    Ok(())
}

/// Sum a `[n_samples, n_expanded]` attribution matrix into collapsed space.
pub fn collapse_attributions_with<S: AsRef<str>>(
    index: &FeatureGroupIndex,
    columns: &[S],
    values: ArrayView2<f64>,
) -> Result<Array2<f64>> {
    check_width(columns.len(), values.ncols(), "Attribution matrix")?;
    let positions = index.member_positions(columns)?;
    Ok(sum_groups_along(values, Axis(1), &positions))
}

/// Sum a single attribution vector into collapsed space.
pub fn collapse_attribution_vector_with<S: AsRef<str>>(
    index: &FeatureGroupIndex,
    columns: &[S],
    values: ArrayView1<f64>,
) -> Result<Array1<f64>> {
    check_width(columns.len(), values.len(), "Attribution vector")?;
    let positions = index.member_positions(columns)?;
    Ok(sum_groups_along(values, Axis(0), &positions))
}

/// Collapse an attribution matrix for the categorical prefixes `cats`.
pub fn collapse_attributions<S: AsRef<str>, P: AsRef<str>>(
    columns: &[S],
    values: ArrayView2<f64>,
    cats: Option<&[P]>,
    policy: PrefixPolicy,
) -> Result<Array2<f64>> {
    let index = FeatureGroupIndex::build(columns, cats, policy)?;
    collapse_attributions_with(&index, columns, values)
}

/// Block-sum an interaction tensor from `old_columns` into `new_columns`.
///
/// Names in `new_columns` that are absent from `old_columns` are treated as
/// categorical prefixes and their members are re-derived from the old
/// schema, most specific prefix first. Cell `(i, j)` of the result is the sum of every old cell whose row
/// belongs to group `i` and whose column belongs to group `j`.
pub fn collapse_interactions<S: AsRef<str>, T: AsRef<str>>(
    old_columns: &[S],
    new_columns: &[T],
    interactions: ArrayView3<f64>,
) -> Result<InteractionTensor> {
    check_square(old_columns.len(), interactions)?;
    let mut cats: Vec<&str> = new_columns
        .iter()
        .map(AsRef::as_ref)
        .filter(|c| !old_columns.iter().any(|o| o.as_ref() == *c))
        .collect();
    // longer prefixes first so `DeckLevel` is not swallowed by `Deck`
    cats.sort_by(|a, b| b.len().cmp(&a.len()));
    let index = FeatureGroupIndex::build(old_columns, Some(&cats[..]), PrefixPolicy::Strict)?;

    let names: Vec<&str> = new_columns.iter().map(AsRef::as_ref).collect();
    let positions = index.positions_of(&names, old_columns)?;
    Ok(block_sum(interactions, &positions))
}

/// Block-sum an interaction tensor over the groups of `index`, in index
/// order.
pub fn collapse_interactions_with<S: AsRef<str>>(
    index: &FeatureGroupIndex,
    columns: &[S],
    interactions: ArrayView3<f64>,
) -> Result<InteractionTensor> {
    check_square(columns.len(), interactions)?;
    let positions = index.member_positions(columns)?;
    Ok(block_sum(interactions, &positions))
}

fn check_square(columns: usize, interactions: ArrayView3<f64>) -> Result<()> {
    let (_, rows, cols) = interactions.dim();
    if rows != columns || cols != columns {
        return Err(ExplainError::Shape(format!(
            "Interaction tensor is {}x{} per sample but the schema has {} columns.",
            rows, cols, columns
        )));
    }
    Ok(())
}

fn block_sum(interactions: ArrayView3<f64>, positions: &[Vec<usize>]) -> InteractionTensor {
    let by_row = sum_groups_along(interactions, Axis(1), positions);
    sum_groups_along(by_row.view(), Axis(2), positions)
}

/// Rewrite the diagonal of an interaction tensor so each row sums to the
/// feature's attribution.
///
/// Some tree ensembles report the full attribution on the diagonal instead of
/// the main effect, which inflates row sums. The new diagonal is
/// `attribution - (row_sum - diagonal)`. Without `attributions` the existing
/// diagonal is taken to be the attribution. This is an approximation tied to
/// how the upstream engine fills the diagonal, not a general identity.
pub fn normalize_interactions(
    interactions: ArrayView3<f64>,
    attributions: Option<ArrayView2<f64>>,
) -> Result<InteractionTensor> {
    let (n_samples, rows, cols) = interactions.dim();
    if rows != cols {
        return Err(ExplainError::Shape(format!(
            "Interaction tensor must be square per sample, got {}x{}.",
            rows, cols
        )));
    }
    if let Some(attr) = &attributions {
        if attr.dim() != (n_samples, rows) {
            return Err(ExplainError::Shape(format!(
                "Attributions are {:?} but the interaction tensor is {:?}.",
                attr.dim(),
                (n_samples, rows, cols)
            )));
        }
    }

    let mut corrected = interactions.to_owned();
    let row_sums = interactions.sum_axis(Axis(2));
    for s in 0..n_samples {
        for i in 0..rows {
            let diagonal = interactions[[s, i, i]];
            let off_diagonal = row_sums[[s, i]] - diagonal;
            let attribution = attributions.as_ref().map_or(diagonal, |a| a[[s, i]]);
            corrected[[s, i, i]] = attribution - off_diagonal;
        }
    }
    log::debug!(
        "normalized interaction diagonals for {} samples x {} features (attributions given: {})",
        n_samples,
        rows,
        attributions.is_some()
    );
    Ok(corrected)
}
