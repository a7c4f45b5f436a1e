// src/traits.rs

//! Seams to the collaborators this crate consumes but does not implement:
//! the predictive model, the attribution engine and the shadow-tree library.

use crate::core::{Attributions, Dataset, ExplainError, Frame, Observation, Result};
use ndarray::{Array1, Array2};

/// A trained model that can score a dataset.
pub trait PredictModel {
    /// One prediction per row. For classifiers this is the predicted label.
    fn predict(&self, instances: &Dataset) -> Result<Array1<f64>>;

    /// Class probabilities, `[n_samples, n_classes]`.
    fn predict_proba(&self, _instances: &Dataset) -> Result<Array2<f64>> {
        Err(ExplainError::ModelCapability(
            "Model does not provide class probabilities.".to_string(),
        ))
    }

    fn num_features(&self) -> usize;
}

/// A model that can be refit, used by cross-validated permutation importance.
pub trait FitModel: PredictModel + Clone {
    fn fit(&mut self, instances: &Dataset, targets: &Array1<f64>) -> Result<()>;
}

/// Produces base value, attributions and optionally interactions for a frame.
pub trait AttributionEngine {
    fn explain(&self, data: &Frame) -> Result<Attributions>;
}

/// Read-only view of one node of a shadow tree.
pub trait ShadowNode {
    fn id(&self) -> usize;
    fn is_leaf(&self) -> bool;
    /// Split feature; `None` on leaves.
    fn feature_name(&self) -> Option<&str>;
    /// Split threshold; `None` on leaves.
    fn split(&self) -> Option<f64>;
    fn left(&self) -> Option<&Self>;
    fn right(&self) -> Option<&Self>;
    /// Training class counts reaching this node (classifiers only).
    fn class_counts(&self) -> Option<&[f64]>;
    /// Mean training target reaching this node (regressors only).
    fn mean_value(&self) -> Option<f64>;
}

/// A decision tree that can be walked with a single observation.
pub trait ShadowTree {
    type Node: ShadowNode;

    fn is_classifier(&self) -> bool;

    /// The prediction for `observation` and the nodes visited, root first.
    fn predict(&self, observation: &Observation) -> Result<(f64, Vec<&Self::Node>)>;
}

/// A model that may be an ensemble of shadow-walkable trees.
pub trait TreeEnsemble {
    type Tree: ShadowTree;

    /// `None` when the model is not a tree ensemble.
    fn shadow_trees(&self) -> Option<&[Self::Tree]>;
}
