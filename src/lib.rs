// src/lib.rs

//! `shap_tables` turns raw SHAP attributions into the tables an
//! explainability dashboard shows: one-hot groups collapsed back into their
//! categorical features, waterfall contribution tables, calibration bins,
//! decision-path traces through tree ensembles and global importance
//! rankings.
//!
//! Models, attribution engines and tree structures are supplied by the caller
//! through the traits in [`traits`].

pub mod algorithms;
pub mod core;
pub mod traits;
pub mod utils;

pub use crate::algorithms::TabularExplainer;
pub use crate::core::{
    Attributions, Dataset, ExplainConfig, ExplainError, Frame, Instance, InteractionTensor,
    Observation, PrefixPolicy, Result,
};
pub use crate::traits::{AttributionEngine, FitModel, PredictModel, ShadowNode, ShadowTree, TreeEnsemble};
