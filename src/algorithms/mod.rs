pub mod calibration;
pub mod collapse;
pub mod contributions;
pub mod decision_path;
pub mod explainer;
pub mod feature_groups;
pub mod importance;
pub mod shadow_tree;

pub use calibration::{precision_table, precision_table_from_matrix, CalibrationBin, CalibrationConfig};
pub use collapse::{
    collapse_attributions, collapse_frame, collapse_interactions, collapse_interactions_with,
    normalize_interactions,
};
pub use contributions::{contribution_summary, contribution_table, ContributionTable};
pub use decision_path::{path_summary, trace_ensemble, trace_path, DecisionPathTrace};
pub use explainer::TabularExplainer;
pub use feature_groups::{recover_onehot_labels, FeatureGroupIndex};
pub use importance::{
    cv_permutation_importances, mean_absolute_attributions, permutation_importances,
    ImportanceRow, Metric, PermutationOptions,
};
pub use shadow_tree::{ShadowDecisionTree, ShadowForest, TreeStructure};
