// src/algorithms/decision_path.rs

//! Causal traces of a single prediction through a decision tree.

use crate::core::{ExplainError, Observation, Result};
use crate::traits::{ShadowNode, ShadowTree, TreeEnsemble};
use crate::utils::{format_rounded, round_to};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Left,
    Right,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Left => write!(f, "left"),
            Direction::Right => write!(f, "right"),
        }
    }
}

/// One internal node on the path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathStep {
    pub node_id: usize,
    /// Average outcome at this node before the split.
    pub average: f64,
    pub feature: String,
    pub value: f64,
    pub split: f64,
    pub direction: Direction,
    pub left: f64,
    pub right: f64,
    /// Outcome of the chosen child minus `average`.
    pub diff: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecisionPathTrace {
    steps: Vec<PathStep>,
    classifier: bool,
    leaf_average: f64,
}

impl DecisionPathTrace {
    pub fn steps(&self) -> &[PathStep] {
        &self.steps
    }

    pub fn is_classifier(&self) -> bool {
        self.classifier
    }

    /// Average outcome at the root.
    pub fn base_value(&self) -> f64 {
        self.steps.first().map_or(self.leaf_average, |s| s.average)
    }

    /// Average outcome at the leaf reached.
    pub fn prediction(&self) -> f64 {
        self.steps
            .last()
            .map_or(self.leaf_average, |s| s.average + s.diff)
    }
}

/// How a node's average outcome is read. Chosen once per tree.
trait OutcomeStatistic<N: ShadowNode> {
    fn outcome(&self, node: &N) -> Result<f64>;
}

/// Share of training samples in the positive class.
struct PositiveRate {
    pos_label: usize,
}

impl<N: ShadowNode> OutcomeStatistic<N> for PositiveRate {
    fn outcome(&self, node: &N) -> Result<f64> {
        let counts = node.class_counts().ok_or_else(|| {
            ExplainError::ModelCapability(format!("Node {} has no class counts.", node.id()))
        })?;
        let positive = counts.get(self.pos_label).ok_or_else(|| {
            ExplainError::ModelCapability(format!(
                "Node {} has {} classes, positive class {} requested.",
                node.id(),
                counts.len(),
                self.pos_label
            ))
        })?;
        let total: f64 = counts.iter().sum();
        if total <= 0.0 {
            return Err(ExplainError::ModelCapability(format!(
                "Node {} has no training samples.",
                node.id()
            )));
        }
        Ok(positive / total)
    }
}

/// Mean training target.
struct MeanTarget;

impl<N: ShadowNode> OutcomeStatistic<N> for MeanTarget {
    fn outcome(&self, node: &N) -> Result<f64> {
        node.mean_value().ok_or_else(|| {
            ExplainError::ModelCapability(format!("Node {} has no mean target value.", node.id()))
        })
    }
}

fn missing(what: &'static str, id: usize) -> impl FnOnce() -> ExplainError {
    move || ExplainError::ModelCapability(format!("Internal node {} has no {}.", id, what))
}

/// Walk `observation` through `tree`, recording every split on the way.
///
/// `value < split` goes left. For classifiers the outcome is the frequency of
/// class `pos_label`, for regressors the mean target.
pub fn trace_path<T: ShadowTree>(
    tree: &T,
    observation: &Observation,
    pos_label: usize,
) -> Result<DecisionPathTrace> {
    let positive_rate = PositiveRate { pos_label };
    let classifier = tree.is_classifier();
    let statistic: &dyn OutcomeStatistic<T::Node> = if classifier {
        &positive_rate
    } else {
        &MeanTarget
    };

    let (_, nodes) = tree.predict(observation)?;
    let leaf = nodes.last().ok_or_else(|| {
        ExplainError::ModelCapability("Shadow tree returned an empty path.".to_string())
    })?;

    let mut steps = Vec::with_capacity(nodes.len().saturating_sub(1));
    for node in nodes.iter().filter(|n| !n.is_leaf()) {
        let id = node.id();
        let feature = node.feature_name().ok_or_else(missing("split feature", id))?;
        let split = node.split().ok_or_else(missing("split threshold", id))?;
        let left = node.left().ok_or_else(missing("left child", id))?;
        let right = node.right().ok_or_else(missing("right child", id))?;
        let value = observation.get(feature).ok_or_else(|| {
            ExplainError::Schema(format!("Observation has no feature '{}'.", feature))
        })?;

        let average = statistic.outcome(node)?;
        let left_avg = statistic.outcome(left)?;
        let right_avg = statistic.outcome(right)?;
        let (direction, chosen) = if value < split {
            (Direction::Left, left_avg)
        } else {
            (Direction::Right, right_avg)
        };
        steps.push(PathStep {
            node_id: id,
            average,
            feature: feature.to_string(),
            value,
            split,
            direction,
            left: left_avg,
            right: right_avg,
            diff: chosen - average,
        });
    }

    Ok(DecisionPathTrace {
        steps,
        classifier,
        leaf_average: statistic.outcome(*leaf)?,
    })
}

/// Trace `observation` through every tree of a tree ensemble.
pub fn trace_ensemble<E: TreeEnsemble>(
    model: &E,
    observation: &Observation,
    pos_label: usize,
) -> Result<Vec<DecisionPathTrace>> {
    let trees = model.shadow_trees().ok_or_else(|| {
        ExplainError::ModelCapability(
            "Model is not an ensemble of decision trees.".to_string(),
        )
    })?;
    log::debug!("tracing observation through {} trees", trees.len());
    trees
        .iter()
        .map(|tree| trace_path(tree, observation, pos_label))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathSummaryRow {
    /// `feature=value`, padded to 50 characters.
    pub value: String,
    /// `>=` or `< ` followed by the split, padded to 10 characters.
    pub condition: String,
    pub change: String,
    pub prediction: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathSummary {
    /// Root outcome, in percent for classifiers.
    pub base_value: f64,
    /// Leaf outcome, in percent for classifiers.
    pub prediction: f64,
    pub rows: Vec<PathSummaryRow>,
}

/// Fixed-width text rendering of a trace.
pub fn path_summary(trace: &DecisionPathTrace, round_digits: u32) -> PathSummary {
    let scale = if trace.is_classifier() { 100.0 } else { 1.0 };
    let unit = if trace.is_classifier() { "%" } else { "" };

    let rows = trace
        .steps()
        .iter()
        .map(|step| {
            let op = match step.direction {
                Direction::Right => ">=",
                Direction::Left => "< ",
            };
            let sign = if step.diff >= 0.0 { "+" } else { "" };
            PathSummaryRow {
                value: format!("{:<50}", format!("{}={}", step.feature, step.value)),
                condition: format!("{}{:<10}", op, step.split.to_string()),
                change: format!(
                    "{}{}{}",
                    sign,
                    format_rounded(scale * step.diff, round_digits),
                    unit
                ),
                prediction: format!(
                    "{}{}",
                    format_rounded(scale * (step.average + step.diff), round_digits),
                    unit
                ),
            }
        })
        .collect();

    PathSummary {
        base_value: round_to(scale * trace.base_value(), round_digits),
        prediction: round_to(scale * trace.prediction(), round_digits),
        rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::shadow_tree::tests::{structure, survived, training_frame};
    use crate::algorithms::shadow_tree::{ShadowDecisionTree, ShadowForest, TreeStructure};
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn classifier() -> ShadowDecisionTree {
        ShadowDecisionTree::classifier(&structure(), &training_frame(), survived().view(), &["Neg", "Pos"])
            .unwrap()
    }

    #[test]
    fn classifier_trace_records_branch_rates() -> Result<()> {
        let obs = Observation::new(vec!["age", "fare"], array![35.0, 12.0])?;
        let trace = trace_path(&classifier(), &obs, 1)?;
        assert_eq!(trace.steps().len(), 2);

        let root = &trace.steps()[0];
        assert_eq!(root.node_id, 0);
        assert_eq!(root.feature, "age");
        assert_eq!(root.direction, Direction::Right);
        assert_abs_diff_eq!(root.average, 4.0 / 6.0);
        assert_abs_diff_eq!(root.left, 1.0);
        assert_abs_diff_eq!(root.right, 0.5);
        assert_abs_diff_eq!(root.diff, 0.5 - 4.0 / 6.0);

        let second = &trace.steps()[1];
        assert_eq!(second.node_id, 2);
        assert_eq!(second.direction, Direction::Left);
        assert_abs_diff_eq!(second.diff, -0.5);
        assert_abs_diff_eq!(trace.prediction(), 0.0);
        Ok(())
    }

    #[test]
    fn diffs_add_up_to_the_prediction() -> Result<()> {
        let obs = Observation::new(vec!["age", "fare"], array![35.0, 85.0])?;
        let targets = array![1.0, 3.0, 10.0, 20.0, 30.0, 12.0];
        let tree = ShadowDecisionTree::regressor(&structure(), &training_frame(), targets.view())?;
        let trace = trace_path(&tree, &obs, 1)?;
        let total: f64 = trace.steps().iter().map(|s| s.diff).sum();
        let last = trace.steps().last().unwrap();
        assert_abs_diff_eq!(last.average + last.diff, trace.base_value() + total, epsilon = 1e-12);
        assert_abs_diff_eq!(trace.prediction(), 25.0, epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn leaf_only_tree_has_empty_trace() -> Result<()> {
        let tree = ShadowDecisionTree::regressor(
            &TreeStructure::Leaf,
            &training_frame(),
            array![1.0, 2.0, 3.0, 4.0, 5.0, 6.0].view(),
        )?;
        let obs = Observation::new(vec!["age", "fare"], array![1.0, 1.0])?;
        let trace = trace_path(&tree, &obs, 1)?;
        assert!(trace.steps().is_empty());
        assert_abs_diff_eq!(trace.base_value(), 3.5);
        assert_abs_diff_eq!(trace.prediction(), 3.5);
        Ok(())
    }

    #[test]
    fn out_of_range_positive_label_is_reported() -> Result<()> {
        let obs = Observation::new(vec!["age", "fare"], array![35.0, 12.0])?;
        let err = trace_path(&classifier(), &obs, 5).unwrap_err();
        assert!(matches!(err, ExplainError::ModelCapability(_)));
        Ok(())
    }

    #[test]
    fn summary_formats_classifier_rows() -> Result<()> {
        let obs = Observation::new(vec!["age", "fare"], array![35.0, 12.0])?;
        let summary = path_summary(&trace_path(&classifier(), &obs, 1)?, 2);
        assert_abs_diff_eq!(summary.base_value, 66.67);
        assert_abs_diff_eq!(summary.prediction, 0.0);
        assert_eq!(summary.rows.len(), 2);
        let first = &summary.rows[0];
        assert_eq!(first.value.len(), 50);
        assert!(first.value.starts_with("age=35 "));
        assert_eq!(first.condition, ">=18        ");
        assert_eq!(first.change, "-16.67%");
        assert_eq!(first.prediction, "50.00%");
        assert_eq!(summary.rows[1].condition, "< 50        ");
        Ok(())
    }

    #[test]
    fn summary_formats_regressor_rows() -> Result<()> {
        let obs = Observation::new(vec!["age", "fare"], array![10.0, 85.0])?;
        let targets = array![1.0, 3.0, 10.0, 20.0, 30.0, 12.0];
        let tree = ShadowDecisionTree::regressor(&structure(), &training_frame(), targets.view())?;
        let summary = path_summary(&trace_path(&tree, &obs, 1)?, 1);
        assert_eq!(summary.rows.len(), 1);
        assert_eq!(summary.rows[0].change, "-10.7");
        assert_eq!(summary.rows[0].prediction, "2.0");
        assert_abs_diff_eq!(summary.base_value, 12.7);
        Ok(())
    }

    struct SingleTree;

    impl TreeEnsemble for SingleTree {
        type Tree = ShadowDecisionTree;

        fn shadow_trees(&self) -> Option<&[ShadowDecisionTree]> {
            None
        }
    }

    #[test]
    fn ensembles_trace_every_tree() -> Result<()> {
        let forest = ShadowForest::new(vec![classifier(), classifier()]);
        let obs = Observation::new(vec!["age", "fare"], array![10.0, 12.0])?;
        let traces = trace_ensemble(&forest, &obs, 1)?;
        assert_eq!(traces.len(), 2);
        assert_abs_diff_eq!(traces[1].prediction(), 1.0);

        let err = trace_ensemble(&SingleTree, &obs, 1).unwrap_err();
        assert!(matches!(err, ExplainError::ModelCapability(_)));
        Ok(())
    }
}
