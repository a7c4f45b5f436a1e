// src/algorithms/shadow_tree.rs

//! A concrete shadow tree: an exported decision tree structure annotated with
//! the training statistics that reach each node.

use crate::core::{ExplainError, Frame, Observation, Result};
use crate::traits::{ShadowNode, ShadowTree, TreeEnsemble};
use ndarray::ArrayView1;

/// Bare split structure of a fitted tree, as exported from a training
/// library.
#[derive(Debug, Clone, PartialEq)]
pub enum TreeStructure {
    Leaf,
    Split {
        feature: String,
        threshold: f64,
        left: Box<TreeStructure>,
        right: Box<TreeStructure>,
    },
}

impl TreeStructure {
    pub fn split<S: Into<String>>(
        feature: S,
        threshold: f64,
        left: TreeStructure,
        right: TreeStructure,
    ) -> Self {
        TreeStructure::Split {
            feature: feature.into(),
            threshold,
            left: Box::new(left),
            right: Box::new(right),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShadowDecisionNode {
    id: usize,
    feature: Option<String>,
    split: Option<f64>,
    left: Option<Box<ShadowDecisionNode>>,
    right: Option<Box<ShadowDecisionNode>>,
    class_counts: Option<Vec<f64>>,
    mean_value: Option<f64>,
    n_samples: usize,
}

impl ShadowDecisionNode {
    pub fn n_samples(&self) -> usize {
        self.n_samples
    }
}

impl ShadowNode for ShadowDecisionNode {
    fn id(&self) -> usize {
        self.id
    }

    fn is_leaf(&self) -> bool {
        self.left.is_none() && self.right.is_none()
    }

    fn feature_name(&self) -> Option<&str> {
        self.feature.as_deref()
    }

    fn split(&self) -> Option<f64> {
        self.split
    }

    fn left(&self) -> Option<&Self> {
        self.left.as_deref()
    }

    fn right(&self) -> Option<&Self> {
        self.right.as_deref()
    }

    fn class_counts(&self) -> Option<&[f64]> {
        self.class_counts.as_deref()
    }

    fn mean_value(&self) -> Option<f64> {
        self.mean_value
    }
}

#[derive(Debug, Clone, Copy)]
enum Task {
    Classification { n_classes: usize },
    Regression,
}

struct Builder<'a, 'b> {
    training: &'a Frame,
    targets: ArrayView1<'b, f64>,
    task: Task,
    next_id: usize,
}

impl Builder<'_, '_> {
    fn node(&mut self, structure: &TreeStructure, rows: Vec<usize>) -> Result<ShadowDecisionNode> {
        let id = self.next_id;
        self.next_id += 1;

        let (class_counts, mean_value) = match self.task {
            Task::Classification { n_classes } => {
                let mut counts = vec![0.0; n_classes];
                for &r in &rows {
                    counts[self.targets[r] as usize] += 1.0;
                }
                (Some(counts), None)
            }
            Task::Regression => {
                let mean = if rows.is_empty() {
                    None
                } else {
                    Some(rows.iter().map(|&r| self.targets[r]).sum::<f64>() / rows.len() as f64)
                };
                (None, mean)
            }
        };

        let mut node = ShadowDecisionNode {
            id,
            feature: None,
            split: None,
            left: None,
            right: None,
            class_counts,
            mean_value,
            n_samples: rows.len(),
        };

        if let TreeStructure::Split {
            feature,
            threshold,
            left,
            right,
        } = structure
        {
            let column = self.training.column(feature).ok_or_else(|| {
                ExplainError::Schema(format!(
                    "Split feature '{}' is not a column of the training frame.",
                    feature
                ))
            })?;
            let (left_rows, right_rows): (Vec<usize>, Vec<usize>) =
                rows.into_iter().partition(|&r| column[r] < *threshold);
            node.feature = Some(feature.clone());
            node.split = Some(*threshold);
            node.left = Some(Box::new(self.node(left, left_rows)?));
            node.right = Some(Box::new(self.node(right, right_rows)?));
        }
        Ok(node)
    }
}

/// A decision tree whose nodes carry the training class counts (classifier)
/// or target means (regressor) that reached them. Node ids are assigned in
/// depth-first pre-order.
#[derive(Debug, Clone, PartialEq)]
pub struct ShadowDecisionTree {
    root: ShadowDecisionNode,
    classifier: bool,
    class_names: Vec<String>,
}

impl ShadowDecisionTree {
    /// Annotate `structure` with class counts from `labels` (class indices
    /// into `class_names`).
    pub fn classifier<S: AsRef<str>>(
        structure: &TreeStructure,
        training: &Frame,
        labels: ArrayView1<f64>,
        class_names: &[S],
    ) -> Result<Self> {
        check_targets(training, labels)?;
        let n_classes = class_names.len();
        if let Some(bad) = labels
            .iter()
            .find(|&&y| y < 0.0 || y.fract() != 0.0 || y as usize >= n_classes)
        {
            return Err(ExplainError::Shape(format!(
                "Label {} is not a class index below {}.",
                bad, n_classes
            )));
        }
        let mut builder = Builder {
            training,
            targets: labels,
            task: Task::Classification { n_classes },
            next_id: 0,
        };
        let root = builder.node(structure, (0..labels.len()).collect())?;
        Ok(ShadowDecisionTree {
            root,
            classifier: true,
            class_names: class_names.iter().map(|c| c.as_ref().to_string()).collect(),
        })
    }

    /// Annotate `structure` with target means from `targets`.
    pub fn regressor(
        structure: &TreeStructure,
        training: &Frame,
        targets: ArrayView1<f64>,
    ) -> Result<Self> {
        check_targets(training, targets)?;
        let mut builder = Builder {
            training,
            targets,
            task: Task::Regression,
            next_id: 0,
        };
        let root = builder.node(structure, (0..targets.len()).collect())?;
        Ok(ShadowDecisionTree {
            root,
            classifier: false,
            class_names: Vec::new(),
        })
    }

    pub fn root(&self) -> &ShadowDecisionNode {
        &self.root
    }

    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }
}

fn check_targets(training: &Frame, targets: ArrayView1<f64>) -> Result<()> {
    if training.values().nrows() != targets.len() {
        return Err(ExplainError::Shape(format!(
            "Training frame has {} rows but {} targets were given.",
            training.values().nrows(),
            targets.len()
        )));
    }
    Ok(())
}

impl ShadowTree for ShadowDecisionTree {
    type Node = ShadowDecisionNode;

    fn is_classifier(&self) -> bool {
        self.classifier
    }

    fn predict(&self, observation: &Observation) -> Result<(f64, Vec<&ShadowDecisionNode>)> {
        let mut path = vec![&self.root];
        let mut node = &self.root;
        while let (Some(feature), Some(split), Some(left), Some(right)) =
            (node.feature_name(), node.split(), node.left(), node.right())
        {
            let value = observation.get(feature).ok_or_else(|| {
                ExplainError::Schema(format!("Observation has no feature '{}'.", feature))
            })?;
            node = if value < split { left } else { right };
            path.push(node);
        }

        let prediction = match (&node.class_counts, node.mean_value) {
            (Some(counts), _) => counts
                .iter()
                .enumerate()
                .fold((0, f64::NEG_INFINITY), |best, (i, &c)| if c > best.1 { (i, c) } else { best })
                .0 as f64,
            (None, Some(mean)) => mean,
            (None, None) => {
                return Err(ExplainError::ModelCapability(format!(
                    "Leaf {} has no training samples to predict from.",
                    node.id
                )))
            }
        };
        Ok((prediction, path))
    }
}

/// An ensemble of shadow trees, e.g. the estimators of a random forest.
#[derive(Debug, Clone, PartialEq)]
pub struct ShadowForest {
    trees: Vec<ShadowDecisionTree>,
}

impl ShadowForest {
    pub fn new(trees: Vec<ShadowDecisionTree>) -> Self {
        ShadowForest { trees }
    }
}

impl TreeEnsemble for ShadowForest {
    type Tree = ShadowDecisionTree;

    fn shadow_trees(&self) -> Option<&[ShadowDecisionTree]> {
        Some(&self.trees)
    }
}
