// src/algorithms/importance.rs

//! Global feature rankings: mean absolute attribution and permutation
//! importance.

use crate::algorithms::collapse::collapse_attributions_with;
use crate::algorithms::feature_groups::FeatureGroupIndex;
use crate::core::{Dataset, ExplainError, Frame, PrefixPolicy, Result};
use crate::traits::{FitModel, PredictModel};
use crate::utils::metrics::{accuracy_score, r2_score, roc_auc_score};
use ndarray::{Array1, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportanceRow {
    pub feature: String,
    pub importance: f64,
}

fn sort_descending(rows: &mut [ImportanceRow]) {
    rows.sort_by(|a, b| b.importance.total_cmp(&a.importance));
}

/// Mean over samples of the absolute group attribution, highest first.
pub fn mean_absolute_attributions<S: AsRef<str>, P: AsRef<str>>(
    columns: &[S],
    values: ArrayView2<f64>,
    cats: Option<&[P]>,
    policy: PrefixPolicy,
) -> Result<Vec<ImportanceRow>> {
    let index = FeatureGroupIndex::build(columns, cats, policy)?;
    let collapsed = collapse_attributions_with(&index, columns, values)?;
    Ok(ranked_mean_abs(&index.names(), collapsed.view()))
}

pub(crate) fn ranked_mean_abs(names: &[String], collapsed: ArrayView2<f64>) -> Vec<ImportanceRow> {
    let means = collapsed
        .mapv(f64::abs)
        .mean_axis(Axis(0))
        .unwrap_or_else(|| Array1::zeros(names.len()));
    let mut rows: Vec<ImportanceRow> = names
        .iter()
        .zip(means.iter())
        .map(|(name, &importance)| ImportanceRow {
            feature: name.clone(),
            importance,
        })
        .collect();
    sort_descending(&mut rows);
    rows
}

/// Score used to compare predictions before and after permutation.
#[derive(Debug, Clone, Copy)]
pub enum Metric {
    RocAuc,
    R2,
    Accuracy,
    Custom(fn(ArrayView1<f64>, ArrayView1<f64>) -> Result<f64>),
}

impl Metric {
    pub fn score(&self, y_true: ArrayView1<f64>, y_pred: ArrayView1<f64>) -> Result<f64> {
        match self {
            Metric::RocAuc => roc_auc_score(y_true, y_pred),
            Metric::R2 => r2_score(y_true, y_pred),
            Metric::Accuracy => accuracy_score(y_true, y_pred),
            Metric::Custom(f) => f(y_true, y_pred),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PermutationOptions {
    /// `false` for losses: a rise after permutation then counts as importance.
    pub greater_is_better: bool,
    /// Score the positive-class probability instead of `predict`.
    pub needs_proba: bool,
    /// Seed for [`PermutationOptions::rng`].
    pub seed: u64,
    /// Number of folds for the cross-validated variant.
    pub folds: usize,
}

impl Default for PermutationOptions {
    fn default() -> Self {
        PermutationOptions {
            greater_is_better: true,
            needs_proba: true,
            seed: 0,
            folds: 5,
        }
    }
}

impl PermutationOptions {
    pub fn rng(&self) -> StdRng {
        StdRng::seed_from_u64(self.seed)
    }
}

fn model_score<M: PredictModel>(
    model: &M,
    instances: &Dataset,
    targets: ArrayView1<f64>,
    metric: Metric,
    options: &PermutationOptions,
) -> Result<f64> {
    let raw = if options.needs_proba {
        let probas = model.predict_proba(instances)?;
        if probas.ncols() < 2 {
            return Err(ExplainError::ModelCapability(format!(
                "predict_proba returned {} column(s), need a positive class column.",
                probas.ncols()
            )));
        }
        metric.score(targets, probas.column(1))?
    } else {
        let preds = model.predict(instances)?;
        metric.score(targets, preds.view())?
    };
    Ok(if options.greater_is_better { raw } else { -raw })
}

fn unsorted_permutation_importances<M: PredictModel, R: Rng + ?Sized>(
    model: &M,
    frame: &Frame,
    targets: ArrayView1<f64>,
    metric: Metric,
    index: &FeatureGroupIndex,
    options: &PermutationOptions,
    rng: &mut R,
) -> Result<Vec<ImportanceRow>> {
    if frame.values().nrows() != targets.len() {
        return Err(ExplainError::Shape(format!(
            "Frame has {} rows but {} targets were given.",
            frame.values().nrows(),
            targets.len()
        )));
    }
    if model.num_features() != frame.ncols() {
        return Err(ExplainError::Shape(format!(
            "Model expects {} features but the frame has {} columns.",
            model.num_features(),
            frame.ncols()
        )));
    }
    let positions = index.member_positions(frame.columns())?;
    let mut shuffled = frame.clone();
    let baseline = model_score(model, shuffled.values(), targets, metric, options)?;
    log::debug!("permutation importance baseline score: {}", baseline);

    let n = targets.len();
    let mut rows = Vec::with_capacity(index.len());
    for ((name, _), members) in index.iter().zip(&positions) {
        let mut order: Vec<usize> = (0..n).collect();
        order.shuffle(rng);
        // group columns move together so one-hot rows stay valid
        for &col in members {
            let permuted = frame.values().column(col).select(Axis(0), &order);
            shuffled.values_mut().column_mut(col).assign(&permuted);
        }
        let score = model_score(model, shuffled.values(), targets, metric, options)?;
        for &col in members {
            shuffled
                .values_mut()
                .column_mut(col)
                .assign(&frame.values().column(col));
        }
        log::debug!("feature '{}' permuted score: {}", name, score);
        rows.push(ImportanceRow {
            feature: name.to_string(),
            importance: baseline - score,
        });
    }
    Ok(rows)
}

/// Drop in score when each feature (or one-hot group) is shuffled, highest
/// first.
pub fn permutation_importances<M: PredictModel, P: AsRef<str>, R: Rng + ?Sized>(
    model: &M,
    frame: &Frame,
    targets: ArrayView1<f64>,
    metric: Metric,
    cats: Option<&[P]>,
    options: &PermutationOptions,
    rng: &mut R,
) -> Result<Vec<ImportanceRow>> {
    let index = FeatureGroupIndex::build(frame.columns(), cats, PrefixPolicy::Strict)?;
    let mut rows =
        unsorted_permutation_importances(model, frame, targets, metric, &index, options, rng)?;
    sort_descending(&mut rows);
    Ok(rows)
}

/// Stratified fold assignment without shuffling.
///
/// Classes are numbered by first appearance. Dealing the class-sorted labels
/// round-robin fixes how many members of each class every fold receives;
/// each class then fills the folds with contiguous runs of its samples in
/// row order.
fn stratified_folds(targets: ArrayView1<f64>, folds: usize) -> Vec<usize> {
    let mut class_of: HashMap<u64, usize> = HashMap::new();
    let encoded: Vec<usize> = targets
        .iter()
        .map(|&y| {
            let next = class_of.len();
            // `+ 0.0` folds -0.0 into 0.0
            *class_of.entry((y + 0.0).to_bits()).or_insert(next)
        })
        .collect();
    let n_classes = class_of.len();

    let mut sorted = encoded.clone();
    sorted.sort_unstable();
    let mut allocation = vec![vec![0usize; n_classes]; folds];
    for (i, &class) in sorted.iter().enumerate() {
        allocation[i % folds][class] += 1;
    }

    let per_class: Vec<Vec<usize>> = (0..n_classes)
        .map(|class| {
            (0..folds)
                .flat_map(|fold| std::iter::repeat(fold).take(allocation[fold][class]))
                .collect()
        })
        .collect();
    let mut seen = vec![0usize; n_classes];
    encoded
        .iter()
        .map(|&class| {
            let fold = per_class[class][seen[class]];
            seen[class] += 1;
            fold
        })
        .collect()
}

/// Permutation importances averaged over stratified cross-validation folds.
///
/// A fresh clone of `model` is fit on each training split and scored on the
/// held-out split. Folds are independent and are averaged per feature.
pub fn cv_permutation_importances<M: FitModel, P: AsRef<str>, R: Rng + ?Sized>(
    model: &M,
    frame: &Frame,
    targets: ArrayView1<f64>,
    metric: Metric,
    cats: Option<&[P]>,
    options: &PermutationOptions,
    rng: &mut R,
) -> Result<Vec<ImportanceRow>> {
    let folds = options.folds;
    if folds < 2 {
        return Err(ExplainError::Configuration(format!(
            "Cross-validation needs at least 2 folds, got {}.",
            folds
        )));
    }
    if targets.len() < folds {
        return Err(ExplainError::Configuration(format!(
            "Cannot split {} samples into {} folds.",
            targets.len(),
            folds
        )));
    }
    if frame.values().nrows() != targets.len() {
        return Err(ExplainError::Shape(format!(
            "Frame has {} rows but {} targets were given.",
            frame.values().nrows(),
            targets.len()
        )));
    }

    let index = FeatureGroupIndex::build(frame.columns(), cats, PrefixPolicy::Strict)?;
    let assignment = stratified_folds(targets, folds);
    let mut totals = vec![0.0; index.len()];

    for fold in 0..folds {
        let (test_idx, train_idx): (Vec<usize>, Vec<usize>) =
            (0..targets.len()).partition(|&i| assignment[i] == fold);
        let train = frame.select_rows(&train_idx)?;
        let test = frame.select_rows(&test_idx)?;
        let train_y = targets.select(Axis(0), &train_idx);
        let test_y = targets.select(Axis(0), &test_idx);

        let mut fold_model = model.clone();
        fold_model.fit(train.values(), &train_y)?;
        let rows = unsorted_permutation_importances(
            &fold_model,
            &test,
            test_y.view(),
            metric,
            &index,
            options,
            rng,
        )?;
        log::debug!("fold {} of {} scored", fold + 1, folds);
        for (total, row) in totals.iter_mut().zip(&rows) {
            *total += row.importance;
        }
    }

    let mut rows: Vec<ImportanceRow> = index
        .names()
        .into_iter()
        .zip(totals)
        .map(|(feature, total)| ImportanceRow {
            feature,
            importance: total / folds as f64,
        })
        .collect();
    sort_descending(&mut rows);
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array2};

    #[derive(Debug, Clone)]
    struct LinearModel {
        weights: Array1<f64>,
        fitted_rows: usize,
    }

    impl LinearModel {
        fn new(weights: Vec<f64>) -> Self {
            LinearModel {
                weights: Array1::from(weights),
                fitted_rows: 0,
            }
        }
    }

    impl PredictModel for LinearModel {
        fn predict(&self, instances: &Dataset) -> Result<Array1<f64>> {
            Ok(instances.dot(&self.weights))
        }

        fn num_features(&self) -> usize {
            self.weights.len()
        }
    }

    impl FitModel for LinearModel {
        fn fit(&mut self, instances: &Dataset, _targets: &Array1<f64>) -> Result<()> {
            self.fitted_rows = instances.nrows();
            Ok(())
        }
    }

    fn regression_data() -> (Frame, Array1<f64>) {
        let values = Array2::from_shape_fn((20, 3), |(i, j)| match j {
            0 => i as f64,
            1 => ((i * 7) % 20) as f64,
            _ => (i % 2) as f64,
        });
        let targets = values.column(0).mapv(|x| 2.0 * x);
        let frame = Frame::new(vec!["signal", "noise", "flag"], values).unwrap();
        (frame, targets)
    }

    fn regression_options() -> PermutationOptions {
        PermutationOptions {
            needs_proba: false,
            seed: 7,
            folds: 4,
            ..PermutationOptions::default()
        }
    }

    #[test]
    fn mean_absolute_attributions_collapse_groups() -> Result<()> {
        let cols = ["Age", "Sex_male", "Sex_female"];
        let shap = array![[0.1, 0.3, -0.1], [-0.3, -0.2, 0.1]];
        let rows = mean_absolute_attributions(&cols, shap.view(), Some(&["Sex"][..]), PrefixPolicy::Strict)?;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].feature, "Age");
        assert_abs_diff_eq!(rows[0].importance, 0.2, epsilon = 1e-12);
        assert_eq!(rows[1].feature, "Sex");
        assert_abs_diff_eq!(rows[1].importance, 0.15, epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn unused_features_have_zero_importance() -> Result<()> {
        let (frame, targets) = regression_data();
        let model = LinearModel::new(vec![2.0, 0.0, 0.0]);
        let options = regression_options();
        let rows = permutation_importances::<_, &str, _>(
            &model,
            &frame,
            targets.view(),
            Metric::R2,
            None,
            &options,
            &mut options.rng(),
        )?;
        assert_eq!(rows[0].feature, "signal");
        assert!(rows[0].importance > 0.0);
        for row in &rows[1..] {
            assert_abs_diff_eq!(row.importance, 0.0);
        }
        Ok(())
    }

    #[test]
    fn seeded_runs_are_reproducible() -> Result<()> {
        let (frame, targets) = regression_data();
        let model = LinearModel::new(vec![2.0, 0.5, 0.0]);
        let options = regression_options();
        let run = || {
            permutation_importances::<_, &str, _>(
                &model,
                &frame,
                targets.view(),
                Metric::R2,
                None,
                &options,
                &mut options.rng(),
            )
        };
        assert_eq!(run()?, run()?);
        Ok(())
    }

    #[test]
    fn losses_flip_the_sign() -> Result<()> {
        fn mse(y: ArrayView1<f64>, p: ArrayView1<f64>) -> Result<f64> {
            Ok((&y - &p).mapv(|d| d * d).mean().unwrap_or(0.0))
        }
        let (frame, targets) = regression_data();
        let model = LinearModel::new(vec![2.0, 0.0, 0.0]);
        let options = PermutationOptions {
            greater_is_better: false,
            ..regression_options()
        };
        let rows = permutation_importances::<_, &str, _>(
            &model,
            &frame,
            targets.view(),
            Metric::Custom(mse),
            None,
            &options,
            &mut options.rng(),
        )?;
        assert_eq!(rows[0].feature, "signal");
        assert!(rows[0].importance > 0.0);
        Ok(())
    }

    #[test]
    fn proba_scoring_requires_capability() {
        let (frame, targets) = regression_data();
        let model = LinearModel::new(vec![2.0, 0.0, 0.0]);
        let options = PermutationOptions::default();
        let err = permutation_importances::<_, &str, _>(
            &model,
            &frame,
            targets.view(),
            Metric::RocAuc,
            None,
            &options,
            &mut options.rng(),
        )
        .unwrap_err();
        assert!(matches!(err, ExplainError::ModelCapability(_)));
    }

    #[test]
    fn stratified_folds_balance_classes() {
        let y = array![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0];
        let folds = stratified_folds(y.view(), 2);
        assert_eq!(folds, vec![0, 0, 1, 1, 0, 0, 1, 1]);
        for fold in 0..2 {
            let positives = (0..8).filter(|&i| folds[i] == fold && y[i] == 1.0).count();
            assert_eq!(positives, 2);
        }
    }

    #[test]
    fn uneven_classes_get_contiguous_runs() {
        // seven negatives then three positives over three folds
        let y = array![0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        let folds = stratified_folds(y.view(), 3);
        assert_eq!(folds, vec![0, 0, 0, 1, 1, 2, 2, 0, 1, 2]);
    }

    #[test]
    fn model_width_must_match_frame() {
        let (frame, targets) = regression_data();
        let model = LinearModel::new(vec![2.0, 0.0]);
        let options = regression_options();
        let err = permutation_importances::<_, &str, _>(
            &model,
            &frame,
            targets.view(),
            Metric::R2,
            None,
            &options,
            &mut options.rng(),
        )
        .unwrap_err();
        assert!(matches!(err, ExplainError::Shape(_)));
    }

    #[test]
    fn cross_validated_importances_average_folds() -> Result<()> {
        let (frame, targets) = regression_data();
        let model = LinearModel::new(vec![2.0, 0.0, 0.0]);
        let options = regression_options();
        let rows = cv_permutation_importances::<_, &str, _>(
            &model,
            &frame,
            targets.view(),
            Metric::R2,
            None,
            &options,
            &mut options.rng(),
        )?;
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].feature, "signal");
        assert!(rows[0].importance > 0.0);
        assert_abs_diff_eq!(rows[2].importance, 0.0);
        Ok(())
    }

    #[test]
    fn too_few_folds_is_a_configuration_error() {
        let (frame, targets) = regression_data();
        let model = LinearModel::new(vec![2.0, 0.0, 0.0]);
        let options = PermutationOptions {
            folds: 1,
            ..regression_options()
        };
        let err = cv_permutation_importances::<_, &str, _>(
            &model,
            &frame,
            targets.view(),
            Metric::R2,
            None,
            &options,
            &mut options.rng(),
        )
        .unwrap_err();
        assert!(matches!(err, ExplainError::Configuration(_)));
    }
}
