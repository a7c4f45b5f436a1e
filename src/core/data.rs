// src/core/data.rs
use crate::core::{ExplainError, Result};
use ndarray::{Array1, Array2, Array3, ArrayView1, Axis};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;

/// Represents a single data instance (a row of features).
pub type Instance = Array1<f64>;

/// Represents a dataset in expanded (post one-hot) column space.
pub type Dataset = Array2<f64>;

/// Pairwise attributions indexed `[sample, col_i, col_j]`.
pub type InteractionTensor = Array3<f64>;

/// A single cell of a feature table. Collapsed categorical columns hold
/// labels, everything else holds numbers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Number(f64),
    Label(String),
}

impl fmt::Display for FeatureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureValue::Number(v) => write!(f, "{}", v),
            FeatureValue::Label(s) => write!(f, "{}", s),
        }
    }
}

impl From<f64> for FeatureValue {
    fn from(v: f64) -> Self {
        FeatureValue::Number(v)
    }
}

impl From<&str> for FeatureValue {
    fn from(s: &str) -> Self {
        FeatureValue::Label(s.to_string())
    }
}

/// Read access shared by expanded and collapsed tables.
pub trait FeatureRows {
    fn column_names(&self) -> &[String];
    fn nrows(&self) -> usize;
    fn value(&self, row: usize, col: usize) -> FeatureValue;
}

fn ensure_unique(columns: &[String]) -> Result<()> {
    let mut seen = HashSet::with_capacity(columns.len());
    for name in columns {
        if !seen.insert(name.as_str()) {
            return Err(ExplainError::Schema(format!(
                "Column name '{}' appears more than once.",
                name
            )));
        }
    }
    Ok(())
}

/// A dataset with named columns in expanded space.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    columns: Vec<String>,
    values: Dataset,
}

impl Frame {
    pub fn new<S: Into<String>>(columns: Vec<S>, values: Dataset) -> Result<Self> {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        if columns.len() != values.ncols() {
            return Err(ExplainError::Shape(format!(
                "Frame has {} column names but {} data columns.",
                columns.len(),
                values.ncols()
            )));
        }
        ensure_unique(&columns)?;
        Ok(Frame { columns, values })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &Dataset {
        &self.values
    }

    pub fn ncols(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn column(&self, name: &str) -> Option<ArrayView1<'_, f64>> {
        self.column_index(name)
            .map(|idx| self.values.column(idx))
    }

    /// Single-row frame for row `index`.
    pub fn row_frame(&self, index: usize) -> Result<Frame> {
        self.select_rows(&[index])
    }

    /// Named view of one row, for tree traversal.
    pub fn observation(&self, index: usize) -> Result<Observation> {
        if index >= self.values.nrows() {
            return Err(ExplainError::Shape(format!(
                "Row {} requested from a frame with {} rows.",
                index,
                self.values.nrows()
            )));
        }
        Ok(Observation {
            columns: self.columns.clone(),
            values: self.values.row(index).to_owned(),
        })
    }

    pub fn select_rows(&self, indices: &[usize]) -> Result<Frame> {
        if let Some(&bad) = indices.iter().find(|&&i| i >= self.values.nrows()) {
            return Err(ExplainError::Shape(format!(
                "Row {} requested from a frame with {} rows.",
                bad,
                self.values.nrows()
            )));
        }
        Ok(Frame {
            columns: self.columns.clone(),
            values: self.values.select(Axis(0), indices),
        })
    }

    /// Mutable access for in-place column permutation.
    pub(crate) fn values_mut(&mut self) -> &mut Dataset {
        &mut self.values
    }
}

impl FeatureRows for Frame {
    fn column_names(&self) -> &[String] {
        &self.columns
    }

    fn nrows(&self) -> usize {
        self.values.nrows()
    }

    fn value(&self, row: usize, col: usize) -> FeatureValue {
        FeatureValue::Number(self.values[[row, col]])
    }
}

/// A column of a collapsed table.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Numeric(Array1<f64>),
    Categorical(Vec<String>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Numeric(v) => v.len(),
            Column::Categorical(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, row: usize) -> Option<FeatureValue> {
        match self {
            Column::Numeric(v) => v.get(row).map(|&x| FeatureValue::Number(x)),
            Column::Categorical(v) => v.get(row).map(|s| FeatureValue::Label(s.clone())),
        }
    }
}

/// A table in collapsed (semantic) column space: one-hot groups have been
/// folded back into a single label column.
#[derive(Debug, Clone, PartialEq)]
pub struct CollapsedFrame {
    columns: Vec<String>,
    data: Vec<Column>,
    nrows: usize,
}

impl CollapsedFrame {
    pub fn new(columns: Vec<String>, data: Vec<Column>) -> Result<Self> {
        if columns.len() != data.len() {
            return Err(ExplainError::Shape(format!(
                "{} column names given for {} columns.",
                columns.len(),
                data.len()
            )));
        }
        ensure_unique(&columns)?;
        let nrows = data.first().map(Column::len).unwrap_or(0);
        if let Some((name, col)) = columns.iter().zip(&data).find(|(_, c)| c.len() != nrows) {
            return Err(ExplainError::Shape(format!(
                "Column '{}' has {} rows, expected {}.",
                name,
                col.len(),
                nrows
            )));
        }
        Ok(CollapsedFrame { columns, data, nrows })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .position(|c| c == name)
            .map(|idx| &self.data[idx])
    }

    pub fn row_frame(&self, index: usize) -> Result<CollapsedFrame> {
        if index >= self.nrows {
            return Err(ExplainError::Shape(format!(
                "Row {} requested from a frame with {} rows.",
                index, self.nrows
            )));
        }
        let data = self
            .data
            .iter()
            .map(|col| match col {
                Column::Numeric(v) => Column::Numeric(Array1::from_elem(1, v[index])),
                Column::Categorical(v) => Column::Categorical(vec![v[index].clone()]),
            })
            .collect();
        Ok(CollapsedFrame {
            columns: self.columns.clone(),
            data,
            nrows: 1,
        })
    }
}

impl FeatureRows for CollapsedFrame {
    fn column_names(&self) -> &[String] {
        &self.columns
    }

    fn nrows(&self) -> usize {
        self.nrows
    }

    fn value(&self, row: usize, col: usize) -> FeatureValue {
        match &self.data[col] {
            Column::Numeric(v) => FeatureValue::Number(v[row]),
            Column::Categorical(v) => FeatureValue::Label(v[row].clone()),
        }
    }
}

/// A single named row, the unit a shadow tree is walked with.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    columns: Vec<String>,
    values: Instance,
}

impl Observation {
    pub fn new<S: Into<String>>(columns: Vec<S>, values: Instance) -> Result<Self> {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        if columns.len() != values.len() {
            return Err(ExplainError::Shape(format!(
                "Observation has {} names but {} values.",
                columns.len(),
                values.len()
            )));
        }
        Ok(Observation { columns, values })
    }

    pub fn get(&self, feature: &str) -> Option<f64> {
        self.columns
            .iter()
            .position(|c| c == feature)
            .map(|idx| self.values[idx])
    }

    pub fn values(&self) -> &Instance {
        &self.values
    }
}

/// Output of an attribution engine for a dataset in expanded space.
#[derive(Debug, Clone)]
pub struct Attributions {
    /// The base value, E[f(x)].
    pub base_value: f64,
    /// `[n_samples, n_features]` attribution matrix.
    pub values: Array2<f64>,
    /// Optional `[n_samples, n_features, n_features]` interaction tensor.
    pub interactions: Option<InteractionTensor>,
}

impl fmt::Display for Attributions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Attributions:")?;
        writeln!(f, "  Base Value: {:.4}", self.base_value)?;
        writeln!(
            f,
            "  Samples: {}, Features: {}",
            self.values.nrows(),
            self.values.ncols()
        )?;
        if let Some(first) = self.values.rows().into_iter().next() {
            writeln!(f, "  First Row (first 10):")?;
            for (i, val) in first.iter().take(10).enumerate() {
                writeln!(f, "    Feature {}: {:.4}", i, val)?;
            }
            if first.len() > 10 {
                writeln!(f, "    ...")?;
            }
        }
        if self.interactions.is_some() {
            writeln!(f, "  Interactions: present")?;
        }
        Ok(())
    }
}
