// src/algorithms/feature_groups.rs

//! Mapping between the expanded (one-hot) column space and the collapsed
//! semantic column space.

use crate::core::{ExplainConfig, ExplainError, Frame, PrefixPolicy, Result};
use std::collections::HashMap;

/// Ordered mapping from semantic feature name to the expanded columns it was
/// encoded into.
///
/// Every expanded column belongs to exactly one group. A group with a single
/// member named after itself is a pass-through feature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureGroupIndex {
    groups: Vec<(String, Vec<String>)>,
    categorical: Vec<bool>,
}

impl FeatureGroupIndex {
    /// Every column is its own group.
    pub fn passthrough<S: AsRef<str>>(columns: &[S]) -> Self {
        let groups: Vec<(String, Vec<String>)> = columns
            .iter()
            .map(|c| (c.as_ref().to_string(), vec![c.as_ref().to_string()]))
            .collect();
        let categorical = vec![false; groups.len()];
        FeatureGroupIndex { groups, categorical }
    }

    /// Build the index for `columns` given optional categorical prefixes.
    ///
    /// A prefix is registered as a group only when it claims more than one
    /// column. Prefixes are resolved in the order given and a column claimed
    /// by an earlier prefix is not available to later ones. Groups are
    /// ordered by the first schema position of any of their members.
    pub fn build<S: AsRef<str>, P: AsRef<str>>(
        columns: &[S],
        cats: Option<&[P]>,
        policy: PrefixPolicy,
    ) -> Result<Self> {
        let cats = match cats {
            Some(cats) if !cats.is_empty() => cats,
            _ => return Ok(Self::passthrough(columns)),
        };

        // column position -> index into `registered`
        let mut owner: HashMap<usize, usize> = HashMap::new();
        let mut registered: Vec<(String, Vec<usize>)> = Vec::new();

        for prefix in cats {
            let prefix = prefix.as_ref();
            let any_match = columns.iter().any(|c| c.as_ref().starts_with(prefix));
            if !any_match {
                match policy {
                    PrefixPolicy::Strict => {
                        return Err(ExplainError::Schema(format!(
                            "Categorical prefix '{}' matches no column.",
                            prefix
                        )))
                    }
                    PrefixPolicy::Lenient => {
                        log::warn!("categorical prefix '{}' matches no column, ignoring", prefix);
                        continue;
                    }
                }
            }
            let members: Vec<usize> = columns
                .iter()
                .enumerate()
                .filter(|(i, c)| !owner.contains_key(i) && c.as_ref().starts_with(prefix))
                .map(|(i, _)| i)
                .collect();
            if members.len() > 1 {
                let group_id = registered.len();
                for &m in &members {
                    owner.insert(m, group_id);
                }
                registered.push((prefix.to_string(), members));
            } else {
                log::debug!(
                    "categorical prefix '{}' matches {} column(s), treating as ordinary",
                    prefix,
                    members.len()
                );
            }
        }

        let mut groups = Vec::with_capacity(columns.len());
        let mut categorical = Vec::with_capacity(columns.len());
        let mut emitted = vec![false; registered.len()];
        for (pos, col) in columns.iter().enumerate() {
            match owner.get(&pos) {
                Some(&group_id) => {
                    if !emitted[group_id] {
                        emitted[group_id] = true;
                        let (name, members) = &registered[group_id];
                        let member_names: Vec<String> = members
                            .iter()
                            .map(|&m| columns[m].as_ref().to_string())
                            .collect();
                        groups.push((name.clone(), member_names));
                        categorical.push(true);
                    }
                }
                None => {
                    groups.push((col.as_ref().to_string(), vec![col.as_ref().to_string()]));
                    categorical.push(false);
                }
            }
        }

        let index = FeatureGroupIndex { groups, categorical };
        index.ensure_unique_names()?;
        log::debug!(
            "built feature group index: {} columns -> {} groups ({} categorical)",
            columns.len(),
            index.len(),
            index.categorical.iter().filter(|&&c| c).count()
        );
        Ok(index)
    }

    // A prefix equal to an unclaimed column name would produce two groups
    // with the same key.
    fn ensure_unique_names(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for (name, _) in &self.groups {
            if !seen.insert(name.as_str()) {
                return Err(ExplainError::Schema(format!(
                    "Categorical prefix '{}' collides with an ordinary column of the same name.",
                    name
                )));
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Collapsed column names, in index order.
    pub fn names(&self) -> Vec<String> {
        self.groups.iter().map(|(name, _)| name.clone()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.groups
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, members)| members.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.groups
            .iter()
            .map(|(name, members)| (name.as_str(), members.as_slice()))
    }

    /// Groups that were registered from a categorical prefix.
    pub fn categorical_groups(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.iter()
            .zip(&self.categorical)
            .filter(|(_, &is_cat)| is_cat)
            .map(|(group, _)| group)
    }

    pub fn is_categorical(&self, name: &str) -> bool {
        self.groups
            .iter()
            .zip(&self.categorical)
            .any(|((n, _), &is_cat)| n == name && is_cat)
    }

    pub fn has_categorical(&self) -> bool {
        self.categorical.iter().any(|&c| c)
    }

    /// Positions of each group's members within `columns`.
    pub(crate) fn member_positions<S: AsRef<str>>(&self, columns: &[S]) -> Result<Vec<Vec<usize>>> {
        let names: Vec<&str> = self.groups.iter().map(|(name, _)| name.as_str()).collect();
        self.positions_of(&names, columns)
    }

    /// Positions within `columns` of the members of each named group, in the
    /// order the names are given.
    pub(crate) fn positions_of<S: AsRef<str>>(
        &self,
        names: &[&str],
        columns: &[S],
    ) -> Result<Vec<Vec<usize>>> {
        let lookup: HashMap<&str, usize> = columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.as_ref(), i))
            .collect();
        names
            .iter()
            .map(|&name| {
                let members = self.get(name).ok_or_else(|| {
                    ExplainError::Schema(format!(
                        "Column '{}' cannot be resolved against the schema.",
                        name
                    ))
                })?;
                members
                    .iter()
                    .map(|m| {
                        lookup.get(m.as_str()).copied().ok_or_else(|| {
                            ExplainError::Schema(format!(
                                "Column '{}' of group '{}' is not in the schema.",
                                m, name
                            ))
                        })
                    })
                    .collect::<Result<Vec<usize>>>()
            })
            .collect()
    }
}

/// Category label encoded by `column` for the group `prefix`.
pub(crate) fn category_label<'a>(column: &'a str, prefix: &str, separator: &str) -> &'a str {
    let rest = column.strip_prefix(prefix).unwrap_or(column);
    rest.strip_prefix(separator).unwrap_or(rest)
}

/// Recover, for every row, which category of the one-hot group `prefix` was
/// set.
///
/// Member columns are those named `prefix` + separator + label. The label of
/// the first column holding the row maximum wins; a row whose maximum is zero
/// yields the configured not-encoded label.
pub fn recover_onehot_labels(
    frame: &Frame,
    prefix: &str,
    config: Option<&ExplainConfig>,
) -> Result<Vec<String>> {
    let default_config;
    let config = match config {
        Some(c) => c,
        None => {
            default_config = ExplainConfig::default();
            &default_config
        }
    };
    let head = format!("{}{}", prefix, config.category_separator);
    let members: Vec<String> = frame
        .columns()
        .iter()
        .filter(|c| c.starts_with(&head))
        .cloned()
        .collect();
    if members.is_empty() {
        return Err(ExplainError::Schema(format!(
            "No columns that start with '{}' in frame.",
            head
        )));
    }
    recover_group_labels(frame, prefix, &members, config)
}

pub(crate) fn recover_group_labels(
    frame: &Frame,
    prefix: &str,
    members: &[String],
    config: &ExplainConfig,
) -> Result<Vec<String>> {
    let positions: Vec<usize> = members
        .iter()
        .map(|m| {
            frame.column_index(m).ok_or_else(|| {
                ExplainError::Schema(format!("Column '{}' is not in the frame.", m))
            })
        })
        .collect::<Result<_>>()?;
    let labels: Vec<&str> = members
        .iter()
        .map(|m| category_label(m, prefix, &config.category_separator))
        .collect();

    let values = frame.values();
    let recovered = values
        .rows()
        .into_iter()
        .map(|row| {
            let mut best = 0;
            for (k, &pos) in positions.iter().enumerate().skip(1) {
                if row[pos] > row[positions[best]] {
                    best = k;
                }
            }
            if row[positions[best]] == 0.0 {
                config.not_encoded_label.clone()
            } else {
                labels[best].to_string()
            }
        })
        .collect();
    Ok(recovered)
}
