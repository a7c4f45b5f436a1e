// src/core/config.rs
use serde::{Deserialize, Serialize};

/// Label reported when no column of a one-hot group is set.
pub const NOT_ENCODED: &str = "NOT_ENCODED";

/// What to do with a categorical prefix that matches no column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrefixPolicy {
    /// Fail with a schema error.
    Strict,
    /// Log a warning and carry on without the prefix.
    Lenient,
}

/// Settings shared by the collapse, table and trace routines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplainConfig {
    pub prefix_policy: PrefixPolicy,
    /// Separator between a prefix and its category label, as in `Gender_Male`.
    pub category_separator: String,
    pub not_encoded_label: String,
    /// Decimal places used by the text summaries.
    pub round_digits: u32,
    /// Class index treated as positive by classifier traces.
    pub pos_label: usize,
}

impl Default for ExplainConfig {
    fn default() -> Self {
        ExplainConfig {
            prefix_policy: PrefixPolicy::Strict,
            category_separator: "_".to_string(),
            not_encoded_label: NOT_ENCODED.to_string(),
            round_digits: 2,
            pos_label: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_falls_back_to_defaults() {
        let config: ExplainConfig =
            serde_json::from_str(r#"{"prefix_policy": "lenient", "round_digits": 3}"#).unwrap();
        assert_eq!(config.prefix_policy, PrefixPolicy::Lenient);
        assert_eq!(config.round_digits, 3);
        assert_eq!(config.category_separator, "_");
        assert_eq!(config.not_encoded_label, NOT_ENCODED);
    }
}
