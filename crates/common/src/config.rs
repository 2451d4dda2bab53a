use std::collections::BTreeSet;
use std::fs;

use serde::{Deserialize, Serialize};

use crate::error::{FpdError, Result};
use crate::ids::ConnectorId;
use crate::session::SessionProperties;

/// Static pushdown configuration for one connector.
///
/// Loaded once at connector start-up; per-query overrides come from
/// [`SessionProperties`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PushdownConfig {
    /// Only scans whose table handle carries this connector id are rewritten.
    pub connector_id: ConnectorId,
    pub predicate_pushdown_enabled: bool,
    pub limit_pushdown_enabled: bool,
    pub aggregation_pushdown_enabled: bool,
    /// Issue filter-only queries once instead of once per partition.
    pub prefer_single_query: bool,
    /// Limits above this value stay in the host plan.
    pub max_limit: Option<usize>,
    pub allow_list: FunctionAllowList,
}

impl Default for PushdownConfig {
    fn default() -> Self {
        Self {
            connector_id: ConnectorId::new("pinot"),
            predicate_pushdown_enabled: true,
            limit_pushdown_enabled: true,
            aggregation_pushdown_enabled: true,
            prefer_single_query: false,
            max_limit: None,
            allow_list: FunctionAllowList::default(),
        }
    }
}

impl PushdownConfig {
    /// Parse a config from JSON text. Missing keys keep their defaults.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let mut cfg: Self = serde_json::from_str(s)
            .map_err(|e| FpdError::InvalidConfig(format!("pushdown config: {e}")))?;
        cfg.allow_list = cfg.allow_list.normalized();
        Ok(cfg)
    }

    /// Load a config file from disk.
    pub fn load_from_json(path: &str) -> Result<Self> {
        let s = fs::read_to_string(path)?;
        Self::from_json_str(&s)
    }

    /// Resolve the effective toggles for one query.
    pub fn toggles(&self, props: &SessionProperties) -> PushdownToggles {
        PushdownToggles {
            predicate: props
                .predicate_pushdown
                .unwrap_or(self.predicate_pushdown_enabled),
            limit: props.limit_pushdown.unwrap_or(self.limit_pushdown_enabled),
            aggregation: props
                .aggregation_pushdown
                .unwrap_or(self.aggregation_pushdown_enabled),
            prefer_single_query: props
                .prefer_single_query
                .unwrap_or(self.prefer_single_query),
        }
    }
}

/// Feature toggles after session overrides were applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushdownToggles {
    pub predicate: bool,
    pub limit: bool,
    pub aggregation: bool,
    pub prefer_single_query: bool,
}

/// Operators and functions the remote query language can evaluate.
///
/// Operator keys are the rendered symbols (`=`, `<>`, `<`, `<=`, `>`, `>=`,
/// `+`, `-`, `*`, `/`) and the keywords `and`, `or`, `not`, `between`, `in`,
/// `is_null`, `is_not_null`, `negative`. Function names are matched
/// case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FunctionAllowList {
    pub operators: BTreeSet<String>,
    pub scalar_functions: BTreeSet<String>,
    pub aggregate_functions: BTreeSet<String>,
}

impl Default for FunctionAllowList {
    fn default() -> Self {
        let operators = [
            "=",
            "<>",
            "<",
            "<=",
            ">",
            ">=",
            "and",
            "or",
            "not",
            "between",
            "in",
            "is_null",
            "is_not_null",
            "negative",
        ];
        let aggregates = ["count", "sum", "min", "max", "avg"];
        Self {
            operators: operators.iter().map(|s| s.to_string()).collect(),
            scalar_functions: BTreeSet::new(),
            aggregate_functions: aggregates.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl FunctionAllowList {
    pub fn supports_operator(&self, key: &str) -> bool {
        self.operators.contains(key)
    }

    pub fn supports_scalar_function(&self, name: &str) -> bool {
        self.scalar_functions.contains(&name.to_ascii_lowercase())
    }

    pub fn supports_aggregate(&self, name: &str) -> bool {
        self.aggregate_functions.contains(&name.to_ascii_lowercase())
    }

    /// Allow an extra scalar function. Builder-style for tests and embedders.
    pub fn with_scalar_function(mut self, name: &str) -> Self {
        self.scalar_functions.insert(name.to_ascii_lowercase());
        self
    }

    /// Allow an extra operator key.
    pub fn with_operator(mut self, key: &str) -> Self {
        self.operators.insert(key.to_ascii_lowercase());
        self
    }

    /// Remove an aggregate function from the allow-list.
    pub fn without_aggregate(mut self, name: &str) -> Self {
        self.aggregate_functions.remove(&name.to_ascii_lowercase());
        self
    }

    fn normalized(self) -> Self {
        let lower = |set: BTreeSet<String>| {
            set.into_iter()
                .map(|s| s.to_ascii_lowercase())
                .collect::<BTreeSet<_>>()
        };
        Self {
            operators: lower(self.operators),
            scalar_functions: lower(self.scalar_functions),
            aggregate_functions: lower(self.aggregate_functions),
        }
    }
}
