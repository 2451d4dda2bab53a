use serde::{Deserialize, Serialize};

use crate::ids::QueryId;

/// Per-query context handed to the optimizer by the host engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub query_id: QueryId,
    pub properties: SessionProperties,
}

impl Session {
    pub fn new(query_id: QueryId) -> Self {
        Self {
            query_id,
            properties: SessionProperties::default(),
        }
    }

    pub fn with_properties(mut self, properties: SessionProperties) -> Self {
        self.properties = properties;
        self
    }
}

/// Session-level overrides of [`crate::PushdownConfig`] toggles.
///
/// `None` keeps the connector-level setting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionProperties {
    pub predicate_pushdown: Option<bool>,
    pub limit_pushdown: Option<bool>,
    pub aggregation_pushdown: Option<bool>,
    pub prefer_single_query: Option<bool>,
}
