use std::sync::atomic::{AtomicU64, Ordering};

use fpd_common::{PushdownConfig, QueryId, Result, Session, SessionProperties};
use fpd_planner::{explain_logical, sql_to_logical, LogicalPlan, Optimizer};
use fpd_storage::Catalog;
use tracing::info;

use crate::context::CatalogContext;

/// Plans before and after pushdown for one query.
#[derive(Debug, Clone, PartialEq)]
pub struct PushdownReport {
    pub query_id: QueryId,
    pub before: LogicalPlan,
    pub after: LogicalPlan,
}

impl PushdownReport {
    /// Both plans as indented text, the way the CLI prints them.
    pub fn explain(&self) -> String {
        format!(
            "== query {} ==\n-- before pushdown --\n{}-- after pushdown --\n{}",
            self.query_id,
            explain_logical(&self.before),
            explain_logical(&self.after)
        )
    }
}

#[derive(Debug)]
pub struct Engine {
    catalog: Catalog,
    optimizer: Optimizer,
    next_query_id: AtomicU64,
}

impl Engine {
    pub fn new(config: PushdownConfig, catalog: Catalog) -> Self {
        Self {
            catalog,
            optimizer: Optimizer::new(config),
            next_query_id: AtomicU64::new(1),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Optimizer used by [`Engine::pushdown`]; custom rules are registered here.
    pub fn optimizer(&self) -> &Optimizer {
        &self.optimizer
    }

    /// Parse `query` against the catalog without optimizing it.
    pub fn sql(&self, query: &str) -> Result<LogicalPlan> {
        sql_to_logical(query, &CatalogContext::new(&self.catalog))
    }

    /// Plan `query` and push as much of it as possible into remote queries.
    pub fn pushdown(&self, query: &str, properties: SessionProperties) -> Result<PushdownReport> {
        let query_id = QueryId(self.next_query_id.fetch_add(1, Ordering::Relaxed));
        let session = Session::new(query_id).with_properties(properties);
        let ctx = CatalogContext::new(&self.catalog);

        let before = sql_to_logical(query, &ctx)?;
        let after = self.optimizer.optimize(before.clone(), &ctx, &session)?;
        info!(
            query_id = %query_id,
            operator = "Engine",
            rewritten = before != after,
            "planned pushdown"
        );
        Ok(PushdownReport {
            query_id,
            before,
            after,
        })
    }
}
