use fpd_common::{PushdownConfig, PushdownToggles, QueryId, Result};
use tracing::{debug, warn};

use crate::expr_classifier::{classify, Classification};
use crate::logical_plan::{Expr, LogicalPlan};
use crate::optimizer::OptimizerContext;
use crate::plan_matcher::MatchedChain;
use crate::query_generator::{QueryGenerator, QueryRequest};

/// Replaces a matched chain with a scan that carries the generated query,
/// plus whatever the remote store cannot evaluate.
pub struct PushdownRewriter<'a> {
    config: &'a PushdownConfig,
    toggles: PushdownToggles,
    ctx: &'a dyn OptimizerContext,
    query_id: QueryId,
}

impl<'a> PushdownRewriter<'a> {
    pub fn new(
        config: &'a PushdownConfig,
        toggles: PushdownToggles,
        ctx: &'a dyn OptimizerContext,
        query_id: QueryId,
    ) -> Self {
        Self {
            config,
            toggles,
            ctx,
            query_id,
        }
    }

    /// Build the replacement for `chain`.
    ///
    /// Returns `Ok(None)` when the scan's columns cannot be resolved; the
    /// fragment then stays as it is.
    pub fn rewrite(&self, chain: &MatchedChain<'_>) -> Result<Option<LogicalPlan>> {
        let Some(columns) = self.scan_columns(chain) else {
            return Ok(None);
        };

        let classification = match chain.filter {
            Some(predicate) if self.toggles.predicate => classify(
                predicate.clone(),
                self.ctx.determinism(),
                &self.config.allow_list,
            ),
            Some(predicate) => Classification::all_residual(predicate.clone()),
            None => Classification::all_residual(Expr::literal(true)),
        };
        let residual = classification.has_residual();

        // A limit above a residual filter would cut rows before they are filtered.
        let pushed_limit = chain.limit.filter(|n| {
            self.toggles.limit && !residual && self.config.max_limit.map_or(true, |max| *n <= max)
        });
        let offered_aggregation = chain
            .aggregation
            .filter(|_| self.toggles.aggregation && chain.limit.is_none() && !residual);

        let generated = QueryGenerator::new(&self.config.allow_list)
            .prefer_single_query(self.toggles.prefer_single_query)
            .generate(&QueryRequest {
                table: chain.table,
                columns: &columns,
                predicate: classification
                    .has_pushable()
                    .then_some(&classification.pushable),
                limit: pushed_limit,
                aggregation: offered_aggregation,
            })?;

        debug!(
            query_id = %self.query_id,
            operator = "PushdownRewriter",
            connector = %chain.table.connector_id,
            table = %chain.table.table_name,
            mode = ?generated.query.mode(),
            residual,
            limit_pushed = pushed_limit.is_some(),
            aggregation_pushed = generated.aggregation_pushed,
            query = generated.query.query(),
            "pushed plan fragment into remote query"
        );

        let projection = generated.query.output_columns().to_vec();
        let mut plan = LogicalPlan::scan(chain.table.with_query(generated.query), Some(projection));
        if residual {
            plan = plan.filter(classification.residual);
        }
        if let (Some(n), None) = (chain.limit, pushed_limit) {
            plan = plan.limit(n);
        }
        if let Some(agg) = chain.aggregation.filter(|_| !generated.aggregation_pushed) {
            plan = plan.aggregate(agg.group_exprs.to_vec(), agg.aggr_exprs.to_vec());
        }
        Ok(Some(plan))
    }

    fn scan_columns(&self, chain: &MatchedChain<'_>) -> Option<Vec<String>> {
        if let Some(projection) = chain.projection {
            if projection.is_empty() {
                warn!(
                    query_id = %self.query_id,
                    table = %chain.table.table_name,
                    "scan selects no columns; scan left unpushed"
                );
                return None;
            }
            return Some(projection.to_vec());
        }
        let schema = match self.ctx.table_schema(chain.table) {
            Ok(schema) => schema,
            Err(e) => {
                warn!(
                    query_id = %self.query_id,
                    table = %chain.table.table_name,
                    error = %e,
                    "table schema unavailable; scan left unpushed"
                );
                return None;
            }
        };
        let columns = schema
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect::<Vec<_>>();
        if columns.is_empty() {
            warn!(
                query_id = %self.query_id,
                table = %chain.table.table_name,
                "table has no columns; scan left unpushed"
            );
            return None;
        }
        Some(columns)
    }
}
