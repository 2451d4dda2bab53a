use fpd_common::ConnectorId;

use crate::logical_plan::{Expr, LogicalPlan, TableHandle};
use crate::query_generator::AggregationSpec;

/// A plan fragment of the shape `Aggregate? -> Limit? -> Filter? -> TableScan`
/// whose scan reads from the pushdown connector.
#[derive(Debug, Clone, Copy)]
pub struct MatchedChain<'a> {
    pub aggregation: Option<AggregationSpec<'a>>,
    pub limit: Option<usize>,
    pub filter: Option<&'a Expr>,
    pub table: &'a TableHandle,
    pub projection: Option<&'a [String]>,
}

/// Position in the chain; each stage only accepts the nodes allowed below
/// the ones already seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Stage {
    Aggregation,
    Limit,
    Filter,
    Scan,
}

/// Match the chain rooted at `plan`, or `None` when the fragment has any
/// other shape, targets another connector or was already pushed down.
pub fn match_chain<'a>(plan: &'a LogicalPlan, connector: &ConnectorId) -> Option<MatchedChain<'a>> {
    let mut aggregation = None;
    let mut limit = None;
    let mut filter = None;
    let mut stage = Stage::Aggregation;
    let mut node = plan;
    loop {
        match node {
            LogicalPlan::Aggregate {
                group_exprs,
                aggr_exprs,
                input,
            } if stage <= Stage::Aggregation => {
                aggregation = Some(AggregationSpec {
                    group_exprs,
                    aggr_exprs,
                });
                stage = Stage::Limit;
                node = &**input;
            }
            LogicalPlan::Limit { n, input } if stage <= Stage::Limit => {
                limit = Some(*n);
                stage = Stage::Filter;
                node = &**input;
            }
            LogicalPlan::Filter { predicate, input } if stage <= Stage::Filter => {
                filter = Some(predicate);
                stage = Stage::Scan;
                node = &**input;
            }
            LogicalPlan::TableScan { table, projection } => {
                if table.connector_id != *connector || table.query.is_some() {
                    return None;
                }
                return Some(MatchedChain {
                    aggregation,
                    limit,
                    filter,
                    table,
                    projection: projection.as_deref(),
                });
            }
            LogicalPlan::Aggregate { .. }
            | LogicalPlan::Limit { .. }
            | LogicalPlan::Filter { .. }
            | LogicalPlan::Projection { .. }
            | LogicalPlan::Join { .. }
            | LogicalPlan::UnionAll { .. } => return None,
        }
    }
}
