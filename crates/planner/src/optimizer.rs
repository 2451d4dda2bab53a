use arrow_schema::SchemaRef;
use fpd_common::{ConnectorId, PushdownConfig, Result, Session};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::expr_classifier::{BuiltinDeterminism, DeterminismEvaluator};
use crate::logical_plan::{LogicalPlan, TableHandle};
use crate::plan_matcher::match_chain;
use crate::plan_rewriter::PushdownRewriter;

/// Pushdown needs the remote table's columns when a scan selects `*`.
/// The client provides this from its catalog.
pub trait SchemaProvider {
    /// Return schema for a remote table.
    fn table_schema(&self, table: &TableHandle) -> Result<SchemaRef>;
}

/// Host services available to optimizer rules.
pub trait OptimizerContext: SchemaProvider {
    /// Oracle deciding which conjuncts are safe to evaluate remotely.
    fn determinism(&self) -> &dyn DeterminismEvaluator {
        &BuiltinDeterminism
    }
}

/// Custom optimizer rule hook.
pub trait OptimizerRule: Send + Sync {
    /// Stable rule name used by registry.
    fn name(&self) -> &str;
    /// Rewrite input plan and return transformed plan.
    fn rewrite(
        &self,
        plan: LogicalPlan,
        ctx: &dyn OptimizerContext,
        session: &Session,
    ) -> Result<LogicalPlan>;
}

/// Pushdown optimizer for one connector.
///
/// Every branch of the plan is rewritten at its highest node where an
/// `Aggregate? -> Limit? -> Filter? -> TableScan` chain over the connector
/// starts. Anything the remote store cannot evaluate is kept above the new
/// scan, so the result computes the same rows as the input.
pub struct Optimizer {
    config: PushdownConfig,
    custom_rules: RwLock<HashMap<String, Arc<dyn OptimizerRule>>>,
}

impl std::fmt::Debug for Optimizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self
            .custom_rules
            .read()
            .map(|m| m.len())
            .unwrap_or_default();
        f.debug_struct("Optimizer")
            .field("connector_id", &self.config.connector_id)
            .field("custom_rules", &count)
            .finish()
    }
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::new(PushdownConfig::default())
    }
}

impl Optimizer {
    /// Create a new optimizer.
    pub fn new(config: PushdownConfig) -> Self {
        Self {
            config,
            custom_rules: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &PushdownConfig {
        &self.config
    }

    /// Register or replace a custom optimizer rule.
    ///
    /// Returns `true` when an existing rule with the same name was replaced.
    pub fn register_rule(&self, rule: Arc<dyn OptimizerRule>) -> bool {
        self.custom_rules
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(rule.name().to_string(), rule)
            .is_some()
    }

    /// Deregister a custom optimizer rule by name.
    ///
    /// Returns `true` when an existing rule was removed.
    pub fn deregister_rule(&self, name: &str) -> bool {
        self.custom_rules
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .is_some()
    }

    /// Push work into remote queries, then run custom rules.
    ///
    /// Plans without a matching chain come back unchanged, and so does a plan
    /// this method already optimized.
    pub fn optimize(
        &self,
        plan: LogicalPlan,
        ctx: &dyn OptimizerContext,
        session: &Session,
    ) -> Result<LogicalPlan> {
        // 1) pushdown
        let toggles = self.config.toggles(&session.properties);
        let rewriter = PushdownRewriter::new(&self.config, toggles, ctx, session.query_id);
        let mut plan = pushdown(plan, &rewriter, &self.config.connector_id)?;

        // 2) user-registered custom rules (deterministic by name)
        let mut rules = self
            .custom_rules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(k, v)| (k.clone(), Arc::clone(v)))
            .collect::<Vec<_>>();
        rules.sort_by(|a, b| a.0.cmp(&b.0));
        for (_name, rule) in rules {
            plan = rule.rewrite(plan, ctx, session)?;
        }

        Ok(plan)
    }
}

fn pushdown(
    plan: LogicalPlan,
    rewriter: &PushdownRewriter<'_>,
    connector: &ConnectorId,
) -> Result<LogicalPlan> {
    let rewritten = match match_chain(&plan, connector) {
        Some(chain) => Some(rewriter.rewrite(&chain)?),
        None => None,
    };
    match rewritten {
        Some(Some(new_plan)) => Ok(new_plan),
        // matched but not rewritable; its children belong to the same chain
        Some(None) => Ok(plan),
        None => try_map_children(plan, |child| pushdown(child, rewriter, connector)),
    }
}

fn try_map_children(
    plan: LogicalPlan,
    f: impl Fn(LogicalPlan) -> Result<LogicalPlan> + Copy,
) -> Result<LogicalPlan> {
    Ok(match plan {
        LogicalPlan::TableScan { .. } => plan,
        LogicalPlan::Projection { exprs, input } => LogicalPlan::Projection {
            exprs,
            input: Box::new(f(*input)?),
        },
        LogicalPlan::Filter { predicate, input } => LogicalPlan::Filter {
            predicate,
            input: Box::new(f(*input)?),
        },
        LogicalPlan::Aggregate {
            group_exprs,
            aggr_exprs,
            input,
        } => LogicalPlan::Aggregate {
            group_exprs,
            aggr_exprs,
            input: Box::new(f(*input)?),
        },
        LogicalPlan::Limit { n, input } => LogicalPlan::Limit {
            n,
            input: Box::new(f(*input)?),
        },
        LogicalPlan::Join { left, right, on } => LogicalPlan::Join {
            left: Box::new(f(*left)?),
            right: Box::new(f(*right)?),
            on,
        },
        LogicalPlan::UnionAll { left, right } => LogicalPlan::UnionAll {
            left: Box::new(f(*left)?),
            right: Box::new(f(*right)?),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logical_plan::{AggExpr, BinaryOp, Expr};
    use arrow_schema::{DataType, Field, Schema};
    use fpd_common::QueryId;

    struct TwoColumns;

    impl SchemaProvider for TwoColumns {
        fn table_schema(&self, _table: &TableHandle) -> Result<SchemaRef> {
            Ok(Arc::new(Schema::new(vec![
                Field::new("id", DataType::Int64, false),
                Field::new("v", DataType::Int64, true),
            ])))
        }
    }

    impl OptimizerContext for TwoColumns {}

    #[test]
    fn rewrites_each_branch_of_a_union_at_its_highest_chain() {
        let left = LogicalPlan::scan(TableHandle::new("pinot", "a"), None).limit(3);
        let right = LogicalPlan::scan(TableHandle::new("pinot", "b"), None)
            .filter(Expr::binary(Expr::column("v"), BinaryOp::Eq, Expr::literal(1)));
        let plan = LogicalPlan::UnionAll {
            left: Box::new(left),
            right: Box::new(right),
        };
        let out = Optimizer::default()
            .optimize(plan, &TwoColumns, &Session::new(QueryId(1)))
            .expect("optimize");
        let LogicalPlan::UnionAll { left, right } = out else {
            panic!("expected union, got {out:?}");
        };
        let LogicalPlan::TableScan { table: a, .. } = *left else {
            panic!("left branch not collapsed");
        };
        let LogicalPlan::TableScan { table: b, .. } = *right else {
            panic!("right branch not collapsed");
        };
        assert_eq!(
            a.query.expect("query").query(),
            "SELECT id, v FROM a LIMIT 3"
        );
        assert_eq!(
            b.query.expect("query").query(),
            "SELECT id, v FROM b__TABLE_NAME_SUFFIX_TEMPLATE__ WHERE (v = 1)"
        );
    }

    #[test]
    fn foreign_scans_are_untouched() {
        let plan = LogicalPlan::scan(TableHandle::new("hive", "a"), None).limit(3);
        let out = Optimizer::default()
            .optimize(plan.clone(), &TwoColumns, &Session::default())
            .expect("optimize");
        assert_eq!(out, plan);
    }

    #[test]
    fn zero_column_scan_is_returned_unpushed() {
        let plan = LogicalPlan::scan(TableHandle::new("pinot", "a"), Some(vec![]))
            .limit(5)
            .aggregate(vec![], vec![(AggExpr::CountStar, "count".to_string())]);
        let out = Optimizer::default()
            .optimize(plan.clone(), &TwoColumns, &Session::default())
            .expect("optimize");
        assert_eq!(out, plan);
    }

    #[test]
    fn debug_reports_rule_count() {
        let s = format!("{:?}", Optimizer::default());
        assert!(s.contains("custom_rules: 0"), "{s}");
    }
}
