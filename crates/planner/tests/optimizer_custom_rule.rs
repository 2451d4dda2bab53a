use std::sync::{Arc, Mutex};

use arrow_schema::{DataType, Field, Schema, SchemaRef};
use fpd_common::{QueryId, Session};
use fpd_planner::{
    BinaryOp, Expr, LiteralValue, LogicalPlan, Optimizer, OptimizerContext, OptimizerRule,
    SchemaProvider, TableHandle,
};

struct TestCtx {
    schema: SchemaRef,
}

impl SchemaProvider for TestCtx {
    fn table_schema(&self, _table: &TableHandle) -> fpd_common::Result<SchemaRef> {
        Ok(Arc::clone(&self.schema))
    }
}

impl OptimizerContext for TestCtx {}

fn test_ctx() -> TestCtx {
    TestCtx {
        schema: Arc::new(Schema::new(vec![
            Field::new("x", DataType::Int64, false),
            Field::new("y", DataType::Utf8, false),
        ])),
    }
}

/// Rewrites `expr > 10` into `expr >= 11` in host-side filters.
struct GtToGte11Rule;

impl OptimizerRule for GtToGte11Rule {
    fn name(&self) -> &str {
        "test_gt_to_gte_11"
    }

    fn rewrite(
        &self,
        plan: LogicalPlan,
        _ctx: &dyn OptimizerContext,
        _session: &Session,
    ) -> fpd_common::Result<LogicalPlan> {
        fn rewrite_expr(expr: Expr) -> Expr {
            match expr {
                Expr::BinaryOp {
                    left,
                    op: BinaryOp::Gt,
                    right,
                } if *right == Expr::Literal(LiteralValue::Int64(10)) => {
                    Expr::binary(*left, BinaryOp::GtEq, Expr::literal(11))
                }
                Expr::And(a, b) => rewrite_expr(*a).and(rewrite_expr(*b)),
                other => other,
            }
        }

        fn rewrite_plan(plan: LogicalPlan) -> LogicalPlan {
            match plan {
                LogicalPlan::Filter { predicate, input } => LogicalPlan::Filter {
                    predicate: rewrite_expr(predicate),
                    input: Box::new(rewrite_plan(*input)),
                },
                LogicalPlan::Limit { n, input } => LogicalPlan::Limit {
                    n,
                    input: Box::new(rewrite_plan(*input)),
                },
                other => other,
            }
        }

        Ok(rewrite_plan(plan))
    }
}

/// Records the order in which rules run.
struct Recorder {
    name: &'static str,
    log: Arc<Mutex<Vec<&'static str>>>,
}

impl OptimizerRule for Recorder {
    fn name(&self) -> &str {
        self.name
    }

    fn rewrite(
        &self,
        plan: LogicalPlan,
        _ctx: &dyn OptimizerContext,
        _session: &Session,
    ) -> fpd_common::Result<LogicalPlan> {
        self.log.lock().expect("log lock").push(self.name);
        Ok(plan)
    }
}

#[test]
fn custom_rule_sees_residual_filter_after_pushdown() {
    // `length(y) > 10` is not allow-listed, so it stays above the scan.
    let residual = Expr::binary(
        Expr::function("length", vec![Expr::column("y")]),
        BinaryOp::Gt,
        Expr::literal(10),
    );
    let plan = LogicalPlan::scan(TableHandle::new("pinot", "t"), None).filter(residual);

    let optimizer = Optimizer::default();
    assert!(!optimizer.register_rule(Arc::new(GtToGte11Rule)));
    let optimized = optimizer
        .optimize(plan, &test_ctx(), &Session::new(QueryId(3)))
        .expect("optimize");

    let LogicalPlan::Filter { predicate, input } = optimized else {
        panic!("expected residual filter, got {optimized:?}");
    };
    assert_eq!(
        predicate,
        Expr::binary(
            Expr::function("length", vec![Expr::column("y")]),
            BinaryOp::GtEq,
            Expr::literal(11),
        )
    );
    let LogicalPlan::TableScan { table, .. } = *input else {
        panic!("expected scan below residual filter");
    };
    assert_eq!(
        table.query.expect("pushed query").query(),
        "SELECT x, y FROM t__TABLE_NAME_SUFFIX_TEMPLATE__"
    );
}

#[test]
fn custom_rules_run_in_name_order_and_can_be_removed() {
    let log = Arc::new(Mutex::new(vec![]));
    let optimizer = Optimizer::default();
    for name in ["b_second", "a_first", "c_third"] {
        optimizer.register_rule(Arc::new(Recorder {
            name,
            log: Arc::clone(&log),
        }));
    }
    assert!(optimizer.register_rule(Arc::new(Recorder {
        name: "c_third",
        log: Arc::clone(&log),
    })));
    assert!(optimizer.deregister_rule("b_second"));
    assert!(!optimizer.deregister_rule("b_second"));

    let plan = LogicalPlan::scan(TableHandle::new("hive", "t"), None);
    optimizer
        .optimize(plan, &test_ctx(), &Session::default())
        .expect("optimize");
    assert_eq!(*log.lock().expect("log lock"), vec!["a_first", "c_third"]);
}
