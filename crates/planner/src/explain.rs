use crate::logical_plan::{AggExpr, ExecutionMode, Expr, LiteralValue, LogicalPlan};

/// Render logical plan as human-readable multiline text.
pub fn explain_logical(plan: &LogicalPlan) -> String {
    let mut s = String::new();
    fmt_plan(plan, 0, &mut s);
    s
}

fn fmt_plan(plan: &LogicalPlan, indent: usize, out: &mut String) {
    let pad = "  ".repeat(indent);
    match plan {
        LogicalPlan::TableScan { table, projection } => {
            out.push_str(&format!(
                "{pad}TableScan connector={} table={}\n",
                table.connector_id, table.table_name
            ));
            match projection {
                Some(cols) => out.push_str(&format!("{pad}  projection=[{}]\n", cols.join(", "))),
                None => out.push_str(&format!("{pad}  projection=*\n")),
            }
            if let Some(q) = &table.query {
                out.push_str(&format!("{pad}  mode={}\n", fmt_mode(q.mode())));
                out.push_str(&format!("{pad}  query={}\n", q.query()));
                out.push_str(&format!(
                    "{pad}  output_columns=[{}]\n",
                    q.output_columns().join(", ")
                ));
            }
        }
        LogicalPlan::Filter { predicate, input } => {
            out.push_str(&format!("{pad}Filter {}\n", fmt_expr(predicate)));
            fmt_plan(input, indent + 1, out);
        }
        LogicalPlan::Projection { exprs, input } => {
            out.push_str(&format!("{pad}Projection\n"));
            for (e, name) in exprs {
                out.push_str(&format!("{pad}  {name} := {}\n", fmt_expr(e)));
            }
            fmt_plan(input, indent + 1, out);
        }
        LogicalPlan::Aggregate {
            group_exprs,
            aggr_exprs,
            input,
        } => {
            out.push_str(&format!("{pad}Aggregate\n"));
            out.push_str(&format!("{pad}  group_by={}\n", group_exprs.len()));
            for g in group_exprs {
                out.push_str(&format!("{pad}    {}\n", fmt_expr(g)));
            }
            out.push_str(&format!("{pad}  aggs={}\n", aggr_exprs.len()));
            for (a, name) in aggr_exprs {
                out.push_str(&format!("{pad}    {name} := {}\n", fmt_agg(a)));
            }
            fmt_plan(input, indent + 1, out);
        }
        LogicalPlan::Limit { n, input } => {
            out.push_str(&format!("{pad}Limit n={n}\n"));
            fmt_plan(input, indent + 1, out);
        }
        LogicalPlan::Join { left, right, on } => {
            out.push_str(&format!("{pad}Join\n"));
            out.push_str(&format!("{pad}  on={:?}\n", on));
            out.push_str(&format!("{pad}  left:\n"));
            fmt_plan(left, indent + 2, out);
            out.push_str(&format!("{pad}  right:\n"));
            fmt_plan(right, indent + 2, out);
        }
        LogicalPlan::UnionAll { left, right } => {
            out.push_str(&format!("{pad}UnionAll\n"));
            fmt_plan(left, indent + 1, out);
            fmt_plan(right, indent + 1, out);
        }
    }
}

fn fmt_mode(mode: ExecutionMode) -> &'static str {
    match mode {
        ExecutionMode::SingleQuery => "single_query",
        ExecutionMode::PerPartitionQuery => "per_partition_query",
    }
}

pub(crate) fn fmt_agg(a: &AggExpr) -> String {
    match a {
        AggExpr::CountStar => "count(*)".to_string(),
        other => format!(
            "{}({})",
            other.function_name(),
            other
                .args()
                .into_iter()
                .map(fmt_expr)
                .collect::<Vec<_>>()
                .join(", ")
        ),
    }
}

fn fmt_expr(e: &Expr) -> String {
    match e {
        Expr::Column(c) => c.clone(),
        Expr::Literal(v) => fmt_literal(v),
        Expr::Not(x) => format!("NOT ({})", fmt_expr(x)),
        Expr::Negative(x) => format!("-({})", fmt_expr(x)),
        Expr::IsNull(x) => format!("{} IS NULL", fmt_expr(x)),
        Expr::IsNotNull(x) => format!("{} IS NOT NULL", fmt_expr(x)),
        Expr::And(a, b) => format!("({}) AND ({})", fmt_expr(a), fmt_expr(b)),
        Expr::Or(a, b) => format!("({}) OR ({})", fmt_expr(a), fmt_expr(b)),
        Expr::BinaryOp { left, op, right } => {
            format!("{} {} {}", fmt_expr(left), op.symbol(), fmt_expr(right))
        }
        Expr::Between {
            expr,
            low,
            high,
            negated,
        } => format!(
            "{} {}BETWEEN {} AND {}",
            fmt_expr(expr),
            if *negated { "NOT " } else { "" },
            fmt_expr(low),
            fmt_expr(high)
        ),
        Expr::InList {
            expr,
            list,
            negated,
        } => format!(
            "{} {}IN ({})",
            fmt_expr(expr),
            if *negated { "NOT " } else { "" },
            list.iter().map(fmt_expr).collect::<Vec<_>>().join(", ")
        ),
        Expr::ScalarFunction { name, args } => format!(
            "{}({})",
            name,
            args.iter().map(fmt_expr).collect::<Vec<_>>().join(", ")
        ),
    }
}

fn fmt_literal(v: &LiteralValue) -> String {
    match v {
        LiteralValue::Int64(i) => i.to_string(),
        LiteralValue::Float64(f) => format!("{f:?}"),
        LiteralValue::Utf8(s) => format!("'{s}'"),
        LiteralValue::Boolean(b) => b.to_string(),
        LiteralValue::Null => "NULL".to_string(),
    }
}
