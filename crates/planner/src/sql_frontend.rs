use fpd_common::{FpdError, Result};
use sqlparser::ast::{
    BinaryOperator as SqlBinaryOp, Expr as SqlExpr, Function, FunctionArg, FunctionArgExpr,
    FunctionArguments, GroupByExpr, Ident, ObjectName, Query, Select, SelectItem, SetExpr,
    Statement, TableFactor, TableWithJoins, UnaryOperator, Value,
};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::Token;

use crate::explain::fmt_agg;
use crate::logical_plan::{AggExpr, BinaryOp, Expr, LiteralValue, LogicalPlan, TableHandle};
use crate::optimizer::SchemaProvider;

/// Maps SQL table names to connector table handles.
pub trait TableResolver: SchemaProvider {
    fn resolve_table(&self, name: &str) -> Result<TableHandle>;
}

/// Aggregates recognized in a SELECT list besides the five core ones.
const EXTRA_AGGREGATES: &[&str] = &[
    "approx_distinct",
    "approx_percentile",
    "arbitrary",
    "distinctcount",
    "percentile",
    "stddev",
    "variance",
];

pub fn parse_sql(sql: &str) -> Result<Vec<Statement>> {
    let dialect = GenericDialect {};
    Parser::parse_sql(&dialect, sql).map_err(|e| FpdError::Planning(e.to_string()))
}

/// Parse a standalone SQL boolean expression such as `fare > 100 AND city = 'del'`.
pub fn parse_predicate(sql: &str) -> Result<Expr> {
    let dialect = GenericDialect {};
    let mut parser = Parser::new(&dialect)
        .try_with_sql(sql)
        .map_err(|e| FpdError::Planning(e.to_string()))?;
    let e = parser
        .parse_expr()
        .map_err(|e| FpdError::Planning(e.to_string()))?;
    let next = parser.peek_token();
    if next.token != Token::EOF {
        return Err(FpdError::Planning(format!(
            "unexpected trailing input in predicate: {}",
            next.token
        )));
    }
    sql_expr_to_expr(&e)
}

/// Convert a single SELECT statement into a logical plan.
///
/// Produces `Limit?(Aggregate?(Filter?(TableScan)))`, with a `Projection`
/// on top when the SELECT list renames, reorders or drops columns the
/// plan below it needs.
pub fn sql_to_logical(sql: &str, resolver: &dyn TableResolver) -> Result<LogicalPlan> {
    let stmts = parse_sql(sql)?;
    if stmts.len() != 1 {
        return Err(FpdError::Unsupported(
            "only single-statement SQL is supported".to_string(),
        ));
    }
    match &stmts[0] {
        Statement::Query(q) => query_to_logical(q, resolver),
        _ => Err(FpdError::Unsupported(
            "only SELECT queries are supported".to_string(),
        )),
    }
}

fn query_to_logical(q: &Query, resolver: &dyn TableResolver) -> Result<LogicalPlan> {
    if q.order_by.is_some() {
        return Err(FpdError::Unsupported("ORDER BY is not supported".to_string()));
    }
    if q.offset.is_some() || q.fetch.is_some() {
        return Err(FpdError::Unsupported(
            "OFFSET/FETCH is not supported".to_string(),
        ));
    }
    let select = match &*q.body {
        SetExpr::Select(s) => s.as_ref(),
        _ => {
            return Err(FpdError::Unsupported(
                "only simple SELECT is supported (no UNION/EXCEPT/INTERSECT)".to_string(),
            ))
        }
    };
    if select.distinct.is_some() {
        return Err(FpdError::Unsupported("SELECT DISTINCT is not supported".to_string()));
    }
    if select.having.is_some() {
        return Err(FpdError::Unsupported("HAVING is not supported".to_string()));
    }

    let table = resolver.resolve_table(&from_table_name(&select.from)?)?;
    let known_columns = resolver
        .table_schema(&table)?
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect::<Vec<_>>();

    let predicate = select.selection.as_ref().map(sql_expr_to_expr).transpose()?;
    let limit = q.limit.as_ref().map(sql_limit_to_usize).transpose()?;
    let items = select_items(select)?;

    let is_aggregate = items.iter().any(|i| matches!(i, Item::Aggregate(..)))
        || !group_by_columns(&select.group_by)?.is_empty();
    let (plan, projection) = if is_aggregate {
        aggregate_plan(table, select, items, predicate.as_ref(), limit)?
    } else {
        row_plan(table, items, predicate.as_ref(), limit)?
    };

    for col in referenced_columns(&plan) {
        if !known_columns.contains(&col) {
            return Err(FpdError::Planning(format!("unknown column: {col}")));
        }
    }

    Ok(match projection {
        Some(exprs) => LogicalPlan::Projection {
            exprs,
            input: Box::new(plan),
        },
        None => plan,
    })
}

/// One entry of the SELECT list.
enum Item {
    Wildcard,
    Column { name: String, alias: Option<String> },
    Aggregate(AggExpr, String),
}

fn select_items(select: &Select) -> Result<Vec<Item>> {
    let mut items = vec![];
    for item in &select.projection {
        let (e, alias) = match item {
            SelectItem::UnnamedExpr(e) => (e, None),
            SelectItem::ExprWithAlias { expr, alias } => (expr, Some(alias.value.clone())),
            SelectItem::Wildcard(_) | SelectItem::QualifiedWildcard(_, _) => {
                items.push(Item::Wildcard);
                continue;
            }
        };
        if let Some(agg) = try_parse_agg(e)? {
            let name = alias.unwrap_or_else(|| fmt_agg(&agg));
            items.push(Item::Aggregate(agg, name));
            continue;
        }
        match sql_expr_to_expr(e)? {
            Expr::Column(name) => items.push(Item::Column { name, alias }),
            _ => {
                return Err(FpdError::Unsupported(format!(
                    "only columns and aggregates are supported in the SELECT list: {e}"
                )))
            }
        }
    }
    if items.len() > 1 && items.iter().any(|i| matches!(i, Item::Wildcard)) {
        return Err(FpdError::Unsupported(
            "`*` cannot be combined with other SELECT items".to_string(),
        ));
    }
    Ok(items)
}

fn row_plan(
    table: TableHandle,
    items: Vec<Item>,
    predicate: Option<&Expr>,
    limit: Option<usize>,
) -> Result<(LogicalPlan, Option<Vec<(Expr, String)>>)> {
    let mut selected = vec![];
    for item in items {
        match item {
            Item::Wildcard => {
                let plan = with_filter_and_limit(LogicalPlan::scan(table, None), predicate, limit);
                return Ok((plan, None));
            }
            Item::Column { name, alias } => {
                let out = alias.unwrap_or_else(|| name.clone());
                selected.push((name, out));
            }
            Item::Aggregate(..) => {
                return Err(FpdError::Planning(
                    "aggregate in a query planned without aggregation".to_string(),
                ))
            }
        }
    }

    let mut scan_cols = vec![];
    for (name, _) in &selected {
        push_unique(&mut scan_cols, name);
    }
    if let Some(p) = predicate {
        collect_columns(p, &mut scan_cols);
    }
    let narrowed = scan_cols.len() != selected.len() || selected.iter().any(|(n, o)| n != o);
    let plan = with_filter_and_limit(LogicalPlan::scan(table, Some(scan_cols)), predicate, limit);
    let projection = narrowed.then(|| {
        selected
            .into_iter()
            .map(|(name, out)| (Expr::Column(name), out))
            .collect()
    });
    Ok((plan, projection))
}

fn aggregate_plan(
    table: TableHandle,
    select: &Select,
    items: Vec<Item>,
    predicate: Option<&Expr>,
    limit: Option<usize>,
) -> Result<(LogicalPlan, Option<Vec<(Expr, String)>>)> {
    let group_cols = group_by_columns(&select.group_by)?;
    let mut aggr_exprs = vec![];
    // (name in the aggregate's output, name in the query's output)
    let mut selected = vec![];
    for item in items {
        match item {
            Item::Wildcard => {
                return Err(FpdError::Unsupported(
                    "`*` is not supported in an aggregate query".to_string(),
                ))
            }
            Item::Column { name, alias } => {
                if !group_cols.contains(&name) {
                    return Err(FpdError::Planning(format!(
                        "column {name} must appear in GROUP BY or be aggregated"
                    )));
                }
                let out = alias.unwrap_or_else(|| name.clone());
                selected.push((name, out));
            }
            Item::Aggregate(agg, name) => {
                selected.push((name.clone(), name.clone()));
                aggr_exprs.push((agg, name));
            }
        }
    }

    let mut scan_cols = group_cols.clone();
    for (agg, _) in &aggr_exprs {
        for arg in agg.args() {
            collect_columns(arg, &mut scan_cols);
        }
    }
    if let Some(p) = predicate {
        collect_columns(p, &mut scan_cols);
    }
    let scan = LogicalPlan::scan(table, (!scan_cols.is_empty()).then_some(scan_cols));

    let output = group_cols
        .iter()
        .cloned()
        .chain(aggr_exprs.iter().map(|(_, name)| name.clone()))
        .collect::<Vec<_>>();
    let reshaped = selected.len() != output.len()
        || selected
            .iter()
            .zip(&output)
            .any(|((name, out), agg_out)| name != agg_out || name != out);

    let mut plan = scan;
    if let Some(p) = predicate {
        plan = plan.filter(p.clone());
    }
    plan = plan.aggregate(group_cols.into_iter().map(Expr::Column).collect(), aggr_exprs);
    if let Some(n) = limit {
        plan = plan.limit(n);
    }
    let projection = reshaped.then(|| {
        selected
            .into_iter()
            .map(|(name, out)| (Expr::Column(name), out))
            .collect()
    });
    Ok((plan, projection))
}

fn with_filter_and_limit(
    mut plan: LogicalPlan,
    predicate: Option<&Expr>,
    limit: Option<usize>,
) -> LogicalPlan {
    if let Some(p) = predicate {
        plan = plan.filter(p.clone());
    }
    if let Some(n) = limit {
        plan = plan.limit(n);
    }
    plan
}

fn from_table_name(from: &[TableWithJoins]) -> Result<String> {
    if from.len() != 1 {
        return Err(FpdError::Unsupported(
            "only one FROM source is supported".to_string(),
        ));
    }
    let twj = &from[0];
    if !twj.joins.is_empty() {
        return Err(FpdError::Unsupported("JOIN is not supported".to_string()));
    }
    match &twj.relation {
        TableFactor::Table { name, .. } => Ok(object_name_to_string(name)),
        _ => Err(FpdError::Unsupported(
            "only simple table names in FROM are supported".to_string(),
        )),
    }
}

fn group_by_columns(g: &GroupByExpr) -> Result<Vec<String>> {
    match g {
        GroupByExpr::Expressions(es, _mods) => es
            .iter()
            .map(|e| match sql_expr_to_expr(e)? {
                Expr::Column(c) => Ok(c),
                _ => Err(FpdError::Unsupported(format!(
                    "GROUP BY supports plain columns only: {e}"
                ))),
            })
            .collect(),
        GroupByExpr::All(_mods) => Err(FpdError::Unsupported(
            "GROUP BY ALL is not supported".to_string(),
        )),
    }
}

fn try_parse_agg(e: &SqlExpr) -> Result<Option<AggExpr>> {
    let SqlExpr::Function(func) = e else {
        return Ok(None);
    };
    let fname = object_name_to_string(&func.name).to_lowercase();
    let is_core = matches!(fname.as_str(), "count" | "sum" | "min" | "max" | "avg");
    if !is_core && !EXTRA_AGGREGATES.contains(&fname.as_str()) {
        return Ok(None);
    }
    if func.over.is_some() {
        return Err(FpdError::Unsupported(format!(
            "window function {fname}() is not supported"
        )));
    }
    let args = function_args(func)?;
    if fname == "count" && matches!(args, [FunctionArg::Unnamed(FunctionArgExpr::Wildcard)]) {
        return Ok(Some(AggExpr::CountStar));
    }
    let mut args = args
        .iter()
        .map(function_arg_to_expr)
        .collect::<Result<Vec<_>>>()?;
    if !is_core {
        return Ok(Some(AggExpr::Function { name: fname, args }));
    }
    if args.len() != 1 {
        return Err(FpdError::Unsupported(format!(
            "{fname}() requires exactly one argument"
        )));
    }
    let arg = args.remove(0);
    Ok(Some(match fname.as_str() {
        "count" => AggExpr::Count(arg),
        "sum" => AggExpr::Sum(arg),
        "min" => AggExpr::Min(arg),
        "max" => AggExpr::Max(arg),
        _ => AggExpr::Avg(arg),
    }))
}

fn function_args(func: &Function) -> Result<&[FunctionArg]> {
    match &func.args {
        FunctionArguments::None => Ok(&[]),
        FunctionArguments::List(list) => {
            if list.duplicate_treatment.is_some() {
                return Err(FpdError::Unsupported(format!(
                    "DISTINCT/ALL inside {}() is not supported",
                    func.name
                )));
            }
            Ok(list.args.as_slice())
        }
        FunctionArguments::Subquery(_) => Err(FpdError::Unsupported(
            "subquery function arguments are not supported".to_string(),
        )),
    }
}

fn function_arg_to_expr(a: &FunctionArg) -> Result<Expr> {
    match a {
        FunctionArg::Unnamed(FunctionArgExpr::Expr(e)) => sql_expr_to_expr(e),
        _ => Err(FpdError::Unsupported(format!(
            "unsupported function argument form: {a}"
        ))),
    }
}

fn sql_expr_to_expr(e: &SqlExpr) -> Result<Expr> {
    match e {
        SqlExpr::Identifier(id) => Ok(Expr::Column(id.value.clone())),
        SqlExpr::CompoundIdentifier(parts) => Ok(Expr::Column(last_ident(parts)?)),
        SqlExpr::Value(v) => sql_value_to_literal(v),
        SqlExpr::Nested(inner) => sql_expr_to_expr(inner),
        SqlExpr::BinaryOp { left, op, right } => {
            let l = sql_expr_to_expr(left)?;
            let r = sql_expr_to_expr(right)?;
            Ok(match op {
                SqlBinaryOp::And => l.and(r),
                SqlBinaryOp::Or => l.or(r),
                _ => Expr::binary(l, sql_binop_to_binop(op)?, r),
            })
        }
        SqlExpr::UnaryOp { op, expr } => match op {
            UnaryOperator::Not => Ok(Expr::Not(Box::new(sql_expr_to_expr(expr)?))),
            UnaryOperator::Plus => sql_expr_to_expr(expr),
            UnaryOperator::Minus => Ok(match sql_expr_to_expr(expr)? {
                Expr::Literal(LiteralValue::Int64(i)) => Expr::literal(-i),
                Expr::Literal(LiteralValue::Float64(f)) => Expr::literal(-f),
                other => Expr::Negative(Box::new(other)),
            }),
            _ => Err(FpdError::Unsupported(format!("unsupported unary op: {op}"))),
        },
        SqlExpr::IsNull(x) => Ok(Expr::IsNull(Box::new(sql_expr_to_expr(x)?))),
        SqlExpr::IsNotNull(x) => Ok(Expr::IsNotNull(Box::new(sql_expr_to_expr(x)?))),
        SqlExpr::Between {
            expr,
            negated,
            low,
            high,
        } => Ok(Expr::Between {
            expr: Box::new(sql_expr_to_expr(expr)?),
            low: Box::new(sql_expr_to_expr(low)?),
            high: Box::new(sql_expr_to_expr(high)?),
            negated: *negated,
        }),
        SqlExpr::InList {
            expr,
            list,
            negated,
        } => Ok(Expr::InList {
            expr: Box::new(sql_expr_to_expr(expr)?),
            list: list.iter().map(sql_expr_to_expr).collect::<Result<_>>()?,
            negated: *negated,
        }),
        SqlExpr::Substring {
            expr,
            substring_from,
            substring_for,
            ..
        } => {
            let mut args = vec![sql_expr_to_expr(expr)?];
            for part in [substring_from, substring_for].into_iter().flatten() {
                args.push(sql_expr_to_expr(part)?);
            }
            Ok(Expr::function("substr", args))
        }
        SqlExpr::Function(func) => {
            if func.over.is_some() {
                return Err(FpdError::Unsupported(format!(
                    "window function {}() is not supported",
                    func.name
                )));
            }
            let args = function_args(func)?
                .iter()
                .map(function_arg_to_expr)
                .collect::<Result<Vec<_>>>()?;
            Ok(Expr::function(
                object_name_to_string(&func.name).to_lowercase(),
                args,
            ))
        }
        _ => Err(FpdError::Unsupported(format!(
            "unsupported SQL expression: {e}"
        ))),
    }
}

fn sql_value_to_literal(v: &Value) -> Result<Expr> {
    match v {
        Value::Number(s, _) => {
            if s.contains(&['.', 'e', 'E'][..]) {
                let f: f64 = s
                    .parse()
                    .map_err(|_| FpdError::Planning(format!("bad number: {s}")))?;
                Ok(Expr::Literal(LiteralValue::Float64(f)))
            } else {
                let i: i64 = s
                    .parse()
                    .map_err(|_| FpdError::Planning(format!("bad number: {s}")))?;
                Ok(Expr::Literal(LiteralValue::Int64(i)))
            }
        }
        Value::SingleQuotedString(s) => Ok(Expr::Literal(LiteralValue::Utf8(s.clone()))),
        Value::Boolean(b) => Ok(Expr::Literal(LiteralValue::Boolean(*b))),
        Value::Null => Ok(Expr::Literal(LiteralValue::Null)),
        _ => Err(FpdError::Unsupported(format!(
            "unsupported SQL literal: {v}"
        ))),
    }
}

fn sql_limit_to_usize(e: &SqlExpr) -> Result<usize> {
    match sql_expr_to_expr(e)? {
        Expr::Literal(LiteralValue::Int64(i)) => usize::try_from(i)
            .map_err(|_| FpdError::Planning("LIMIT must be non-negative".to_string())),
        _ => Err(FpdError::Planning(
            "LIMIT must be a literal integer".to_string(),
        )),
    }
}

fn sql_binop_to_binop(op: &SqlBinaryOp) -> Result<BinaryOp> {
    Ok(match op {
        SqlBinaryOp::Eq => BinaryOp::Eq,
        SqlBinaryOp::NotEq => BinaryOp::NotEq,
        SqlBinaryOp::Lt => BinaryOp::Lt,
        SqlBinaryOp::LtEq => BinaryOp::LtEq,
        SqlBinaryOp::Gt => BinaryOp::Gt,
        SqlBinaryOp::GtEq => BinaryOp::GtEq,
        SqlBinaryOp::Plus => BinaryOp::Plus,
        SqlBinaryOp::Minus => BinaryOp::Minus,
        SqlBinaryOp::Multiply => BinaryOp::Multiply,
        SqlBinaryOp::Divide => BinaryOp::Divide,
        _ => {
            return Err(FpdError::Unsupported(format!(
                "unsupported binary operator: {op}"
            )))
        }
    })
}

fn object_name_to_string(n: &ObjectName) -> String {
    n.0.iter()
        .map(|i| i.value.clone())
        .collect::<Vec<_>>()
        .join(".")
}

/// `t.col` refers to `col` of the single FROM table.
fn last_ident(parts: &[Ident]) -> Result<String> {
    parts
        .last()
        .map(|i| i.value.clone())
        .ok_or_else(|| FpdError::Planning("empty compound identifier".to_string()))
}

fn push_unique(out: &mut Vec<String>, name: &str) {
    if !out.iter().any(|c| c == name) {
        out.push(name.to_string());
    }
}

fn collect_columns(e: &Expr, out: &mut Vec<String>) {
    match e {
        Expr::Column(c) => push_unique(out, c),
        Expr::Literal(_) => {}
        Expr::BinaryOp { left, right, .. } | Expr::And(left, right) | Expr::Or(left, right) => {
            collect_columns(left, out);
            collect_columns(right, out);
        }
        Expr::Not(x) | Expr::Negative(x) | Expr::IsNull(x) | Expr::IsNotNull(x) => {
            collect_columns(x, out)
        }
        Expr::Between {
            expr, low, high, ..
        } => {
            collect_columns(expr, out);
            collect_columns(low, out);
            collect_columns(high, out);
        }
        Expr::InList { expr, list, .. } => {
            collect_columns(expr, out);
            for item in list {
                collect_columns(item, out);
            }
        }
        Expr::ScalarFunction { args, .. } => {
            for a in args {
                collect_columns(a, out);
            }
        }
    }
}

/// Columns the plan reads from its scan.
fn referenced_columns(plan: &LogicalPlan) -> Vec<String> {
    let mut out = vec![];
    let mut node = plan;
    loop {
        match node {
            LogicalPlan::TableScan { projection, .. } => {
                for c in projection.iter().flatten() {
                    push_unique(&mut out, c);
                }
                return out;
            }
            LogicalPlan::Filter { predicate, input } => {
                collect_columns(predicate, &mut out);
                node = &**input;
            }
            LogicalPlan::Aggregate { input, .. }
            | LogicalPlan::Limit { input, .. }
            | LogicalPlan::Projection { input, .. } => node = &**input,
            LogicalPlan::Join { .. } | LogicalPlan::UnionAll { .. } => return out,
        }
    }
}
