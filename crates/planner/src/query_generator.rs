//! Render pushed-down work as a query string for the remote store.
//!
//! Grammar of the generated text:
//!
//! ```text
//! SELECT <items> FROM <table>[__TABLE_NAME_SUFFIX_TEMPLATE__]
//!     [WHERE (<conjunct>) AND ...] [GROUP BY <cols>] [LIMIT <n>]
//! ```
//!
//! The execution mode is derived from [`QueryShape`]: only a plain row query
//! (no limit, no aggregation) may run per partition.

use fpd_common::{FpdError, FunctionAllowList, Result};

use crate::expr_classifier::{is_pushable_expr, split_conjuncts};
use crate::logical_plan::{
    AggExpr, ExecutionMode, Expr, GeneratedQuery, LiteralValue, TableHandle,
    PARTITION_SUFFIX_PLACEHOLDER,
};

/// Grouping keys and aggregates of an `Aggregate` node.
#[derive(Debug, Clone, Copy)]
pub struct AggregationSpec<'a> {
    pub group_exprs: &'a [Expr],
    pub aggr_exprs: &'a [(AggExpr, String)],
}

/// Everything the generator may fold into one query.
#[derive(Debug, Clone, Copy)]
pub struct QueryRequest<'a> {
    pub table: &'a TableHandle,
    /// Output columns of the scan, in order.
    pub columns: &'a [String],
    /// Must be pushable under the generator's allow-list.
    pub predicate: Option<&'a Expr>,
    pub limit: Option<usize>,
    pub aggregation: Option<AggregationSpec<'a>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generated {
    pub query: GeneratedQuery,
    /// `false` when the request's aggregation could not be folded in; the
    /// caller keeps the `Aggregate` node.
    pub aggregation_pushed: bool,
}

/// What a query computes beyond filtering.
#[derive(Debug, Clone, Copy)]
enum QueryShape<'a> {
    Rows,
    Limited(usize),
    Aggregated(AggregationSpec<'a>),
}

impl QueryShape<'_> {
    fn mode(&self, prefer_single_query: bool) -> ExecutionMode {
        match self {
            QueryShape::Rows if !prefer_single_query => ExecutionMode::PerPartitionQuery,
            // A per-partition limit or aggregate, concatenated, differs from
            // the same operation over the whole table.
            QueryShape::Rows | QueryShape::Limited(_) | QueryShape::Aggregated(_) => {
                ExecutionMode::SingleQuery
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct QueryGenerator<'a> {
    allow_list: &'a FunctionAllowList,
    prefer_single_query: bool,
}

impl<'a> QueryGenerator<'a> {
    pub fn new(allow_list: &'a FunctionAllowList) -> Self {
        Self {
            allow_list,
            prefer_single_query: false,
        }
    }

    pub fn prefer_single_query(mut self, prefer: bool) -> Self {
        self.prefer_single_query = prefer;
        self
    }

    /// Render `request` into a query and its execution mode.
    ///
    /// # Errors
    /// `Unsupported` when the predicate holds something outside the
    /// allow-list, `Planning` when there is nothing to select.
    pub fn generate(&self, request: &QueryRequest<'_>) -> Result<Generated> {
        let shape = self.shape(request);
        let mode = shape.mode(self.prefer_single_query);

        let (items, output_columns) = match shape {
            QueryShape::Aggregated(agg) => self.aggregate_select_list(agg)?,
            QueryShape::Rows | QueryShape::Limited(_) => {
                (request.columns.to_vec(), request.columns.to_vec())
            }
        };
        if items.is_empty() {
            return Err(FpdError::Planning(format!(
                "no output columns to select from {}",
                request.table.table_name
            )));
        }

        let mut query = format!(
            "SELECT {} FROM {}",
            items.join(", "),
            request.table.table_name
        );
        if mode.is_per_partition() {
            query.push_str(PARTITION_SUFFIX_PLACEHOLDER);
        }
        if let Some(predicate) = request.predicate.filter(|p| !p.is_true_literal()) {
            query.push_str(" WHERE ");
            query.push_str(&self.render_predicate(predicate)?);
        }
        match shape {
            QueryShape::Aggregated(agg) if !agg.group_exprs.is_empty() => {
                let keys = agg
                    .group_exprs
                    .iter()
                    .map(|e| self.render_expr(e))
                    .collect::<Result<Vec<_>>>()?;
                query.push_str(&format!(" GROUP BY {}", keys.join(", ")));
            }
            QueryShape::Limited(n) => query.push_str(&format!(" LIMIT {n}")),
            QueryShape::Aggregated(_) | QueryShape::Rows => {}
        }

        Ok(Generated {
            aggregation_pushed: matches!(shape, QueryShape::Aggregated(_)),
            query: GeneratedQuery::new(query, output_columns, mode),
        })
    }

    /// Whether every part of `agg` can be evaluated by the remote store.
    pub fn aggregation_supported(&self, agg: &AggregationSpec<'_>) -> bool {
        (!agg.group_exprs.is_empty() || !agg.aggr_exprs.is_empty())
            && agg
                .group_exprs
                .iter()
                .all(|e| matches!(e, Expr::Column(_)))
            && agg.aggr_exprs.iter().all(|(a, _)| {
                self.allow_list.supports_aggregate(a.function_name())
                    && a.args().into_iter().all(|e| is_pushable_expr(e, self.allow_list))
            })
    }

    fn shape<'r>(&self, request: &QueryRequest<'r>) -> QueryShape<'r> {
        match (request.aggregation, request.limit) {
            // LIMIT in the same query would cap the aggregated output, not
            // the rows being aggregated.
            (Some(agg), None) if self.aggregation_supported(&agg) => QueryShape::Aggregated(agg),
            (_, Some(n)) => QueryShape::Limited(n),
            (_, None) => QueryShape::Rows,
        }
    }

    fn aggregate_select_list(&self, agg: AggregationSpec<'_>) -> Result<(Vec<String>, Vec<String>)> {
        let mut items = vec![];
        let mut names = vec![];
        for key in agg.group_exprs {
            let Expr::Column(name) = key else {
                return Err(FpdError::Unsupported(
                    "grouping keys must be plain columns".to_string(),
                ));
            };
            items.push(name.clone());
            names.push(name.clone());
        }
        for (a, name) in agg.aggr_exprs {
            items.push(self.render_aggregate(a)?);
            names.push(name.clone());
        }
        Ok((items, names))
    }

    fn render_aggregate(&self, a: &AggExpr) -> Result<String> {
        if let AggExpr::CountStar = a {
            return Ok("count(*)".to_string());
        }
        let args = a
            .args()
            .into_iter()
            .map(|e| self.render_expr(e))
            .collect::<Result<Vec<_>>>()?;
        Ok(format!("{}({})", a.function_name(), args.join(", ")))
    }

    fn render_predicate(&self, predicate: &Expr) -> Result<String> {
        let conjuncts = split_conjuncts(predicate.clone())
            .into_iter()
            .filter(|c| !c.is_true_literal())
            .map(|c| self.render_expr(&c).map(|s| format!("({s})")))
            .collect::<Result<Vec<_>>>()?;
        Ok(conjuncts.join(" AND "))
    }

    fn render_expr(&self, e: &Expr) -> Result<String> {
        if !is_pushable_expr(e, self.allow_list) {
            return Err(FpdError::Unsupported(format!(
                "expression cannot be pushed down: {e:?}"
            )));
        }
        render(e)
    }
}

/// Render an expression already known to be pushable.
fn render(e: &Expr) -> Result<String> {
    Ok(match e {
        Expr::Column(c) => c.clone(),
        Expr::Literal(v) => render_literal(v)?,
        Expr::BinaryOp { left, op, right } if op.is_comparison() => {
            // keep the column on the left: `100 < fare` becomes `fare > 100`
            if matches!(**left, Expr::Literal(_)) && !matches!(**right, Expr::Literal(_)) {
                format!("{} {} {}", render(right)?, op.mirrored().symbol(), render(left)?)
            } else {
                format!("{} {} {}", render(left)?, op.symbol(), render(right)?)
            }
        }
        Expr::BinaryOp { left, op, right } => {
            format!("({} {} {})", render(left)?, op.symbol(), render(right)?)
        }
        Expr::And(a, b) => format!("({}) AND ({})", render(a)?, render(b)?),
        Expr::Or(a, b) => format!("({}) OR ({})", render(a)?, render(b)?),
        Expr::Not(x) => format!("NOT ({})", render(x)?),
        Expr::Negative(x) => format!("-({})", render(x)?),
        Expr::IsNull(x) => format!("{} IS NULL", render(x)?),
        Expr::IsNotNull(x) => format!("{} IS NOT NULL", render(x)?),
        Expr::Between {
            expr,
            low,
            high,
            negated,
        } => format!(
            "{} {}BETWEEN {} AND {}",
            render(expr)?,
            if *negated { "NOT " } else { "" },
            render(low)?,
            render(high)?
        ),
        Expr::InList {
            expr,
            list,
            negated,
        } => format!(
            "{} {}IN ({})",
            render(expr)?,
            if *negated { "NOT " } else { "" },
            list.iter().map(render).collect::<Result<Vec<_>>>()?.join(", ")
        ),
        Expr::ScalarFunction { name, args } => format!(
            "{name}({})",
            args.iter().map(render).collect::<Result<Vec<_>>>()?.join(", ")
        ),
    })
}

fn render_literal(v: &LiteralValue) -> Result<String> {
    Ok(match v {
        LiteralValue::Int64(i) => i.to_string(),
        // Debug formatting always keeps a decimal point or exponent, so the
        // remote store sees a floating point literal.
        LiteralValue::Float64(f) if f.is_finite() => format!("{f:?}"),
        LiteralValue::Utf8(s) => format!("'{}'", s.replace('\'', "''")),
        LiteralValue::Boolean(b) => b.to_string(),
        LiteralValue::Float64(_) | LiteralValue::Null => {
            return Err(FpdError::Unsupported(format!(
                "literal has no remote representation: {v:?}"
            )))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logical_plan::BinaryOp;

    fn hybrid() -> TableHandle {
        TableHandle::new("pinot", "hybrid")
    }

    fn columns() -> Vec<String> {
        ["regionId", "city", "fare", "secondsSinceEpoch"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn request<'a>(table: &'a TableHandle, columns: &'a [String]) -> QueryRequest<'a> {
        QueryRequest {
            table,
            columns,
            predicate: None,
            limit: None,
            aggregation: None,
        }
    }

    #[test]
    fn limit_query_is_single_and_has_no_placeholder() {
        let allow = FunctionAllowList::default();
        let (table, cols) = (hybrid(), columns());
        let out = QueryGenerator::new(&allow)
            .generate(&QueryRequest {
                limit: Some(50),
                ..request(&table, &cols)
            })
            .expect("generate");
        assert_eq!(
            out.query.query(),
            "SELECT regionId, city, fare, secondsSinceEpoch FROM hybrid LIMIT 50"
        );
        assert_eq!(out.query.mode(), ExecutionMode::SingleQuery);
        assert_eq!(out.query.output_columns(), cols.as_slice());
    }

    #[test]
    fn filter_only_query_runs_per_partition() {
        let allow = FunctionAllowList::default();
        let (table, cols) = (hybrid(), columns());
        let predicate = Expr::binary(Expr::column("fare"), BinaryOp::Gt, Expr::literal(100));
        let out = QueryGenerator::new(&allow)
            .generate(&QueryRequest {
                predicate: Some(&predicate),
                ..request(&table, &cols)
            })
            .expect("generate");
        assert_eq!(
            out.query.query(),
            "SELECT regionId, city, fare, secondsSinceEpoch FROM hybrid__TABLE_NAME_SUFFIX_TEMPLATE__ WHERE (fare > 100)"
        );
        assert_eq!(out.query.mode(), ExecutionMode::PerPartitionQuery);
        assert_eq!(
            out.query.for_partition("_OFFLINE").as_deref(),
            Some("SELECT regionId, city, fare, secondsSinceEpoch FROM hybrid_OFFLINE WHERE (fare > 100)")
        );
    }

    #[test]
    fn prefer_single_query_drops_the_placeholder() {
        let allow = FunctionAllowList::default();
        let (table, cols) = (hybrid(), columns());
        let out = QueryGenerator::new(&allow)
            .prefer_single_query(true)
            .generate(&request(&table, &cols))
            .expect("generate");
        assert_eq!(
            out.query.query(),
            "SELECT regionId, city, fare, secondsSinceEpoch FROM hybrid"
        );
        assert_eq!(out.query.mode(), ExecutionMode::SingleQuery);
        assert_eq!(out.query.for_partition("_OFFLINE"), None);
    }

    #[test]
    fn literal_on_the_left_is_flipped_without_changing_meaning() {
        let allow = FunctionAllowList::default();
        let (table, cols) = (hybrid(), columns());
        let predicate = Expr::binary(Expr::literal(100), BinaryOp::Lt, Expr::column("fare"))
            .and(Expr::binary(
                Expr::literal(2.5),
                BinaryOp::GtEq,
                Expr::column("regionId"),
            ));
        let out = QueryGenerator::new(&allow)
            .generate(&QueryRequest {
                predicate: Some(&predicate),
                limit: Some(10),
                ..request(&table, &cols)
            })
            .expect("generate");
        assert!(
            out.query
                .query()
                .ends_with("FROM hybrid WHERE (fare > 100) AND (regionId <= 2.5) LIMIT 10"),
            "{}",
            out.query.query()
        );
    }

    #[test]
    fn renders_strings_lists_and_ranges() {
        let allow = FunctionAllowList::default();
        let (table, cols) = (hybrid(), columns());
        let predicate = Expr::InList {
            expr: Box::new(Expr::column("city")),
            list: vec![Expr::literal("del"), Expr::literal("o'hare")],
            negated: true,
        }
        .and(Expr::Between {
            expr: Box::new(Expr::column("fare")),
            low: Box::new(Expr::literal(1.0)),
            high: Box::new(Expr::literal(10)),
            negated: false,
        })
        .and(
            Expr::IsNotNull(Box::new(Expr::column("city")))
                .or(Expr::binary(Expr::column("regionId"), BinaryOp::NotEq, Expr::literal(-1))),
        );
        let out = QueryGenerator::new(&allow)
            .generate(&QueryRequest {
                predicate: Some(&predicate),
                ..request(&table, &cols)
            })
            .expect("generate");
        assert!(out.query.query().ends_with(
            " WHERE (city NOT IN ('del', 'o''hare')) AND (fare BETWEEN 1.0 AND 10) \
             AND ((city IS NOT NULL) OR (regionId <> -1))"
        ));
    }

    #[test]
    fn supported_global_aggregation_is_folded_into_select() {
        let allow = FunctionAllowList::default();
        let (table, cols) = (hybrid(), columns());
        let aggs = vec![
            (AggExpr::CountStar, "cnt".to_string()),
            (AggExpr::Sum(Expr::column("fare")), "total".to_string()),
        ];
        let out = QueryGenerator::new(&allow)
            .generate(&QueryRequest {
                aggregation: Some(AggregationSpec {
                    group_exprs: &[],
                    aggr_exprs: &aggs,
                }),
                ..request(&table, &cols)
            })
            .expect("generate");
        assert!(out.aggregation_pushed);
        assert_eq!(
            out.query.query(),
            "SELECT count(*), sum(fare) FROM hybrid"
        );
        assert_eq!(out.query.output_columns(), ["cnt", "total"]);
        assert_eq!(out.query.mode(), ExecutionMode::SingleQuery);
    }

    #[test]
    fn grouped_aggregation_lists_keys_first() {
        let allow = FunctionAllowList::default();
        let (table, cols) = (hybrid(), columns());
        let keys = vec![Expr::column("city")];
        let aggs = vec![(AggExpr::Max(Expr::column("fare")), "max_fare".to_string())];
        let out = QueryGenerator::new(&allow)
            .generate(&QueryRequest {
                aggregation: Some(AggregationSpec {
                    group_exprs: &keys,
                    aggr_exprs: &aggs,
                }),
                ..request(&table, &cols)
            })
            .expect("generate");
        assert_eq!(
            out.query.query(),
            "SELECT city, max(fare) FROM hybrid GROUP BY city"
        );
        assert_eq!(out.query.output_columns(), ["city", "max_fare"]);
    }

    #[test]
    fn unsupported_aggregate_is_ignored_and_reported() {
        let allow = FunctionAllowList::default();
        let (table, cols) = (hybrid(), columns());
        let aggs = vec![(
            AggExpr::Function {
                name: "approx_percentile".to_string(),
                args: vec![Expr::column("fare"), Expr::literal(0.9)],
            },
            "p90".to_string(),
        )];
        let out = QueryGenerator::new(&allow)
            .generate(&QueryRequest {
                aggregation: Some(AggregationSpec {
                    group_exprs: &[],
                    aggr_exprs: &aggs,
                }),
                ..request(&table, &cols)
            })
            .expect("generate");
        assert!(!out.aggregation_pushed);
        assert_eq!(out.query.output_columns(), cols.as_slice());
        assert_eq!(out.query.mode(), ExecutionMode::PerPartitionQuery);
    }

    #[test]
    fn aggregation_together_with_limit_keeps_only_the_limit() {
        let allow = FunctionAllowList::default();
        let (table, cols) = (hybrid(), columns());
        let aggs = vec![(AggExpr::CountStar, "count".to_string())];
        let out = QueryGenerator::new(&allow)
            .generate(&QueryRequest {
                limit: Some(50),
                aggregation: Some(AggregationSpec {
                    group_exprs: &[],
                    aggr_exprs: &aggs,
                }),
                ..request(&table, &cols)
            })
            .expect("generate");
        assert!(!out.aggregation_pushed);
        assert_eq!(
            out.query.query(),
            "SELECT regionId, city, fare, secondsSinceEpoch FROM hybrid LIMIT 50"
        );
    }

    #[test]
    fn unsupported_predicate_is_an_error() {
        let allow = FunctionAllowList::default();
        let (table, cols) = (hybrid(), columns());
        let predicate = Expr::binary(
            Expr::function("lower", vec![Expr::column("city")]),
            BinaryOp::Eq,
            Expr::literal("del"),
        );
        let err = QueryGenerator::new(&allow)
            .generate(&QueryRequest {
                predicate: Some(&predicate),
                ..request(&table, &cols)
            })
            .expect_err("lower is not allow-listed");
        assert!(matches!(err, FpdError::Unsupported(_)), "got {err:?}");
    }

    #[test]
    fn empty_select_list_is_rejected() {
        let allow = FunctionAllowList::default();
        let table = hybrid();
        let err = QueryGenerator::new(&allow)
            .generate(&request(&table, &[]))
            .expect_err("nothing to select");
        assert!(matches!(err, FpdError::Planning(_)), "got {err:?}");
    }
}
