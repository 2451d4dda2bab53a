use fpd_common::ConnectorId;
use serde::{Deserialize, Serialize};

/// Sentinel the execution layer replaces with a partition's table suffix.
///
/// Present in a generated query if and only if its mode is
/// [`ExecutionMode::PerPartitionQuery`].
pub const PARTITION_SUFFIX_PLACEHOLDER: &str = "__TABLE_NAME_SUFFIX_TEMPLATE__";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Column(String),
    Literal(LiteralValue),
    BinaryOp {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    Not(Box<Expr>),
    /// Unary minus over a non-literal operand.
    Negative(Box<Expr>),
    IsNull(Box<Expr>),
    IsNotNull(Box<Expr>),
    Between {
        expr: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
        negated: bool,
    },
    InList {
        expr: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    ScalarFunction {
        name: String,
        args: Vec<Expr>,
    },
}

impl Expr {
    pub fn column(name: impl Into<String>) -> Self {
        Expr::Column(name.into())
    }

    pub fn literal(value: impl Into<LiteralValue>) -> Self {
        Expr::Literal(value.into())
    }

    pub fn binary(left: Expr, op: BinaryOp, right: Expr) -> Self {
        Expr::BinaryOp {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    pub fn function(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::ScalarFunction {
            name: name.into(),
            args,
        }
    }

    pub fn and(self, other: Expr) -> Self {
        Expr::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Expr) -> Self {
        Expr::Or(Box::new(self), Box::new(other))
    }

    /// `true` for the literal `TRUE`, the neutral element of a conjunction.
    pub fn is_true_literal(&self) -> bool {
        matches!(self, Expr::Literal(LiteralValue::Boolean(true)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LiteralValue {
    Int64(i64),
    Float64(f64),
    Utf8(String),
    Boolean(bool),
    Null,
}

impl From<i64> for LiteralValue {
    fn from(v: i64) -> Self {
        LiteralValue::Int64(v)
    }
}

impl From<i32> for LiteralValue {
    fn from(v: i32) -> Self {
        LiteralValue::Int64(i64::from(v))
    }
}

impl From<f64> for LiteralValue {
    fn from(v: f64) -> Self {
        LiteralValue::Float64(v)
    }
}

impl From<&str> for LiteralValue {
    fn from(v: &str) -> Self {
        LiteralValue::Utf8(v.to_string())
    }
}

impl From<bool> for LiteralValue {
    fn from(v: bool) -> Self {
        LiteralValue::Boolean(v)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Plus,
    Minus,
    Multiply,
    Divide,
}

impl BinaryOp {
    /// Rendered symbol, also the operator's allow-list key.
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::NotEq => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::Plus => "+",
            BinaryOp::Minus => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq
                | BinaryOp::NotEq
                | BinaryOp::Lt
                | BinaryOp::LtEq
                | BinaryOp::Gt
                | BinaryOp::GtEq
        )
    }

    /// Operator with swapped operands: `a < b` is `b > a`.
    ///
    /// Arithmetic operators are returned unchanged; only comparisons are
    /// ever swapped.
    pub fn mirrored(self) -> Self {
        match self {
            BinaryOp::Lt => BinaryOp::Gt,
            BinaryOp::LtEq => BinaryOp::GtEq,
            BinaryOp::Gt => BinaryOp::Lt,
            BinaryOp::GtEq => BinaryOp::LtEq,
            other => other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AggExpr {
    CountStar,
    Count(Expr),
    Sum(Expr),
    Min(Expr),
    Max(Expr),
    Avg(Expr),
    /// Any other aggregate known to the host engine.
    Function { name: String, args: Vec<Expr> },
}

impl AggExpr {
    pub fn function_name(&self) -> &str {
        match self {
            AggExpr::CountStar | AggExpr::Count(_) => "count",
            AggExpr::Sum(_) => "sum",
            AggExpr::Min(_) => "min",
            AggExpr::Max(_) => "max",
            AggExpr::Avg(_) => "avg",
            AggExpr::Function { name, .. } => name,
        }
    }

    pub fn args(&self) -> Vec<&Expr> {
        match self {
            AggExpr::CountStar => vec![],
            AggExpr::Count(e)
            | AggExpr::Sum(e)
            | AggExpr::Min(e)
            | AggExpr::Max(e)
            | AggExpr::Avg(e) => vec![e],
            AggExpr::Function { args, .. } => args.iter().collect(),
        }
    }
}

/// How the execution layer must issue a generated query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Issue once to the coordinating endpoint; the result is final.
    SingleQuery,
    /// Issue once per partition with the suffix substituted; union the results.
    PerPartitionQuery,
}

impl ExecutionMode {
    pub fn is_per_partition(self) -> bool {
        matches!(self, ExecutionMode::PerPartitionQuery)
    }
}

/// Query text produced by pushdown, attached to a [`TableHandle`].
///
/// `output_columns[i]` names the i-th item of the query's SELECT list. Only
/// the query generator builds these, which keeps text, columns and mode
/// consistent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedQuery {
    query: String,
    output_columns: Vec<String>,
    mode: ExecutionMode,
}

impl GeneratedQuery {
    pub(crate) fn new(query: String, output_columns: Vec<String>, mode: ExecutionMode) -> Self {
        Self {
            query,
            output_columns,
            mode,
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn output_columns(&self) -> &[String] {
        &self.output_columns
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Query text for one partition, or `None` for a single query.
    pub fn for_partition(&self, suffix: &str) -> Option<String> {
        self.mode
            .is_per_partition()
            .then(|| self.query.replace(PARTITION_SUFFIX_PLACEHOLDER, suffix))
    }
}

/// Identifies a table of some connector. Immutable: pushdown builds a new
/// handle with [`TableHandle::with_query`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableHandle {
    pub connector_id: ConnectorId,
    /// Table name inside the remote store.
    pub table_name: String,
    #[serde(default)]
    pub query: Option<GeneratedQuery>,
}

impl TableHandle {
    pub fn new(connector_id: impl Into<ConnectorId>, table_name: impl Into<String>) -> Self {
        Self {
            connector_id: connector_id.into(),
            table_name: table_name.into(),
            query: None,
        }
    }

    pub fn with_query(&self, query: GeneratedQuery) -> Self {
        Self {
            connector_id: self.connector_id.clone(),
            table_name: self.table_name.clone(),
            query: Some(query),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LogicalPlan {
    TableScan {
        table: TableHandle,
        /// Output columns in order; `None` selects every column of the table.
        projection: Option<Vec<String>>,
    },
    Projection {
        exprs: Vec<(Expr, String)>,
        input: Box<LogicalPlan>,
    },
    Filter {
        predicate: Expr,
        input: Box<LogicalPlan>,
    },
    Aggregate {
        group_exprs: Vec<Expr>,
        aggr_exprs: Vec<(AggExpr, String)>,
        input: Box<LogicalPlan>,
    },
    Limit {
        n: usize,
        input: Box<LogicalPlan>,
    },
    Join {
        left: Box<LogicalPlan>,
        right: Box<LogicalPlan>,
        on: Vec<(String, String)>,
    },
    UnionAll {
        left: Box<LogicalPlan>,
        right: Box<LogicalPlan>,
    },
}

impl LogicalPlan {
    pub fn scan(table: TableHandle, projection: Option<Vec<String>>) -> Self {
        LogicalPlan::TableScan { table, projection }
    }

    pub fn filter(self, predicate: Expr) -> Self {
        LogicalPlan::Filter {
            predicate,
            input: Box::new(self),
        }
    }

    pub fn limit(self, n: usize) -> Self {
        LogicalPlan::Limit {
            n,
            input: Box::new(self),
        }
    }

    pub fn aggregate(self, group_exprs: Vec<Expr>, aggr_exprs: Vec<(AggExpr, String)>) -> Self {
        LogicalPlan::Aggregate {
            group_exprs,
            aggr_exprs,
            input: Box::new(self),
        }
    }
}
