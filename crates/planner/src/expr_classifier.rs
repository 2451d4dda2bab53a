//! Split predicates into the part the remote store can evaluate and the
//! residual the host engine keeps.
//!
//! Classification is per conjunct: a conjunct is pushed whole or not at all.

use fpd_common::FunctionAllowList;

use crate::logical_plan::{Expr, LiteralValue};

/// Host service answering whether an expression always yields the same
/// output for the same input.
pub trait DeterminismEvaluator {
    fn is_deterministic(&self, expr: &Expr) -> bool;
}

/// Name-based determinism check used when the host supplies nothing better.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinDeterminism;

const NON_DETERMINISTIC_FUNCTIONS: &[&str] = &[
    "random",
    "rand",
    "now",
    "uuid",
    "current_timestamp",
    "current_date",
    "current_time",
];

impl DeterminismEvaluator for BuiltinDeterminism {
    fn is_deterministic(&self, expr: &Expr) -> bool {
        match expr {
            Expr::ScalarFunction { name, args } => {
                !NON_DETERMINISTIC_FUNCTIONS.contains(&name.to_ascii_lowercase().as_str())
                    && args.iter().all(|a| self.is_deterministic(a))
            }
            Expr::Column(_) | Expr::Literal(_) => true,
            Expr::BinaryOp { left, right, .. } | Expr::And(left, right) | Expr::Or(left, right) => {
                self.is_deterministic(left) && self.is_deterministic(right)
            }
            Expr::Not(x) | Expr::Negative(x) | Expr::IsNull(x) | Expr::IsNotNull(x) => {
                self.is_deterministic(x)
            }
            Expr::Between {
                expr, low, high, ..
            } => {
                self.is_deterministic(expr)
                    && self.is_deterministic(low)
                    && self.is_deterministic(high)
            }
            Expr::InList { expr, list, .. } => {
                self.is_deterministic(expr) && list.iter().all(|e| self.is_deterministic(e))
            }
        }
    }
}

/// Result of [`classify`]. Either side is literal `TRUE` when empty.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub pushable: Expr,
    pub residual: Expr,
}

impl Classification {
    /// Nothing pushable: the whole predicate stays in the host plan.
    pub fn all_residual(predicate: Expr) -> Self {
        Self {
            pushable: true_literal(),
            residual: predicate,
        }
    }

    pub fn has_pushable(&self) -> bool {
        !self.pushable.is_true_literal()
    }

    pub fn has_residual(&self) -> bool {
        !self.residual.is_true_literal()
    }
}

/// Split `predicate` into pushable and residual conjunctions.
///
/// Both sides keep the conjuncts' original relative order.
pub fn classify(
    predicate: Expr,
    determinism: &dyn DeterminismEvaluator,
    allow_list: &FunctionAllowList,
) -> Classification {
    let mut pushable = vec![];
    let mut residual = vec![];
    for conjunct in split_conjuncts(predicate) {
        if conjunct.is_true_literal() {
            continue;
        }
        if determinism.is_deterministic(&conjunct) && is_pushable_expr(&conjunct, allow_list) {
            pushable.push(conjunct);
        } else {
            residual.push(conjunct);
        }
    }
    tracing::trace!(
        pushable = pushable.len(),
        residual = residual.len(),
        "classified predicate conjuncts"
    );
    Classification {
        pushable: combine_conjuncts(pushable),
        residual: combine_conjuncts(residual),
    }
}

/// Whether the remote query language can express `e`, checked bottom-up.
pub fn is_pushable_expr(e: &Expr, allow: &FunctionAllowList) -> bool {
    match e {
        Expr::Column(_) => true,
        Expr::Literal(v) => literal_is_pushable(v),
        Expr::BinaryOp { left, op, right } => {
            allow.supports_operator(op.symbol())
                && is_pushable_expr(left, allow)
                && is_pushable_expr(right, allow)
                // the remote store compares a value against a constant
                && (!op.is_comparison() || is_literal(left) || is_literal(right))
        }
        Expr::And(a, b) => {
            allow.supports_operator("and") && is_pushable_expr(a, allow) && is_pushable_expr(b, allow)
        }
        Expr::Or(a, b) => {
            allow.supports_operator("or") && is_pushable_expr(a, allow) && is_pushable_expr(b, allow)
        }
        Expr::Not(x) => allow.supports_operator("not") && is_pushable_expr(x, allow),
        Expr::Negative(x) => allow.supports_operator("negative") && is_pushable_expr(x, allow),
        Expr::IsNull(x) => allow.supports_operator("is_null") && is_pushable_expr(x, allow),
        Expr::IsNotNull(x) => allow.supports_operator("is_not_null") && is_pushable_expr(x, allow),
        Expr::Between {
            expr, low, high, ..
        } => {
            allow.supports_operator("between")
                && is_pushable_expr(expr, allow)
                && is_pushable_literal(low)
                && is_pushable_literal(high)
        }
        Expr::InList { expr, list, .. } => {
            allow.supports_operator("in")
                && !list.is_empty()
                && is_pushable_expr(expr, allow)
                && list.iter().all(is_pushable_literal)
        }
        Expr::ScalarFunction { name, args } => {
            allow.supports_scalar_function(name) && args.iter().all(|a| is_pushable_expr(a, allow))
        }
    }
}

pub fn split_conjuncts(e: Expr) -> Vec<Expr> {
    match e {
        Expr::And(a, b) => {
            let mut v = split_conjuncts(*a);
            v.extend(split_conjuncts(*b));
            v
        }
        other => vec![other],
    }
}

pub fn combine_conjuncts(mut v: Vec<Expr>) -> Expr {
    if v.is_empty() {
        return true_literal();
    }
    let first = v.remove(0);
    v.into_iter()
        .fold(first, |acc, e| Expr::And(Box::new(acc), Box::new(e)))
}

fn true_literal() -> Expr {
    Expr::Literal(LiteralValue::Boolean(true))
}

fn is_literal(e: &Expr) -> bool {
    matches!(e, Expr::Literal(_))
}

fn is_pushable_literal(e: &Expr) -> bool {
    matches!(e, Expr::Literal(v) if literal_is_pushable(v))
}

fn literal_is_pushable(v: &LiteralValue) -> bool {
    match v {
        LiteralValue::Float64(f) => f.is_finite(),
        LiteralValue::Null => false,
        LiteralValue::Int64(_) | LiteralValue::Utf8(_) | LiteralValue::Boolean(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logical_plan::BinaryOp;

    fn fare_gt_100() -> Expr {
        Expr::binary(Expr::column("fare"), BinaryOp::Gt, Expr::literal(100))
    }

    fn lower_substr_city() -> Expr {
        Expr::binary(
            Expr::function(
                "lower",
                vec![Expr::function(
                    "substr",
                    vec![Expr::column("city"), Expr::literal(0), Expr::literal(3)],
                )],
            ),
            BinaryOp::Eq,
            Expr::literal("del"),
        )
    }

    #[test]
    fn splits_supported_and_unsupported_conjuncts() {
        let predicate = lower_substr_city().and(fare_gt_100());
        let out = classify(predicate, &BuiltinDeterminism, &FunctionAllowList::default());
        assert_eq!(out.pushable, fare_gt_100());
        assert_eq!(out.residual, lower_substr_city());
    }

    #[test]
    fn fully_supported_predicate_leaves_trivial_residual() {
        let region = Expr::binary(Expr::column("regionId"), BinaryOp::Eq, Expr::literal(3));
        let predicate = fare_gt_100().and(region);
        let out = classify(predicate.clone(), &BuiltinDeterminism, &FunctionAllowList::default());
        assert_eq!(out.pushable, predicate);
        assert!(!out.has_residual());
    }

    #[test]
    fn function_is_pushable_only_when_every_nested_call_is_allowed() {
        let allow = FunctionAllowList::default().with_scalar_function("lower");
        assert!(!is_pushable_expr(&lower_substr_city(), &allow));
        let allow = allow.with_scalar_function("SUBSTR");
        assert!(is_pushable_expr(&lower_substr_city(), &allow));
    }

    #[test]
    fn non_deterministic_conjunct_stays_residual_even_when_allowed() {
        let rand_cmp = Expr::binary(
            Expr::function("random", vec![]),
            BinaryOp::Lt,
            Expr::literal(0.5),
        );
        let allow = FunctionAllowList::default().with_scalar_function("random");
        assert!(is_pushable_expr(&rand_cmp, &allow));
        let out = classify(fare_gt_100().and(rand_cmp.clone()), &BuiltinDeterminism, &allow);
        assert_eq!(out.pushable, fare_gt_100());
        assert_eq!(out.residual, rand_cmp);
    }

    #[test]
    fn disjunction_with_unsupported_branch_is_not_split() {
        let predicate = fare_gt_100().or(lower_substr_city());
        let out = classify(predicate.clone(), &BuiltinDeterminism, &FunctionAllowList::default());
        assert!(!out.has_pushable());
        assert_eq!(out.residual, predicate);
    }

    #[test]
    fn column_to_column_comparison_and_null_literal_are_not_pushable() {
        let allow = FunctionAllowList::default();
        let cols = Expr::binary(Expr::column("a"), BinaryOp::Lt, Expr::column("b"));
        assert!(!is_pushable_expr(&cols, &allow));
        let null_cmp = Expr::binary(
            Expr::column("a"),
            BinaryOp::Eq,
            Expr::Literal(LiteralValue::Null),
        );
        assert!(!is_pushable_expr(&null_cmp, &allow));
        assert!(is_pushable_expr(
            &Expr::IsNull(Box::new(Expr::column("a"))),
            &allow
        ));
    }

    #[test]
    fn arithmetic_requires_allow_listed_operator() {
        let sum_gt = Expr::binary(
            Expr::binary(Expr::column("fare"), BinaryOp::Plus, Expr::literal(1)),
            BinaryOp::Gt,
            Expr::literal(100),
        );
        assert!(!is_pushable_expr(&sum_gt, &FunctionAllowList::default()));
        assert!(is_pushable_expr(
            &sum_gt,
            &FunctionAllowList::default().with_operator("+")
        ));
    }

    #[test]
    fn in_list_and_between_need_literal_bounds() {
        let allow = FunctionAllowList::default();
        let in_list = Expr::InList {
            expr: Box::new(Expr::column("city")),
            list: vec![Expr::literal("del"), Expr::literal("sfo")],
            negated: false,
        };
        assert!(is_pushable_expr(&in_list, &allow));
        let between_cols = Expr::Between {
            expr: Box::new(Expr::column("fare")),
            low: Box::new(Expr::column("lo")),
            high: Box::new(Expr::literal(10)),
            negated: false,
        };
        assert!(!is_pushable_expr(&between_cols, &allow));
    }

    #[test]
    fn true_conjuncts_are_dropped() {
        let predicate = Expr::literal(true).and(fare_gt_100());
        let out = classify(predicate, &BuiltinDeterminism, &FunctionAllowList::default());
        assert_eq!(out.pushable, fare_gt_100());
        assert!(!out.has_residual());
    }
}
