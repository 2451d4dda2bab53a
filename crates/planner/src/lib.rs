pub mod explain;
pub mod expr_classifier;
pub mod logical_plan;
pub mod optimizer;
pub mod plan_matcher;
pub mod plan_rewriter;
pub mod query_generator;
pub mod sql_frontend;

pub use explain::explain_logical;
pub use expr_classifier::*;
pub use logical_plan::*;
pub use optimizer::*;
pub use plan_matcher::{match_chain, MatchedChain};
pub use plan_rewriter::PushdownRewriter;
pub use query_generator::*;
pub use sql_frontend::*;
