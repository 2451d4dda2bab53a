//! Catalog-backed entry points over the pushdown optimizer.
//!
//! [`Engine`] owns a [`fpd_storage::Catalog`] and an [`fpd_planner::Optimizer`]
//! and turns SQL text into plans before and after pushdown. The `fpd` binary
//! is a thin CLI over it.

mod context;

pub mod engine;

pub use context::CatalogContext;
pub use engine::{Engine, PushdownReport};
