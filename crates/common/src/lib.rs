//! Shared configuration, error types and ids for FPD crates.
//!
//! Architecture role:
//! - defines the pushdown configuration and per-query session overrides
//! - provides common [`FpdError`] / [`Result`] contracts
//! - hosts typed identifiers used in logs and plan handles
//!
//! Key modules:
//! - [`config`]
//! - [`error`]
//! - [`ids`]
//! - [`session`]

pub mod config;
pub mod error;
pub mod ids;
pub mod session;

pub use config::{FunctionAllowList, PushdownConfig, PushdownToggles};
pub use error::{FpdError, Result};
pub use ids::*;
pub use session::{Session, SessionProperties};
