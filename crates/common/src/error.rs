use thiserror::Error;

/// Canonical FPD error taxonomy used across crates.
///
/// Classification guidance:
/// - [`FpdError::Planning`]: plan shape/name issues discovered while optimizing
/// - [`FpdError::InvalidConfig`]: catalog/config/environment contract violations
/// - [`FpdError::Unsupported`]: valid input the remote query language cannot express
/// - [`FpdError::Io`]: raw filesystem failures from std APIs
///
/// The pushdown rule itself never fails on an unsupported plan; it leaves the
/// plan unpushed instead. These errors surface from host collaborators and
/// from callers that bypass classification.
#[derive(Debug, Error)]
pub enum FpdError {
    /// Invalid or inconsistent configuration/catalog state.
    ///
    /// Examples:
    /// - malformed catalog or pushdown config JSON
    /// - unknown column type name in a catalog entry
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Query planning/optimizer failures.
    ///
    /// Examples:
    /// - unknown table
    /// - SQL that does not parse
    #[error("planning error: {0}")]
    Planning(String),

    /// Transparent std IO failures.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Valid request for a shape the remote query language does not support.
    ///
    /// Examples:
    /// - rendering a function outside the allow-list
    /// - SQL constructs outside the supported front-end subset
    #[error("unsupported: {0}")]
    Unsupported(String),
}

/// Standard FPD result alias.
pub type Result<T> = std::result::Result<T, FpdError>;
