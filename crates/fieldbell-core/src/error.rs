//! Fieldbell error taxonomy.

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, FieldbellError>;

/// Top-level error type. One variant per failure domain; everything a
/// record-loop or session-loop can hit stays recoverable (logged and
/// contained at the loop boundary), only `Config` aborts startup.
#[derive(Debug, thiserror::Error)]
pub enum FieldbellError {
    /// Missing or malformed configuration. Fatal at startup.
    #[error("config error: {0}")]
    Config(String),

    /// Persistent store read/write failure.
    #[error("store error: {0}")]
    Store(String),

    /// Messaging gateway failure (send, probe, admin lookup).
    #[error("gateway error: {0}")]
    Gateway(String),

    /// Verification flow failure.
    #[error("verification error: {0}")]
    Verify(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
