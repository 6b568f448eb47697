use thiserror::Error;
use uuid::Uuid;

/// Contract violations raised by the report engine.
///
/// Malformed individual sessions are not errors: they contribute zero.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReportError {
    #[error("invalid report window: begin {begin} is after end {end}")]
    InvalidWindow { begin: String, end: String },

    #[error("invalid page size: {0} (must be positive)")]
    InvalidPageSize(usize),

    #[error("no label for entity {0}")]
    MissingLabel(Uuid),
}

pub type ReportResult<T> = Result<T, ReportError>;

/// Errors from the SQLite session store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("group not found: {0}")]
    GroupNotFound(String),

    #[error("stored timestamp out of range: {secs}s {nanos}ns")]
    Timestamp { secs: i64, nanos: u32 },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors loading the server configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid bind address {0}")]
    BindAddr(String),
}
