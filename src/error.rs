use crate::dialect::LiteralError;
use crate::scan::ScanError;
use crate::statement::StatementKind;
use thiserror::Error;

/// Errors raised while building, running or tearing down a query activity.
///
/// Construction fails with `UnsupportedDialect`, `UnsupportedDriver`,
/// `Configuration`, `UnsupportedStatementKind`, `Compilation` or `Connection`.
/// Everything else is scoped to a single invocation or to cleanup and leaves
/// the shared pool usable.
#[derive(Error, Debug)]
pub enum Error {
    #[error("unsupported dialect '{0}'")]
    UnsupportedDialect(String),
    #[error("unsupported driver '{0}'")]
    UnsupportedDriver(String),
    #[error("invalid settings: {0}")]
    Configuration(String),
    #[error("only select statement is supported, got {0}")]
    UnsupportedStatementKind(StatementKind),
    #[error("malformed query template at byte {offset}: {reason}")]
    Compilation { offset: usize, reason: String },
    #[error("cannot bind placeholder '{name}': {source}")]
    Bind {
        name: String,
        #[source]
        source: LiteralError,
    },
    #[error("cannot open data source '{data_source}': {source}")]
    Connection {
        data_source: String,
        #[source]
        source: rusqlite::Error,
    },
    #[error("query execution failed: {0}")]
    Execution(#[from] rusqlite::Error),
    #[error("connection pool is closed")]
    PoolClosed,
    #[error("query worker did not finish: {0}")]
    Worker(#[from] tokio::task::JoinError),
    #[error("cannot scan column '{column}': {source}")]
    Scan {
        column: String,
        #[source]
        source: ScanError,
    },
    #[error("cleanup failed: {0}")]
    Cleanup(#[source] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
