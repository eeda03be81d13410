use thiserror::Error;

/// Errors from route directory operations.
#[derive(Debug, Error)]
pub enum RouteError {
    /// A SQLite operation failed.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, RouteError>;
