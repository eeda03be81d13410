use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    /// Configuration could not be loaded or is structurally invalid.
    /// Fatal at startup, never recoverable per request.
    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
