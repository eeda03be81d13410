use thiserror::Error;

/// Errors from engine routing and invocation.
#[derive(Debug, Error)]
pub enum EngineError {
    /// An override named an engine the router does not know.
    #[error("unknown engine: {engine}")]
    UnknownEngine { engine: String },

    /// Router construction invariant violated (bad default, duplicate id).
    /// Fatal at startup, never recoverable per request.
    #[error("engine configuration error: {0}")]
    Configuration(String),

    /// The agent process exited non-zero.
    #[error("engine process exited with code {code}")]
    ExecutionFailed {
        code: i32,
        /// Bounded tail of the process error stream, for diagnostics.
        stderr_tail: String,
    },

    /// The process succeeded but no session id was ever observed.
    #[error("engine reported no session id")]
    MissingSessionId,

    /// The agent process could not be spawned.
    #[error("failed to spawn engine process: {0}")]
    Spawn(String),

    /// I/O failure on the process streams.
    #[error("engine I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
