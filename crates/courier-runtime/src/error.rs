use thiserror::Error;

/// Failures surfaced at the worker-task boundary.
///
/// These are per-request: they become an error reply to the originating
/// chat and never take down the scheduler.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Engine(#[from] courier_engine::EngineError),

    #[error(transparent)]
    Routes(#[from] courier_routes::RouteError),

    #[error("transport send failed: {0}")]
    Transport(String),
}

pub type Result<T> = std::result::Result<T, DispatchError>;
