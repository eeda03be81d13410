pub mod batch;
pub mod error;
pub mod exec;
pub mod gate;
pub mod mock;
pub mod router;
pub mod runner;

pub use error::EngineError;
pub use exec::ExecRunner;
pub use gate::SessionGate;
pub use router::{EngineRouter, RunnerEntry};
pub use runner::{EngineRun, EngineRunner, RunRequest};
