use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::Result;

/// One engine invocation: what to run and where.
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// Combined prompt text, written to the agent's stdin.
    pub prompt: String,
    /// Session to continue; `None` starts a new session.
    pub resume: Option<String>,
    /// Working-directory override from the resolved context.
    pub workdir: Option<PathBuf>,
}

impl RunRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            resume: None,
            workdir: None,
        }
    }

    pub fn resuming(prompt: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            resume: Some(session_id.into()),
            workdir: None,
        }
    }
}

/// Outcome of a completed engine invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineRun {
    /// Session id the engine assigned (or the resumed id).
    pub session_id: String,
    /// Final reply text recovered from the event stream.
    pub reply: String,
}

/// Common interface for backend engine runners.
///
/// Implementations must tolerate concurrent `run` calls for distinct
/// sessions; same-session serialization is the [`SessionGate`]'s job.
///
/// [`SessionGate`]: crate::gate::SessionGate
#[async_trait]
pub trait EngineRunner: Send + Sync + std::fmt::Debug {
    /// Engine identifier, for routing, logging and error messages.
    fn engine(&self) -> &str;

    /// Run one invocation to completion.
    async fn run(&self, req: &RunRequest) -> Result<EngineRun>;
}
