//! Scriptable runner for tests: plays back a fixed sequence of outcomes
//! and records every request it receives.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::runner::{EngineRun, EngineRunner, RunRequest};

/// One scripted outcome.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    /// Succeed with this reply text. The session id is the resumed id, or
    /// a freshly minted one for new sessions.
    Reply(String),
    /// Fail as if the process exited non-zero with this diagnostic.
    Fail(String),
}

#[derive(Debug)]
pub struct ScriptRunner {
    engine: String,
    script: Mutex<VecDeque<ScriptStep>>,
    calls: Mutex<Vec<RunRequest>>,
}

impl ScriptRunner {
    pub fn new(engine: impl Into<String>, steps: Vec<ScriptStep>) -> Self {
        Self {
            engine: engine.into(),
            script: Mutex::new(steps.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Runner that answers every request with the same reply.
    pub fn replying(engine: impl Into<String>, reply: impl Into<String>) -> Self {
        Self::new(engine, vec![ScriptStep::Reply(reply.into())])
    }

    /// Requests received so far, in arrival order.
    pub fn calls(&self) -> Vec<RunRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl EngineRunner for ScriptRunner {
    fn engine(&self) -> &str {
        &self.engine
    }

    async fn run(&self, req: &RunRequest) -> Result<EngineRun> {
        self.calls.lock().unwrap().push(req.clone());

        // An exhausted script keeps replaying its last step.
        let step = {
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                script.pop_front()
            } else {
                script.front().cloned()
            }
        };

        match step.unwrap_or_else(|| ScriptStep::Reply("ok".to_string())) {
            ScriptStep::Reply(reply) => Ok(EngineRun {
                session_id: req
                    .resume
                    .clone()
                    .unwrap_or_else(|| Uuid::new_v4().to_string()),
                reply,
            }),
            ScriptStep::Fail(diagnostic) => Err(EngineError::ExecutionFailed {
                code: 1,
                stderr_tail: diagnostic,
            }),
        }
    }
}
