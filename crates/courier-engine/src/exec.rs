//! External agent process driver.
//!
//! Spawns the engine CLI in non-interactive structured-output mode and
//! recovers the (session id, final reply) pair from its line-delimited
//! JSON event stream.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

use courier_core::config::EngineConfig;

use crate::error::{EngineError, Result};
use crate::runner::{EngineRun, EngineRunner, RunRequest};

/// Stderr lines retained for diagnostics on failure.
const STDERR_TAIL_LINES: usize = 200;

/// Substituted when the stream ends without an agent message. The external
/// session may legitimately produce no final text event.
pub const NO_REPLY_PLACEHOLDER: &str = "(no agent reply captured from event stream)";

/// One event on the agent's stdout stream. Lines that fail to deserialize
/// (malformed JSON, unknown `type`) are skipped by the reader.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum StreamEvent {
    /// The engine reports the session id it assigned. Only meaningful when
    /// no id was supplied on the command line.
    #[serde(rename = "session.started")]
    SessionStarted { session_id: String },
    /// An item finished; agent messages carry the latest reply text, later
    /// events overwriting earlier ones.
    #[serde(rename = "item.completed")]
    ItemCompleted { item: CompletedItem },
}

#[derive(Debug, Deserialize)]
struct CompletedItem {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}

/// Runs one agent CLI in non-interactive mode:
///   new:    `<command> exec --json [extra] [--cd DIR] -`
///   resume: `<command> exec --json [extra] [--cd DIR] resume <SESSION_ID> -`
///
/// The prompt always travels via stdin (the trailing `-`), never argv, to
/// avoid quoting and length limits.
#[derive(Debug)]
pub struct ExecRunner {
    engine: String,
    command: String,
    workspace: Option<PathBuf>,
    extra_args: Vec<String>,
}

impl ExecRunner {
    pub fn new(engine: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            engine: engine.into(),
            command: command.into(),
            workspace: None,
            extra_args: Vec::new(),
        }
    }

    /// Fallback working directory when the request carries none.
    pub fn with_workspace(mut self, workspace: Option<PathBuf>) -> Self {
        self.workspace = workspace;
        self
    }

    /// Extra arguments appended to every invocation (e.g. `["--full-auto"]`).
    pub fn with_extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    /// Build a runner straight from an `[[engines]]` config entry.
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(&config.id, &config.command)
            .with_workspace(config.workspace.clone())
            .with_extra_args(config.extra_args.clone())
    }

    fn build_command(&self, req: &RunRequest) -> Command {
        let mut cmd = Command::new(&self.command);
        cmd.arg("exec").arg("--json");
        cmd.args(&self.extra_args);
        if let Some(dir) = req.workdir.as_ref().or(self.workspace.as_ref()) {
            cmd.arg("--cd").arg(dir);
        }
        if let Some(session_id) = &req.resume {
            cmd.arg("resume").arg(session_id);
        }
        cmd.arg("-");
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }
}

#[async_trait]
impl EngineRunner for ExecRunner {
    fn engine(&self) -> &str {
        &self.engine
    }

    async fn run(&self, req: &RunRequest) -> Result<EngineRun> {
        let mut cmd = self.build_command(req);

        debug!(
            engine = %self.engine,
            command = %self.command,
            resume = req.resume.is_some(),
            prompt_len = req.prompt.len(),
            "spawning agent process"
        );

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                EngineError::Spawn(format!(
                    "'{}' not found; install the {} CLI first",
                    self.command, self.engine
                ))
            } else {
                EngineError::Spawn(e.to_string())
            }
        })?;

        // Write the prompt, then close stdin to signal end-of-input.
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(req.prompt.as_bytes()).await?;
            drop(stdin);
        }

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::Spawn("stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| EngineError::Spawn("stderr not captured".to_string()))?;

        // Drain stderr on its own task so a full pipe can never deadlock
        // the child while we block on stdout.
        let stderr_task = tokio::spawn(async move {
            let mut tail: VecDeque<String> = VecDeque::new();
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            tail
        });

        // A supplied resume id counts as already known.
        let mut session_id = req.resume.clone();
        let mut last_reply: Option<String> = None;

        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<StreamEvent>(line) {
                Ok(StreamEvent::SessionStarted { session_id: id }) => session_id = Some(id),
                Ok(StreamEvent::ItemCompleted { item }) => {
                    if item.kind == "agent_message" {
                        if let Some(text) = item.text {
                            last_reply = Some(text);
                        }
                    }
                }
                // Unrecognized or unparsable lines are skipped, not fatal.
                Err(_) => continue,
            }
        }

        let status = child.wait().await?;
        let tail: Vec<String> = stderr_task.await.unwrap_or_default().into();

        if !status.success() {
            let code = status.code().unwrap_or(-1);
            warn!(engine = %self.engine, code, "agent process failed");
            return Err(EngineError::ExecutionFailed {
                code,
                stderr_tail: tail.join("\n"),
            });
        }

        let session_id = session_id.ok_or(EngineError::MissingSessionId)?;
        let reply = last_reply.unwrap_or_else(|| NO_REPLY_PLACEHOLDER.to_string());

        debug!(
            engine = %self.engine,
            session_id = %session_id,
            reply_len = reply.len(),
            "agent process completed"
        );

        Ok(EngineRun { session_id, reply })
    }
}
