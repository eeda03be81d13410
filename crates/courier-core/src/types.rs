use serde::{Deserialize, Serialize};

/// Chat identifier assigned by the transport.
pub type ChatId = i64;

/// Message identifier within a chat. Opaque: ordering is by arrival,
/// never by numeric comparison.
pub type MessageId = i64;

/// Thread (forum topic) identifier within a chat.
pub type ThreadId = i64;

/// Identifier of a configured backend engine.
pub type EngineId = String;

/// Resolved working context for one engine invocation.
///
/// Immutable after creation. A context never carries a branch without a
/// project; the resolver produces no context at all in that case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunContext {
    pub project: Option<String>,
    pub branch: Option<String>,
}

/// Handle to continue an existing engine session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeToken {
    /// Engine that minted the session.
    pub engine: EngineId,
    /// Opaque session handle meaningful only to that engine.
    pub value: String,
}

/// Project/branch hints the transport derives from its own binding rules
/// (e.g. "this chat is bound to project X"). Consumed, never produced, by
/// the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportMessageContext {
    pub project_hint: Option<String>,
    pub branch_hint: Option<String>,
}
