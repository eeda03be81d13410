use serde::{Deserialize, Serialize};

use courier_core::ResumeToken;

/// A persisted link from one outbound chat message to its engine session.
///
/// `route_type` records the engine id and `route_id` the session id, so a
/// reply to the linked message resolves straight to a resume token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub route_type: String,
    pub route_id: String,
    /// Free-form diagnostics: workspace, error marker, ...
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl Route {
    pub fn new(route_type: impl Into<String>, route_id: impl Into<String>) -> Self {
        Self {
            route_type: route_type.into(),
            route_id: route_id.into(),
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// View this route as a resume token for its engine.
    pub fn resume_token(&self) -> ResumeToken {
        ResumeToken {
            engine: self.route_type.clone(),
            value: self.route_id.clone(),
        }
    }
}
