//! Context directives and message resolution.
//!
//! A message can steer its own routing with leading markers
//! (`@branch`, `/project`, `!engine`) which always beat the hints the
//! transport attaches and the configured defaults.

use std::path::PathBuf;

use courier_core::config::ProjectsConfig;
use courier_core::{EngineId, RunContext, TransportMessageContext};

/// Directives parsed off the front of a message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Directives {
    pub branch: Option<String>,
    pub project: Option<String>,
    pub engine: Option<String>,
}

/// A message after directive stripping and context resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMessage {
    pub context: Option<RunContext>,
    pub engine_override: Option<EngineId>,
    /// Message text with directives stripped.
    pub text: String,
}

/// Strip leading `@branch`, `/project` and `!engine` markers.
///
/// Each marker is recognized at most once, in any order; each consumes
/// exactly one leading token and its trailing whitespace. A bare marker
/// (no name) or a repeated one ends parsing and stays in the text.
pub fn parse_directives(text: &str) -> (Directives, String) {
    let mut directives = Directives::default();
    let mut rest = text.trim_start();

    while let Some(token) = rest.split_whitespace().next() {
        if let Some(name) = token.strip_prefix('@') {
            if name.is_empty() || directives.branch.is_some() {
                break;
            }
            directives.branch = Some(name.to_string());
        } else if let Some(name) = token.strip_prefix('/') {
            if name.is_empty() || directives.project.is_some() {
                break;
            }
            directives.project = Some(name.to_string());
        } else if let Some(name) = token.strip_prefix('!') {
            if name.is_empty() || directives.engine.is_some() {
                break;
            }
            directives.engine = Some(name.to_string());
        } else {
            break;
        }
        rest = rest[token.len()..].trim_start();
    }

    (directives, rest.to_string())
}

/// Merges explicit directives, transport hints and configuration defaults
/// into a resolved context and engine override.
///
/// Performs no I/O and cannot fail: an unknown project name resolves like
/// any other; validating it is a configuration concern elsewhere.
pub struct MessageResolver {
    projects: ProjectsConfig,
}

impl MessageResolver {
    pub fn new(projects: ProjectsConfig) -> Self {
        Self { projects }
    }

    /// Resolve one inbound message.
    ///
    /// `reply_text` is the quoted text when the message replies to another;
    /// it carries no directives of its own and is currently unused.
    pub fn resolve_message(
        &self,
        text: &str,
        _reply_text: Option<&str>,
        transport_context: Option<&TransportMessageContext>,
    ) -> ResolvedMessage {
        let (directives, stripped) = parse_directives(text);

        // Each source in strict precedence order: explicit directive,
        // transport hint, configured default.
        let project = directives
            .project
            .clone()
            .or_else(|| transport_context.and_then(|c| c.project_hint.clone()))
            .or_else(|| self.projects.default_project.clone());
        let branch = directives
            .branch
            .clone()
            .or_else(|| transport_context.and_then(|c| c.branch_hint.clone()));

        // A branch without a project is not a usable context.
        let context = project.map(|project| RunContext {
            project: Some(project),
            branch,
        });

        let engine_override = self.resolve_engine(directives.engine.as_deref(), context.as_ref());

        ResolvedMessage {
            context,
            engine_override,
            text: stripped,
        }
    }

    /// Engine precedence: explicit override, then the resolved project's
    /// default engine, then `None` (the router's global default applies
    /// downstream).
    pub fn resolve_engine(
        &self,
        engine_override: Option<&str>,
        context: Option<&RunContext>,
    ) -> Option<EngineId> {
        if let Some(engine) = engine_override {
            return Some(engine.to_string());
        }
        context
            .and_then(|c| c.project.as_deref())
            .and_then(|name| self.projects.get(name))
            .and_then(|project| project.default_engine.clone())
    }

    /// Working directory for a resolved context: the project checkout, or
    /// a branch worktree under it.
    pub fn resolve_workdir(&self, context: Option<&RunContext>) -> Option<PathBuf> {
        let context = context?;
        let project = self.projects.get(context.project.as_deref()?)?;
        Some(match context.branch.as_deref() {
            Some(branch) => project.worktrees_root().join(branch),
            None => project.path.clone(),
        })
    }
}
