use std::collections::BTreeMap;
use std::path::PathBuf;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::EngineId;

pub const DEFAULT_DEBOUNCE_WINDOW_MS: u64 = 200;
pub const DEFAULT_MAX_WORKERS: usize = 4;

/// Top-level config (courier.toml + COURIER_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourierConfig {
    /// Engine used when neither a directive nor a project default selects one.
    pub default_engine: EngineId,
    /// External agent CLIs available for dispatch.
    pub engines: Vec<EngineConfig>,
    #[serde(default)]
    pub projects: ProjectsConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub routes: RoutesConfig,
}

/// One external agent CLI the router can select.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub id: EngineId,
    /// Executable name or path, e.g. "codex".
    pub command: String,
    /// Fallback working directory when no project context resolves.
    pub workspace: Option<PathBuf>,
    /// Extra arguments appended to every invocation, e.g. ["--full-auto"].
    #[serde(default)]
    pub extra_args: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProjectsConfig {
    #[serde(default)]
    pub projects: BTreeMap<String, ProjectConfig>,
    /// Project assumed when neither a directive nor a transport hint names one.
    pub default_project: Option<String>,
}

impl ProjectsConfig {
    pub fn get(&self, name: &str) -> Option<&ProjectConfig> {
        self.projects.get(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Checkout the engine runs in when this project is selected.
    pub path: PathBuf,
    /// Where branch worktrees live. Defaults to `<path>/.worktrees`.
    pub worktrees_dir: Option<PathBuf>,
    /// Engine used for this project when no directive overrides it.
    pub default_engine: Option<EngineId>,
}

impl ProjectConfig {
    pub fn worktrees_root(&self) -> PathBuf {
        self.worktrees_dir
            .clone()
            .unwrap_or_else(|| self.path.join(".worktrees"))
    }
}

/// Debounce window and worker pool sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Sliding coalescing window per topic. Zero disables batching.
    #[serde(default = "default_debounce_window_ms")]
    pub debounce_window_ms: u64,
    /// Batches executed truly concurrently; excess queues.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            debounce_window_ms: DEFAULT_DEBOUNCE_WINDOW_MS,
            max_workers: DEFAULT_MAX_WORKERS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutesConfig {
    /// SQLite file backing the message→session route directory.
    #[serde(default = "default_routes_db_path")]
    pub db_path: String,
}

impl Default for RoutesConfig {
    fn default() -> Self {
        Self {
            db_path: default_routes_db_path(),
        }
    }
}

fn default_debounce_window_ms() -> u64 {
    DEFAULT_DEBOUNCE_WINDOW_MS
}
fn default_max_workers() -> usize {
    DEFAULT_MAX_WORKERS
}
fn default_routes_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.courier/routes.db", home)
}
fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.courier/courier.toml", home)
}

impl CourierConfig {
    /// Load config from a TOML file with COURIER_* env var overrides.
    ///
    /// Falls back to `~/.courier/courier.toml` when no path is given.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        debug!(%path, "loading configuration");

        let config: CourierConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("COURIER_").split("_"))
            .extract()
            .map_err(|e| crate::error::CoreError::Config(e.to_string()))?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml: &str) -> CourierConfig {
        Figment::new()
            .merge(Toml::string(toml))
            .extract()
            .expect("config parses")
    }

    #[test]
    fn minimal_config_applies_defaults() {
        let config = parse(
            r#"
            default_engine = "codex"

            [[engines]]
            id = "codex"
            command = "codex"
            "#,
        );
        assert_eq!(config.default_engine, "codex");
        assert_eq!(config.dispatch.debounce_window_ms, 200);
        assert_eq!(config.dispatch.max_workers, 4);
        assert!(config.projects.projects.is_empty());
        assert!(config.projects.default_project.is_none());
        assert!(config.engines[0].extra_args.is_empty());
    }

    #[test]
    fn project_section_round_trips() {
        let config = parse(
            r#"
            default_engine = "codex"

            [[engines]]
            id = "codex"
            command = "codex"
            extra_args = ["--full-auto"]

            [projects.projects.api]
            path = "/srv/api"
            default_engine = "claude"

            [projects]
            default_project = "api"

            [dispatch]
            debounce_window_ms = 50
            max_workers = 2
            "#,
        );
        let project = config.projects.get("api").expect("project present");
        assert_eq!(project.default_engine.as_deref(), Some("claude"));
        assert_eq!(project.worktrees_root(), PathBuf::from("/srv/api/.worktrees"));
        assert_eq!(config.projects.default_project.as_deref(), Some("api"));
        assert_eq!(config.dispatch.debounce_window_ms, 50);
        assert_eq!(config.engines[0].extra_args, vec!["--full-auto"]);
    }

    #[test]
    fn explicit_worktrees_dir_wins() {
        let config = parse(
            r#"
            default_engine = "codex"

            [[engines]]
            id = "codex"
            command = "codex"

            [projects.projects.api]
            path = "/srv/api"
            worktrees_dir = "/tmp/wt"
            "#,
        );
        let project = config.projects.get("api").expect("project present");
        assert_eq!(project.worktrees_root(), PathBuf::from("/tmp/wt"));
    }
}
