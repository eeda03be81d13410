//! Engine identifier → runner resolution.

use std::sync::Arc;

use courier_core::config::EngineConfig;
use courier_core::EngineId;

use crate::error::{EngineError, Result};
use crate::exec::ExecRunner;
use crate::runner::EngineRunner;

/// One engine registration.
#[derive(Debug)]
pub struct RunnerEntry {
    pub engine: EngineId,
    pub runner: Arc<dyn EngineRunner>,
}

impl RunnerEntry {
    pub fn new(engine: impl Into<EngineId>, runner: Arc<dyn EngineRunner>) -> Self {
        Self {
            engine: engine.into(),
            runner,
        }
    }
}

/// Maps engine identifiers to runner implementations, with a global
/// default.
///
/// Immutable after construction, so safe for unsynchronized concurrent
/// reads.
#[derive(Debug)]
pub struct EngineRouter {
    entries: Vec<RunnerEntry>,
    default_engine: EngineId,
}

impl EngineRouter {
    /// Build a router. Fails when the default is not among the entries or
    /// an engine id is registered twice.
    pub fn new(entries: Vec<RunnerEntry>, default_engine: impl Into<EngineId>) -> Result<Self> {
        let default_engine = default_engine.into();

        for (i, entry) in entries.iter().enumerate() {
            if entries[..i].iter().any(|e| e.engine == entry.engine) {
                return Err(EngineError::Configuration(format!(
                    "duplicate engine registration: {}",
                    entry.engine
                )));
            }
        }
        if !entries.iter().any(|e| e.engine == default_engine) {
            return Err(EngineError::Configuration(format!(
                "default engine '{default_engine}' is not registered"
            )));
        }

        Ok(Self {
            entries,
            default_engine,
        })
    }

    /// Build a router of [`ExecRunner`]s from `[[engines]]` config entries.
    pub fn from_config(engines: &[EngineConfig], default_engine: &str) -> Result<Self> {
        let entries = engines
            .iter()
            .map(|config| RunnerEntry::new(&config.id, Arc::new(ExecRunner::from_config(config))))
            .collect();
        Self::new(entries, default_engine)
    }

    pub fn default_engine(&self) -> &str {
        &self.default_engine
    }

    /// Registered engine ids, in registration order.
    pub fn engines(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.engine.as_str())
    }

    /// Resolve an optional override to a runner. With no override the
    /// default engine applies, which construction guaranteed exists.
    pub fn resolve(&self, engine_override: Option<&str>) -> Result<Arc<dyn EngineRunner>> {
        let engine = engine_override.unwrap_or(&self.default_engine);
        self.entries
            .iter()
            .find(|e| e.engine == engine)
            .map(|e| Arc::clone(&e.runner))
            .ok_or_else(|| EngineError::UnknownEngine {
                engine: engine.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::ScriptRunner;

    fn entry(engine: &str) -> RunnerEntry {
        RunnerEntry::new(engine, Arc::new(ScriptRunner::replying(engine, "ok")))
    }

    #[test]
    fn resolves_default_when_no_override() {
        let router = EngineRouter::new(vec![entry("codex"), entry("claude")], "codex")
            .expect("router builds");
        let runner = router.resolve(None).expect("resolves");
        assert_eq!(runner.engine(), "codex");
    }

    #[test]
    fn resolves_exact_override() {
        let router = EngineRouter::new(vec![entry("codex"), entry("claude")], "codex")
            .expect("router builds");
        let runner = router.resolve(Some("claude")).expect("resolves");
        assert_eq!(runner.engine(), "claude");
    }

    #[test]
    fn unknown_override_fails() {
        let router = EngineRouter::new(vec![entry("codex")], "codex").expect("router builds");
        let err = router.resolve(Some("nope")).expect_err("fails");
        assert!(matches!(err, EngineError::UnknownEngine { engine } if engine == "nope"));
    }

    #[test]
    fn unregistered_default_is_a_configuration_error() {
        let err = EngineRouter::new(vec![entry("codex")], "claude").expect_err("fails");
        assert!(matches!(err, EngineError::Configuration(_)));
    }

    #[test]
    fn duplicate_registration_is_a_configuration_error() {
        let err =
            EngineRouter::new(vec![entry("codex"), entry("codex")], "codex").expect_err("fails");
        assert!(matches!(err, EngineError::Configuration(_)));
    }
}
