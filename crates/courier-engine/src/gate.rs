//! Per-session serialization of engine invocations.
//!
//! Most agent CLIs corrupt state when the same session is resumed by two
//! concurrent processes. The gate guarantees at most one in-flight
//! invocation per session id for the life of the process.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::error::Result;
use crate::runner::{EngineRun, EngineRunner, RunRequest};

/// Serializes engine invocations per session id.
///
/// Locks are created lazily and retained for the life of the gate;
/// session cardinality is bounded by active conversations, not request
/// volume.
#[derive(Default)]
pub struct SessionGate {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl SessionGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Session handles are opaque and engine-scoped, so the lock key is
    /// qualified by engine: two engines minting the same string must not
    /// share a lock.
    fn lock_for(&self, engine: &str, session_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(format!("{engine}:{session_id}"))
            .or_default()
            .value()
            .clone()
    }

    /// Run `req` on `runner`, holding the session lock when resuming.
    ///
    /// A new session has no prior state to contend over, so it runs
    /// unserialized. A resume waits for any in-flight invocation of the
    /// same session to finish first.
    pub async fn run_serialized(
        &self,
        runner: &dyn EngineRunner,
        req: &RunRequest,
    ) -> Result<EngineRun> {
        let Some(session_id) = req.resume.as_deref() else {
            return runner.run(req).await;
        };
        let lock = self.lock_for(runner.engine(), session_id);
        let _held = lock.lock().await;
        runner.run(req).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::Barrier;

    use super::*;

    /// Tracks how many invocations are in flight at once.
    #[derive(Debug)]
    struct OverlapProbe {
        active: AtomicUsize,
        max_active: AtomicUsize,
        barrier: Option<Barrier>,
    }

    impl OverlapProbe {
        fn counting() -> Self {
            Self {
                active: AtomicUsize::new(0),
                max_active: AtomicUsize::new(0),
                barrier: None,
            }
        }

        /// Both invocations must be inside `run` at the same time for the
        /// barrier to release, so completion proves overlap.
        fn requiring_overlap() -> Self {
            Self {
                active: AtomicUsize::new(0),
                max_active: AtomicUsize::new(0),
                barrier: Some(Barrier::new(2)),
            }
        }
    }

    #[async_trait]
    impl EngineRunner for OverlapProbe {
        fn engine(&self) -> &str {
            "probe"
        }

        async fn run(&self, req: &RunRequest) -> Result<EngineRun> {
            let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now_active, Ordering::SeqCst);
            match &self.barrier {
                Some(barrier) => {
                    barrier.wait().await;
                }
                None => tokio::time::sleep(Duration::from_millis(20)).await,
            }
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(EngineRun {
                session_id: req.resume.clone().unwrap_or_else(|| "new".to_string()),
                reply: "ok".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn same_session_never_overlaps() {
        let gate = Arc::new(SessionGate::new());
        let probe = Arc::new(OverlapProbe::counting());

        let mut handles = Vec::new();
        for _ in 0..4 {
            let gate = Arc::clone(&gate);
            let probe = Arc::clone(&probe);
            handles.push(tokio::spawn(async move {
                let req = RunRequest::resuming("go", "shared");
                gate.run_serialized(probe.as_ref(), &req).await
            }));
        }
        for handle in handles {
            handle.await.expect("task").expect("run");
        }

        assert_eq!(probe.max_active.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn distinct_sessions_overlap_freely() {
        let gate = Arc::new(SessionGate::new());
        let probe = Arc::new(OverlapProbe::requiring_overlap());

        let a = {
            let gate = Arc::clone(&gate);
            let probe = Arc::clone(&probe);
            tokio::spawn(async move {
                gate.run_serialized(probe.as_ref(), &RunRequest::resuming("go", "a"))
                    .await
            })
        };
        let b = {
            let gate = Arc::clone(&gate);
            let probe = Arc::clone(&probe);
            tokio::spawn(async move {
                gate.run_serialized(probe.as_ref(), &RunRequest::resuming("go", "b"))
                    .await
            })
        };

        a.await.expect("task").expect("run");
        b.await.expect("task").expect("run");
        assert_eq!(probe.max_active.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn new_sessions_bypass_the_gate() {
        let gate = Arc::new(SessionGate::new());
        let probe = Arc::new(OverlapProbe::requiring_overlap());

        let a = {
            let gate = Arc::clone(&gate);
            let probe = Arc::clone(&probe);
            tokio::spawn(
                async move { gate.run_serialized(probe.as_ref(), &RunRequest::new("go")).await },
            )
        };
        let b = {
            let gate = Arc::clone(&gate);
            let probe = Arc::clone(&probe);
            tokio::spawn(
                async move { gate.run_serialized(probe.as_ref(), &RunRequest::new("go")).await },
            )
        };

        a.await.expect("task").expect("run");
        b.await.expect("task").expect("run");
        assert_eq!(probe.max_active.load(Ordering::SeqCst), 2);
    }
}
