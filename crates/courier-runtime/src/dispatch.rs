//! Dispatch scheduler: the runtime gluing resolver, debouncer and engine.
//!
//! A single driver loop ingests transport events and drains expired
//! batches into a bounded worker pool. Each batch runs as its own task:
//! engine resolution, session-locked execution, reply delivery and route
//! linking all happen off the driver loop, so ingestion never blocks on a
//! running agent process.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use courier_core::{ChatId, MessageId, ThreadId, TransportMessageContext};
use courier_engine::{EngineError, EngineRouter, RunRequest, SessionGate};
use courier_routes::{Route, RouteStore};

use crate::debounce::{MessageBatch, PendingMessage, TopicDebouncer, TopicKey};
use crate::error::DispatchError;
use crate::resolve::MessageResolver;

/// Longest the driver parks when nothing is pending.
const IDLE_PARK: Duration = Duration::from_secs(60);

/// Longest stderr excerpt shown in a user-visible error reply.
const MAX_ERROR_TAIL_CHARS: usize = 1000;

/// Outbound half of the chat transport.
///
/// Long replies may be split by the transport; every message id actually
/// sent comes back so each one can be linked for resume-by-reply.
#[async_trait]
pub trait ReplySender: Send + Sync {
    async fn send_reply(
        &self,
        chat_id: ChatId,
        thread_id: Option<ThreadId>,
        reply_to: MessageId,
        text: &str,
    ) -> Result<Vec<MessageId>, DispatchError>;
}

/// One inbound chat message, as the transport hands it over.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub chat_id: ChatId,
    pub msg_id: MessageId,
    pub text: String,
    pub thread_id: Option<ThreadId>,
    /// Id of the bot message this one replies to, when it is a reply.
    pub reply_to: Option<MessageId>,
    pub transport_context: Option<TransportMessageContext>,
}

/// Events fed into the scheduler by the transport layer.
#[derive(Debug, Clone)]
pub enum InboundEvent {
    Message(InboundMessage),
    /// Dispatch a topic's pending batch immediately (explicit "send now").
    Flush(TopicKey),
}

pub struct DispatchScheduler {
    router: Arc<EngineRouter>,
    resolver: Arc<MessageResolver>,
    routes: Arc<dyn RouteStore>,
    sender: Arc<dyn ReplySender>,
    gate: Arc<SessionGate>,
    debouncer: Mutex<TopicDebouncer>,
    workers: Arc<Semaphore>,
}

impl DispatchScheduler {
    pub fn new(
        router: Arc<EngineRouter>,
        resolver: Arc<MessageResolver>,
        routes: Arc<dyn RouteStore>,
        sender: Arc<dyn ReplySender>,
        window: Duration,
        max_workers: usize,
    ) -> Self {
        Self {
            router,
            resolver,
            routes,
            sender,
            gate: Arc::new(SessionGate::new()),
            debouncer: Mutex::new(TopicDebouncer::new(window)),
            workers: Arc::new(Semaphore::new(max_workers)),
        }
    }

    /// Drive the pipeline until `shutdown` flips true or the transport
    /// closes its channel. Drains pending batches and in-flight workers
    /// before returning.
    pub async fn run(
        self,
        mut inbound: mpsc::Receiver<InboundEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(
            window_ms = self.debouncer.lock().unwrap().window().as_millis() as u64,
            "dispatch scheduler started"
        );

        let mut tasks = JoinSet::new();

        loop {
            // Sleep exactly until the next deadline; park when idle.
            let wake_at = self
                .debouncer
                .lock()
                .unwrap()
                .next_deadline()
                .unwrap_or_else(|| Instant::now() + IDLE_PARK);

            tokio::select! {
                event = inbound.recv() => match event {
                    Some(InboundEvent::Message(msg)) => {
                        if let Some(batch) = self.ingest(msg) {
                            self.submit(batch, &mut tasks);
                        }
                    }
                    Some(InboundEvent::Flush(key)) => {
                        let flushed = self.debouncer.lock().unwrap().flush_topic(key);
                        if let Some(batch) = flushed {
                            debug!(chat_id = key.0, "topic flushed on request");
                            self.submit(batch, &mut tasks);
                        }
                    }
                    None => break, // transport hung up
                },
                _ = tokio::time::sleep_until(wake_at) => {
                    let expired = self.debouncer.lock().unwrap().check_expired(Instant::now());
                    for batch in expired {
                        self.submit(batch, &mut tasks);
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("dispatch scheduler draining");
        let remaining = self.debouncer.lock().unwrap().flush_all();
        for batch in remaining {
            self.submit(batch, &mut tasks);
        }
        while tasks.join_next().await.is_some() {}
        info!("dispatch scheduler stopped");
    }

    /// Resolve an inbound message and queue it for debouncing.
    ///
    /// Returns a ready batch when the window is zero.
    fn ingest(&self, msg: InboundMessage) -> Option<MessageBatch> {
        // A reply to a routed bot message continues that session.
        let resume_token = msg.reply_to.and_then(|reply_to| {
            match self.routes.resolve(msg.chat_id, reply_to) {
                Ok(route) => route.map(|r| r.resume_token()),
                Err(e) => {
                    warn!(chat_id = msg.chat_id, error = %e, "route lookup failed");
                    None
                }
            }
        });

        let resolved =
            self.resolver
                .resolve_message(&msg.text, None, msg.transport_context.as_ref());

        let pending = PendingMessage {
            chat_id: msg.chat_id,
            user_msg_id: msg.msg_id,
            text: resolved.text,
            resume_token,
            context: resolved.context,
            thread_id: msg.thread_id,
            engine_override: resolved.engine_override,
            timestamp: Instant::now(),
        };
        self.debouncer.lock().unwrap().add_message(pending)
    }

    /// Hand a batch to the worker pool.
    ///
    /// The permit is acquired inside the spawned task: a saturated pool
    /// queues work without ever blocking the driver loop.
    fn submit(&self, batch: MessageBatch, tasks: &mut JoinSet<()>) {
        let router = Arc::clone(&self.router);
        let resolver = Arc::clone(&self.resolver);
        let routes = Arc::clone(&self.routes);
        let sender = Arc::clone(&self.sender);
        let gate = Arc::clone(&self.gate);
        let workers = Arc::clone(&self.workers);

        tasks.spawn(async move {
            let _permit = match workers.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return, // semaphore closed, shutting down
            };
            run_batch(router, resolver, routes, sender, gate, batch).await;
        });
    }
}

/// Execute one batch: route, run session-locked, deliver the outcome.
///
/// Failures are per-request: they become an error reply and an
/// error-marked route, never a scheduler crash.
async fn run_batch(
    router: Arc<EngineRouter>,
    resolver: Arc<MessageResolver>,
    routes: Arc<dyn RouteStore>,
    sender: Arc<dyn ReplySender>,
    gate: Arc<SessionGate>,
    batch: MessageBatch,
) {
    // A resume token pins the engine that minted the session; otherwise
    // the batch override (or the router default) picks it.
    let engine_override = batch
        .resume_token
        .as_ref()
        .map(|t| t.engine.clone())
        .or_else(|| batch.engine_override.clone());

    let outcome: Result<(String, courier_engine::EngineRun), DispatchError> =
        match router.resolve(engine_override.as_deref()) {
            Ok(runner) => {
                let req = RunRequest {
                    prompt: batch.combined_text.clone(),
                    resume: batch.resume_token.as_ref().map(|t| t.value.clone()),
                    workdir: resolver.resolve_workdir(batch.context.as_ref()),
                };
                gate.run_serialized(runner.as_ref(), &req)
                    .await
                    .map(|run| (runner.engine().to_string(), run))
                    .map_err(DispatchError::from)
            }
            Err(e) => Err(e.into()),
        };

    match outcome {
        Ok((engine, run)) => {
            debug!(
                chat_id = batch.chat_id,
                engine = %engine,
                session_id = %run.session_id,
                "batch completed"
            );
            let route = Route::new(engine, &run.session_id);
            send_and_link(&*sender, &*routes, &batch, &run.reply, &route).await;
        }
        Err(err) => {
            warn!(chat_id = batch.chat_id, error = %err, "batch execution failed");
            // The error route keeps the reply chain resumable for a retry.
            let engine = engine_override.unwrap_or_else(|| router.default_engine().to_string());
            let session_id = batch
                .resume_token
                .as_ref()
                .map(|t| t.value.clone())
                .unwrap_or_else(|| "unknown".to_string());
            let route = Route::new(engine, session_id)
                .with_metadata(serde_json::json!({"error": true}));
            send_and_link(&*sender, &*routes, &batch, &user_facing_error(&err), &route).await;
        }
    }
}

async fn send_and_link(
    sender: &dyn ReplySender,
    routes: &dyn RouteStore,
    batch: &MessageBatch,
    text: &str,
    route: &Route,
) {
    match sender
        .send_reply(batch.chat_id, batch.thread_id, batch.last_msg_id, text)
        .await
    {
        Ok(sent) => {
            for message_id in sent {
                if let Err(e) = routes.link(batch.chat_id, message_id, route) {
                    error!(
                        chat_id = batch.chat_id,
                        message_id,
                        error = %e,
                        "route link failed"
                    );
                }
            }
        }
        Err(e) => error!(chat_id = batch.chat_id, error = %e, "reply delivery failed"),
    }
}

/// Render a worker failure for the chat reply.
fn user_facing_error(err: &DispatchError) -> String {
    match err {
        DispatchError::Engine(EngineError::ExecutionFailed { code, stderr_tail }) => format!(
            "❌ Engine failed (exit code {code}).\n{}",
            truncate(stderr_tail, MAX_ERROR_TAIL_CHARS)
        ),
        other => format!("❌ {other}"),
    }
}

/// Truncate on a character boundary for error messages.
fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        None => s,
        Some((idx, _)) => &s[..idx],
    }
}
