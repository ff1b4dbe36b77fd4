//! Single-flight streaming request pipeline.
//!
//! At most one [`RequestSession`] is `Pending`/`Streaming` at a time. A second
//! submit is rejected with [`AssistError::AlreadyInFlight`]; it never cancels
//! or queues behind the running one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::StreamExt;
use log::{info, warn};
use tokio::sync::mpsc;

use crate::ai_client::{ChatRequest, CompletionService};
use crate::config::AppConfig;
use crate::error::{AssistError, Result};

pub type SessionId = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationKind {
    Summarize,
    Translate { target_language: String },
}

impl OperationKind {
    /// Panel title and error prefix for this operation.
    pub fn label(&self) -> String {
        match self {
            OperationKind::Summarize => "Summary".to_string(),
            OperationKind::Translate { target_language } => {
                format!("Translation ({target_language})")
            }
        }
    }

    fn instruction(&self) -> String {
        match self {
            OperationKind::Summarize => "You are a text summarization assistant. Summarize the \
                 user's text concisely, in the same language as the text."
                .to_string(),
            OperationKind::Translate { target_language } => format!(
                "You are a translation assistant. Translate the user's text into \
                 {target_language}, preserving its formatting and tone."
            ),
        }
    }

    fn task_prefix(&self) -> String {
        match self {
            OperationKind::Summarize => "Summarize the following text".to_string(),
            OperationKind::Translate { target_language } => {
                format!("Translate the following text into {target_language}")
            }
        }
    }

    pub fn user_message(&self, text: &str) -> String {
        format!("{}:\n{}", self.task_prefix(), text)
    }

    pub fn to_request(&self, model: &str, text: &str) -> ChatRequest {
        ChatRequest::streaming(model, &self.instruction(), &self.user_message(text))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Pending,
    Streaming,
    Completed,
    Failed,
}

impl SessionState {
    pub fn is_active(self) -> bool {
        matches!(self, SessionState::Pending | SessionState::Streaming)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSession {
    pub id: SessionId,
    pub input_text: String,
    pub operation: OperationKind,
    pub accumulated_output: String,
    pub state: SessionState,
}

/// Receives the progress of a session. `on_chunk` always gets the full text
/// so far; `on_done`/`on_error` is the last call for a session.
pub trait ChunkSink: Send + Sync {
    fn on_chunk(&self, session: SessionId, accumulated: &str);
    fn on_done(&self, session: SessionId, output: &str);
    fn on_error(&self, session: SessionId, error: AssistError);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    Chunk { session: SessionId, text: String },
    Done { session: SessionId, text: String },
    Failed { session: SessionId, error: AssistError },
}

/// Posts session progress onto a channel instead of calling back into the
/// receiver's state.
pub struct ChannelSink<E> {
    tx: mpsc::UnboundedSender<E>,
}

impl<E> ChannelSink<E> {
    pub fn new(tx: mpsc::UnboundedSender<E>) -> Self {
        Self { tx }
    }
}

impl<E> ChunkSink for ChannelSink<E>
where
    E: From<PipelineEvent> + Send + 'static,
{
    fn on_chunk(&self, session: SessionId, accumulated: &str) {
        let _ = self.tx.send(
            PipelineEvent::Chunk {
                session,
                text: accumulated.to_string(),
            }
            .into(),
        );
    }

    fn on_done(&self, session: SessionId, output: &str) {
        let _ = self.tx.send(
            PipelineEvent::Done {
                session,
                text: output.to_string(),
            }
            .into(),
        );
    }

    fn on_error(&self, session: SessionId, error: AssistError) {
        let _ = self.tx.send(PipelineEvent::Failed { session, error }.into());
    }
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub api_key: Option<String>,
    pub model_name: String,
    /// Zero disables the idle timeout.
    pub stream_idle_timeout: Duration,
}

impl From<&AppConfig> for PipelineSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            api_key: config.credential().map(str::to_string),
            model_name: config.model_name.clone(),
            stream_idle_timeout: config.stream_idle_timeout(),
        }
    }
}

#[derive(Default)]
struct Slot {
    active: Option<RequestSession>,
    last_finished: Option<RequestSession>,
}

struct Inner {
    service: Arc<dyn CompletionService>,
    sink: Arc<dyn ChunkSink>,
    settings: PipelineSettings,
    slot: Mutex<Slot>,
    next_id: AtomicU64,
}

#[derive(Clone)]
pub struct CompletionPipeline {
    inner: Arc<Inner>,
}

impl CompletionPipeline {
    pub fn new(
        service: Arc<dyn CompletionService>,
        sink: Arc<dyn ChunkSink>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                service,
                sink,
                settings,
                slot: Mutex::new(Slot::default()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Starts a streaming request on the current tokio runtime.
    ///
    /// Rejections happen synchronously and leave any running session alone.
    pub fn submit(&self, text: &str, operation: OperationKind) -> Result<RequestSession> {
        let mut slot = self.inner.slot();
        if slot.active.is_some() {
            return Err(AssistError::AlreadyInFlight);
        }
        let api_key = self
            .inner
            .settings
            .api_key
            .clone()
            .ok_or(AssistError::MissingCredential)?;

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let request = operation.to_request(&self.inner.settings.model_name, text);
        let mut session = RequestSession {
            id,
            input_text: text.to_string(),
            operation,
            accumulated_output: String::new(),
            state: SessionState::Pending,
        };
        session.state = SessionState::Streaming;
        slot.active = Some(session.clone());
        drop(slot);

        info!(
            "session {id}: {} request for {} chars",
            session.operation.label(),
            text.chars().count()
        );
        tokio::spawn(run_session(Arc::clone(&self.inner), id, api_key, request));

        Ok(session)
    }

    pub fn active(&self) -> Option<RequestSession> {
        self.inner.slot().active.clone()
    }

    pub fn is_busy(&self) -> bool {
        self.inner.slot().active.is_some()
    }

    /// Most recent session that reached `Completed` or `Failed`.
    pub fn last_finished(&self) -> Option<RequestSession> {
        self.inner.slot().last_finished.clone()
    }
}

impl Inner {
    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record_progress(&self, id: SessionId, accumulated: &str) {
        if let Some(session) = self.slot().active.as_mut().filter(|s| s.id == id) {
            session.accumulated_output.clear();
            session.accumulated_output.push_str(accumulated);
        }
    }

    /// Moves the session to its terminal state and frees the single-flight slot.
    fn finish(&self, id: SessionId, state: SessionState) {
        let mut slot = self.slot();
        if slot.active.as_ref().map(|s| s.id) != Some(id) {
            return;
        }
        if let Some(mut session) = slot.active.take() {
            session.state = state;
            slot.last_finished = Some(session);
        }
    }

    fn idle_timeout_error(&self) -> AssistError {
        AssistError::Transport(format!(
            "no data received for {}s",
            self.settings.stream_idle_timeout.as_secs()
        ))
    }

    async fn within_idle_timeout<F, T>(&self, fut: F) -> Result<T>
    where
        F: std::future::Future<Output = T>,
    {
        let limit = self.settings.stream_idle_timeout;
        if limit.is_zero() {
            return Ok(fut.await);
        }
        tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| self.idle_timeout_error())
    }
}

async fn run_session(inner: Arc<Inner>, id: SessionId, api_key: String, request: ChatRequest) {
    match stream_session(&inner, id, &api_key, request).await {
        Ok(output) => {
            inner.finish(id, SessionState::Completed);
            info!("session {id} completed, {} chars", output.chars().count());
            inner.sink.on_done(id, &output);
        }
        Err(e) => {
            inner.finish(id, SessionState::Failed);
            warn!("session {id} failed: {e}");
            inner.sink.on_error(id, e);
        }
    }
}

async fn stream_session(
    inner: &Inner,
    id: SessionId,
    api_key: &str,
    request: ChatRequest,
) -> Result<String> {
    let mut stream = inner
        .within_idle_timeout(inner.service.stream_chat(api_key, request))
        .await??;

    let mut accumulated = String::new();
    while let Some(fragment) = inner.within_idle_timeout(stream.next()).await? {
        accumulated.push_str(&fragment?);
        inner.record_progress(id, &accumulated);
        inner.sink.on_chunk(id, &accumulated);
    }
    Ok(accumulated)
}
