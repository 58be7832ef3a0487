//! Runtime for driving sessions
//!
//! Each session runs as one task consuming its event queue. Observers follow
//! along through a broadcast stream and a watch snapshot.

mod executor;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use executor::SessionRuntime;
pub use traits::*;

use crate::speech::{AudioClip, AudioFeeder, FeedError, RemoteMicrophone, Transcriber};
use crate::state_machine::{CaptureLimits, Event, Notice, Phase, SessionContext, Turn};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, watch, RwLock};
use tokio::time::{Instant, MissedTickBehavior};

/// Type alias for production runtime with concrete implementations
pub type ProductionRuntime = SessionRuntime<
    Arc<dyn ResponseProvider>,
    MicrophoneSpeechInput<Arc<RemoteMicrophone>, Arc<dyn Transcriber>>,
    Arc<dyn TextToSpeech>,
>;

/// Events sent to observers
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// First event on every stream; carries the full view
    Init {
        view: crate::presentation::SessionView,
    },
    StateChange {
        phase: Phase,
        /// Phase-specific extras (capture limits while listening)
        data: serde_json::Value,
    },
    Turn {
        turn: Turn,
    },
    Audio {
        audio: AudioClip,
    },
    Notice {
        notice: Notice,
    },
    Error {
        message: String,
    },
}

/// Read-only view of a session at one instant
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub phase: Phase,
    pub pending_utterance: Option<String>,
    pub last_reply: String,
    pub notice: Option<Notice>,
    pub history: Vec<Turn>,
    pub capture: CaptureLimits,
}

impl SessionSnapshot {
    pub fn new(context: &SessionContext) -> Self {
        Self {
            session_id: context.session_id.clone(),
            phase: Phase::Idle,
            pending_utterance: None,
            last_reply: String::new(),
            notice: None,
            history: Vec::new(),
            capture: context.capture,
        }
    }
}

/// Failures of session management operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(String),
    #[error("Aria is busy ({}), wait for the current exchange to finish", .0.as_str())]
    Busy(Phase),
    #[error("Session is not listening for audio")]
    NotListening,
    #[error("Command is empty")]
    EmptyCommand,
    #[error("Audio rejected: {0}")]
    AudioRejected(String),
    #[error("Session has stopped")]
    Closed,
}

/// Builds the providers for each new session
pub struct SessionProviders {
    pub responder: Arc<dyn ResponseProvider>,
    pub transcriber: Arc<dyn Transcriber>,
    pub speech_out: Arc<dyn TextToSpeech>,
}

/// Settings applied to every new session
#[derive(Debug, Clone)]
pub struct SessionDefaults {
    pub thinking_delay: Duration,
    pub capture: CaptureLimits,
    pub language: String,
    /// Sessions untouched and unwatched this long are ended; `None` keeps them
    pub idle_expiry: Option<Duration>,
}

impl Default for SessionDefaults {
    fn default() -> Self {
        Self {
            thinking_delay: Duration::from_secs(5),
            capture: CaptureLimits::default(),
            language: "en".to_string(),
            idle_expiry: Some(Duration::from_secs(30 * 60)),
        }
    }
}

/// Handle to interact with a running session
pub struct SessionHandle {
    pub event_tx: mpsc::Sender<Event>,
    pub broadcast_tx: broadcast::Sender<SessionEvent>,
    pub snapshot_rx: watch::Receiver<SessionSnapshot>,
    audio_feeder: AudioFeeder,
    task: tokio::task::JoinHandle<()>,
    /// Milliseconds since the manager started, at the last client request
    last_active_ms: AtomicU64,
}

/// Manager for all session runtimes
pub struct SessionManager {
    providers: SessionProviders,
    defaults: SessionDefaults,
    sessions: RwLock<HashMap<String, SessionHandle>>,
    epoch: Instant,
}

impl SessionManager {
    pub fn new(providers: SessionProviders, defaults: SessionDefaults) -> Self {
        Self {
            providers,
            defaults,
            sessions: RwLock::new(HashMap::new()),
            epoch: Instant::now(),
        }
    }

    /// Start a new session and return its id
    pub async fn create_session(&self) -> String {
        let session_id = uuid::Uuid::new_v4().to_string();
        let context = SessionContext::new(&session_id)
            .with_thinking_delay(self.defaults.thinking_delay)
            .with_capture(self.defaults.capture)
            .with_language(self.defaults.language.clone());

        let (event_tx, event_rx) = mpsc::channel(32);
        let (broadcast_tx, _) = broadcast::channel(128);
        let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot::new(&context));

        // Each session owns its microphone
        let microphone = Arc::new(RemoteMicrophone::new());
        let audio_feeder = microphone.feeder();
        let speech_in = MicrophoneSpeechInput::new(
            microphone,
            self.providers.transcriber.clone(),
            context.language.clone(),
        );

        let runtime: ProductionRuntime = SessionRuntime::new(
            context,
            Arc::new(self.providers.responder.clone()),
            Arc::new(speech_in),
            Arc::new(self.providers.speech_out.clone()),
            event_rx,
            event_tx.clone(),
            broadcast_tx.clone(),
            snapshot_tx,
        );

        let task = tokio::spawn(runtime.run());

        self.sessions.write().await.insert(
            session_id.clone(),
            SessionHandle {
                event_tx,
                broadcast_tx,
                snapshot_rx,
                audio_feeder,
                task,
                last_active_ms: AtomicU64::new(self.elapsed_ms()),
            },
        );

        let active = self.session_count().await;
        tracing::info!(session_id = %session_id, active, "Session created");
        session_id
    }

    /// Send an event to a session
    pub async fn send_event(&self, session_id: &str, event: Event) -> Result<(), SessionError> {
        let event_tx = {
            let sessions = self.sessions.read().await;
            let handle = sessions
                .get(session_id)
                .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;
            self.touch(handle);
            handle.event_tx.clone()
        };
        event_tx.send(event).await.map_err(|_| SessionError::Closed)
    }

    /// Submit a typed command. Rejected up front when the session is busy;
    /// the runtime enforces the same rule for races.
    pub async fn submit_text(&self, session_id: &str, text: &str) -> Result<(), SessionError> {
        if text.trim().is_empty() {
            return Err(SessionError::EmptyCommand);
        }
        self.ensure_idle(session_id).await?;
        self.send_event(
            session_id,
            Event::SubmitText {
                text: text.to_string(),
            },
        )
        .await
    }

    /// Start a voice command. Opens a fresh capture window so uploads from
    /// earlier commands can never be taken for this one.
    pub async fn start_voice(&self, session_id: &str) -> Result<(), SessionError> {
        self.ensure_idle(session_id).await?;
        {
            let sessions = self.sessions.read().await;
            let handle = sessions
                .get(session_id)
                .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;
            handle.audio_feeder.open_window();
        }
        self.send_event(session_id, Event::StartVoice).await
    }

    /// Hand recorded audio to the session's microphone
    pub async fn deliver_audio(&self, session_id: &str, clip: AudioClip) -> Result<(), SessionError> {
        let sessions = self.sessions.read().await;
        let handle = sessions
            .get(session_id)
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;
        self.touch(handle);
        if handle.snapshot_rx.borrow().phase != Phase::Listening {
            return Err(SessionError::NotListening);
        }
        // The window closes once the capture has its clip, while transcription
        // is still running
        handle.audio_feeder.deliver(clip).map_err(|e| match e {
            FeedError::WindowClosed => SessionError::NotListening,
            other => SessionError::AudioRejected(other.to_string()),
        })
    }

    /// Subscribe to session updates
    pub async fn subscribe(
        &self,
        session_id: &str,
    ) -> Result<(SessionSnapshot, broadcast::Receiver<SessionEvent>), SessionError> {
        let sessions = self.sessions.read().await;
        let handle = sessions
            .get(session_id)
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;
        self.touch(handle);
        // Subscribe before reading the snapshot so no change falls in between
        let rx = handle.broadcast_tx.subscribe();
        let snapshot = handle.snapshot_rx.borrow().clone();
        Ok((snapshot, rx))
    }

    /// Current snapshot of a session
    pub async fn snapshot(&self, session_id: &str) -> Result<SessionSnapshot, SessionError> {
        let sessions = self.sessions.read().await;
        sessions
            .get(session_id)
            .map(|h| {
                self.touch(h);
                h.snapshot_rx.borrow().clone()
            })
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))
    }

    /// Stop a session and discard its state
    pub async fn end_session(&self, session_id: &str) -> Result<(), SessionError> {
        let handle = self
            .sessions
            .write()
            .await
            .remove(session_id)
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;
        // The runtime holds its own sender, so the queue never closes by itself
        handle.task.abort();
        tracing::info!(session_id = %session_id, "Session ended");
        Ok(())
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Spawn the task that ends abandoned sessions. Returns `None` when
    /// expiry is disabled. The task stops once the manager is dropped.
    pub fn spawn_reaper(self: &Arc<Self>) -> Option<tokio::task::JoinHandle<()>> {
        let idle = self.defaults.idle_expiry?;
        let manager = Arc::downgrade(self);
        let period = (idle / 4).max(Duration::from_secs(1));

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                let ended = manager.reap_idle(idle).await;
                if ended > 0 {
                    let remaining = manager.session_count().await;
                    tracing::debug!(ended, remaining, "Reaper pass");
                }
            }
        }))
    }

    /// End every idle session with no observers and no request for `idle`
    pub async fn reap_idle(&self, idle: Duration) -> usize {
        let now = self.elapsed_ms();
        let limit = u64::try_from(idle.as_millis()).unwrap_or(u64::MAX);

        let expired: Vec<String> = {
            let sessions = self.sessions.read().await;
            sessions
                .iter()
                .filter(|(_, handle)| {
                    let quiet_ms = now.saturating_sub(handle.last_active_ms.load(Ordering::Relaxed));
                    quiet_ms >= limit
                        && handle.broadcast_tx.receiver_count() == 0
                        && !handle.snapshot_rx.borrow().phase.is_busy()
                })
                .map(|(id, _)| id.clone())
                .collect()
        };

        let mut ended = 0;
        for session_id in &expired {
            if self.end_session(session_id).await.is_ok() {
                tracing::info!(session_id = %session_id, idle_ms = limit, "Expired idle session");
                ended += 1;
            }
        }
        ended
    }

    fn touch(&self, handle: &SessionHandle) {
        handle
            .last_active_ms
            .store(self.elapsed_ms(), Ordering::Relaxed);
    }

    fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    async fn ensure_idle(&self, session_id: &str) -> Result<(), SessionError> {
        let phase = self.snapshot(session_id).await?.phase;
        if phase.is_busy() {
            return Err(SessionError::Busy(phase));
        }
        Ok(())
    }
}
