//! Session state types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Reply shown when the response provider cannot be reached
pub const FALLBACK_REPLY: &str =
    "Sorry, I'm having trouble connecting to my brain right now. Please try again.";

/// Message shown when a reply could not be voiced
pub const VOICE_FAILURE_MESSAGE: &str = "Sorry, I couldn't generate voice output.";

// ============================================================================
// Turns
// ============================================================================

/// Who produced a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One recorded utterance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
    pub recorded_at: DateTime<Utc>,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            recorded_at: Utc::now(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
            recorded_at: Utc::now(),
        }
    }
}

/// Append-only record of a session's turns
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConversationHistory {
    turns: Vec<Turn>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a turn. Empty turns are never recorded.
    pub fn push(&mut self, turn: Turn) -> bool {
        if turn.text.trim().is_empty() {
            tracing::warn!(role = turn.role.as_str(), "Refusing to record empty turn");
            return false;
        }
        self.turns.push(turn);
        true
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    #[allow(dead_code)] // API completeness
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

// ============================================================================
// Errors surfaced to the user
// ============================================================================

/// Classification of every failure the session can surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ProviderAuth,
    ProviderNetwork,
    ProviderQuota,
    ProviderOther,
    SpeechTimeout,
    SpeechUnintelligible,
    SpeechService,
    Synthesis,
    MicrophoneUnavailable,
}

impl ErrorKind {
    /// Short message suitable for display
    pub fn user_message(self) -> &'static str {
        match self {
            ErrorKind::ProviderAuth => "I couldn't sign in to my language service.",
            ErrorKind::ProviderNetwork => "I couldn't reach my language service.",
            ErrorKind::ProviderQuota => "My language service is over its quota right now.",
            ErrorKind::ProviderOther => "My language service returned an error.",
            ErrorKind::SpeechTimeout => "No speech detected. Please try again.",
            ErrorKind::SpeechUnintelligible => "Sorry, I couldn't understand what you said.",
            ErrorKind::SpeechService => "The speech recognition service failed.",
            ErrorKind::Synthesis => VOICE_FAILURE_MESSAGE,
            ErrorKind::MicrophoneUnavailable => "The microphone is not available.",
        }
    }
}

/// A user-facing message produced by an error path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub kind: ErrorKind,
    pub message: String,
    /// Provider-side detail, kept for logs and debugging panes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl Notice {
    pub fn new(kind: ErrorKind, detail: Option<String>) -> Self {
        Self {
            kind,
            message: kind.user_message().to_string(),
            detail: detail.filter(|d| !d.is_empty()),
        }
    }
}

// ============================================================================
// Phase and session state
// ============================================================================

/// Stage of the current interaction cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Ready for a new command
    #[default]
    Idle,
    /// Microphone held, waiting for speech
    Listening,
    /// Command accepted, waiting on the response provider
    Thinking,
    /// Reply received, waiting on speech synthesis
    Speaking,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Listening => "listening",
            Phase::Thinking => "thinking",
            Phase::Speaking => "speaking",
        }
    }

    pub fn is_busy(self) -> bool {
        self != Phase::Idle
    }
}

/// Everything the state machine owns apart from the history
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionState {
    pub phase: Phase,
    /// User text awaiting a response
    pub pending_utterance: Option<String>,
    /// Latest assistant text; empty before the first reply
    pub last_reply: String,
    /// Message from the most recent error path
    pub notice: Option<Notice>,
}

impl SessionState {
    pub fn idle() -> Self {
        Self::default()
    }
}

// ============================================================================
// Context
// ============================================================================

/// Limits for one voice capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CaptureLimits {
    /// How long to wait for speech to start
    #[serde(rename = "timeout_ms", serialize_with = "as_millis")]
    pub timeout: Duration,
    /// Longest phrase accepted once speech starts
    #[serde(rename = "phrase_limit_ms", serialize_with = "as_millis")]
    pub phrase_limit: Duration,
}

impl Default for CaptureLimits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            phrase_limit: Duration::from_secs(10),
        }
    }
}

#[allow(clippy::trivially_copy_pass_by_ref)] // serde's serialize_with signature
fn as_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

/// Per-session configuration (immutable)
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub session_id: String,
    /// Pause between accepting a command and calling the response provider
    pub thinking_delay: Duration,
    pub capture: CaptureLimits,
    /// Language code handed to speech synthesis
    pub language: String,
}

impl SessionContext {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            thinking_delay: Duration::from_secs(5),
            capture: CaptureLimits::default(),
            language: "en".to_string(),
        }
    }

    pub fn with_thinking_delay(mut self, delay: Duration) -> Self {
        self.thinking_delay = delay;
        self
    }

    pub fn with_capture(mut self, capture: CaptureLimits) -> Self {
        self.capture = capture;
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }
}
