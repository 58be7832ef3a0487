//! Pure state transition function
//!
//! Given the same state, context and event this always produces the same new
//! state and effects. All I/O is described by the returned effects and carried
//! out by the runtime.

use super::state::{ErrorKind, Notice, Phase, SessionContext, SessionState, FALLBACK_REPLY};
use super::{Effect, Event};
use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: SessionState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: SessionState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

/// Reasons an event is rejected. A rejected event leaves the session untouched.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Aria is busy ({}), wait for the current exchange to finish", .0.as_str())]
    Busy(Phase),
    #[error("Command is empty")]
    EmptyCommand,
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

/// Pure transition function
pub fn transition(
    state: &SessionState,
    context: &SessionContext,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    match (state.phase, event) {
        // ============================================================
        // Commands
        // ============================================================

        // Idle + SubmitText -> Thinking (typed commands skip listening)
        (Phase::Idle, Event::SubmitText { text }) => {
            let text = text.trim();
            if text.is_empty() {
                return Err(TransitionError::EmptyCommand);
            }
            Ok(accept_utterance(state, context, text))
        }

        // Idle + StartVoice -> Listening
        (Phase::Idle, Event::StartVoice) => {
            let new_state = SessionState {
                phase: Phase::Listening,
                pending_utterance: None,
                last_reply: state.last_reply.clone(),
                notice: None,
            };
            Ok(TransitionResult::new(new_state)
                .with_effect(Effect::notify_phase(Phase::Listening))
                .with_effect(Effect::CaptureSpeech {
                    limits: context.capture,
                }))
        }

        // One cycle at a time
        (phase, Event::SubmitText { .. } | Event::StartVoice) => Err(TransitionError::Busy(phase)),

        // ============================================================
        // Speech capture
        // ============================================================
        (Phase::Listening, Event::SpeechCaptured { text }) => {
            let text = text.trim();
            if text.is_empty() {
                return Ok(fail_to_idle(state, ErrorKind::SpeechUnintelligible, None));
            }
            Ok(accept_utterance(state, context, text))
        }

        (Phase::Listening, Event::SpeechFailed { kind, message }) => {
            Ok(fail_to_idle(state, kind, Some(message)))
        }

        // ============================================================
        // Response provider
        // ============================================================
        (Phase::Thinking, Event::ResponseReceived { text }) => {
            let text = text.trim();
            if text.is_empty() {
                return Ok(provider_failure(
                    state,
                    ErrorKind::ProviderOther,
                    "Provider returned an empty reply".to_string(),
                ));
            }
            let new_state = SessionState {
                phase: Phase::Speaking,
                pending_utterance: None,
                last_reply: text.to_string(),
                notice: None,
            };
            Ok(TransitionResult::new(new_state)
                .with_effect(Effect::record_assistant(text))
                .with_effect(Effect::notify_phase(Phase::Speaking))
                .with_effect(Effect::SynthesizeSpeech {
                    text: text.to_string(),
                    language: context.language.clone(),
                }))
        }

        (Phase::Thinking, Event::ResponseFailed { kind, message }) => {
            Ok(provider_failure(state, kind, message))
        }

        // ============================================================
        // Speech synthesis
        // ============================================================
        (Phase::Speaking, Event::SpeechSynthesized { audio }) => {
            let new_state = SessionState {
                phase: Phase::Idle,
                ..state.clone()
            };
            Ok(TransitionResult::new(new_state)
                .with_effect(Effect::DeliverAudio { audio })
                .with_effect(Effect::notify_phase(Phase::Idle)))
        }

        // Synthesis failure still ends the cycle; the text reply stays visible
        (Phase::Speaking, Event::SynthesisFailed { message }) => {
            Ok(fail_to_idle(state, ErrorKind::Synthesis, Some(message)))
        }

        // ============================================================
        // Invalid Transitions
        // ============================================================
        (phase, event) => Err(TransitionError::InvalidTransition(format!(
            "No transition from {} with event {}",
            phase.as_str(),
            event.name()
        ))),
    }
}

/// Record a user utterance and start thinking about it
fn accept_utterance(state: &SessionState, context: &SessionContext, text: &str) -> TransitionResult {
    let new_state = SessionState {
        phase: Phase::Thinking,
        pending_utterance: Some(text.to_string()),
        last_reply: state.last_reply.clone(),
        notice: None,
    };
    TransitionResult::new(new_state)
        .with_effect(Effect::record_user(text))
        .with_effect(Effect::notify_phase(Phase::Thinking))
        .with_effect(Effect::RequestResponse {
            utterance: text.to_string(),
            delay: context.thinking_delay,
        })
}

/// Provider failures replace the reply with the fallback apology
fn provider_failure(state: &SessionState, kind: ErrorKind, message: String) -> TransitionResult {
    let mut result = fail_to_idle(state, kind, Some(message));
    result.new_state.last_reply = FALLBACK_REPLY.to_string();
    result
}

fn fail_to_idle(state: &SessionState, kind: ErrorKind, detail: Option<String>) -> TransitionResult {
    let notice = Notice::new(kind, detail);
    let new_state = SessionState {
        phase: Phase::Idle,
        pending_utterance: None,
        last_reply: state.last_reply.clone(),
        notice: Some(notice.clone()),
    };
    TransitionResult::new(new_state)
        .with_effect(Effect::notify_phase(Phase::Idle))
        .with_effect(Effect::NotifyNotice { notice })
}
