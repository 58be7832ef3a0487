//! Effects produced by state transitions

use super::state::{CaptureLimits, Notice, Phase, Turn};
use crate::speech::AudioClip;
use std::time::Duration;

/// Effects to be executed after state transition
#[derive(Debug, Clone)]
pub enum Effect {
    /// Append a turn to the conversation history
    RecordTurn { turn: Turn },

    /// Acquire the microphone and transcribe one phrase
    CaptureSpeech { limits: CaptureLimits },

    /// Wait `delay`, then ask the response provider for a reply to `utterance`
    RequestResponse { utterance: String, delay: Duration },

    /// Turn the reply into audio
    SynthesizeSpeech { text: String, language: String },

    /// Hand synthesized audio to observers for playback
    DeliverAudio { audio: AudioClip },

    /// Tell observers the phase changed
    NotifyPhase { phase: Phase },

    /// Surface an error message to observers
    NotifyNotice { notice: Notice },
}

impl Effect {
    pub fn record_user(text: impl Into<String>) -> Self {
        Effect::RecordTurn {
            turn: Turn::user(text),
        }
    }

    pub fn record_assistant(text: impl Into<String>) -> Self {
        Effect::RecordTurn {
            turn: Turn::assistant(text),
        }
    }

    pub fn notify_phase(phase: Phase) -> Self {
        Effect::NotifyPhase { phase }
    }
}
