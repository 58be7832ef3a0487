//! Events that can occur in a session

use super::state::ErrorKind;
use crate::speech::AudioClip;

/// Events that trigger state transitions
#[derive(Debug, Clone)]
pub enum Event {
    // User events
    SubmitText {
        text: String,
    },
    StartVoice,

    // Speech capture events
    SpeechCaptured {
        text: String,
    },
    SpeechFailed {
        kind: ErrorKind,
        message: String,
    },

    // Response provider events
    ResponseReceived {
        text: String,
    },
    ResponseFailed {
        kind: ErrorKind,
        message: String,
    },

    // Speech synthesis events
    SpeechSynthesized {
        audio: AudioClip,
    },
    SynthesisFailed {
        message: String,
    },
}

impl Event {
    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            Event::SubmitText { .. } => "submit_text",
            Event::StartVoice => "start_voice",
            Event::SpeechCaptured { .. } => "speech_captured",
            Event::SpeechFailed { .. } => "speech_failed",
            Event::ResponseReceived { .. } => "response_received",
            Event::ResponseFailed { .. } => "response_failed",
            Event::SpeechSynthesized { .. } => "speech_synthesized",
            Event::SynthesisFailed { .. } => "synthesis_failed",
        }
    }
}
