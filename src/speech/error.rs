//! Speech error types

use crate::state_machine::ErrorKind;
use std::time::Duration;
use thiserror::Error;

/// Failure while capturing or recognizing speech
#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("No speech detected within {} ms", .0.as_millis())]
    Timeout(Duration),
    #[error("Speech could not be understood")]
    Unintelligible,
    #[error("Speech service error: {0}")]
    Service(String),
    #[error("Microphone unavailable: {0}")]
    MicrophoneUnavailable(String),
}

impl SpeechError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SpeechError::Timeout(_) => ErrorKind::SpeechTimeout,
            SpeechError::Unintelligible => ErrorKind::SpeechUnintelligible,
            SpeechError::Service(_) => ErrorKind::SpeechService,
            SpeechError::MicrophoneUnavailable(_) => ErrorKind::MicrophoneUnavailable,
        }
    }
}

/// Failure while rendering text as audio
#[derive(Debug, Error)]
#[error("{message}")]
pub struct SynthesisError {
    pub message: String,
}

impl SynthesisError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for SynthesisError {
    fn from(e: reqwest::Error) -> Self {
        Self::new(format!("Request failed: {e}"))
    }
}
