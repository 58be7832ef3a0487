//! Speech input and output
//!
//! Capturing audio from a microphone, turning it into text, and turning
//! reply text back into playable audio. The recognition and synthesis
//! themselves are delegated to external services.

mod capture;
mod error;
mod google_stt;
mod gtts;

pub use capture::{AudioFeeder, FeedError, Microphone, RemoteMicrophone};
pub use error::{SpeechError, SynthesisError};
pub use google_stt::GoogleSpeechTranscriber;
pub use gtts::GoogleTranslateTts;

use async_trait::async_trait;
use base64::Engine;
use std::fmt;
use std::time::Duration;

/// A chunk of encoded audio with its media type
#[derive(Clone, PartialEq, Eq)]
pub struct AudioClip {
    pub bytes: Vec<u8>,
    pub media_type: String,
    /// Length of the recording, when the producer knows it
    pub duration: Option<Duration>,
}

impl AudioClip {
    pub fn new(bytes: Vec<u8>, media_type: impl Into<String>) -> Self {
        Self {
            bytes,
            media_type: media_type.into(),
            duration: None,
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.bytes)
    }
}

impl fmt::Debug for AudioClip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioClip")
            .field("len", &self.bytes.len())
            .field("media_type", &self.media_type)
            .field("duration", &self.duration)
            .finish()
    }
}

/// Speech-to-text service
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Recognize the speech in `clip`
    async fn transcribe(&self, clip: &AudioClip, language: &str) -> Result<String, SpeechError>;
}

/// Text-to-speech service
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Render `text` as audio in the given language
    async fn synthesize(&self, text: &str, language: &str) -> Result<AudioClip, SynthesisError>;
}

#[async_trait]
impl<T: Transcriber + ?Sized> Transcriber for std::sync::Arc<T> {
    async fn transcribe(&self, clip: &AudioClip, language: &str) -> Result<String, SpeechError> {
        (**self).transcribe(clip, language).await
    }
}

#[async_trait]
impl<T: Synthesizer + ?Sized> Synthesizer for std::sync::Arc<T> {
    async fn synthesize(&self, text: &str, language: &str) -> Result<AudioClip, SynthesisError> {
        (**self).synthesize(text, language).await
    }
}

/// Stand-in used when no speech credentials are configured
pub struct UnconfiguredTranscriber {
    reason: String,
}

impl UnconfiguredTranscriber {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Transcriber for UnconfiguredTranscriber {
    async fn transcribe(&self, _clip: &AudioClip, _language: &str) -> Result<String, SpeechError> {
        Err(SpeechError::Service(self.reason.clone()))
    }
}
