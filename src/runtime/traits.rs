//! Trait abstractions for runtime I/O
//!
//! These traits enable testing the executor with mock implementations.

use crate::llm::{LlmError, LlmMessage, LlmRequest, LlmService};
use crate::speech::{AudioClip, Microphone, SpeechError, SynthesisError, Synthesizer, Transcriber};
use crate::state_machine::{CaptureLimits, Role, Turn};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;

/// Produces the assistant's reply to a user utterance
#[async_trait]
pub trait ResponseProvider: Send + Sync {
    /// Reply to `text` given the turns that came before it
    async fn respond(&self, history: &[Turn], text: &str) -> Result<String, LlmError>;

    /// Model answering the requests, for logs
    fn model_id(&self) -> &str;
}

/// Captures one spoken phrase and returns its transcript
#[async_trait]
pub trait SpeechToText: Send + Sync {
    async fn capture_and_transcribe(&self, limits: CaptureLimits) -> Result<String, SpeechError>;
}

/// Renders reply text as playable audio
#[async_trait]
pub trait TextToSpeech: Send + Sync {
    async fn synthesize(&self, text: &str, language: &str) -> Result<AudioClip, SynthesisError>;
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: ResponseProvider + ?Sized> ResponseProvider for Arc<T> {
    async fn respond(&self, history: &[Turn], text: &str) -> Result<String, LlmError> {
        (**self).respond(history, text).await
    }

    fn model_id(&self) -> &str {
        (**self).model_id()
    }
}

#[async_trait]
impl<T: SpeechToText + ?Sized> SpeechToText for Arc<T> {
    async fn capture_and_transcribe(&self, limits: CaptureLimits) -> Result<String, SpeechError> {
        (**self).capture_and_transcribe(limits).await
    }
}

#[async_trait]
impl<T: TextToSpeech + ?Sized> TextToSpeech for Arc<T> {
    async fn synthesize(&self, text: &str, language: &str) -> Result<AudioClip, SynthesisError> {
        (**self).synthesize(text, language).await
    }
}

// ============================================================================
// Production Adapters
// ============================================================================

/// Longest reply requested from the model. Replies are spoken, so short.
const MAX_REPLY_TOKENS: u32 = 1024;

/// Adapter to use an `LlmService` as a `ResponseProvider`
pub struct LlmResponder {
    llm: Arc<dyn LlmService>,
    system_prompt: String,
}

impl LlmResponder {
    pub fn new(llm: Arc<dyn LlmService>, system_prompt: impl Into<String>) -> Self {
        Self {
            llm,
            system_prompt: system_prompt.into(),
        }
    }

    fn build_request(&self, history: &[Turn], text: &str) -> LlmRequest {
        let mut messages: Vec<LlmMessage> = history
            .iter()
            .map(|turn| match turn.role {
                Role::User => LlmMessage::user(turn.text.clone()),
                Role::Assistant => LlmMessage::assistant(turn.text.clone()),
            })
            .collect();
        messages.push(LlmMessage::user(text));

        LlmRequest {
            system: Some(self.system_prompt.clone()),
            messages,
            max_tokens: Some(MAX_REPLY_TOKENS),
        }
    }
}

#[async_trait]
impl ResponseProvider for LlmResponder {
    async fn respond(&self, history: &[Turn], text: &str) -> Result<String, LlmError> {
        let request = self.build_request(history, text);
        let response = self.llm.complete(&request).await?;
        Ok(response.text().trim().to_string())
    }

    fn model_id(&self) -> &str {
        self.llm.model_id()
    }
}

/// Adapter pairing a microphone with a transcription service
pub struct MicrophoneSpeechInput<M, T> {
    microphone: M,
    transcriber: T,
    language: String,
}

impl<M: Microphone, T: Transcriber> MicrophoneSpeechInput<M, T> {
    pub fn new(microphone: M, transcriber: T, language: impl Into<String>) -> Self {
        Self {
            microphone,
            transcriber,
            language: language.into(),
        }
    }
}

#[async_trait]
impl<M: Microphone, T: Transcriber> SpeechToText for MicrophoneSpeechInput<M, T> {
    async fn capture_and_transcribe(&self, limits: CaptureLimits) -> Result<String, SpeechError> {
        // The microphone is released when `record` returns, before transcription
        let clip = self.microphone.record(limits).await?;
        let start = Instant::now();
        let result = self.transcriber.transcribe(&clip, &self.language).await;
        match &result {
            Ok(text) => tracing::info!(
                duration_ms = %start.elapsed().as_millis(),
                chars = text.chars().count(),
                "Transcription completed"
            ),
            Err(e) => tracing::warn!(
                duration_ms = %start.elapsed().as_millis(),
                error = %e,
                "Transcription failed"
            ),
        }
        result
    }
}

/// Adapter to use a `Synthesizer` as `TextToSpeech`
pub struct SpeechOutput {
    synthesizer: Arc<dyn Synthesizer>,
}

impl SpeechOutput {
    pub fn new(synthesizer: Arc<dyn Synthesizer>) -> Self {
        Self { synthesizer }
    }
}

#[async_trait]
impl TextToSpeech for SpeechOutput {
    async fn synthesize(&self, text: &str, language: &str) -> Result<AudioClip, SynthesisError> {
        let start = Instant::now();
        let result = self.synthesizer.synthesize(text, language).await;
        match &result {
            Ok(audio) => tracing::info!(
                duration_ms = %start.elapsed().as_millis(),
                bytes = audio.len(),
                language,
                "Speech synthesized"
            ),
            Err(e) => tracing::error!(
                duration_ms = %start.elapsed().as_millis(),
                error = %e,
                "Speech synthesis failed"
            ),
        }
        result
    }
}
