//! Google Cloud Speech-to-Text (synchronous `speech:recognize`)

use super::{AudioClip, SpeechError, Transcriber};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://speech.googleapis.com/v1";

/// Transcriber backed by Google Cloud Speech-to-Text
pub struct GoogleSpeechTranscriber {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GoogleSpeechTranscriber {
    pub fn new(api_key: String, base_url: Option<&str>) -> Result<Self, SpeechError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| SpeechError::Service(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
        })
    }

    fn build_request(clip: &AudioClip, language: &str) -> RecognizeRequest {
        // WAV and FLAC carry their own header; Opus containers need the rate spelled out
        let (encoding, sample_rate_hertz) = match clip.media_type.as_str() {
            "audio/webm" | "audio/webm;codecs=opus" => (Some("WEBM_OPUS"), Some(48_000)),
            "audio/ogg" | "audio/ogg;codecs=opus" => (Some("OGG_OPUS"), Some(48_000)),
            _ => (None, None),
        };

        RecognizeRequest {
            config: RecognitionConfig {
                language_code: language.to_string(),
                encoding,
                sample_rate_hertz,
                max_alternatives: 1,
            },
            audio: RecognitionAudio {
                content: clip.to_base64(),
            },
        }
    }

    /// Pick the best transcript out of a recognize response
    fn best_transcript(resp: RecognizeResponse) -> Result<String, SpeechError> {
        let transcript = resp
            .results
            .into_iter()
            .filter_map(|r| r.alternatives.into_iter().next())
            .map(|a| a.transcript.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        let transcript = transcript.trim();
        if transcript.is_empty() {
            return Err(SpeechError::Unintelligible);
        }
        Ok(transcript.to_string())
    }
}

#[async_trait]
impl Transcriber for GoogleSpeechTranscriber {
    async fn transcribe(&self, clip: &AudioClip, language: &str) -> Result<String, SpeechError> {
        let request = Self::build_request(clip, language);
        let url = format!("{}/speech:recognize", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| SpeechError::Service(format!("Request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SpeechError::Service(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            let message = serde_json::from_str::<GoogleErrorResponse>(&body)
                .map_or(body, |e| e.error.message);
            return Err(SpeechError::Service(format!("HTTP {status}: {message}")));
        }

        let parsed: RecognizeResponse = serde_json::from_str(&body)
            .map_err(|e| SpeechError::Service(format!("Failed to parse response: {e}")))?;

        Self::best_transcript(parsed)
    }
}

// Speech API types

#[derive(Debug, Serialize)]
struct RecognizeRequest {
    config: RecognitionConfig,
    audio: RecognitionAudio,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RecognitionConfig {
    language_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    encoding: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sample_rate_hertz: Option<u32>,
    max_alternatives: u32,
}

#[derive(Debug, Serialize)]
struct RecognitionAudio {
    content: String,
}

#[derive(Debug, Default, Deserialize)]
struct RecognizeResponse {
    #[serde(default)]
    results: Vec<RecognitionResult>,
}

#[derive(Debug, Deserialize)]
struct RecognitionResult {
    #[serde(default)]
    alternatives: Vec<RecognitionAlternative>,
}

#[derive(Debug, Deserialize)]
struct RecognitionAlternative {
    #[serde(default)]
    transcript: String,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorResponse {
    error: GoogleError,
}

#[derive(Debug, Deserialize)]
struct GoogleError {
    message: String,
}
