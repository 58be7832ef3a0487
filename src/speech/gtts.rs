//! Google Translate text-to-speech
//!
//! The public translate endpoint only accepts short inputs, so longer replies
//! are split on word boundaries and the MP3 segments concatenated.

use super::{AudioClip, Synthesizer, SynthesisError};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://translate.google.com";

/// Longest text accepted per request, in characters
const MAX_CHUNK_CHARS: usize = 100;

/// Synthesizer backed by the Google Translate TTS endpoint
pub struct GoogleTranslateTts {
    client: Client,
    base_url: String,
}

impl GoogleTranslateTts {
    pub fn new(base_url: Option<&str>) -> Result<Self, SynthesisError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| SynthesisError::new(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
        })
    }

    async fn fetch_chunk(
        &self,
        chunk: &str,
        language: &str,
        idx: usize,
        total: usize,
    ) -> Result<Vec<u8>, SynthesisError> {
        let url = format!("{}/translate_tts", self.base_url);
        let idx_param = idx.to_string();
        let total_param = total.to_string();
        let textlen_param = chunk.chars().count().to_string();
        let response = self
            .client
            .get(&url)
            .query(&[
                ("ie", "UTF-8"),
                ("client", "tw-ob"),
                ("tl", language),
                ("q", chunk),
                ("idx", idx_param.as_str()),
                ("total", total_param.as_str()),
                ("textlen", textlen_param.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SynthesisError::new(format!(
                "TTS request failed with HTTP {status} (chunk {} of {total})",
                idx + 1
            )));
        }

        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl Synthesizer for GoogleTranslateTts {
    async fn synthesize(&self, text: &str, language: &str) -> Result<AudioClip, SynthesisError> {
        let chunks = split_for_tts(text, MAX_CHUNK_CHARS);
        if chunks.is_empty() {
            return Err(SynthesisError::new("Nothing to speak"));
        }

        let mut audio = Vec::new();
        for (idx, chunk) in chunks.iter().enumerate() {
            let bytes = self.fetch_chunk(chunk, language, idx, chunks.len()).await?;
            audio.extend_from_slice(&bytes);
        }

        if audio.is_empty() {
            return Err(SynthesisError::new("TTS service returned no audio"));
        }
        Ok(AudioClip::new(audio, "audio/mpeg"))
    }
}

/// Split `text` into pieces of at most `max_chars` characters, breaking on
/// whitespace where possible. Words longer than the limit are hard-split.
fn split_for_tts(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for word in text.split_whitespace() {
        let word_len = word.chars().count();

        if word_len > max_chars {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let chars: Vec<char> = word.chars().collect();
            for piece in chars.chunks(max_chars) {
                chunks.push(piece.iter().collect());
            }
            continue;
        }

        let needed = if current.is_empty() { word_len } else { word_len + 1 };
        if current_len + needed > max_chars {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if !current.is_empty() {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(word);
        current_len += word_len;
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
