//! Microphone access
//!
//! A microphone is an exclusive device: one capture holds it at a time and
//! releases it when the capture returns, whatever the outcome.

use super::{AudioClip, SpeechError};
use crate::state_machine::CaptureLimits;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};

/// Source of recorded audio
#[async_trait]
pub trait Microphone: Send + Sync {
    /// Record one phrase within `limits`
    async fn record(&self, limits: CaptureLimits) -> Result<AudioClip, SpeechError>;
}

#[async_trait]
impl<T: Microphone + ?Sized> Microphone for Arc<T> {
    async fn record(&self, limits: CaptureLimits) -> Result<AudioClip, SpeechError> {
        (**self).record(limits).await
    }
}

/// Clips waiting to be picked up. Uploads beyond this are refused.
const FEED_CAPACITY: usize = 4;

/// Why an upload was refused
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FeedError {
    #[error("no capture is waiting for audio")]
    WindowClosed,
    #[error("too many pending uploads")]
    Full,
    #[error("microphone closed")]
    Disconnected,
}

/// Microphone whose audio is recorded elsewhere (typically the browser) and
/// uploaded through an [`AudioFeeder`].
///
/// Uploads are stamped with the capture window they were made in. An even
/// generation accepts uploads for the upcoming capture; the capture closes it
/// (odd) on every exit, so a clip never outlives the window it was meant for.
pub struct RemoteMicrophone {
    feed_tx: mpsc::Sender<(u64, AudioClip)>,
    /// Held for the whole capture; doubles as the device lock
    feed_rx: Arc<Mutex<mpsc::Receiver<(u64, AudioClip)>>>,
    generation: Arc<AtomicU64>,
}

/// Upload side of a [`RemoteMicrophone`]
#[derive(Clone)]
pub struct AudioFeeder {
    feed_tx: mpsc::Sender<(u64, AudioClip)>,
    generation: Arc<AtomicU64>,
}

impl RemoteMicrophone {
    pub fn new() -> Self {
        let (feed_tx, feed_rx) = mpsc::channel(FEED_CAPACITY);
        Self {
            feed_tx,
            feed_rx: Arc::new(Mutex::new(feed_rx)),
            // Closed until the first voice command opens a window
            generation: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn feeder(&self) -> AudioFeeder {
        AudioFeeder {
            feed_tx: self.feed_tx.clone(),
            generation: self.generation.clone(),
        }
    }
}

impl Default for RemoteMicrophone {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Microphone for RemoteMicrophone {
    async fn record(&self, limits: CaptureLimits) -> Result<AudioClip, SpeechError> {
        let mut feed = self
            .feed_rx
            .try_lock()
            .map_err(|_| SpeechError::MicrophoneUnavailable("capture already in progress".to_string()))?;
        let window = self.generation.load(Ordering::SeqCst);

        // Speech must start within `timeout` and may run up to `phrase_limit`
        // before the client finishes the upload.
        let deadline = limits.timeout + limits.phrase_limit;
        let mut stale = 0usize;
        let received = tokio::time::timeout(deadline, async {
            while let Some((generation, clip)) = feed.recv().await {
                if generation == window {
                    return Some(clip);
                }
                stale += 1;
            }
            None
        })
        .await;

        // Later uploads belong to nobody; the next voice command opens a new window
        let _ = self.generation.compare_exchange(
            window,
            window | 1,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        while feed.try_recv().is_ok() {
            stale += 1;
        }
        if stale > 0 {
            tracing::debug!(count = stale, "Discarded stale audio clips");
        }

        let clip = match received {
            Err(_) => return Err(SpeechError::Timeout(deadline)),
            Ok(None) => {
                return Err(SpeechError::MicrophoneUnavailable(
                    "audio source disconnected".to_string(),
                ))
            }
            Ok(Some(clip)) => clip,
        };

        if clip.is_empty() {
            return Err(SpeechError::Timeout(limits.timeout));
        }
        if let Some(duration) = clip.duration {
            if duration > limits.phrase_limit {
                return Err(SpeechError::Service(format!(
                    "recording of {} ms exceeds the {} ms phrase limit",
                    duration.as_millis(),
                    limits.phrase_limit.as_millis()
                )));
            }
        }

        tracing::debug!(bytes = clip.len(), media_type = %clip.media_type, "Captured audio");
        Ok(clip)
    }
}

impl AudioFeeder {
    /// Start a new capture window. Clips from earlier windows are ignored.
    pub fn open_window(&self) {
        let _ = self
            .generation
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |g| {
                Some(if g % 2 == 0 { g + 2 } else { g + 1 })
            });
    }

    /// Hand a recorded clip to the microphone
    pub fn deliver(&self, clip: AudioClip) -> Result<(), FeedError> {
        let generation = self.generation.load(Ordering::SeqCst);
        if generation % 2 == 1 {
            return Err(FeedError::WindowClosed);
        }
        self.feed_tx.try_send((generation, clip)).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => FeedError::Full,
            mpsc::error::TrySendError::Closed(_) => FeedError::Disconnected,
        })
    }
}
