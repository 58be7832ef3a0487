//! Mock implementations for testing
//!
//! These mocks enable integration testing without real I/O.

use super::traits::*;
use crate::llm::LlmError;
use crate::speech::{AudioClip, SpeechError, SynthesisError, Transcriber};
use crate::state_machine::{CaptureLimits, Turn};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

// ============================================================================
// Mock Response Provider
// ============================================================================

/// Mock responder that returns queued replies
pub struct MockResponder {
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    /// Record of all requests made: (prior turns, new text)
    pub requests: Mutex<Vec<(Vec<Turn>, String)>>,
}

impl MockResponder {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a successful reply
    pub fn queue_reply(&self, text: impl Into<String>) {
        self.replies.lock().unwrap().push_back(Ok(text.into()));
    }

    /// Queue a failure
    pub fn queue_error(&self, error: LlmError) {
        self.replies.lock().unwrap().push_back(Err(error));
    }

    /// Get recorded requests
    pub fn recorded_requests(&self) -> Vec<(Vec<Turn>, String)> {
        self.requests.lock().unwrap().clone()
    }
}

impl Default for MockResponder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResponseProvider for MockResponder {
    async fn respond(&self, history: &[Turn], text: &str) -> Result<String, LlmError> {
        self.requests
            .lock()
            .unwrap()
            .push((history.to_vec(), text.to_string()));
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::network("No mock reply queued")))
    }

    fn model_id(&self) -> &str {
        "mock-model"
    }
}

// ============================================================================
// Mock Speech Input
// ============================================================================

/// Mock speech input returning queued transcripts. With a gate, each capture
/// blocks until the test releases it.
pub struct MockSpeechToText {
    results: Mutex<VecDeque<Result<String, SpeechError>>>,
    gate: Option<Arc<Notify>>,
    /// Limits passed to each capture
    pub captures: Mutex<Vec<CaptureLimits>>,
}

impl MockSpeechToText {
    pub fn new() -> Self {
        Self {
            results: Mutex::new(VecDeque::new()),
            gate: None,
            captures: Mutex::new(Vec::new()),
        }
    }

    /// Captures wait on `gate` before returning
    pub fn blocking(gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new()
        }
    }

    pub fn queue_transcript(&self, text: impl Into<String>) {
        self.results.lock().unwrap().push_back(Ok(text.into()));
    }

    pub fn queue_error(&self, error: SpeechError) {
        self.results.lock().unwrap().push_back(Err(error));
    }
}

impl Default for MockSpeechToText {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SpeechToText for MockSpeechToText {
    async fn capture_and_transcribe(&self, limits: CaptureLimits) -> Result<String, SpeechError> {
        self.captures.lock().unwrap().push(limits);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(SpeechError::Timeout(limits.timeout + limits.phrase_limit)))
    }
}

// ============================================================================
// Mock Speech Output
// ============================================================================

/// Mock synthesizer; succeeds with a tiny clip unless a failure is queued
pub struct MockTextToSpeech {
    failures: Mutex<VecDeque<SynthesisError>>,
    /// Texts synthesized, with their language
    pub requests: Mutex<Vec<(String, String)>>,
}

impl MockTextToSpeech {
    pub fn new() -> Self {
        Self {
            failures: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn queue_failure(&self, message: &str) {
        self.failures
            .lock()
            .unwrap()
            .push_back(SynthesisError::new(message));
    }
}

impl Default for MockTextToSpeech {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TextToSpeech for MockTextToSpeech {
    async fn synthesize(&self, text: &str, language: &str) -> Result<AudioClip, SynthesisError> {
        self.requests
            .lock()
            .unwrap()
            .push((text.to_string(), language.to_string()));
        match self.failures.lock().unwrap().pop_front() {
            Some(err) => Err(err),
            None => Ok(AudioClip::new(b"ID3mock".to_vec(), "audio/mpeg")),
        }
    }
}

/// Mock transcriber that reports the clip size it was given
pub struct MockTranscriber {
    pub transcript: String,
}

#[async_trait]
impl Transcriber for MockTranscriber {
    async fn transcribe(&self, clip: &AudioClip, _language: &str) -> Result<String, SpeechError> {
        if clip.is_empty() {
            return Err(SpeechError::Unintelligible);
        }
        Ok(self.transcript.clone())
    }
}

// ============================================================================
// Test Runtime Builder
// ============================================================================

use crate::runtime::{SessionEvent, SessionRuntime, SessionSnapshot};
use crate::state_machine::{Event, Phase, SessionContext};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};

/// Helper for building test runtimes with minimal boilerplate
pub struct TestRuntime {
    pub event_tx: mpsc::Sender<Event>,
    pub broadcast_rx: broadcast::Receiver<SessionEvent>,
    pub snapshot_rx: watch::Receiver<SessionSnapshot>,
    pub responder: Arc<MockResponder>,
    pub speech_in: Arc<MockSpeechToText>,
    pub speech_out: Arc<MockTextToSpeech>,
    _runtime_handle: tokio::task::JoinHandle<()>,
}

pub struct TestRuntimeBuilder {
    context: SessionContext,
    responder: Option<MockResponder>,
    speech_in: Option<MockSpeechToText>,
    speech_out: Option<MockTextToSpeech>,
}

impl TestRuntimeBuilder {
    pub fn new() -> Self {
        Self {
            context: SessionContext::new("test-session").with_thinking_delay(Duration::ZERO),
            responder: None,
            speech_in: None,
            speech_out: None,
        }
    }

    pub fn responder(mut self, responder: MockResponder) -> Self {
        self.responder = Some(responder);
        self
    }

    pub fn speech_in(mut self, speech_in: MockSpeechToText) -> Self {
        self.speech_in = Some(speech_in);
        self
    }

    pub fn speech_out(mut self, speech_out: MockTextToSpeech) -> Self {
        self.speech_out = Some(speech_out);
        self
    }

    pub fn thinking_delay(mut self, delay: Duration) -> Self {
        self.context = self.context.with_thinking_delay(delay);
        self
    }

    pub fn build(self) -> TestRuntime {
        let responder = Arc::new(self.responder.unwrap_or_default());
        let speech_in = Arc::new(self.speech_in.unwrap_or_default());
        let speech_out = Arc::new(self.speech_out.unwrap_or_default());

        let (event_tx, event_rx) = mpsc::channel(32);
        let (broadcast_tx, broadcast_rx) = broadcast::channel(128);
        let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot::new(&self.context));

        let runtime = SessionRuntime::new(
            self.context,
            responder.clone(),
            speech_in.clone(),
            speech_out.clone(),
            event_rx,
            event_tx.clone(),
            broadcast_tx,
            snapshot_tx,
        );

        let handle = tokio::spawn(async move {
            runtime.run().await;
        });

        TestRuntime {
            event_tx,
            broadcast_rx,
            snapshot_rx,
            responder,
            speech_in,
            speech_out,
            _runtime_handle: handle,
        }
    }
}

impl Default for TestRuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestRuntime {
    pub fn builder() -> TestRuntimeBuilder {
        TestRuntimeBuilder::new()
    }

    pub async fn submit_text(&self, text: &str) {
        self.event_tx
            .send(Event::SubmitText {
                text: text.to_string(),
            })
            .await
            .expect("Failed to send command");
    }

    pub async fn start_voice(&self) {
        self.event_tx
            .send(Event::StartVoice)
            .await
            .expect("Failed to send voice command");
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Collect events until the session is back in idle, plus anything
    /// published in the same step
    pub async fn run_until_idle(&mut self, timeout: Duration) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match tokio::time::timeout_at(deadline, self.broadcast_rx.recv()).await {
                Ok(Ok(event)) => {
                    let done = matches!(
                        event,
                        SessionEvent::StateChange {
                            phase: Phase::Idle,
                            ..
                        }
                    );
                    events.push(event);
                    if done {
                        break;
                    }
                }
                _ => return events,
            }
        }
        while let Ok(event) = self.broadcast_rx.try_recv() {
            events.push(event);
        }
        events
    }

    /// Wait for a specific phase notification
    pub async fn wait_for_phase(&mut self, expected: Phase, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match tokio::time::timeout_at(deadline, self.broadcast_rx.recv()).await {
                Ok(Ok(SessionEvent::StateChange { phase, .. })) if phase == expected => {
                    return true;
                }
                Ok(Ok(_)) => continue,
                _ => return false,
            }
        }
    }
}

/// Phases announced in `events`, in order
pub fn phases(events: &[SessionEvent]) -> Vec<Phase> {
    events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::StateChange { phase, .. } => Some(*phase),
            _ => None,
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{SessionDefaults, SessionError, SessionManager, SessionProviders};
    use crate::state_machine::state::{FALLBACK_REPLY, VOICE_FAILURE_MESSAGE};
    use crate::state_machine::{ErrorKind, Role};

    const WAIT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_mock_responder() {
        let responder = MockResponder::new();
        responder.queue_reply("Hi!");

        let reply = responder.respond(&[], "Hello").await.unwrap();
        assert_eq!(reply, "Hi!");
        assert_eq!(responder.recorded_requests().len(), 1);

        // Empty queue fails
        assert!(responder.respond(&[], "Again").await.is_err());
    }

    #[tokio::test]
    async fn test_hello_exchange() {
        let responder = MockResponder::new();
        responder.queue_reply("Hello! How can I help?");
        let mut rt = TestRuntime::builder().responder(responder).build();

        rt.submit_text("Hello").await;
        let events = rt.run_until_idle(WAIT).await;

        assert_eq!(
            phases(&events),
            vec![Phase::Thinking, Phase::Speaking, Phase::Idle]
        );
        assert!(events
            .iter()
            .any(|e| matches!(e, SessionEvent::Audio { audio } if !audio.is_empty())));

        let snapshot = rt.snapshot();
        assert_eq!(snapshot.phase, Phase::Idle);
        assert_eq!(snapshot.history.len(), 2);
        assert_eq!(snapshot.history[0].role, Role::User);
        assert_eq!(snapshot.history[0].text, "Hello");
        assert_eq!(snapshot.history[1].role, Role::Assistant);
        assert_eq!(snapshot.history[1].text, "Hello! How can I help?");
        assert_eq!(snapshot.last_reply, "Hello! How can I help?");
        assert!(snapshot.pending_utterance.is_none());
        assert!(snapshot.notice.is_none());

        let spoken = rt.speech_out.requests.lock().unwrap().clone();
        assert_eq!(
            spoken,
            vec![("Hello! How can I help?".to_string(), "en".to_string())]
        );
    }

    #[tokio::test]
    async fn test_capture_timeout() {
        let speech_in = MockSpeechToText::new();
        speech_in.queue_error(SpeechError::Timeout(Duration::from_secs(5)));
        let mut rt = TestRuntime::builder().speech_in(speech_in).build();

        rt.start_voice().await;
        let events = rt.run_until_idle(WAIT).await;

        assert_eq!(phases(&events), vec![Phase::Listening, Phase::Idle]);
        let snapshot = rt.snapshot();
        assert!(snapshot.history.is_empty());
        let notice = snapshot.notice.expect("notice after timeout");
        assert_eq!(notice.kind, ErrorKind::SpeechTimeout);
        assert!(notice.message.contains("No speech detected"));
        assert!(rt.responder.recorded_requests().is_empty());
    }

    #[tokio::test]
    async fn test_listening_announces_capture_limits() {
        let mut rt = TestRuntime::builder().build();
        rt.start_voice().await;
        let events = rt.run_until_idle(WAIT).await;

        let data = events
            .iter()
            .find_map(|e| match e {
                SessionEvent::StateChange {
                    phase: Phase::Listening,
                    data,
                } => Some(data.clone()),
                _ => None,
            })
            .expect("listening notification");
        assert_eq!(data["capture"]["timeout_ms"], 5000);
        assert_eq!(data["capture"]["phrase_limit_ms"], 10000);
        assert_eq!(rt.speech_in.captures.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_voice_exchange() {
        let speech_in = MockSpeechToText::new();
        speech_in.queue_transcript("what's the weather");
        let responder = MockResponder::new();
        responder.queue_reply("Sunny all day.");
        let mut rt = TestRuntime::builder()
            .speech_in(speech_in)
            .responder(responder)
            .build();

        rt.start_voice().await;
        let events = rt.run_until_idle(WAIT).await;

        assert_eq!(
            phases(&events),
            vec![Phase::Listening, Phase::Thinking, Phase::Speaking, Phase::Idle]
        );
        let history = rt.snapshot().history;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].text, "what's the weather");
    }

    #[tokio::test]
    async fn test_unintelligible_speech() {
        let speech_in = MockSpeechToText::new();
        speech_in.queue_transcript("   ");
        let mut rt = TestRuntime::builder().speech_in(speech_in).build();

        rt.start_voice().await;
        rt.run_until_idle(WAIT).await;

        let snapshot = rt.snapshot();
        assert!(snapshot.history.is_empty());
        assert_eq!(
            snapshot.notice.map(|n| n.kind),
            Some(ErrorKind::SpeechUnintelligible)
        );
    }

    #[tokio::test]
    async fn test_provider_network_error() {
        let responder = MockResponder::new();
        responder.queue_error(LlmError::network("connection refused"));
        let mut rt = TestRuntime::builder().responder(responder).build();

        rt.submit_text("Hello").await;
        let events = rt.run_until_idle(WAIT).await;

        assert_eq!(phases(&events), vec![Phase::Thinking, Phase::Idle]);
        let snapshot = rt.snapshot();
        assert_eq!(snapshot.last_reply, FALLBACK_REPLY);
        assert_eq!(snapshot.history.len(), 1);
        assert_eq!(snapshot.history[0].role, Role::User);
        let notice = snapshot.notice.expect("notice after provider error");
        assert_eq!(notice.kind, ErrorKind::ProviderNetwork);
        assert_eq!(notice.detail.as_deref(), Some("connection refused"));
        assert!(rt.speech_out.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_provider_quota_error() {
        let responder = MockResponder::new();
        responder.queue_error(LlmError::rate_limit("quota exhausted"));
        let mut rt = TestRuntime::builder().responder(responder).build();

        rt.submit_text("Hello").await;
        rt.run_until_idle(WAIT).await;

        let snapshot = rt.snapshot();
        assert_eq!(snapshot.last_reply, FALLBACK_REPLY);
        assert_eq!(
            snapshot.notice.map(|n| n.kind),
            Some(ErrorKind::ProviderQuota)
        );
    }

    #[tokio::test]
    async fn test_empty_reply_uses_fallback() {
        let responder = MockResponder::new();
        responder.queue_reply("");
        let mut rt = TestRuntime::builder().responder(responder).build();

        rt.submit_text("Hello").await;
        let events = rt.run_until_idle(WAIT).await;

        assert_eq!(phases(&events), vec![Phase::Thinking, Phase::Idle]);
        let snapshot = rt.snapshot();
        assert_eq!(snapshot.last_reply, FALLBACK_REPLY);
        assert_eq!(snapshot.history.len(), 1);
    }

    #[tokio::test]
    async fn test_synthesis_failure_keeps_reply() {
        let responder = MockResponder::new();
        responder.queue_reply("Here is your answer.");
        let speech_out = MockTextToSpeech::new();
        speech_out.queue_failure("HTTP 503");
        let mut rt = TestRuntime::builder()
            .responder(responder)
            .speech_out(speech_out)
            .build();

        rt.submit_text("Question").await;
        let events = rt.run_until_idle(WAIT).await;

        assert_eq!(
            phases(&events),
            vec![Phase::Thinking, Phase::Speaking, Phase::Idle]
        );
        assert!(!events
            .iter()
            .any(|e| matches!(e, SessionEvent::Audio { .. })));
        let snapshot = rt.snapshot();
        assert_eq!(snapshot.last_reply, "Here is your answer.");
        assert_eq!(snapshot.history.len(), 2);
        let notice = snapshot.notice.expect("notice after synthesis failure");
        assert_eq!(notice.kind, ErrorKind::Synthesis);
        assert_eq!(notice.message, VOICE_FAILURE_MESSAGE);
    }

    #[tokio::test]
    async fn test_prior_history_passed_to_responder() {
        let responder = MockResponder::new();
        responder.queue_reply("Hi there!");
        responder.queue_reply("I'm doing well.");
        let mut rt = TestRuntime::builder().responder(responder).build();

        rt.submit_text("Hello").await;
        rt.run_until_idle(WAIT).await;
        rt.submit_text("How are you?").await;
        rt.run_until_idle(WAIT).await;

        let requests = rt.responder.recorded_requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].0.is_empty());
        assert_eq!(requests[0].1, "Hello");

        let (prior, text) = &requests[1];
        assert_eq!(text, "How are you?");
        let prior_texts: Vec<&str> = prior.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(prior_texts, vec!["Hello", "Hi there!"]);
        assert_eq!(rt.snapshot().history.len(), 4);
    }

    #[tokio::test]
    async fn test_busy_session_ignores_new_commands() {
        let gate = Arc::new(Notify::new());
        let speech_in = MockSpeechToText::blocking(gate.clone());
        speech_in.queue_error(SpeechError::Timeout(Duration::from_secs(5)));
        let mut rt = TestRuntime::builder().speech_in(speech_in).build();

        rt.start_voice().await;
        assert!(rt.wait_for_phase(Phase::Listening, WAIT).await);

        rt.start_voice().await;
        rt.submit_text("Hello").await;

        // Both rejected with an error event, nothing else changes
        let mut errors = 0;
        while errors < 2 {
            match tokio::time::timeout(WAIT, rt.broadcast_rx.recv()).await {
                Ok(Ok(SessionEvent::Error { message })) => {
                    assert!(message.contains("busy"), "{message}");
                    errors += 1;
                }
                Ok(Ok(other)) => panic!("unexpected event while busy: {other:?}"),
                _ => panic!("timed out waiting for rejection"),
            }
        }
        let snapshot = rt.snapshot();
        assert_eq!(snapshot.phase, Phase::Listening);
        assert!(snapshot.history.is_empty());
        assert_eq!(rt.speech_in.captures.lock().unwrap().len(), 1);

        gate.notify_one();
        let events = rt.run_until_idle(WAIT).await;
        assert_eq!(phases(&events), vec![Phase::Idle]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_thinking_delay_precedes_provider_call() {
        let responder = MockResponder::new();
        responder.queue_reply("Done thinking.");
        let mut rt = TestRuntime::builder()
            .responder(responder)
            .thinking_delay(Duration::from_secs(5))
            .build();

        let start = tokio::time::Instant::now();
        rt.submit_text("Hello").await;
        assert!(rt.wait_for_phase(Phase::Thinking, Duration::from_secs(60)).await);

        // Transcript is recorded before the delay, provider not yet called
        assert_eq!(rt.snapshot().history.len(), 1);
        assert!(rt.responder.recorded_requests().is_empty());

        rt.run_until_idle(Duration::from_secs(60)).await;
        assert!(start.elapsed() >= Duration::from_secs(5));
        assert_eq!(rt.responder.recorded_requests().len(), 1);
        assert_eq!(rt.snapshot().last_reply, "Done thinking.");
    }

    // ------------------------------------------------------------------------
    // Session manager
    // ------------------------------------------------------------------------

    fn manager_defaults() -> SessionDefaults {
        SessionDefaults {
            thinking_delay: Duration::ZERO,
            capture: CaptureLimits {
                timeout: Duration::from_secs(2),
                phrase_limit: Duration::from_secs(2),
            },
            language: "en".to_string(),
            idle_expiry: None,
        }
    }

    fn manager_with(
        responder: MockResponder,
        transcriber: Arc<dyn Transcriber>,
        defaults: SessionDefaults,
    ) -> SessionManager {
        let providers = SessionProviders {
            responder: Arc::new(responder),
            transcriber,
            speech_out: Arc::new(MockTextToSpeech::new()),
        };
        SessionManager::new(providers, defaults)
    }

    fn manager(responder: MockResponder, transcript: &str) -> SessionManager {
        let transcriber = Arc::new(MockTranscriber {
            transcript: transcript.to_string(),
        });
        manager_with(responder, transcriber, manager_defaults())
    }

    /// Names each clip by its first byte, after a pause
    struct SlowEchoTranscriber {
        delay: Duration,
    }

    #[async_trait]
    impl Transcriber for SlowEchoTranscriber {
        async fn transcribe(&self, clip: &AudioClip, _language: &str) -> Result<String, SpeechError> {
            tokio::time::sleep(self.delay).await;
            clip.bytes
                .first()
                .map(|b| format!("clip {b}"))
                .ok_or(SpeechError::Unintelligible)
        }
    }

    async fn wait_for(rx: &mut broadcast::Receiver<SessionEvent>, expected: Phase) -> bool {
        loop {
            match tokio::time::timeout(WAIT, rx.recv()).await {
                Ok(Ok(SessionEvent::StateChange { phase, .. })) if phase == expected => {
                    return true;
                }
                Ok(Ok(_)) => continue,
                _ => return false,
            }
        }
    }

    #[tokio::test]
    async fn test_manager_voice_round_trip() {
        let responder = MockResponder::new();
        responder.queue_reply("Good morning!");
        let manager = manager(responder, "good morning aria");

        let id = manager.create_session().await;
        let (snapshot, mut rx) = manager.subscribe(&id).await.unwrap();
        assert_eq!(snapshot.phase, Phase::Idle);

        // Audio is only accepted while listening
        let err = manager
            .deliver_audio(&id, AudioClip::new(vec![1, 2, 3], "audio/webm"))
            .await
            .unwrap_err();
        assert_eq!(err, SessionError::NotListening);

        manager.start_voice(&id).await.unwrap();
        assert!(wait_for(&mut rx, Phase::Listening).await);
        manager
            .deliver_audio(&id, AudioClip::new(vec![1, 2, 3], "audio/webm"))
            .await
            .unwrap();
        assert!(wait_for(&mut rx, Phase::Idle).await);

        let snapshot = manager.snapshot(&id).await.unwrap();
        let texts: Vec<&str> = snapshot.history.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["good morning aria", "Good morning!"]);
    }

    #[tokio::test]
    async fn test_manager_rejections() {
        let manager = manager(MockResponder::new(), "unused");
        let id = manager.create_session().await;

        assert_eq!(
            manager.submit_text(&id, "   ").await,
            Err(SessionError::EmptyCommand)
        );
        assert!(matches!(
            manager.submit_text("missing", "Hello").await,
            Err(SessionError::NotFound(_))
        ));

        let (_, mut rx) = manager.subscribe(&id).await.unwrap();
        manager.start_voice(&id).await.unwrap();
        assert!(wait_for(&mut rx, Phase::Listening).await);
        assert_eq!(
            manager.submit_text(&id, "Hello").await,
            Err(SessionError::Busy(Phase::Listening))
        );
        assert_eq!(
            manager.start_voice(&id).await,
            Err(SessionError::Busy(Phase::Listening))
        );
    }

    #[tokio::test]
    async fn test_manager_end_session() {
        let manager = manager(MockResponder::new(), "unused");
        let id = manager.create_session().await;
        assert_eq!(manager.session_count().await, 1);

        manager.end_session(&id).await.unwrap();
        assert_eq!(manager.session_count().await, 0);
        assert!(matches!(
            manager.snapshot(&id).await,
            Err(SessionError::NotFound(_))
        ));
        assert!(matches!(
            manager.end_session(&id).await,
            Err(SessionError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_audio_during_transcription_is_refused() {
        let responder = MockResponder::new();
        responder.queue_reply("one");
        responder.queue_reply("two");
        let transcriber = Arc::new(SlowEchoTranscriber {
            delay: Duration::from_millis(300),
        });
        let manager = manager_with(responder, transcriber, manager_defaults());

        let id = manager.create_session().await;
        let (_, mut rx) = manager.subscribe(&id).await.unwrap();

        manager.start_voice(&id).await.unwrap();
        assert!(wait_for(&mut rx, Phase::Listening).await);
        manager
            .deliver_audio(&id, AudioClip::new(vec![1], "audio/webm"))
            .await
            .unwrap();

        // Still listening while the first clip is transcribed, but that
        // capture already has its audio
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(manager.snapshot(&id).await.unwrap().phase, Phase::Listening);
        assert_eq!(
            manager
                .deliver_audio(&id, AudioClip::new(vec![2], "audio/webm"))
                .await,
            Err(SessionError::NotListening)
        );
        assert!(wait_for(&mut rx, Phase::Idle).await);

        // The next command only hears its own upload
        manager.start_voice(&id).await.unwrap();
        assert!(wait_for(&mut rx, Phase::Listening).await);
        manager
            .deliver_audio(&id, AudioClip::new(vec![3], "audio/webm"))
            .await
            .unwrap();
        assert!(wait_for(&mut rx, Phase::Idle).await);

        let snapshot = manager.snapshot(&id).await.unwrap();
        let texts: Vec<&str> = snapshot.history.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["clip 1", "one", "clip 3", "two"]);
        assert!(snapshot.notice.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_sessions_expire() {
        let defaults = SessionDefaults {
            idle_expiry: Some(Duration::from_secs(60)),
            ..manager_defaults()
        };
        let transcriber = Arc::new(MockTranscriber {
            transcript: "unused".to_string(),
        });
        let manager = Arc::new(manager_with(MockResponder::new(), transcriber, defaults));

        let abandoned = manager.create_session().await;
        let watched = manager.create_session().await;
        let (_, _stream) = manager.subscribe(&watched).await.unwrap();
        let active = manager.create_session().await;
        let reaper = manager.spawn_reaper().unwrap();

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(manager.session_count().await, 3);

        // A request keeps a session alive
        tokio::time::sleep(Duration::from_secs(15)).await;
        manager.snapshot(&active).await.unwrap();

        tokio::time::sleep(Duration::from_secs(45)).await;
        assert!(matches!(
            manager.snapshot(&abandoned).await,
            Err(SessionError::NotFound(_))
        ));
        assert!(manager.snapshot(&watched).await.is_ok());
        assert!(manager.snapshot(&active).await.is_ok());
        assert_eq!(manager.session_count().await, 2);
        reaper.abort();
    }

    #[tokio::test]
    async fn test_reaper_disabled_without_expiry() {
        let manager = Arc::new(manager(MockResponder::new(), "unused"));
        assert!(manager.spawn_reaper().is_none());

        let id = manager.create_session().await;
        assert_eq!(manager.reap_idle(Duration::ZERO).await, 1);
        assert!(matches!(
            manager.snapshot(&id).await,
            Err(SessionError::NotFound(_))
        ));
    }

    #[test]
    fn test_manager_futures_are_send() {
        fn assert_send<T: Send>(_: &T) {}
        let manager = manager(MockResponder::new(), "unused");
        // Handlers run these on a multi-threaded server
        assert_send(&manager.create_session());
        assert_send(&manager.start_voice("id"));
        assert_send(&manager.reap_idle(Duration::ZERO));
    }
}
