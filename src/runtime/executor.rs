//! Session runtime executor

use super::traits::{ResponseProvider, SpeechToText, TextToSpeech};
use super::{SessionEvent, SessionSnapshot};

use crate::llm::LlmErrorKind;
use crate::state_machine::{
    transition, ConversationHistory, Effect, ErrorKind, Event, Phase, Role, SessionContext,
    SessionState, Turn,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, mpsc, watch};

/// Generic session runtime that can work with any response, speech input and
/// speech output implementations
pub struct SessionRuntime<R, S, T>
where
    R: ResponseProvider + 'static,
    S: SpeechToText + 'static,
    T: TextToSpeech + 'static,
{
    context: SessionContext,
    state: SessionState,
    history: ConversationHistory,
    responder: Arc<R>,
    speech_in: Arc<S>,
    speech_out: Arc<T>,
    event_rx: mpsc::Receiver<Event>,
    event_tx: mpsc::Sender<Event>,
    broadcast_tx: broadcast::Sender<SessionEvent>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
}

impl<R, S, T> SessionRuntime<R, S, T>
where
    R: ResponseProvider + 'static,
    S: SpeechToText + 'static,
    T: TextToSpeech + 'static,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        context: SessionContext,
        responder: Arc<R>,
        speech_in: Arc<S>,
        speech_out: Arc<T>,
        event_rx: mpsc::Receiver<Event>,
        event_tx: mpsc::Sender<Event>,
        broadcast_tx: broadcast::Sender<SessionEvent>,
        snapshot_tx: watch::Sender<SessionSnapshot>,
    ) -> Self {
        Self {
            context,
            state: SessionState::idle(),
            history: ConversationHistory::new(),
            responder,
            speech_in,
            speech_out,
            event_rx,
            event_tx,
            broadcast_tx,
            snapshot_tx,
        }
    }

    pub async fn run(mut self) {
        tracing::info!(session_id = %self.context.session_id, "Starting session runtime");
        self.publish_snapshot();

        // Process events in a loop - one at a time, each to completion
        while let Some(event) = self.event_rx.recv().await {
            if let Err(e) = self.process_event(event) {
                tracing::warn!(session_id = %self.context.session_id, error = %e, "Event rejected");
            }
        }

        tracing::info!(session_id = %self.context.session_id, "Session runtime stopped");
    }

    fn process_event(&mut self, event: Event) -> Result<(), String> {
        let event_name = event.name();
        let old_phase = self.state.phase;

        // Pure state transition
        let result = match transition(&self.state, &self.context, event) {
            Ok(r) => r,
            Err(e) => {
                // Rejections are user-facing (e.g., "Aria is busy")
                let _ = self.broadcast_tx.send(SessionEvent::Error {
                    message: e.to_string(),
                });
                return Err(e.to_string());
            }
        };

        self.state = result.new_state;
        tracing::debug!(
            session_id = %self.context.session_id,
            event = event_name,
            from = old_phase.as_str(),
            to = self.state.phase.as_str(),
            effects = result.effects.len(),
            turns = self.history.len(),
            "Transition"
        );

        for effect in result.effects {
            self.execute_effect(effect);
        }

        self.publish_snapshot();
        Ok(())
    }

    /// Execute an effect. Provider calls are spawned and report back as events.
    fn execute_effect(&mut self, effect: Effect) {
        match effect {
            Effect::RecordTurn { turn } => {
                if self.history.push(turn.clone()) {
                    let _ = self.broadcast_tx.send(SessionEvent::Turn { turn });
                }
            }

            Effect::CaptureSpeech { limits } => {
                let speech_in = self.speech_in.clone();
                let event_tx = self.event_tx.clone();
                let session_id = self.context.session_id.clone();

                tokio::spawn(async move {
                    tracing::info!(
                        session_id = %session_id,
                        timeout_ms = %limits.timeout.as_millis(),
                        phrase_limit_ms = %limits.phrase_limit.as_millis(),
                        "Capturing speech"
                    );
                    let event = match speech_in.capture_and_transcribe(limits).await {
                        Ok(text) => Event::SpeechCaptured { text },
                        Err(e) => {
                            tracing::warn!(session_id = %session_id, error = %e, "Speech capture failed");
                            Event::SpeechFailed {
                                kind: e.kind(),
                                message: e.to_string(),
                            }
                        }
                    };
                    let _ = event_tx.send(event).await;
                });
            }

            Effect::RequestResponse { utterance, delay } => {
                let responder = self.responder.clone();
                let event_tx = self.event_tx.clone();
                let session_id = self.context.session_id.clone();
                let prior = prior_turns(self.history.turns(), &utterance).to_vec();

                tokio::spawn(async move {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }

                    tracing::info!(
                        session_id = %session_id,
                        model = responder.model_id(),
                        prior_turns = prior.len(),
                        "Requesting response (background)"
                    );
                    let start = Instant::now();
                    let event = match responder.respond(&prior, &utterance).await {
                        Ok(text) => Event::ResponseReceived { text },
                        Err(e) => {
                            tracing::error!(
                                session_id = %session_id,
                                duration_ms = %start.elapsed().as_millis(),
                                error = %e.message,
                                kind = ?e.kind,
                                "Response provider failed"
                            );
                            Event::ResponseFailed {
                                kind: llm_error_kind_to_session(e.kind),
                                message: e.message,
                            }
                        }
                    };
                    let _ = event_tx.send(event).await;
                });
            }

            Effect::SynthesizeSpeech { text, language } => {
                let speech_out = self.speech_out.clone();
                let event_tx = self.event_tx.clone();

                tokio::spawn(async move {
                    let event = match speech_out.synthesize(&text, &language).await {
                        Ok(audio) => Event::SpeechSynthesized { audio },
                        Err(e) => Event::SynthesisFailed { message: e.message },
                    };
                    let _ = event_tx.send(event).await;
                });
            }

            Effect::DeliverAudio { audio } => {
                let _ = self.broadcast_tx.send(SessionEvent::Audio { audio });
            }

            Effect::NotifyPhase { phase } => {
                // Observers reading the snapshot on this notification see the new phase
                self.publish_snapshot();
                let data = if phase == Phase::Listening {
                    json!({ "capture": self.context.capture })
                } else {
                    json!({})
                };
                tracing::info!(
                    session_id = %self.context.session_id,
                    phase = phase.as_str(),
                    "Phase changed"
                );
                let _ = self
                    .broadcast_tx
                    .send(SessionEvent::StateChange { phase, data });
            }

            Effect::NotifyNotice { notice } => {
                tracing::info!(
                    session_id = %self.context.session_id,
                    kind = ?notice.kind,
                    detail = notice.detail.as_deref().unwrap_or(""),
                    "Notice"
                );
                let _ = self.broadcast_tx.send(SessionEvent::Notice { notice });
            }
        }
    }

    fn publish_snapshot(&self) {
        self.snapshot_tx.send_replace(SessionSnapshot {
            session_id: self.context.session_id.clone(),
            phase: self.state.phase,
            pending_utterance: self.state.pending_utterance.clone(),
            last_reply: self.state.last_reply.clone(),
            notice: self.state.notice.clone(),
            history: self.history.turns().to_vec(),
            capture: self.context.capture,
        });
    }
}

/// Turns preceding the utterance being answered. The utterance itself was
/// recorded just before the request went out and is sent separately.
fn prior_turns<'a>(turns: &'a [Turn], utterance: &str) -> &'a [Turn] {
    match turns.split_last() {
        Some((last, rest)) if last.role == Role::User && last.text == utterance => rest,
        _ => turns,
    }
}

/// Classify a response provider failure for the user
fn llm_error_kind_to_session(kind: LlmErrorKind) -> ErrorKind {
    match kind {
        LlmErrorKind::Auth => ErrorKind::ProviderAuth,
        LlmErrorKind::Network | LlmErrorKind::ServerError => ErrorKind::ProviderNetwork,
        LlmErrorKind::RateLimit => ErrorKind::ProviderQuota,
        LlmErrorKind::InvalidRequest | LlmErrorKind::Unknown => ErrorKind::ProviderOther,
    }
}
