//! What the user sees for a session
//!
//! Maps the session snapshot onto the visual asset and control state the
//! page renders.

use crate::runtime::SessionSnapshot;
use crate::state_machine::{CaptureLimits, Notice, Phase, Role, Turn};
use serde::Serialize;

/// Image shown for each phase
#[derive(Debug, Clone)]
pub struct VisualAssets {
    pub idle: String,
    pub listening: String,
    pub thinking: String,
    pub speaking: String,
}

impl Default for VisualAssets {
    fn default() -> Self {
        Self {
            idle: "https://placehold.co/300x400/87CEEB/FFFFFF?text=Aria+Idle".to_string(),
            listening: "https://placehold.co/300x400/FFD580/000000?text=Aria+Listening"
                .to_string(),
            thinking: "https://placehold.co/300x400/D8BFD8/000000?text=Aria+Thinking".to_string(),
            speaking: "https://placehold.co/300x400/98FB98/000000?text=Aria+Speaking".to_string(),
        }
    }
}

impl VisualAssets {
    pub fn for_phase(&self, phase: Phase) -> &str {
        match phase {
            Phase::Idle => &self.idle,
            Phase::Listening => &self.listening,
            Phase::Thinking => &self.thinking,
            Phase::Speaking => &self.speaking,
        }
    }
}

/// Which inputs accept interaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ControlState {
    pub text_input: bool,
    pub voice_button: bool,
}

impl ControlState {
    pub fn for_phase(phase: Phase) -> Self {
        let enabled = phase == Phase::Idle;
        Self {
            text_input: enabled,
            voice_button: enabled,
        }
    }
}

/// Everything the page needs to render one session
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub session_id: String,
    pub phase: Phase,
    /// Status line, e.g. "Aria is thinking..."
    pub status: String,
    pub visual: String,
    pub controls: ControlState,
    pub pending_utterance: Option<String>,
    /// What the user said last ("You said: ...")
    pub last_user_text: Option<String>,
    pub last_reply: String,
    pub notice: Option<Notice>,
    pub history: Vec<Turn>,
    pub capture: CaptureLimits,
}

impl SessionView {
    pub fn render(snapshot: &SessionSnapshot, assets: &VisualAssets) -> Self {
        let last_user_text = snapshot
            .history
            .iter()
            .rev()
            .find(|t| t.role == Role::User)
            .map(|t| t.text.clone());

        Self {
            session_id: snapshot.session_id.clone(),
            phase: snapshot.phase,
            status: status_line(snapshot.phase).to_string(),
            visual: assets.for_phase(snapshot.phase).to_string(),
            controls: ControlState::for_phase(snapshot.phase),
            pending_utterance: snapshot.pending_utterance.clone(),
            last_user_text,
            last_reply: snapshot.last_reply.clone(),
            notice: snapshot.notice.clone(),
            history: snapshot.history.clone(),
            capture: snapshot.capture,
        }
    }
}

fn status_line(phase: Phase) -> &'static str {
    match phase {
        Phase::Idle => "",
        Phase::Listening => "Listening... Speak now!",
        Phase::Thinking => "Aria is thinking...",
        Phase::Speaking => "Aria is speaking...",
    }
}
