//! API request and response types

use crate::presentation::SessionView;
use crate::state_machine::CaptureLimits;
use serde::{Deserialize, Serialize};

/// Request to submit a typed command
#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    pub text: String,
}

/// Optional metadata sent alongside uploaded audio
#[derive(Debug, Default, Deserialize)]
pub struct AudioQuery {
    /// Length of the recording as measured by the client
    pub duration_ms: Option<u64>,
}

/// Response with a session view
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub session: SessionView,
}

/// Response for accepted commands; progress arrives on the stream
#[derive(Debug, Serialize)]
pub struct AcceptedResponse {
    pub accepted: bool,
}

/// Response for starting a voice command
#[derive(Debug, Serialize)]
pub struct VoiceResponse {
    pub accepted: bool,
    /// Limits the client should record within
    pub capture: CaptureLimits,
}

/// Response for lifecycle actions
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
