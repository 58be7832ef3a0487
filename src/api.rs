//! HTTP API for Aria sessions

mod handlers;
mod sse;
mod types;

pub use handlers::create_router;
#[allow(unused_imports)] // Public API re-exports
pub use types::*;

use crate::presentation::VisualAssets;
use crate::runtime::SessionManager;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionManager>,
    pub assets: Arc<VisualAssets>,
}

impl AppState {
    pub fn new(sessions: Arc<SessionManager>, assets: VisualAssets) -> Self {
        Self {
            sessions,
            assets: Arc::new(assets),
        }
    }
}
