//! Aria - voice and text conversation sessions
//!
//! A Rust backend implementing a per-session state machine that turns typed
//! or spoken commands into spoken assistant replies.

mod api;
mod config;
mod llm;
mod presentation;
mod runtime;
mod speech;
mod state_machine;
mod system_prompt;

use api::{create_router, AppState};
use config::AriaConfig;
use llm::{GeminiService, LlmService, LoggingService, UnconfiguredService};
use presentation::VisualAssets;
use runtime::{LlmResponder, SessionManager, SessionProviders, SpeechOutput};
use speech::{GoogleSpeechTranscriber, GoogleTranslateTts, Transcriber, UnconfiguredTranscriber};
use std::net::SocketAddr;
use std::sync::Arc;
use system_prompt::build_system_prompt;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "aria=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    // Configuration
    let config = AriaConfig::from_env()?;

    // Response provider
    let llm: Arc<dyn LlmService> = if let Some(key) = &config.gemini_api_key {
        let gemini = GeminiService::new(key.clone(), &config.model, config.gateway.as_deref())?;
        tracing::info!(model = %config.model, gateway = ?config.gateway, "Response provider initialized");
        Arc::new(LoggingService::new(Arc::new(gemini)))
    } else {
        tracing::warn!("No response provider configured. Set GEMINI_API_KEY.");
        Arc::new(UnconfiguredService::new("GEMINI_API_KEY is not set"))
    };

    // Speech providers
    let transcriber: Arc<dyn Transcriber> = if let Some(key) = &config.speech_api_key {
        Arc::new(GoogleSpeechTranscriber::new(key.clone(), None)?)
    } else {
        tracing::warn!("No speech recognition configured. Set GOOGLE_SPEECH_API_KEY.");
        Arc::new(UnconfiguredTranscriber::new(
            "speech recognition is not configured",
        ))
    };
    let synthesizer = Arc::new(GoogleTranslateTts::new(None)?);

    let providers = SessionProviders {
        responder: Arc::new(LlmResponder::new(llm, build_system_prompt(&config.language))),
        transcriber,
        speech_out: Arc::new(SpeechOutput::new(synthesizer)),
    };

    // Create application state
    let sessions = Arc::new(SessionManager::new(providers, config.session_defaults()));
    if sessions.spawn_reaper().is_none() {
        tracing::info!("Idle session expiry disabled");
    }
    let state = AppState::new(sessions, VisualAssets::default());

    // Create router
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(
        thinking_delay_ms = %config.thinking_delay.as_millis(),
        language = %config.language,
        "Aria server listening on {}",
        addr
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
