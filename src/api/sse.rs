//! Server-Sent Events support

use crate::presentation::{ControlState, VisualAssets};
use crate::runtime::SessionEvent;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

/// Convert broadcast stream to SSE stream
pub fn sse_stream(
    init_event: SessionEvent,
    broadcast_rx: tokio::sync::broadcast::Receiver<SessionEvent>,
    assets: Arc<VisualAssets>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // Create stream that starts with init event then broadcasts
    let init_assets = assets.clone();
    let init =
        futures::stream::once(async move { Ok(session_event_to_axum(init_event, &init_assets)) });

    let broadcasts = BroadcastStream::new(broadcast_rx).filter_map(move |result| match result {
        Ok(event) => Some(Ok(session_event_to_axum(event, &assets))),
        Err(_) => None, // Skip lagged messages
    });

    let combined = init.chain(broadcasts);

    Sse::new(combined).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

fn session_event_to_axum(event: SessionEvent, assets: &VisualAssets) -> Event {
    let (event_type, data) = session_event_json(event, assets);
    Event::default().event(event_type).data(data.to_string())
}

fn session_event_json(event: SessionEvent, assets: &VisualAssets) -> (&'static str, serde_json::Value) {
    match event {
        SessionEvent::Init { view } => (
            "init",
            json!({
                "type": "init",
                "session": view
            }),
        ),
        SessionEvent::StateChange { phase, data } => (
            "state_change",
            json!({
                "type": "state_change",
                "phase": phase,
                "visual": assets.for_phase(phase),
                "controls": ControlState::for_phase(phase),
                "data": data
            }),
        ),
        SessionEvent::Turn { turn } => (
            "turn",
            json!({
                "type": "turn",
                "turn": turn
            }),
        ),
        SessionEvent::Audio { audio } => (
            "audio",
            json!({
                "type": "audio",
                "media_type": audio.media_type,
                "data": audio.to_base64()
            }),
        ),
        SessionEvent::Notice { notice } => (
            "notice",
            json!({
                "type": "notice",
                "notice": notice
            }),
        ),
        SessionEvent::Error { message } => (
            "error",
            json!({
                "type": "error",
                "message": message
            }),
        ),
    }
}
