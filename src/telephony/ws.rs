//! HTTP surface: voice webhook, media stream socket, health probe
//!
//! The media socket is the bridge between the carrier and a call session:
//! inbound wire events become `SessionEvent`s, and frames coming off the
//! session's outbound sink are wrapped as `media` messages.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::header::HOST;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;

use crate::session::{Orchestrator, SessionDeps, SessionEvent};
use crate::telephony::{connect_stream_twiml, outbound_media, InboundMessage};

/// Build the HTTP router over the shared session dependencies
pub fn router(deps: SessionDeps) -> Router {
    Router::new()
        .route("/voice", post(voice_webhook))
        .route("/media", get(media_upgrade))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(deps)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

#[derive(Debug, Deserialize)]
struct VoiceWebhook {
    #[serde(rename = "From", default)]
    from: String,
    #[serde(rename = "To", default)]
    to: String,
    #[serde(rename = "CallSid", default)]
    call_sid: String,
}

/// Answer the carrier's inbound-call webhook with stream instructions
async fn voice_webhook(headers: HeaderMap, Form(webhook): Form<VoiceWebhook>) -> Response {
    let host = headers
        .get(HOST)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("localhost");

    tracing::info!(call_sid = %webhook.call_sid, from = %webhook.from, "inbound call");

    let twiml = connect_stream_twiml(host, &webhook.from, &webhook.to);
    ([("content-type", "text/xml")], twiml).into_response()
}

async fn media_upgrade(ws: WebSocketUpgrade, State(deps): State<SessionDeps>) -> Response {
    ws.on_upgrade(move |socket| media_stream(socket, deps))
}

/// Bridge one media socket to one call session
async fn media_stream(socket: WebSocket, deps: SessionDeps) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (frame_tx, mut frames) = mpsc::channel::<Vec<u8>>(64);

    let (events, orchestrator) = Orchestrator::new(deps, frame_tx);
    let session = tokio::spawn(orchestrator.run());

    let mut stream_sid = String::new();
    loop {
        tokio::select! {
            frame = frames.recv() => {
                let Some(payload) = frame else { break };
                let message = outbound_media(&stream_sid, &BASE64.encode(payload));
                if ws_tx.send(Message::Text(message.into())).await.is_err() {
                    break;
                }
            }
            inbound = ws_rx.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        if dispatch_inbound(&text, &events, &mut stream_sid).await.is_none() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    // Whatever ended the socket, the session still finalizes and persists
    let _ = events.send(SessionEvent::Stop).await;
    let _ = session.await;
}

/// Translate one wire message into session events. Returns `None` when the
/// stream is over.
async fn dispatch_inbound(
    text: &str,
    events: &mpsc::Sender<SessionEvent>,
    stream_sid: &mut String,
) -> Option<()> {
    let message: InboundMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(error) => {
            tracing::debug!(%error, "unparseable transport message dropped");
            return Some(());
        }
    };

    match message.event.as_str() {
        "start" => {
            let Some(start) = message.start else {
                return Some(());
            };
            stream_sid.clone_from(&start.stream_sid);
            let caller = start
                .custom_parameters
                .get("caller")
                .cloned()
                .unwrap_or_else(|| "unknown".to_string());
            let callee = start
                .custom_parameters
                .get("callee")
                .cloned()
                .unwrap_or_else(|| "unknown".to_string());
            events
                .send(SessionEvent::Start {
                    call_id: start.call_sid,
                    stream_id: start.stream_sid,
                    caller_number: caller,
                    callee_number: callee,
                })
                .await
                .ok()
        }
        "media" => {
            let Some(media) = message.media else {
                return Some(());
            };
            match BASE64.decode(&media.payload) {
                Ok(payload) => events.send(SessionEvent::Media { payload }).await.ok(),
                Err(error) => {
                    tracing::debug!(%error, "bad media payload dropped");
                    Some(())
                }
            }
        }
        "stop" => None,
        // connected, mark, and anything newer
        _ => Some(()),
    }
}
