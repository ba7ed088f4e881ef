//! Realtime subtitle sessions over WebSocket
//!
//! Every text frame is one JSON event tagged by `event`. Events of one
//! connection are handled in order, one at a time. A connection owns the
//! sessions it started: chunks and stops from other connections are
//! ignored, and its sessions are discarded when it goes away.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::types::{list_value, ClientEvent, ServerEvent};
use crate::ApiState;

type WsSender = SplitSink<WebSocket, Message>;

/// Upgrade to the realtime event channel
pub async fn realtime(ws: WebSocketUpgrade, State(state): State<ApiState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: ApiState) {
    let connection_id = Uuid::new_v4().simple().to_string();
    info!("Realtime connection {} opened", connection_id);
    let (mut sender, mut receiver) = socket.split();

    while let Some(message) = receiver.next().await {
        let message = match message {
            Ok(message) => message,
            Err(e) => {
                debug!("Realtime connection {} errored: {}", connection_id, e);
                break;
            }
        };

        match message {
            Message::Text(text) => {
                let event = match serde_json::from_str::<ClientEvent>(text.as_str()) {
                    Ok(event) => event,
                    Err(e) => {
                        debug!("Ignoring unrecognised realtime message: {}", e);
                        continue;
                    }
                };
                if let Some(reply) = handle_event(&state, &connection_id, event).await {
                    if !send_event(&mut sender, &reply).await {
                        break;
                    }
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    let discarded = state.sessions.remove_owned_by(&connection_id).await;
    info!(
        "Realtime connection {} closed ({} sessions discarded)",
        connection_id, discarded
    );
}

async fn send_event(sender: &mut WsSender, event: &ServerEvent) -> bool {
    let payload = match serde_json::to_string(event) {
        Ok(payload) => payload,
        Err(e) => {
            warn!("Failed to serialize realtime event: {}", e);
            return true;
        }
    };
    sender.send(Message::Text(payload.into())).await.is_ok()
}

/// Apply one client event; `None` means nothing is sent back
async fn handle_event(state: &ApiState, connection_id: &str, event: ClientEvent) -> Option<ServerEvent> {
    match event {
        ClientEvent::Start {
            session_id,
            languages,
            mime_type,
        } => {
            let requested = session_id.clone();
            match state
                .sessions
                .start(
                    session_id,
                    list_value(languages.as_ref()),
                    mime_type.as_deref(),
                    connection_id,
                )
                .await
            {
                Ok(started) => Some(ServerEvent::Started(started)),
                Err(e) => Some(ServerEvent::Error {
                    session_id: requested,
                    error: e.to_string(),
                }),
            }
        }

        ClientEvent::Chunk { session_id, chunk } => {
            let session_id = session_id.filter(|id| !id.is_empty())?;
            let chunk = chunk.filter(|c| !c.is_empty())?;
            if !state.sessions.is_active(&session_id).await {
                debug!("Ignoring chunk for inactive session {}", session_id);
                return None;
            }

            let bytes = match STANDARD.decode(chunk.as_bytes()) {
                Ok(bytes) => bytes,
                Err(e) => {
                    return Some(ServerEvent::Error {
                        session_id: Some(session_id),
                        error: format!("Invalid chunk encoding: {e}"),
                    })
                }
            };

            match state
                .sessions
                .append_chunk_from(connection_id, &session_id, &bytes)
                .await
            {
                Ok(update) => update.map(ServerEvent::Transcript),
                Err(e) => {
                    warn!("Chunk for session {} failed: {}", session_id, e);
                    Some(ServerEvent::Error {
                        session_id: Some(session_id),
                        error: e.to_string(),
                    })
                }
            }
        }

        ClientEvent::Stop { session_id } => {
            let session_id = session_id.filter(|id| !id.is_empty())?;
            state
                .sessions
                .stop_from(connection_id, &session_id)
                .await
                .map(ServerEvent::Finished)
        }
    }
}
