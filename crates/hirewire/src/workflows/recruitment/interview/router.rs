use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error, warn};

use super::issuer::{MeetRequest, SessionError, SessionTokenIssuer};
use super::rendezvous::RealtimeRendezvous;
use super::token::TokenSigner;
use super::video::{VideoGrantBridge, VideoGrantError};
use crate::workflows::recruitment::access::{Actor, JsonBody};

/// Shared collaborators behind the interview endpoints.
#[derive(Clone)]
pub struct InterviewState {
    pub issuer: Arc<SessionTokenIssuer>,
    pub signer: Arc<TokenSigner>,
    pub bridge: VideoGrantBridge,
    pub rendezvous: Arc<RealtimeRendezvous>,
}

pub fn interview_router(state: InterviewState) -> Router {
    Router::new()
        .route("/meet", post(meet_handler))
        .route("/meet/stream", post(stream_handler))
        .route("/meet/ws", get(socket_handler))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub(crate) struct StreamRequest {
    pub(crate) token: String,
}

impl IntoResponse for SessionError {
    fn into_response(self) -> Response {
        let status = match self {
            SessionError::Unauthorized => StatusCode::UNAUTHORIZED,
            SessionError::Repository(_) | SessionError::Signing(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, axum::Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub(crate) async fn meet_handler(
    State(state): State<InterviewState>,
    actor: Actor,
    JsonBody(request): JsonBody<MeetRequest>,
) -> Response {
    match state.issuer.issue(&actor, request) {
        Ok(session) => {
            (StatusCode::OK, axum::Json(json!({ "token": session.token }))).into_response()
        }
        Err(error) => error.into_response(),
    }
}

pub(crate) async fn stream_handler(
    State(state): State<InterviewState>,
    JsonBody(request): JsonBody<StreamRequest>,
) -> Response {
    let session = match state.signer.verify_session(&request.token, Utc::now()) {
        Ok(session) => session,
        Err(err) => {
            warn!(error = %err, "stream grant refused");
            return SessionError::Unauthorized.into_response();
        }
    };

    match state.bridge.grant(&session) {
        Ok(grant) => (StatusCode::OK, axum::Json(grant)).into_response(),
        Err(VideoGrantError::NoRole) => SessionError::Unauthorized.into_response(),
        Err(err @ VideoGrantError::Provider(_)) => {
            error!(error = %err, user = %session.claims().user_id, "video grant failed");
            let payload = json!({ "error": "internal server error" });
            (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(payload)).into_response()
        }
    }
}

pub(crate) async fn socket_handler(
    State(state): State<InterviewState>,
    upgrade: WebSocketUpgrade,
) -> Response {
    upgrade.on_upgrade(move |socket| relay(socket, state.rendezvous))
}

/// Pump frames between one websocket and the hub until either side closes.
async fn relay(socket: WebSocket, rendezvous: Arc<RealtimeRendezvous>) {
    let (id, mut outbox) = rendezvous.connect();
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            event = outbox.recv() => {
                let Some(event) = event else { break };
                let frame = match serde_json::to_string(&event) {
                    Ok(frame) => frame,
                    Err(err) => {
                        error!(connection = %id, error = %err, "failed to encode rendezvous event");
                        continue;
                    }
                };
                if sink.send(Message::Text(frame)).await.is_err() {
                    break;
                }
            }
            message = stream.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        // Rejections are already delivered to the sender as `meet/error`.
                        let _ = rendezvous.handle_frame(id, &text);
                    }
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    debug!(connection = %id, "websocket closed");
    rendezvous.disconnect(id);
}
