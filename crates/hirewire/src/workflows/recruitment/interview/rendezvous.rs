use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::token::{SessionClaims, TokenSigner};
use crate::workflows::recruitment::domain::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPayload {
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptPayload {
    pub user_id: UserId,
    pub token: String,
}

/// Frames sent by participants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "meet/user-joined")]
    UserJoined(TokenPayload),
    #[serde(rename = "meet/accept-user")]
    AcceptUser(AcceptPayload),
    #[serde(rename = "meet/user-answered-call")]
    UserAnsweredCall(TokenPayload),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinedPayload {
    pub decoded: SessionClaims,
    pub connection_id: ConnectionId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPayload {
    pub user_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeftPayload {
    pub connection_id: ConnectionId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
}

/// Frames pushed to participants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "meet/interviewer-joined")]
    InterviewerJoined,
    #[serde(rename = "meet/user-joined/callback")]
    UserJoined(JoinedPayload),
    #[serde(rename = "meet/accept-user/callback")]
    UserAccepted(UserPayload),
    #[serde(rename = "meet/user-answered-call/callback")]
    CallAnswered(UserPayload),
    #[serde(rename = "meet/user-left/callback")]
    UserLeft(LeftPayload),
    #[serde(rename = "meet/error")]
    Error(ErrorPayload),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoomPhase {
    Empty,
    /// Only candidates are connected.
    AwaitingInterviewer,
    /// An interviewer is connected and no candidate has answered yet.
    Paired,
    InCall,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RendezvousError {
    #[error("unknown connection")]
    UnknownConnection,
    #[error("connection has not joined this room")]
    NotInRoom,
    #[error("invalid session token")]
    InvalidToken,
    #[error("malformed event")]
    Malformed,
    #[error("only the interviewer can accept a candidate")]
    NotInterviewer,
    #[error("only a candidate can answer the call")]
    NotCandidate,
}

struct Participant {
    user_id: UserId,
    is_interviewer: bool,
}

struct Connection {
    outbox: mpsc::UnboundedSender<ServerEvent>,
    room: Option<String>,
    participant: Option<Participant>,
}

#[derive(Default)]
struct Room {
    members: HashSet<ConnectionId>,
    accepted: Option<UserId>,
    answered: Option<UserId>,
}

#[derive(Default)]
struct HubState {
    connections: HashMap<ConnectionId, Connection>,
    rooms: HashMap<String, Room>,
}

impl HubState {
    fn send(&self, to: ConnectionId, event: ServerEvent) {
        if let Some(connection) = self.connections.get(&to) {
            // A closed outbox means the socket task is already tearing down.
            let _ = connection.outbox.send(event);
        }
    }

    fn broadcast_room(&self, code: &str, except: ConnectionId, event: &ServerEvent) {
        let Some(room) = self.rooms.get(code) else {
            return;
        };
        for member in room.members.iter().filter(|member| **member != except) {
            self.send(*member, event.clone());
        }
    }

    fn leave_room(&mut self, id: ConnectionId) {
        let Some(code) = self
            .connections
            .get_mut(&id)
            .and_then(|connection| connection.room.take())
        else {
            return;
        };
        let user = self
            .connections
            .get(&id)
            .and_then(|connection| connection.participant.as_ref())
            .map(|participant| participant.user_id.clone());

        if let Some(room) = self.rooms.get_mut(&code) {
            room.members.remove(&id);
            if room.members.is_empty() {
                self.rooms.remove(&code);
                return;
            }
        }

        if let Some(user) = user {
            let still_present = self.user_in_room(&code, &user);
            if let Some(room) = self.rooms.get_mut(&code) {
                if !still_present && room.answered.as_ref() == Some(&user) {
                    room.answered = None;
                }
                if !still_present && room.accepted.as_ref() == Some(&user) {
                    room.accepted = None;
                }
            }
        }
    }

    fn ensure_member(&self, id: ConnectionId, code: &str) -> Result<(), RendezvousError> {
        let connection = self
            .connections
            .get(&id)
            .ok_or(RendezvousError::UnknownConnection)?;
        if connection.room.as_deref() != Some(code) {
            return Err(RendezvousError::NotInRoom);
        }
        Ok(())
    }

    fn user_in_room(&self, code: &str, user: &UserId) -> bool {
        self.rooms.get(code).is_some_and(|room| {
            room.members.iter().any(|member| {
                self.connections
                    .get(member)
                    .and_then(|connection| connection.participant.as_ref())
                    .is_some_and(|participant| &participant.user_id == user)
            })
        })
    }

    fn phase(&self, code: &str) -> RoomPhase {
        let Some(room) = self.rooms.get(code) else {
            return RoomPhase::Empty;
        };
        let interviewer_present = room.members.iter().any(|member| {
            self.connections
                .get(member)
                .and_then(|connection| connection.participant.as_ref())
                .is_some_and(|participant| participant.is_interviewer)
        });

        match (interviewer_present, room.answered.is_some()) {
            _ if room.members.is_empty() => RoomPhase::Empty,
            (false, _) => RoomPhase::AwaitingInterviewer,
            (true, false) => RoomPhase::Paired,
            (true, true) => RoomPhase::InCall,
        }
    }
}

/// Signaling hub pairing an interviewer with a candidate in a room keyed by interview code.
///
/// Events carry the sender's session token; only its signature is re-checked, not its expiry.
pub struct RealtimeRendezvous {
    signer: Arc<TokenSigner>,
    state: Mutex<HubState>,
}

impl RealtimeRendezvous {
    pub fn new(signer: Arc<TokenSigner>) -> Self {
        Self {
            signer,
            state: Mutex::new(HubState::default()),
        }
    }

    /// Register a transport connection; the receiver yields every frame addressed to it.
    pub fn connect(&self) -> (ConnectionId, mpsc::UnboundedReceiver<ServerEvent>) {
        let (outbox, inbox) = mpsc::unbounded_channel();
        let id = ConnectionId::generate();
        self.lock().connections.insert(
            id,
            Connection {
                outbox,
                room: None,
                participant: None,
            },
        );
        debug!(connection = %id, "rendezvous connection opened");
        (id, inbox)
    }

    /// Parse and dispatch a raw text frame.
    pub fn handle_frame(&self, id: ConnectionId, frame: &str) -> Result<(), RendezvousError> {
        match serde_json::from_str::<ClientEvent>(frame) {
            Ok(event) => self.handle(id, event),
            Err(err) => {
                debug!(connection = %id, error = %err, "unparseable rendezvous frame");
                self.reject(id, RendezvousError::Malformed)
            }
        }
    }

    /// Failures are reported to the sender as `meet/error` and never broadcast.
    pub fn handle(&self, id: ConnectionId, event: ClientEvent) -> Result<(), RendezvousError> {
        let outcome = match event {
            ClientEvent::UserJoined(payload) => self.user_joined(id, &payload.token),
            ClientEvent::AcceptUser(payload) => {
                self.accept_user(id, payload.user_id, &payload.token)
            }
            ClientEvent::UserAnsweredCall(payload) => self.user_answered(id, &payload.token),
        };
        match outcome {
            Err(err) => self.reject(id, err),
            ok => ok,
        }
    }

    /// Drop the connection and tell every connected client it left.
    pub fn disconnect(&self, id: ConnectionId) {
        let mut state = self.lock();
        state.leave_room(id);
        if state.connections.remove(&id).is_none() {
            return;
        }

        let event = ServerEvent::UserLeft(LeftPayload { connection_id: id });
        for other in state.connections.keys() {
            state.send(*other, event.clone());
        }
        info!(connection = %id, "rendezvous connection closed");
    }

    pub fn phase(&self, code: &str) -> RoomPhase {
        self.lock().phase(code)
    }

    pub fn connection_count(&self) -> usize {
        self.lock().connections.len()
    }

    fn user_joined(&self, id: ConnectionId, token: &str) -> Result<(), RendezvousError> {
        let claims = self.verify(token)?;
        let mut state = self.lock();
        if !state.connections.contains_key(&id) {
            return Err(RendezvousError::UnknownConnection);
        }

        state.leave_room(id);
        if let Some(connection) = state.connections.get_mut(&id) {
            connection.room = Some(claims.code.clone());
            connection.participant = Some(Participant {
                user_id: claims.user_id.clone(),
                is_interviewer: claims.is_interviewer,
            });
        }
        state
            .rooms
            .entry(claims.code.clone())
            .or_default()
            .members
            .insert(id);

        let code = claims.code.clone();
        let event = if claims.is_interviewer {
            ServerEvent::InterviewerJoined
        } else {
            ServerEvent::UserJoined(JoinedPayload {
                decoded: claims,
                connection_id: id,
            })
        };
        state.broadcast_room(&code, id, &event);
        info!(connection = %id, room = %code, phase = ?state.phase(&code), "participant joined");
        Ok(())
    }

    fn accept_user(
        &self,
        id: ConnectionId,
        user_id: UserId,
        token: &str,
    ) -> Result<(), RendezvousError> {
        let claims = self.verify(token)?;
        if !claims.is_interviewer {
            return Err(RendezvousError::NotInterviewer);
        }

        let mut state = self.lock();
        state.ensure_member(id, &claims.code)?;
        if let Some(room) = state.rooms.get_mut(&claims.code) {
            room.accepted = Some(user_id.clone());
        }
        state.broadcast_room(&claims.code, id, &ServerEvent::UserAccepted(UserPayload { user_id }));
        Ok(())
    }

    fn user_answered(&self, id: ConnectionId, token: &str) -> Result<(), RendezvousError> {
        let claims = self.verify(token)?;
        if !claims.is_candidate {
            return Err(RendezvousError::NotCandidate);
        }

        let mut state = self.lock();
        state.ensure_member(id, &claims.code)?;
        if let Some(room) = state.rooms.get_mut(&claims.code) {
            room.answered = Some(claims.user_id.clone());
        }
        state.broadcast_room(
            &claims.code,
            id,
            &ServerEvent::CallAnswered(UserPayload {
                user_id: claims.user_id.clone(),
            }),
        );
        info!(connection = %id, room = %claims.code, "call answered");
        Ok(())
    }

    fn verify(&self, token: &str) -> Result<SessionClaims, RendezvousError> {
        self.signer.decode(token).map_err(|err| {
            warn!(error = %err, "rendezvous event with invalid session token");
            RendezvousError::InvalidToken
        })
    }

    fn reject(&self, id: ConnectionId, err: RendezvousError) -> Result<(), RendezvousError> {
        self.lock().send(
            id,
            ServerEvent::Error(ErrorPayload {
                message: err.to_string(),
            }),
        );
        Err(err)
    }

    fn lock(&self) -> MutexGuard<'_, HubState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn signer() -> Arc<TokenSigner> {
        Arc::new(TokenSigner::new("rendezvous-secret", Duration::minutes(5)))
    }

    fn token(signer: &TokenSigner, user: &str, interviewer: bool, code: &str) -> String {
        let (iat, exp) = signer.window(Utc::now());
        signer
            .sign(&SessionClaims {
                user_id: UserId::new(user),
                name: user.to_string(),
                is_interviewer: interviewer,
                is_candidate: !interviewer,
                code: code.to_string(),
                iat,
                exp,
            })
            .expect("signs")
    }

    fn joined(token: String) -> ClientEvent {
        ClientEvent::UserJoined(TokenPayload { token })
    }

    fn drain(inbox: &mut mpsc::UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = inbox.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn handshake_walks_room_through_every_phase() {
        let signer = signer();
        let hub = RealtimeRendezvous::new(signer.clone());
        let interviewer_token = token(&signer, "hr-1", true, "room-1");
        let candidate_token = token(&signer, "cand-1", false, "room-1");

        let (candidate, mut candidate_inbox) = hub.connect();
        let (interviewer, mut interviewer_inbox) = hub.connect();
        assert_eq!(hub.phase("room-1"), RoomPhase::Empty);

        hub.handle(candidate, joined(candidate_token.clone()))
            .expect("candidate joins");
        assert_eq!(hub.phase("room-1"), RoomPhase::AwaitingInterviewer);

        hub.handle(interviewer, joined(interviewer_token.clone()))
            .expect("interviewer joins");
        assert_eq!(hub.phase("room-1"), RoomPhase::Paired);
        assert_eq!(drain(&mut candidate_inbox), vec![ServerEvent::InterviewerJoined]);

        hub.handle(
            interviewer,
            ClientEvent::AcceptUser(AcceptPayload {
                user_id: UserId::new("cand-1"),
                token: interviewer_token,
            }),
        )
        .expect("interviewer accepts");
        assert_eq!(
            drain(&mut candidate_inbox),
            vec![ServerEvent::UserAccepted(UserPayload {
                user_id: UserId::new("cand-1")
            })]
        );

        hub.handle(
            candidate,
            ClientEvent::UserAnsweredCall(TokenPayload {
                token: candidate_token,
            }),
        )
        .expect("candidate answers");
        assert_eq!(hub.phase("room-1"), RoomPhase::InCall);
        assert_eq!(
            drain(&mut interviewer_inbox),
            vec![ServerEvent::CallAnswered(UserPayload {
                user_id: UserId::new("cand-1")
            })]
        );
    }

    #[test]
    fn candidate_join_carries_decoded_claims_to_room() {
        let signer = signer();
        let hub = RealtimeRendezvous::new(signer.clone());
        let (interviewer, mut interviewer_inbox) = hub.connect();
        let (candidate, _candidate_inbox) = hub.connect();

        hub.handle(interviewer, joined(token(&signer, "hr-1", true, "room-1")))
            .expect("joins");
        hub.handle(candidate, joined(token(&signer, "cand-1", false, "room-1")))
            .expect("joins");

        match drain(&mut interviewer_inbox).as_slice() {
            [ServerEvent::UserJoined(payload)] => {
                assert_eq!(payload.connection_id, candidate);
                assert_eq!(payload.decoded.user_id, UserId::new("cand-1"));
                assert!(payload.decoded.is_candidate);
            }
            other => panic!("unexpected events {other:?}"),
        }
    }

    #[test]
    fn rooms_are_isolated() {
        let signer = signer();
        let hub = RealtimeRendezvous::new(signer.clone());
        let (first, mut first_inbox) = hub.connect();
        let (second, _) = hub.connect();

        hub.handle(first, joined(token(&signer, "cand-1", false, "room-1")))
            .expect("joins");
        hub.handle(second, joined(token(&signer, "hr-2", true, "room-2")))
            .expect("joins");

        assert!(drain(&mut first_inbox).is_empty());
        assert_eq!(hub.phase("room-1"), RoomPhase::AwaitingInterviewer);
        assert_eq!(hub.phase("room-2"), RoomPhase::Paired);
    }

    #[test]
    fn forged_token_is_reported_to_sender_only() {
        let signer = signer();
        let hub = RealtimeRendezvous::new(signer.clone());
        let forger = TokenSigner::new("someone-else", Duration::minutes(5));
        let (interviewer, mut interviewer_inbox) = hub.connect();
        let (intruder, mut intruder_inbox) = hub.connect();
        hub.handle(interviewer, joined(token(&signer, "hr-1", true, "room-1")))
            .expect("joins");

        let result = hub.handle(intruder, joined(token(&forger, "cand-9", false, "room-1")));

        assert_eq!(result, Err(RendezvousError::InvalidToken));
        assert!(drain(&mut interviewer_inbox).is_empty());
        assert!(matches!(
            drain(&mut intruder_inbox).as_slice(),
            [ServerEvent::Error(_)]
        ));
    }

    #[test]
    fn candidate_cannot_accept_and_interviewer_cannot_answer() {
        let signer = signer();
        let hub = RealtimeRendezvous::new(signer.clone());
        let (id, _inbox) = hub.connect();

        let accept = hub.handle(
            id,
            ClientEvent::AcceptUser(AcceptPayload {
                user_id: UserId::new("cand-1"),
                token: token(&signer, "cand-1", false, "room-1"),
            }),
        );
        let answer = hub.handle(
            id,
            ClientEvent::UserAnsweredCall(TokenPayload {
                token: token(&signer, "hr-1", true, "room-1"),
            }),
        );

        assert_eq!(accept, Err(RendezvousError::NotInterviewer));
        assert_eq!(answer, Err(RendezvousError::NotCandidate));
    }

    #[test]
    fn signals_require_membership_of_the_token_room() {
        let signer = signer();
        let hub = RealtimeRendezvous::new(signer.clone());
        let (interviewer, mut interviewer_inbox) = hub.connect();
        let (candidate, mut candidate_inbox) = hub.connect();
        let (outsider, mut outsider_inbox) = hub.connect();
        hub.handle(interviewer, joined(token(&signer, "hr-1", true, "room-1")))
            .expect("joins");
        hub.handle(candidate, joined(token(&signer, "cand-1", false, "room-1")))
            .expect("joins");
        hub.handle(outsider, joined(token(&signer, "cand-2", false, "room-2")))
            .expect("joins");
        drain(&mut interviewer_inbox);
        drain(&mut candidate_inbox);

        let accept = hub.handle(
            outsider,
            ClientEvent::AcceptUser(AcceptPayload {
                user_id: UserId::new("cand-1"),
                token: token(&signer, "hr-9", true, "room-1"),
            }),
        );
        let answer = hub.handle(
            outsider,
            ClientEvent::UserAnsweredCall(TokenPayload {
                token: token(&signer, "cand-1", false, "room-1"),
            }),
        );

        assert_eq!(accept, Err(RendezvousError::NotInRoom));
        assert_eq!(answer, Err(RendezvousError::NotInRoom));
        assert!(drain(&mut interviewer_inbox).is_empty());
        assert!(drain(&mut candidate_inbox).is_empty());
        assert_eq!(drain(&mut outsider_inbox).len(), 2);
        assert_eq!(hub.phase("room-1"), RoomPhase::Paired);

        let (stranger, _) = hub.connect();
        let answer = hub.handle(
            stranger,
            ClientEvent::UserAnsweredCall(TokenPayload {
                token: token(&signer, "cand-1", false, "room-1"),
            }),
        );
        assert_eq!(answer, Err(RendezvousError::NotInRoom));
        assert_eq!(hub.phase("room-1"), RoomPhase::Paired);
    }

    #[test]
    fn expired_token_still_joins() {
        let signer = Arc::new(TokenSigner::new("rendezvous-secret", Duration::seconds(-60)));
        let hub = RealtimeRendezvous::new(signer.clone());
        let (id, _inbox) = hub.connect();

        hub.handle(id, joined(token(&signer, "cand-1", false, "room-1")))
            .expect("signature-only check");
        assert_eq!(hub.phase("room-1"), RoomPhase::AwaitingInterviewer);
    }

    #[test]
    fn disconnect_notifies_every_connection_and_resets_phase() {
        let signer = signer();
        let hub = RealtimeRendezvous::new(signer.clone());
        let (interviewer, _) = hub.connect();
        let (candidate, mut candidate_inbox) = hub.connect();
        let (bystander, mut bystander_inbox) = hub.connect();
        hub.handle(interviewer, joined(token(&signer, "hr-1", true, "room-1")))
            .expect("joins");
        hub.handle(candidate, joined(token(&signer, "cand-1", false, "room-1")))
            .expect("joins");
        drain(&mut candidate_inbox);

        hub.disconnect(interviewer);

        let left = ServerEvent::UserLeft(LeftPayload {
            connection_id: interviewer,
        });
        assert_eq!(drain(&mut candidate_inbox), vec![left.clone()]);
        assert_eq!(drain(&mut bystander_inbox), vec![left]);
        assert_eq!(hub.phase("room-1"), RoomPhase::AwaitingInterviewer);
        assert_eq!(hub.connection_count(), 2);

        hub.disconnect(candidate);
        hub.disconnect(bystander);
        assert_eq!(hub.phase("room-1"), RoomPhase::Empty);
        assert_eq!(hub.connection_count(), 0);
    }

    #[test]
    fn frames_use_event_and_data_envelope() {
        let signer = signer();
        let hub = RealtimeRendezvous::new(signer.clone());
        let (id, mut inbox) = hub.connect();

        let frame = serde_json::json!({
            "event": "meet/user-joined",
            "data": { "token": token(&signer, "cand-1", false, "room-7") }
        })
        .to_string();
        hub.handle_frame(id, &frame).expect("valid frame");
        assert_eq!(hub.phase("room-7"), RoomPhase::AwaitingInterviewer);

        assert_eq!(
            hub.handle_frame(id, r#"{"event":"meet/unknown"}"#),
            Err(RendezvousError::Malformed)
        );
        let error = serde_json::to_value(&drain(&mut inbox)[0]).expect("serializes");
        assert_eq!(error["event"], "meet/error");
        assert_eq!(error["data"]["message"], "malformed event");
    }
}
