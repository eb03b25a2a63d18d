//! Interview sessions: token minting, the signaling rendezvous and video-provider grants.

pub mod issuer;
pub mod rendezvous;
pub mod router;
pub mod token;
pub mod video;

pub use issuer::{IssuedSession, MeetRequest, SessionError, SessionTokenIssuer};
pub use rendezvous::{
    AcceptPayload, ClientEvent, ConnectionId, RealtimeRendezvous, RendezvousError, RoomPhase,
    ServerEvent, TokenPayload,
};
pub use router::{interview_router, InterviewState};
pub use token::{SessionClaims, TokenError, TokenSigner, VerifiedSession};
pub use video::{
    call_id_for, CallGrant, CallRole, CallTokenProvider, SignedCallTokenProvider,
    VideoGrantBridge, VideoGrantError,
};
