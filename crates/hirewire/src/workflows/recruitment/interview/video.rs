//! Exchange of a verified session token for a video-provider call credential.
//!
//! Nothing in this module authorizes anyone. [`VideoGrantBridge::grant`] re-scopes the role
//! flags of a [`VerifiedSession`], which only [`TokenSigner::verify_session`] produces.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::token::{SessionClaims, TokenError, TokenSigner, VerifiedSession};
use crate::workflows::recruitment::domain::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallRole {
    Interviewer,
    Interviewee,
}

impl CallRole {
    pub const fn label(self) -> &'static str {
        match self {
            CallRole::Interviewer => "interviewer",
            CallRole::Interviewee => "interviewee",
        }
    }

    fn from_claims(claims: &SessionClaims) -> Option<Self> {
        if claims.is_interviewer {
            Some(CallRole::Interviewer)
        } else if claims.is_candidate {
            Some(CallRole::Interviewee)
        } else {
            None
        }
    }
}

/// Response body of `POST /meet/stream`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallGrant {
    pub token: String,
    pub role: CallRole,
    pub user_id: UserId,
    pub name: String,
    pub call_id: String,
}

#[derive(Debug, thiserror::Error)]
pub enum VideoGrantError {
    #[error("session carries no call role")]
    NoRole,
    #[error("video provider rejected the grant: {0}")]
    Provider(String),
}

/// Issues call-scoped credentials on the external video provider.
pub trait CallTokenProvider: Send + Sync {
    fn call_token(
        &self,
        user_id: &UserId,
        role: CallRole,
        call_id: &str,
    ) -> Result<String, VideoGrantError>;
}

#[derive(Debug, Serialize)]
struct ProviderClaims<'a> {
    user_id: &'a str,
    role: CallRole,
    call_cids: Vec<String>,
    iat: i64,
    exp: i64,
}

/// Provider credentials signed locally with the provider API secret.
#[derive(Debug, Clone)]
pub struct SignedCallTokenProvider {
    api_key: String,
    signer: TokenSigner,
}

impl SignedCallTokenProvider {
    pub fn new(api_key: impl Into<String>, signer: TokenSigner) -> Self {
        Self {
            api_key: api_key.into(),
            signer,
        }
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }
}

impl CallTokenProvider for SignedCallTokenProvider {
    fn call_token(
        &self,
        user_id: &UserId,
        role: CallRole,
        call_id: &str,
    ) -> Result<String, VideoGrantError> {
        let (iat, exp) = self.signer.window(Utc::now());
        let claims = ProviderClaims {
            user_id: user_id.as_str(),
            role,
            call_cids: vec![call_id.to_string()],
            iat,
            exp,
        };
        self.signer
            .sign(&claims)
            .map_err(|err: TokenError| VideoGrantError::Provider(err.to_string()))
    }
}

pub fn call_id_for(code: &str) -> String {
    format!("interview:{code}")
}

#[derive(Clone)]
pub struct VideoGrantBridge {
    provider: Arc<dyn CallTokenProvider>,
}

impl VideoGrantBridge {
    pub fn new(provider: Arc<dyn CallTokenProvider>) -> Self {
        Self { provider }
    }

    /// Performs zero authorization beyond the session check already encoded in `session`.
    pub fn grant(&self, session: &VerifiedSession) -> Result<CallGrant, VideoGrantError> {
        let claims = session.claims();
        let role = CallRole::from_claims(claims).ok_or(VideoGrantError::NoRole)?;
        let call_id = call_id_for(&claims.code);
        let token = self.provider.call_token(&claims.user_id, role, &call_id)?;

        Ok(CallGrant {
            token,
            role,
            user_id: claims.user_id.clone(),
            name: claims.name.clone(),
            call_id,
        })
    }
}
