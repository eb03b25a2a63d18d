//! Compact HS256 tokens for interview sessions and provider grants.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;

use crate::workflows::recruitment::domain::UserId;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "HS256";

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    alg: String,
    typ: String,
}

/// Claims carried by a minted interview session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionClaims {
    pub user_id: UserId,
    pub name: String,
    pub is_interviewer: bool,
    pub is_candidate: bool,
    pub code: String,
    pub iat: i64,
    pub exp: i64,
}

impl SessionClaims {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() >= self.exp
    }
}

/// Claims that passed [`TokenSigner::verify_session`]; no other path constructs one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedSession {
    claims: SessionClaims,
}

impl VerifiedSession {
    pub fn claims(&self) -> &SessionClaims {
        &self.claims
    }

    pub fn into_claims(self) -> SessionClaims {
        self.claims
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token is malformed")]
    Malformed,
    #[error("unsupported token algorithm {0}")]
    UnsupportedAlgorithm(String),
    #[error("token signature mismatch")]
    BadSignature,
    #[error("token expired")]
    Expired,
    #[error("token payload could not be encoded: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("signing key rejected")]
    Key,
}

/// HMAC-SHA256 signer shared by everything that mints or checks tokens.
#[derive(Clone)]
pub struct TokenSigner {
    key: Vec<u8>,
    ttl: Duration,
}

impl fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSigner")
            .field("key", &"<redacted>")
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl TokenSigner {
    pub fn new(secret: impl AsRef<[u8]>, ttl: Duration) -> Self {
        Self {
            key: secret.as_ref().to_vec(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// `(iat, exp)` for a token issued at `now`.
    pub fn window(&self, now: DateTime<Utc>) -> (i64, i64) {
        let issued = now.timestamp();
        (issued, (now + self.ttl).timestamp())
    }

    pub fn sign<T: Serialize>(&self, claims: &T) -> Result<String, TokenError> {
        let header = serde_json::to_vec(&Header {
            alg: ALGORITHM.to_string(),
            typ: "JWT".to_string(),
        })?;
        let payload = serde_json::to_vec(claims)?;
        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(header),
            URL_SAFE_NO_PAD.encode(payload)
        );

        let mut mac = self.mac()?;
        mac.update(signing_input.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok(format!("{signing_input}.{signature}"))
    }

    /// Check the signature and decode the claims. Expiry is left to the caller.
    pub fn decode<T: DeserializeOwned>(&self, token: &str) -> Result<T, TokenError> {
        let parts: Vec<&str> = token.trim().split('.').collect();
        let [header, payload, signature] = parts.as_slice() else {
            return Err(TokenError::Malformed);
        };

        let header: Header = serde_json::from_slice(&base64_decode(header)?)
            .map_err(|_| TokenError::Malformed)?;
        if header.alg != ALGORITHM {
            return Err(TokenError::UnsupportedAlgorithm(header.alg));
        }

        let mut mac = self.mac()?;
        mac.update(header_and_payload(token)?.as_bytes());
        mac.verify_slice(&base64_decode(signature)?)
            .map_err(|_| TokenError::BadSignature)?;

        serde_json::from_slice(&base64_decode(payload)?).map_err(|_| TokenError::Malformed)
    }

    /// Signature and freshness check for session tokens presented over HTTP.
    pub fn verify_session(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<VerifiedSession, TokenError> {
        let claims: SessionClaims = self.decode(token)?;
        if claims.is_expired_at(now) {
            return Err(TokenError::Expired);
        }
        Ok(VerifiedSession { claims })
    }

    fn mac(&self) -> Result<HmacSha256, TokenError> {
        HmacSha256::new_from_slice(&self.key).map_err(|_| TokenError::Key)
    }
}

fn header_and_payload(token: &str) -> Result<&str, TokenError> {
    token
        .trim()
        .rsplit_once('.')
        .map(|(signed, _)| signed)
        .ok_or(TokenError::Malformed)
}

fn base64_decode(segment: &str) -> Result<Vec<u8>, TokenError> {
    URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| TokenError::Malformed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> TokenSigner {
        TokenSigner::new("unit-test-secret", Duration::minutes(10))
    }

    fn claims(now: DateTime<Utc>) -> SessionClaims {
        let (iat, exp) = signer().window(now);
        SessionClaims {
            user_id: UserId::new("user-1"),
            name: "Interviewer".to_string(),
            is_interviewer: true,
            is_candidate: false,
            code: "room-1".to_string(),
            iat,
            exp,
        }
    }

    #[test]
    fn signed_session_verifies_with_same_key() {
        let now = Utc::now();
        let token = signer().sign(&claims(now)).expect("signs");
        assert_eq!(token.split('.').count(), 3);
        let verified = signer().verify_session(&token, now).expect("verifies");
        assert_eq!(verified.claims(), &claims(now));
        let decoded = verified.into_claims();
        assert_eq!(decoded.exp - decoded.iat, 600);
    }

    #[test]
    fn tampered_payload_fails_signature_check() {
        let now = Utc::now();
        let token = signer().sign(&claims(now)).expect("signs");
        let mut forged = claims(now);
        forged.is_interviewer = false;
        forged.is_candidate = true;
        let forged_payload =
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&forged).expect("serializes"));
        let parts: Vec<&str> = token.split('.').collect();
        let tampered = format!("{}.{}.{}", parts[0], forged_payload, parts[2]);

        assert!(matches!(
            signer().decode::<SessionClaims>(&tampered),
            Err(TokenError::BadSignature)
        ));
    }

    #[test]
    fn other_key_is_rejected() {
        let now = Utc::now();
        let token = signer().sign(&claims(now)).expect("signs");
        let other = TokenSigner::new("different-secret", Duration::minutes(10));
        assert!(matches!(
            other.verify_session(&token, now),
            Err(TokenError::BadSignature)
        ));
    }

    #[test]
    fn expired_session_is_rejected_but_still_decodes() {
        let issued = Utc::now() - Duration::hours(1);
        let token = signer().sign(&claims(issued)).expect("signs");
        assert!(matches!(
            signer().verify_session(&token, Utc::now()),
            Err(TokenError::Expired)
        ));
        assert!(signer().decode::<SessionClaims>(&token).is_ok());
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        for token in ["", "abc", "a.b", "a.b.c.d", "!!.??.##"] {
            assert!(
                matches!(
                    signer().decode::<SessionClaims>(token),
                    Err(TokenError::Malformed)
                ),
                "{token:?} should be malformed"
            );
        }
    }

    #[test]
    fn unsigned_algorithm_is_refused() {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD
            .encode(serde_json::to_vec(&claims(Utc::now())).expect("serializes"));
        let token = format!("{header}.{payload}.");
        assert!(matches!(
            signer().decode::<SessionClaims>(&token),
            Err(TokenError::UnsupportedAlgorithm(alg)) if alg == "none"
        ));
    }
}
