use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::token::{SessionClaims, TokenError, TokenSigner};
use crate::workflows::recruitment::access::{Actor, Capability};
use crate::workflows::recruitment::domain::{ApplicationStatus, InterviewRoom, Posting, PostingId};
use crate::workflows::recruitment::repository::{RecruitmentStores, RepositoryError};
use crate::workflows::recruitment::state::WorkflowStateStore;

const INTERVIEWER_NAME: &str = "Interviewer";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeetRequest {
    pub posting_id: PostingId,
}

#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub claims: SessionClaims,
}

/// Every denial collapses into `Unauthorized`; callers learn nothing about pipeline state.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("unauthorized")]
    Unauthorized,
    #[error("internal server error")]
    Repository(#[source] RepositoryError),
    #[error("internal server error")]
    Signing(#[source] TokenError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionRole {
    Interviewer,
    Candidate,
}

/// Mints interview session tokens after walking the capability, membership and pipeline checks.
pub struct SessionTokenIssuer {
    stores: RecruitmentStores,
    workflow: WorkflowStateStore,
    signer: Arc<TokenSigner>,
}

impl SessionTokenIssuer {
    pub fn new(stores: RecruitmentStores, signer: Arc<TokenSigner>) -> Self {
        let workflow = WorkflowStateStore::new(stores.postings.clone());
        Self {
            stores,
            workflow,
            signer,
        }
    }

    pub fn issue(&self, actor: &Actor, request: MeetRequest) -> Result<IssuedSession, SessionError> {
        let posting = self
            .workflow
            .load(&request.posting_id)
            .map_err(|err| self.repository("load_posting", err))?
            .ok_or_else(|| deny(actor, "posting not found"))?;

        let interviewer = self.is_interviewer(actor, &posting)?;
        let room = self.active_room(actor, &posting)?;

        let (role, name) = if interviewer {
            (SessionRole::Interviewer, INTERVIEWER_NAME.to_string())
        } else {
            (SessionRole::Candidate, self.candidate_name(actor, &posting)?)
        };

        let (iat, exp) = self.signer.window(Utc::now());
        let claims = SessionClaims {
            user_id: actor.user_id.clone(),
            name,
            is_interviewer: role == SessionRole::Interviewer,
            is_candidate: role == SessionRole::Candidate,
            code: room.code.clone(),
            iat,
            exp,
        };
        let token = self.signer.sign(&claims).map_err(|err| {
            error!(error = %err, "failed to sign session token");
            SessionError::Signing(err)
        })?;

        info!(
            user = %actor.user_id,
            posting = %posting.id,
            role = ?role,
            code = %claims.code,
            "interview session issued"
        );
        Ok(IssuedSession { token, claims })
    }

    fn is_interviewer(&self, actor: &Actor, posting: &Posting) -> Result<bool, SessionError> {
        let granted = self
            .stores
            .permissions
            .organization_for(actor, Capability::ManageJob)
            .map_err(|err| self.repository("authorize", err))?;
        if granted.is_none() {
            return Ok(false);
        }

        let organization = self
            .stores
            .organizations
            .fetch(&posting.organization_id)
            .map_err(|err| self.repository("load_organization", err))?;
        Ok(organization.is_some_and(|organization| organization.is_member(&actor.user_id)))
    }

    fn active_room<'a>(
        &self,
        actor: &Actor,
        posting: &'a Posting,
    ) -> Result<&'a InterviewRoom, SessionError> {
        let active = self
            .workflow
            .active_step(posting)
            .map_err(|_| deny(actor, "workflow has more than one active step"))?
            .ok_or_else(|| deny(actor, "no active step"))?;

        posting
            .interview_for(&active.id)
            .ok_or_else(|| deny(actor, "no interview room bound to the active step"))
    }

    fn candidate_name(&self, actor: &Actor, posting: &Posting) -> Result<String, SessionError> {
        let candidate = self
            .stores
            .candidates
            .fetch_by_user(&actor.user_id)
            .map_err(|err| self.repository("load_candidate", err))?
            .ok_or_else(|| deny(actor, "no candidate profile"))?;

        if !posting.has_candidate(&candidate.id) {
            return Err(deny(actor, "candidate not qualified for posting"));
        }

        let application = self
            .stores
            .applications
            .fetch(&posting.id, &candidate.id)
            .map_err(|err| self.repository("load_application", err))?
            .ok_or_else(|| deny(actor, "candidate has not applied"))?;
        if application.status == ApplicationStatus::Rejected {
            return Err(deny(actor, "application rejected"));
        }

        Ok(candidate.name)
    }

    fn repository(&self, operation: &'static str, err: RepositoryError) -> SessionError {
        error!(operation, error = %err, "session issuer persistence failure");
        SessionError::Repository(err)
    }
}

fn deny(actor: &Actor, reason: &'static str) -> SessionError {
    warn!(user = %actor.user_id, reason, "interview session denied");
    SessionError::Unauthorized
}
