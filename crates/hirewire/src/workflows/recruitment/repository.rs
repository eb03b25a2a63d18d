use std::sync::Arc;

use super::access::{Actor, Capability};
use super::domain::{
    AppliedPosting, Candidate, CandidateId, InterviewRoom, Organization, OrganizationId, Posting,
    PostingId, UserId, Workflow,
};

/// Document-store access for postings, loaded as fully resolved aggregates.
pub trait PostingRepository: Send + Sync {
    fn fetch(&self, id: &PostingId) -> Result<Option<Posting>, RepositoryError>;
    /// Replace the qualified-candidate set in a single write.
    fn save_candidates(
        &self,
        id: &PostingId,
        candidates: &[CandidateId],
    ) -> Result<(), RepositoryError>;
    fn save_workflow(
        &self,
        id: &PostingId,
        workflow: &Workflow,
        interviews: &[InterviewRoom],
    ) -> Result<(), RepositoryError>;
}

pub trait CandidateRepository: Send + Sync {
    fn fetch(&self, id: &CandidateId) -> Result<Option<Candidate>, RepositoryError>;
    fn fetch_by_user(&self, user: &UserId) -> Result<Option<Candidate>, RepositoryError>;
}

pub trait AppliedPostingRepository: Send + Sync {
    fn fetch(
        &self,
        posting: &PostingId,
        candidate: &CandidateId,
    ) -> Result<Option<AppliedPosting>, RepositoryError>;
    fn save_all(&self, applications: &[AppliedPosting]) -> Result<(), RepositoryError>;
}

pub trait OrganizationRepository: Send + Sync {
    fn fetch(&self, id: &OrganizationId) -> Result<Option<Organization>, RepositoryError>;
}

/// External authorization collaborator resolving organization-scoped capabilities.
pub trait PermissionChecker: Send + Sync {
    /// Organization in which `actor` holds `capability`, if any.
    fn organization_for(
        &self,
        actor: &Actor,
        capability: Capability,
    ) -> Result<Option<OrganizationId>, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Injected ports shared by the pipeline coordinator and the session issuer.
#[derive(Clone)]
pub struct RecruitmentStores {
    pub postings: Arc<dyn PostingRepository>,
    pub candidates: Arc<dyn CandidateRepository>,
    pub applications: Arc<dyn AppliedPostingRepository>,
    pub organizations: Arc<dyn OrganizationRepository>,
    pub permissions: Arc<dyn PermissionChecker>,
}
