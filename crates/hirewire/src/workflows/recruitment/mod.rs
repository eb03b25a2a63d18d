//! Recruitment pipeline: qualify/disqualify gating, workflow advancement and interview sessions.

pub mod access;
pub mod domain;
pub mod interview;
pub mod pipeline;
pub mod repository;
pub mod state;

#[cfg(test)]
mod tests;

pub use access::{Actor, Capability, JsonBody, QueryParams, ACTOR_HEADER};
pub use domain::{
    AppliedPosting, ApplicationStatus, Candidate, CandidateId, InterviewRoom, Organization,
    OrganizationId, Posting, PostingId, StepId, StepStatus, StepType, UserId, Workflow,
    WorkflowAdvance, WorkflowError, WorkflowStep,
};
pub use repository::{
    AppliedPostingRepository, CandidateRepository, OrganizationRepository, PermissionChecker,
    PostingRepository, RecruitmentStores, RepositoryError,
};
pub use state::WorkflowStateStore;
