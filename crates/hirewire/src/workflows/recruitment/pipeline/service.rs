use std::collections::HashSet;
use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::workflows::recruitment::access::{Actor, Capability};
use crate::workflows::recruitment::domain::{
    AppliedPosting, ApplicationStatus, CandidateId, InterviewRoom, OrganizationId, Posting,
    PostingId, StepType, WorkflowAdvance, WorkflowError, WorkflowStep,
};
use crate::workflows::recruitment::repository::{RecruitmentStores, RepositoryError};
use crate::workflows::recruitment::state::WorkflowStateStore;

/// Request body for single-candidate pipeline operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateAction {
    pub candidate_id: CandidateId,
    pub posting_id: PostingId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkCandidateAction {
    pub candidate_ids: Vec<CandidateId>,
    pub posting_id: PostingId,
}

/// Qualified-candidate set of a posting after an operation completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QualificationOutcome {
    pub posting_id: PostingId,
    pub candidates: Vec<CandidateId>,
    pub changed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvanceOutcome {
    pub posting_id: PostingId,
    pub active_step: Option<WorkflowStep>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interview_code: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingRecord {
    Posting,
    Candidate,
    Application,
}

impl fmt::Display for MissingRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissingRecord::Posting => write!(f, "posting not found"),
            MissingRecord::Candidate => write!(f, "candidate not found"),
            MissingRecord::Application => write!(f, "candidate has not applied to this posting"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    WorkflowNotConfigured,
    NoActiveStep,
    NotResumeScreening,
    MultipleActiveSteps,
    WorkflowCompleted,
    EmptySelection,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            PipelineState::WorkflowNotConfigured => "workflow not configured",
            PipelineState::NoActiveStep => "no active workflow step",
            PipelineState::NotResumeScreening => "current step is not resume screening",
            PipelineState::MultipleActiveSteps => "workflow has more than one step in progress",
            PipelineState::WorkflowCompleted => "workflow already completed",
            PipelineState::EmptySelection => "no candidates supplied",
        };
        f.write_str(message)
    }
}

/// Error raised by pipeline operations; a failed operation leaves stored state unchanged.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("unauthorized")]
    Unauthorized,
    #[error("{0}")]
    NotFound(MissingRecord),
    #[error("{0}")]
    InvalidState(PipelineState),
    #[error("internal server error")]
    Internal(#[from] RepositoryError),
}

impl From<WorkflowError> for PipelineError {
    fn from(value: WorkflowError) -> Self {
        let state = match value {
            WorkflowError::NotConfigured => PipelineState::WorkflowNotConfigured,
            WorkflowError::MultipleActiveSteps(_) => PipelineState::MultipleActiveSteps,
            WorkflowError::AlreadyCompleted => PipelineState::WorkflowCompleted,
        };
        Self::InvalidState(state)
    }
}

impl PipelineError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            PipelineError::Unauthorized => StatusCode::UNAUTHORIZED,
            PipelineError::NotFound(_) => StatusCode::NOT_FOUND,
            PipelineError::InvalidState(_) => StatusCode::BAD_REQUEST,
            PipelineError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        let body = axum::Json(json!({ "error": self.to_string() }));
        (self.status_code(), body).into_response()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Membership {
    Qualify,
    Disqualify,
}

impl Membership {
    const fn label(self) -> &'static str {
        match self {
            Membership::Qualify => "qualify",
            Membership::Disqualify => "disqualify",
        }
    }
}

/// Moves candidates in and out of a posting's qualified set, gated on the active step.
pub struct PipelineCoordinator {
    stores: RecruitmentStores,
    workflow: WorkflowStateStore,
    resumes_public_url: String,
}

impl PipelineCoordinator {
    pub fn new(stores: RecruitmentStores, resumes_public_url: impl Into<String>) -> Self {
        let workflow = WorkflowStateStore::new(stores.postings.clone());
        Self {
            stores,
            workflow,
            resumes_public_url: resumes_public_url.into(),
        }
    }

    pub fn workflow(&self) -> &WorkflowStateStore {
        &self.workflow
    }

    /// Admit a candidate at the resume screening stage.
    pub fn qualify(
        &self,
        actor: &Actor,
        action: CandidateAction,
    ) -> Result<QualificationOutcome, PipelineError> {
        self.apply(
            actor,
            Membership::Qualify,
            &action.posting_id,
            vec![action.candidate_id],
        )
    }

    /// Remove a candidate at whichever stage is currently running.
    pub fn disqualify(
        &self,
        actor: &Actor,
        action: CandidateAction,
    ) -> Result<QualificationOutcome, PipelineError> {
        self.apply(
            actor,
            Membership::Disqualify,
            &action.posting_id,
            vec![action.candidate_id],
        )
    }

    pub fn bulk_qualify(
        &self,
        actor: &Actor,
        action: BulkCandidateAction,
    ) -> Result<QualificationOutcome, PipelineError> {
        self.apply(
            actor,
            Membership::Qualify,
            &action.posting_id,
            action.candidate_ids,
        )
    }

    pub fn bulk_disqualify(
        &self,
        actor: &Actor,
        action: BulkCandidateAction,
    ) -> Result<QualificationOutcome, PipelineError> {
        self.apply(
            actor,
            Membership::Disqualify,
            &action.posting_id,
            action.candidate_ids,
        )
    }

    /// Public location of a candidate's uploaded resume.
    pub fn resume_url(
        &self,
        actor: &Actor,
        candidate_id: &CandidateId,
    ) -> Result<String, PipelineError> {
        self.authorize(actor, &[Capability::ViewJob, Capability::ManageJob])?;
        self.stores
            .candidates
            .fetch(candidate_id)
            .map_err(|err| self.internal("resume", err))?
            .ok_or(PipelineError::NotFound(MissingRecord::Candidate))?;

        Ok(format!("{}/{}.pdf", self.resumes_public_url, candidate_id))
    }

    /// Complete the running stage and start the next, binding an interview room when the new
    /// stage is an interview.
    pub fn advance_workflow(
        &self,
        actor: &Actor,
        posting_id: &PostingId,
    ) -> Result<AdvanceOutcome, PipelineError> {
        let organization = self.authorize(actor, &[Capability::ManageJob])?;
        let mut posting = self.load_posting(&organization, posting_id)?;

        let advance = posting
            .workflow
            .as_mut()
            .ok_or(PipelineError::InvalidState(
                PipelineState::WorkflowNotConfigured,
            ))?
            .advance()?;

        let active_step = advance
            .active_step()
            .and_then(|id| self.workflow.step(&posting, id))
            .cloned();

        let mut interview_code = None;
        if let Some(step) = active_step
            .as_ref()
            .filter(|step| step.step_type == StepType::Interview)
        {
            let code = match posting.interview_for(&step.id) {
                Some(room) => room.code.clone(),
                None => {
                    let code = Uuid::new_v4().simple().to_string();
                    posting.interviews.push(InterviewRoom {
                        code: code.clone(),
                        workflow_id: step.id.clone(),
                    });
                    code
                }
            };
            interview_code = Some(code);
        }

        self.workflow
            .store(&posting)
            .map_err(|err| self.internal("advance_workflow", err))?;

        match &advance {
            WorkflowAdvance::Finished(step) => {
                info!(posting = %posting.id, completed = %step, "workflow finished");
            }
            _ => info!(
                posting = %posting.id,
                active = ?active_step.as_ref().map(|step| step.step_type),
                "workflow advanced"
            ),
        }

        Ok(AdvanceOutcome {
            posting_id: posting.id,
            active_step,
            interview_code,
        })
    }

    fn apply(
        &self,
        actor: &Actor,
        membership: Membership,
        posting_id: &PostingId,
        candidate_ids: Vec<CandidateId>,
    ) -> Result<QualificationOutcome, PipelineError> {
        let organization = self.authorize(actor, &[Capability::ViewJob, Capability::ManageJob])?;
        let posting = self.load_posting(&organization, posting_id)?;
        let active = self.gate(&posting, membership)?;

        let candidate_ids = dedupe(candidate_ids);
        if candidate_ids.is_empty() {
            return Err(PipelineError::InvalidState(PipelineState::EmptySelection));
        }

        let applications = self.load_applications(&posting.id, &candidate_ids, membership)?;

        let updated: Vec<AppliedPosting> = applications
            .into_iter()
            .filter_map(|mut application| {
                let before = application.clone();
                match membership {
                    Membership::Qualify => {
                        if application.status != ApplicationStatus::Hired {
                            application.status = ApplicationStatus::InProgress;
                        }
                        application.disqualified_stage = None;
                    }
                    Membership::Disqualify => {
                        application.status = ApplicationStatus::Rejected;
                        application.disqualified_stage = Some(active.id.clone());
                    }
                }
                (application != before).then_some(application)
            })
            .collect();

        let mut candidates = posting.candidates.clone();
        let before = candidates.len();
        match membership {
            Membership::Qualify => {
                for id in &candidate_ids {
                    if !candidates.contains(id) {
                        candidates.push(id.clone());
                    }
                }
            }
            Membership::Disqualify => candidates.retain(|id| !candidate_ids.contains(id)),
        }
        let changed = before.abs_diff(candidates.len());

        if changed > 0 {
            self.stores
                .postings
                .save_candidates(&posting.id, &candidates)
                .map_err(|err| self.internal(membership.label(), err))?;
        }
        if !updated.is_empty() {
            if let Err(err) = self.stores.applications.save_all(&updated) {
                if changed > 0 {
                    self.restore_candidates(&posting);
                }
                return Err(self.internal(membership.label(), err));
            }
        }

        info!(
            operation = membership.label(),
            posting = %posting.id,
            step = %active.id,
            requested = candidate_ids.len(),
            changed,
            "candidate pipeline updated"
        );

        Ok(QualificationOutcome {
            posting_id: posting.id,
            candidates,
            changed,
        })
    }

    fn authorize(
        &self,
        actor: &Actor,
        any_of: &[Capability],
    ) -> Result<OrganizationId, PipelineError> {
        for capability in any_of {
            let granted = self
                .stores
                .permissions
                .organization_for(actor, *capability)
                .map_err(|err| self.internal("authorize", err))?;
            if let Some(organization) = granted {
                return Ok(organization);
            }
        }

        warn!(user = %actor.user_id, "pipeline operation denied: missing capability");
        Err(PipelineError::Unauthorized)
    }

    fn load_posting(
        &self,
        organization: &OrganizationId,
        posting_id: &PostingId,
    ) -> Result<Posting, PipelineError> {
        let posting = self
            .workflow
            .load(posting_id)
            .map_err(|err| self.internal("load_posting", err))?
            .ok_or(PipelineError::NotFound(MissingRecord::Posting))?;

        if &posting.organization_id != organization {
            warn!(
                posting = %posting_id,
                organization = %organization,
                "posting belongs to another organization"
            );
            return Err(PipelineError::NotFound(MissingRecord::Posting));
        }
        Ok(posting)
    }

    fn gate(&self, posting: &Posting, membership: Membership) -> Result<WorkflowStep, PipelineError> {
        let configured = posting
            .workflow
            .as_ref()
            .is_some_and(|workflow| !workflow.steps.is_empty());
        if !configured {
            return Err(PipelineError::InvalidState(
                PipelineState::WorkflowNotConfigured,
            ));
        }

        let active = self
            .workflow
            .active_step(posting)?
            .ok_or(PipelineError::InvalidState(PipelineState::NoActiveStep))?;

        if membership == Membership::Qualify && active.step_type != StepType::ResumeScreening {
            return Err(PipelineError::InvalidState(
                PipelineState::NotResumeScreening,
            ));
        }
        Ok(active.clone())
    }

    fn load_applications(
        &self,
        posting_id: &PostingId,
        candidate_ids: &[CandidateId],
        membership: Membership,
    ) -> Result<Vec<AppliedPosting>, PipelineError> {
        let mut applications = Vec::with_capacity(candidate_ids.len());
        for candidate_id in candidate_ids {
            self.stores
                .candidates
                .fetch(candidate_id)
                .map_err(|err| self.internal(membership.label(), err))?
                .ok_or(PipelineError::NotFound(MissingRecord::Candidate))?;

            let application = self
                .stores
                .applications
                .fetch(posting_id, candidate_id)
                .map_err(|err| self.internal(membership.label(), err))?
                .ok_or(PipelineError::NotFound(MissingRecord::Application))?;
            applications.push(application);
        }
        Ok(applications)
    }

    /// Put the candidate set back after a later write in the same operation failed.
    fn restore_candidates(&self, posting: &Posting) {
        if let Err(err) = self
            .stores
            .postings
            .save_candidates(&posting.id, &posting.candidates)
        {
            error!(
                posting = %posting.id,
                error = %err,
                "failed to restore candidate set after application write failure"
            );
        }
    }

    fn internal(&self, operation: &'static str, err: RepositoryError) -> PipelineError {
        error!(operation, error = %err, "pipeline persistence failure");
        PipelineError::Internal(err)
    }
}

fn dedupe(ids: Vec<CandidateId>) -> Vec<CandidateId> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}
