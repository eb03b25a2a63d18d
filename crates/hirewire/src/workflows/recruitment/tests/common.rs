use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::Duration;
use serde_json::Value;

use crate::workflows::recruitment::access::{Actor, Capability};
use crate::workflows::recruitment::domain::{
    AppliedPosting, ApplicationStatus, Candidate, CandidateId, InterviewRoom, Organization,
    OrganizationId, Posting, PostingId, StepId, StepStatus, StepType, UserId, Workflow,
    WorkflowStep,
};
use crate::workflows::recruitment::interview::TokenSigner;
use crate::workflows::recruitment::repository::{
    AppliedPostingRepository, CandidateRepository, OrganizationRepository, PermissionChecker,
    PostingRepository, RecruitmentStores, RepositoryError,
};

pub(crate) const POSTING: &str = "posting-1";
pub(crate) const ORGANIZATION: &str = "org-1";
pub(crate) const RECRUITER: &str = "hr-1";
pub(crate) const ROOM_CODE: &str = "room-abc";

pub(crate) fn posting_id() -> PostingId {
    PostingId::new(POSTING)
}

pub(crate) fn candidate(index: usize) -> CandidateId {
    CandidateId::new(format!("c-{index}"))
}

pub(crate) fn candidate_user(index: usize) -> Actor {
    Actor::new(format!("user-c-{index}"))
}

pub(crate) fn recruiter() -> Actor {
    Actor::new(RECRUITER)
}

pub(crate) fn posting_with_steps(steps: &[(StepType, StepStatus)]) -> Posting {
    let steps = steps
        .iter()
        .enumerate()
        .map(|(index, (step_type, status))| {
            WorkflowStep::new(format!("step-{index}"), *step_type, *status)
        })
        .collect();

    Posting {
        id: posting_id(),
        organization_id: OrganizationId::new(ORGANIZATION),
        title: "Backend Engineer".to_string(),
        workflow: Some(Workflow::new(steps)),
        candidates: Vec::new(),
        interviews: Vec::new(),
    }
}

pub(crate) fn session_signer() -> Arc<TokenSigner> {
    Arc::new(TokenSigner::new("test-session-secret", Duration::minutes(30)))
}

#[derive(Default, Clone)]
pub(crate) struct MemoryPostings {
    records: Arc<Mutex<HashMap<PostingId, Posting>>>,
}

impl MemoryPostings {
    pub(crate) fn insert(&self, posting: Posting) {
        self.records
            .lock()
            .expect("posting mutex poisoned")
            .insert(posting.id.clone(), posting);
    }

    pub(crate) fn get(&self, id: &PostingId) -> Posting {
        self.records
            .lock()
            .expect("posting mutex poisoned")
            .get(id)
            .cloned()
            .expect("posting seeded")
    }
}

impl PostingRepository for MemoryPostings {
    fn fetch(&self, id: &PostingId) -> Result<Option<Posting>, RepositoryError> {
        Ok(self
            .records
            .lock()
            .expect("posting mutex poisoned")
            .get(id)
            .cloned())
    }

    fn save_candidates(
        &self,
        id: &PostingId,
        candidates: &[CandidateId],
    ) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("posting mutex poisoned");
        let posting = guard.get_mut(id).ok_or(RepositoryError::NotFound)?;
        posting.candidates = candidates.to_vec();
        Ok(())
    }

    fn save_workflow(
        &self,
        id: &PostingId,
        workflow: &Workflow,
        interviews: &[InterviewRoom],
    ) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("posting mutex poisoned");
        let posting = guard.get_mut(id).ok_or(RepositoryError::NotFound)?;
        posting.workflow = Some(workflow.clone());
        posting.interviews = interviews.to_vec();
        Ok(())
    }
}

/// Reads succeed, every write fails.
pub(crate) struct ReadOnlyPostings(pub(crate) MemoryPostings);

impl PostingRepository for ReadOnlyPostings {
    fn fetch(&self, id: &PostingId) -> Result<Option<Posting>, RepositoryError> {
        self.0.fetch(id)
    }

    fn save_candidates(
        &self,
        _id: &PostingId,
        _candidates: &[CandidateId],
    ) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn save_workflow(
        &self,
        _id: &PostingId,
        _workflow: &Workflow,
        _interviews: &[InterviewRoom],
    ) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

#[derive(Default, Clone)]
pub(crate) struct MemoryCandidates {
    records: Arc<Mutex<HashMap<CandidateId, Candidate>>>,
}

impl MemoryCandidates {
    pub(crate) fn insert(&self, candidate: Candidate) {
        self.records
            .lock()
            .expect("candidate mutex poisoned")
            .insert(candidate.id.clone(), candidate);
    }
}

impl CandidateRepository for MemoryCandidates {
    fn fetch(&self, id: &CandidateId) -> Result<Option<Candidate>, RepositoryError> {
        Ok(self
            .records
            .lock()
            .expect("candidate mutex poisoned")
            .get(id)
            .cloned())
    }

    fn fetch_by_user(&self, user: &UserId) -> Result<Option<Candidate>, RepositoryError> {
        Ok(self
            .records
            .lock()
            .expect("candidate mutex poisoned")
            .values()
            .find(|candidate| candidate.user_id.as_ref() == Some(user))
            .cloned())
    }
}

#[derive(Default, Clone)]
pub(crate) struct MemoryApplications {
    records: Arc<Mutex<HashMap<(PostingId, CandidateId), AppliedPosting>>>,
}

impl MemoryApplications {
    pub(crate) fn get(&self, posting: &PostingId, candidate: &CandidateId) -> AppliedPosting {
        self.fetch(posting, candidate)
            .expect("fetch succeeds")
            .expect("application seeded")
    }

    pub(crate) fn set_status(&self, candidate: &CandidateId, status: ApplicationStatus) {
        let mut record = self.get(&posting_id(), candidate);
        record.status = status;
        self.save_all(&[record]).expect("save succeeds");
    }
}

impl AppliedPostingRepository for MemoryApplications {
    fn fetch(
        &self,
        posting: &PostingId,
        candidate: &CandidateId,
    ) -> Result<Option<AppliedPosting>, RepositoryError> {
        Ok(self
            .records
            .lock()
            .expect("application mutex poisoned")
            .get(&(posting.clone(), candidate.clone()))
            .cloned())
    }

    fn save_all(&self, applications: &[AppliedPosting]) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("application mutex poisoned");
        for application in applications {
            guard.insert(
                (
                    application.posting_id.clone(),
                    application.candidate_id.clone(),
                ),
                application.clone(),
            );
        }
        Ok(())
    }
}

/// Reads succeed, status writes fail.
pub(crate) struct ReadOnlyApplications(pub(crate) MemoryApplications);

impl AppliedPostingRepository for ReadOnlyApplications {
    fn fetch(
        &self,
        posting: &PostingId,
        candidate: &CandidateId,
    ) -> Result<Option<AppliedPosting>, RepositoryError> {
        self.0.fetch(posting, candidate)
    }

    fn save_all(&self, _applications: &[AppliedPosting]) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

#[derive(Default, Clone)]
pub(crate) struct MemoryOrganizations {
    records: Arc<Mutex<HashMap<OrganizationId, Organization>>>,
}

impl MemoryOrganizations {
    pub(crate) fn insert(&self, organization: Organization) {
        self.records
            .lock()
            .expect("organization mutex poisoned")
            .insert(organization.id.clone(), organization);
    }
}

impl OrganizationRepository for MemoryOrganizations {
    fn fetch(&self, id: &OrganizationId) -> Result<Option<Organization>, RepositoryError> {
        Ok(self
            .records
            .lock()
            .expect("organization mutex poisoned")
            .get(id)
            .cloned())
    }
}

#[derive(Default, Clone)]
pub(crate) struct StaticPermissions {
    grants: Arc<Mutex<HashMap<(UserId, Capability), OrganizationId>>>,
}

impl StaticPermissions {
    pub(crate) fn grant(&self, actor: &Actor, capability: Capability, organization: &str) {
        self.grants
            .lock()
            .expect("permission mutex poisoned")
            .insert(
                (actor.user_id.clone(), capability),
                OrganizationId::new(organization),
            );
    }
}

impl PermissionChecker for StaticPermissions {
    fn organization_for(
        &self,
        actor: &Actor,
        capability: Capability,
    ) -> Result<Option<OrganizationId>, RepositoryError> {
        Ok(self
            .grants
            .lock()
            .expect("permission mutex poisoned")
            .get(&(actor.user_id.clone(), capability))
            .cloned())
    }
}

/// Seeded in-memory document store: one organization, one posting, three applicants.
#[derive(Default, Clone)]
pub(crate) struct Fixture {
    pub(crate) postings: MemoryPostings,
    pub(crate) candidates: MemoryCandidates,
    pub(crate) applications: MemoryApplications,
    pub(crate) organizations: MemoryOrganizations,
    pub(crate) permissions: StaticPermissions,
}

impl Fixture {
    pub(crate) fn with_steps(steps: &[(StepType, StepStatus)]) -> Self {
        let fixture = Self::default();
        fixture.postings.insert(posting_with_steps(steps));

        fixture.organizations.insert(Organization {
            id: OrganizationId::new(ORGANIZATION),
            name: "Acme Hiring".to_string(),
            members: vec![recruiter().user_id],
        });
        fixture
            .permissions
            .grant(&recruiter(), Capability::ViewJob, ORGANIZATION);
        fixture
            .permissions
            .grant(&recruiter(), Capability::ManageJob, ORGANIZATION);

        for index in 1..=3 {
            fixture.candidates.insert(Candidate {
                id: candidate(index),
                user_id: Some(candidate_user(index).user_id),
                name: format!("Candidate {index}"),
                email: format!("c{index}@example.com"),
            });
            fixture
                .applications
                .save_all(&[AppliedPosting::new(posting_id(), candidate(index))])
                .expect("seed application");
        }

        fixture
    }

    /// Posting currently running an interview step bound to [`ROOM_CODE`].
    pub(crate) fn interviewing() -> Self {
        let fixture = Self::with_steps(&[
            (StepType::ResumeScreening, StepStatus::Completed),
            (StepType::Interview, StepStatus::InProgress),
        ]);
        let mut posting = fixture.postings.get(&posting_id());
        posting.interviews.push(InterviewRoom {
            code: ROOM_CODE.to_string(),
            workflow_id: StepId::new("step-1"),
        });
        fixture.postings.insert(posting);
        fixture
    }

    pub(crate) fn set_candidates(&self, candidates: &[CandidateId]) {
        self.postings
            .save_candidates(&posting_id(), candidates)
            .expect("seed candidates");
    }

    pub(crate) fn candidates_of_posting(&self) -> Vec<CandidateId> {
        self.postings.get(&posting_id()).candidates
    }

    pub(crate) fn stores(&self) -> RecruitmentStores {
        RecruitmentStores {
            postings: Arc::new(self.postings.clone()),
            candidates: Arc::new(self.candidates.clone()),
            applications: Arc::new(self.applications.clone()),
            organizations: Arc::new(self.organizations.clone()),
            permissions: Arc::new(self.permissions.clone()),
        }
    }
}

pub(crate) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
