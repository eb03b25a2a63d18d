use chrono::Duration;
use hirewire::config::AppConfig;
use hirewire::workflows::recruitment::interview::{
    InterviewState, RealtimeRendezvous, SessionTokenIssuer, SignedCallTokenProvider, TokenSigner,
    VideoGrantBridge,
};
use hirewire::workflows::recruitment::pipeline::PipelineCoordinator;
use hirewire::workflows::recruitment::{
    Actor, AppliedPosting, AppliedPostingRepository, Candidate, CandidateId, CandidateRepository,
    Capability, InterviewRoom, Organization, OrganizationId, OrganizationRepository,
    PermissionChecker, Posting, PostingId, PostingRepository, RecruitmentStores, RepositoryError,
    StepStatus, StepType, UserId, Workflow, WorkflowStep,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard};

pub(crate) const DEMO_POSTING: &str = "posting-backend";
pub(crate) const DEMO_ORGANIZATION: &str = "org-acme";
pub(crate) const DEMO_RECRUITER: &str = "user-recruiter";

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

fn guard<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, RepositoryError> {
    mutex
        .lock()
        .map_err(|_| RepositoryError::Unavailable("in-memory store poisoned".to_string()))
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryPostingRepository {
    records: Arc<Mutex<HashMap<PostingId, Posting>>>,
}

impl InMemoryPostingRepository {
    pub(crate) fn insert(&self, posting: Posting) -> Result<(), RepositoryError> {
        guard(&self.records)?.insert(posting.id.clone(), posting);
        Ok(())
    }
}

impl PostingRepository for InMemoryPostingRepository {
    fn fetch(&self, id: &PostingId) -> Result<Option<Posting>, RepositoryError> {
        Ok(guard(&self.records)?.get(id).cloned())
    }

    fn save_candidates(
        &self,
        id: &PostingId,
        candidates: &[CandidateId],
    ) -> Result<(), RepositoryError> {
        let mut records = guard(&self.records)?;
        let posting = records.get_mut(id).ok_or(RepositoryError::NotFound)?;
        posting.candidates = candidates.to_vec();
        Ok(())
    }

    fn save_workflow(
        &self,
        id: &PostingId,
        workflow: &Workflow,
        interviews: &[InterviewRoom],
    ) -> Result<(), RepositoryError> {
        let mut records = guard(&self.records)?;
        let posting = records.get_mut(id).ok_or(RepositoryError::NotFound)?;
        posting.workflow = Some(workflow.clone());
        posting.interviews = interviews.to_vec();
        Ok(())
    }
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryCandidateRepository {
    records: Arc<Mutex<HashMap<CandidateId, Candidate>>>,
}

impl InMemoryCandidateRepository {
    pub(crate) fn insert(&self, candidate: Candidate) -> Result<(), RepositoryError> {
        guard(&self.records)?.insert(candidate.id.clone(), candidate);
        Ok(())
    }
}

impl CandidateRepository for InMemoryCandidateRepository {
    fn fetch(&self, id: &CandidateId) -> Result<Option<Candidate>, RepositoryError> {
        Ok(guard(&self.records)?.get(id).cloned())
    }

    fn fetch_by_user(&self, user: &UserId) -> Result<Option<Candidate>, RepositoryError> {
        Ok(guard(&self.records)?
            .values()
            .find(|candidate| candidate.user_id.as_ref() == Some(user))
            .cloned())
    }
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryApplicationRepository {
    records: Arc<Mutex<HashMap<(PostingId, CandidateId), AppliedPosting>>>,
}

impl AppliedPostingRepository for InMemoryApplicationRepository {
    fn fetch(
        &self,
        posting: &PostingId,
        candidate: &CandidateId,
    ) -> Result<Option<AppliedPosting>, RepositoryError> {
        Ok(guard(&self.records)?
            .get(&(posting.clone(), candidate.clone()))
            .cloned())
    }

    fn save_all(&self, applications: &[AppliedPosting]) -> Result<(), RepositoryError> {
        let mut records = guard(&self.records)?;
        for application in applications {
            records.insert(
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

#[derive(Default, Clone)]
pub(crate) struct InMemoryOrganizationRepository {
    records: Arc<Mutex<HashMap<OrganizationId, Organization>>>,
}

impl InMemoryOrganizationRepository {
    pub(crate) fn insert(&self, organization: Organization) -> Result<(), RepositoryError> {
        guard(&self.records)?.insert(organization.id.clone(), organization);
        Ok(())
    }
}

impl OrganizationRepository for InMemoryOrganizationRepository {
    fn fetch(&self, id: &OrganizationId) -> Result<Option<Organization>, RepositoryError> {
        Ok(guard(&self.records)?.get(id).cloned())
    }
}

/// Static capability grants keyed by user and capability.
#[derive(Default, Clone)]
pub(crate) struct InMemoryPermissionChecker {
    grants: Arc<Mutex<HashMap<(UserId, Capability), OrganizationId>>>,
}

impl InMemoryPermissionChecker {
    pub(crate) fn grant(
        &self,
        user: &UserId,
        capability: Capability,
        organization: &OrganizationId,
    ) -> Result<(), RepositoryError> {
        guard(&self.grants)?.insert((user.clone(), capability), organization.clone());
        Ok(())
    }
}

impl PermissionChecker for InMemoryPermissionChecker {
    fn organization_for(
        &self,
        actor: &Actor,
        capability: Capability,
    ) -> Result<Option<OrganizationId>, RepositoryError> {
        Ok(guard(&self.grants)?
            .get(&(actor.user_id.clone(), capability))
            .cloned())
    }
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryStores {
    pub(crate) postings: InMemoryPostingRepository,
    pub(crate) candidates: InMemoryCandidateRepository,
    pub(crate) applications: InMemoryApplicationRepository,
    pub(crate) organizations: InMemoryOrganizationRepository,
    pub(crate) permissions: InMemoryPermissionChecker,
}

impl InMemoryStores {
    pub(crate) fn ports(&self) -> RecruitmentStores {
        RecruitmentStores {
            postings: Arc::new(self.postings.clone()),
            candidates: Arc::new(self.candidates.clone()),
            applications: Arc::new(self.applications.clone()),
            organizations: Arc::new(self.organizations.clone()),
            permissions: Arc::new(self.permissions.clone()),
        }
    }

    /// One organization with a recruiter, a three-stage posting in resume screening and three
    /// applicants.
    pub(crate) fn seeded() -> Result<Self, RepositoryError> {
        let stores = Self::default();
        let organization = OrganizationId::new(DEMO_ORGANIZATION);
        let recruiter = UserId::new(DEMO_RECRUITER);

        stores.organizations.insert(Organization {
            id: organization.clone(),
            name: "Acme Talent".to_string(),
            members: vec![recruiter.clone()],
        })?;
        stores
            .permissions
            .grant(&recruiter, Capability::ViewJob, &organization)?;
        stores
            .permissions
            .grant(&recruiter, Capability::ManageJob, &organization)?;

        let steps = vec![
            WorkflowStep::new("resume", StepType::ResumeScreening, StepStatus::InProgress),
            WorkflowStep::new("coding", StepType::CodingAssessment, StepStatus::Pending),
            WorkflowStep::new("interview", StepType::Interview, StepStatus::Pending),
        ];
        stores.postings.insert(Posting {
            id: PostingId::new(DEMO_POSTING),
            organization_id: organization,
            title: "Backend Engineer".to_string(),
            workflow: Some(Workflow::new(steps)),
            candidates: Vec::new(),
            interviews: Vec::new(),
        })?;

        let mut applications = Vec::new();
        for (id, name) in [
            ("cand-ada", "Ada Lovelace"),
            ("cand-alan", "Alan Turing"),
            ("cand-grace", "Grace Hopper"),
        ] {
            stores.candidates.insert(Candidate {
                id: CandidateId::new(id),
                user_id: Some(UserId::new(format!("user-{id}"))),
                name: name.to_string(),
                email: format!("{id}@example.com"),
            })?;
            applications.push(AppliedPosting::new(
                PostingId::new(DEMO_POSTING),
                CandidateId::new(id),
            ));
        }
        stores.applications.save_all(&applications)?;

        Ok(stores)
    }
}

/// Pipeline and interview collaborators wired from configuration.
pub(crate) struct Services {
    pub(crate) pipeline: Arc<PipelineCoordinator>,
    pub(crate) interview: InterviewState,
}

impl Services {
    pub(crate) fn build(config: &AppConfig, stores: RecruitmentStores) -> Self {
        let signer = Arc::new(TokenSigner::new(
            &config.session.secret,
            Duration::minutes(config.session.ttl_minutes),
        ));
        let provider = SignedCallTokenProvider::new(
            config.video.api_key.clone(),
            TokenSigner::new(
                &config.video.api_secret,
                Duration::minutes(config.video.ttl_minutes),
            ),
        );

        Self {
            pipeline: Arc::new(PipelineCoordinator::new(
                stores.clone(),
                config.resumes.public_url.clone(),
            )),
            interview: InterviewState {
                issuer: Arc::new(SessionTokenIssuer::new(stores, signer.clone())),
                signer: signer.clone(),
                bridge: VideoGrantBridge::new(Arc::new(provider)),
                rendezvous: Arc::new(RealtimeRendezvous::new(signer)),
            },
        }
    }
}
