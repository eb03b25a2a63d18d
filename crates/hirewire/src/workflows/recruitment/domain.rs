use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(
    /// Identifier of a job or drive opening.
    PostingId
);
string_id!(
    /// Identifier of a candidate profile.
    CandidateId
);
string_id!(
    /// Identifier of an authenticated platform user.
    UserId
);
string_id!(OrganizationId);
string_id!(
    /// Identifier of a single workflow step within a posting.
    StepId
);

/// Fixed set of hiring stages a workflow may contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepType {
    ResumeScreening,
    McqAssessment,
    CodingAssessment,
    Assignment,
    Interview,
    Custom,
}

impl StepType {
    pub const fn label(self) -> &'static str {
        match self {
            Self::ResumeScreening => "Resume Screening",
            Self::McqAssessment => "MCQ Assessment",
            Self::CodingAssessment => "Coding Assessment",
            Self::Assignment => "Assignment",
            Self::Interview => "Interview",
            Self::Custom => "Custom",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl StepStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in-progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub id: StepId,
    #[serde(rename = "type")]
    pub step_type: StepType,
    pub name: String,
    pub status: StepStatus,
}

impl WorkflowStep {
    pub fn new(id: impl Into<String>, step_type: StepType, status: StepStatus) -> Self {
        Self {
            id: StepId::new(id),
            step_type,
            name: step_type.label().to_string(),
            status,
        }
    }
}

/// Ordered hiring stages attached to a posting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workflow {
    pub steps: Vec<WorkflowStep>,
}

/// Result of moving a workflow forward by one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowAdvance {
    Started(StepId),
    Moved { completed: StepId, started: StepId },
    Finished(StepId),
}

impl WorkflowAdvance {
    pub fn active_step(&self) -> Option<&StepId> {
        match self {
            WorkflowAdvance::Started(step) | WorkflowAdvance::Moved { started: step, .. } => {
                Some(step)
            }
            WorkflowAdvance::Finished(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkflowError {
    #[error("workflow not configured")]
    NotConfigured,
    #[error("workflow has {0} steps in progress")]
    MultipleActiveSteps(usize),
    #[error("workflow already completed")]
    AlreadyCompleted,
}

impl Workflow {
    pub fn new(steps: Vec<WorkflowStep>) -> Self {
        Self { steps }
    }

    pub(crate) fn active_index(&self) -> Result<Option<usize>, WorkflowError> {
        let mut active = self
            .steps
            .iter()
            .enumerate()
            .filter(|(_, step)| step.status == StepStatus::InProgress)
            .map(|(index, _)| index);

        let first = active.next();
        let extra = active.count();
        if extra > 0 {
            return Err(WorkflowError::MultipleActiveSteps(extra + 1));
        }
        Ok(first)
    }

    /// Complete the active step and start the one after it. With nothing running, the first
    /// pending step starts.
    pub fn advance(&mut self) -> Result<WorkflowAdvance, WorkflowError> {
        if self.steps.is_empty() {
            return Err(WorkflowError::NotConfigured);
        }

        match self.active_index()? {
            None => {
                let next = self
                    .steps
                    .iter_mut()
                    .find(|step| step.status == StepStatus::Pending)
                    .ok_or(WorkflowError::AlreadyCompleted)?;
                next.status = StepStatus::InProgress;
                Ok(WorkflowAdvance::Started(next.id.clone()))
            }
            Some(index) => {
                self.steps[index].status = StepStatus::Completed;
                let completed = self.steps[index].id.clone();
                match self.steps.get_mut(index + 1) {
                    Some(next) => {
                        next.status = StepStatus::InProgress;
                        Ok(WorkflowAdvance::Moved {
                            completed,
                            started: next.id.clone(),
                        })
                    }
                    None => Ok(WorkflowAdvance::Finished(completed)),
                }
            }
        }
    }
}

/// Binds a signaling room code to the INTERVIEW step that activated it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterviewRoom {
    pub code: String,
    pub workflow_id: StepId,
}

/// Job/drive opening with its workflow, qualified candidates, and interview bindings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Posting {
    pub id: PostingId,
    pub organization_id: OrganizationId,
    pub title: String,
    #[serde(default)]
    pub workflow: Option<Workflow>,
    #[serde(default)]
    pub candidates: Vec<CandidateId>,
    #[serde(default)]
    pub interviews: Vec<InterviewRoom>,
}

impl Posting {
    pub fn has_candidate(&self, candidate: &CandidateId) -> bool {
        self.candidates.contains(candidate)
    }

    pub fn interview_for(&self, step: &StepId) -> Option<&InterviewRoom> {
        self.interviews
            .iter()
            .find(|interview| &interview.workflow_id == step)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub id: CandidateId,
    #[serde(default)]
    pub user_id: Option<UserId>,
    pub name: String,
    pub email: String,
}

/// Outcome status of a candidate's application to a posting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplicationStatus {
    Applied,
    InProgress,
    Hired,
    Rejected,
}

impl ApplicationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::InProgress => "inprogress",
            Self::Hired => "hired",
            Self::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedPosting {
    pub posting_id: PostingId,
    pub candidate_id: CandidateId,
    pub status: ApplicationStatus,
    #[serde(default)]
    pub disqualified_stage: Option<StepId>,
}

impl AppliedPosting {
    pub fn new(posting_id: PostingId, candidate_id: CandidateId) -> Self {
        Self {
            posting_id,
            candidate_id,
            status: ApplicationStatus::Applied,
            disqualified_stage: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: OrganizationId,
    pub name: String,
    pub members: Vec<UserId>,
}

impl Organization {
    pub fn is_member(&self, user: &UserId) -> bool {
        self.members.contains(user)
    }
}
