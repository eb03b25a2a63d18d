use std::sync::Arc;

use super::domain::{Posting, PostingId, StepId, WorkflowError, WorkflowStep};
use super::repository::{PostingRepository, RepositoryError};

/// Read/write access to a posting's ordered workflow steps; carries no business rules.
#[derive(Clone)]
pub struct WorkflowStateStore {
    postings: Arc<dyn PostingRepository>,
}

impl WorkflowStateStore {
    pub fn new(postings: Arc<dyn PostingRepository>) -> Self {
        Self { postings }
    }

    pub fn load(&self, id: &PostingId) -> Result<Option<Posting>, RepositoryError> {
        self.postings.fetch(id)
    }

    /// The single step currently `in-progress`, if any. More than one running step is an error.
    pub fn active_step<'a>(
        &self,
        posting: &'a Posting,
    ) -> Result<Option<&'a WorkflowStep>, WorkflowError> {
        let Some(workflow) = posting.workflow.as_ref() else {
            return Ok(None);
        };
        Ok(workflow
            .active_index()?
            .map(|index| &workflow.steps[index]))
    }

    pub fn step<'a>(&self, posting: &'a Posting, id: &StepId) -> Option<&'a WorkflowStep> {
        posting
            .workflow
            .as_ref()?
            .steps
            .iter()
            .find(|step| &step.id == id)
    }

    /// Persist the workflow statuses and interview bindings of `posting`.
    pub fn store(&self, posting: &Posting) -> Result<(), RepositoryError> {
        let workflow = posting.workflow.clone().unwrap_or_default();
        self.postings
            .save_workflow(&posting.id, &workflow, &posting.interviews)
    }
}
