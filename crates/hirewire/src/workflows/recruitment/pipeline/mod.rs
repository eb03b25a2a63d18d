//! HR-side candidate qualification pipeline.

pub mod router;
pub mod service;

pub use router::pipeline_router;
pub use service::{
    AdvanceOutcome, BulkCandidateAction, CandidateAction, MissingRecord, PipelineCoordinator,
    PipelineError, PipelineState, QualificationOutcome,
};
