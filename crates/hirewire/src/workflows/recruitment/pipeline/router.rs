use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use super::service::{BulkCandidateAction, CandidateAction, PipelineCoordinator};
use crate::workflows::recruitment::access::{Actor, JsonBody, QueryParams};
use crate::workflows::recruitment::domain::{CandidateId, PostingId};

/// Router builder exposing the HR-side pipeline endpoints.
pub fn pipeline_router(coordinator: Arc<PipelineCoordinator>) -> Router {
    Router::new()
        .route("/candidates/qualify", post(qualify_handler))
        .route("/candidates/disqualify", post(disqualify_handler))
        .route("/candidates/bulk-qualify", post(bulk_qualify_handler))
        .route("/candidates/bulk-disqualify", post(bulk_disqualify_handler))
        .route("/candidates/resume", get(resume_handler))
        .route("/workflow/advance", post(advance_handler))
        .with_state(coordinator)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ResumeQuery {
    pub(crate) candidate_id: CandidateId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AdvanceRequest {
    pub(crate) posting_id: PostingId,
}

pub(crate) async fn qualify_handler(
    State(coordinator): State<Arc<PipelineCoordinator>>,
    actor: Actor,
    JsonBody(action): JsonBody<CandidateAction>,
) -> Response {
    match coordinator.qualify(&actor, action) {
        Ok(outcome) => (StatusCode::OK, axum::Json(outcome)).into_response(),
        Err(error) => error.into_response(),
    }
}

pub(crate) async fn disqualify_handler(
    State(coordinator): State<Arc<PipelineCoordinator>>,
    actor: Actor,
    JsonBody(action): JsonBody<CandidateAction>,
) -> Response {
    match coordinator.disqualify(&actor, action) {
        Ok(outcome) => (StatusCode::OK, axum::Json(outcome)).into_response(),
        Err(error) => error.into_response(),
    }
}

pub(crate) async fn bulk_qualify_handler(
    State(coordinator): State<Arc<PipelineCoordinator>>,
    actor: Actor,
    JsonBody(action): JsonBody<BulkCandidateAction>,
) -> Response {
    match coordinator.bulk_qualify(&actor, action) {
        Ok(outcome) => (StatusCode::OK, axum::Json(outcome)).into_response(),
        Err(error) => error.into_response(),
    }
}

pub(crate) async fn bulk_disqualify_handler(
    State(coordinator): State<Arc<PipelineCoordinator>>,
    actor: Actor,
    JsonBody(action): JsonBody<BulkCandidateAction>,
) -> Response {
    match coordinator.bulk_disqualify(&actor, action) {
        Ok(outcome) => (StatusCode::OK, axum::Json(outcome)).into_response(),
        Err(error) => error.into_response(),
    }
}

pub(crate) async fn resume_handler(
    State(coordinator): State<Arc<PipelineCoordinator>>,
    actor: Actor,
    QueryParams(query): QueryParams<ResumeQuery>,
) -> Response {
    match coordinator.resume_url(&actor, &query.candidate_id) {
        Ok(url) => (StatusCode::OK, axum::Json(json!({ "resumeUrl": url }))).into_response(),
        Err(error) => error.into_response(),
    }
}

pub(crate) async fn advance_handler(
    State(coordinator): State<Arc<PipelineCoordinator>>,
    actor: Actor,
    JsonBody(request): JsonBody<AdvanceRequest>,
) -> Response {
    match coordinator.advance_workflow(&actor, &request.posting_id) {
        Ok(outcome) => (StatusCode::OK, axum::Json(outcome)).into_response(),
        Err(error) => error.into_response(),
    }
}
