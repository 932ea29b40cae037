//! HTTP handlers for submissions and votes.
//!
//! Mutating routes take an [`Actor`] extracted from the bearer session token;
//! reads are public.

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use vigil_core::api::{
    AuditLog, AuditQuery, CastVoteRequest, CastVoteResponse, ListQuery, NewSubmission,
    RemoveVoteRequest, RemoveVoteResponse, SubmissionList, SubmissionView, VoteList,
};
use vigil_core::submission::UnknownTargetKind;
use vigil_core::{TargetKind, TargetRef};

use crate::auth::Actor;
use crate::error::ModerationError;
use crate::AppState;

type ApiResult<T> = Result<Json<T>, ModerationError>;

pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/votes", post(cast_vote).delete(remove_vote))
        .route(
            "/submissions",
            post(create_submission).get(list_submissions),
        )
        .route("/submissions/:kind/:id", get(get_submission))
        .route("/submissions/:kind/:id/submit", post(submit_for_review))
        .route("/submissions/:kind/:id/votes", get(list_votes))
        .route("/submissions/:kind/:id/audit", get(audit_log))
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ModerationError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ModerationError::InvalidInput(rejection.body_text()))
}

fn query_params<T>(query: Result<Query<T>, QueryRejection>) -> Result<T, ModerationError> {
    query
        .map(|Query(params)| params)
        .map_err(|rejection| ModerationError::InvalidInput(rejection.body_text()))
}

fn parse_target((kind, id): (String, String)) -> Result<TargetRef, ModerationError> {
    let kind: TargetKind = kind
        .parse()
        .map_err(|e: UnknownTargetKind| ModerationError::InvalidInput(e.to_string()))?;
    Ok(TargetRef::new(kind, id))
}

async fn cast_vote(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    payload: Result<Json<CastVoteRequest>, JsonRejection>,
) -> ApiResult<CastVoteResponse> {
    let request = json_body(payload)?;
    let response = state.moderation.cast_vote(&actor.id, request).await?;
    Ok(Json(response))
}

async fn remove_vote(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    payload: Result<Json<RemoveVoteRequest>, JsonRejection>,
) -> ApiResult<RemoveVoteResponse> {
    let request = json_body(payload)?;
    let response = state.moderation.remove_vote(&actor.id, request).await?;
    Ok(Json(response))
}

async fn create_submission(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    payload: Result<Json<NewSubmission>, JsonRejection>,
) -> Result<(StatusCode, Json<SubmissionView>), ModerationError> {
    let request = json_body(payload)?;
    let view = state.moderation.create_submission(&actor.id, request).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

async fn list_submissions(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> ApiResult<SubmissionList> {
    let query = query_params(query)?;
    let submissions = state.moderation.list_submissions(&query).await?;
    Ok(Json(SubmissionList { submissions }))
}

async fn get_submission(
    State(state): State<Arc<AppState>>,
    Path(path): Path<(String, String)>,
) -> ApiResult<SubmissionView> {
    let target = parse_target(path)?;
    Ok(Json(state.moderation.get_submission(&target).await?))
}

async fn submit_for_review(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(path): Path<(String, String)>,
) -> ApiResult<SubmissionView> {
    let target = parse_target(path)?;
    Ok(Json(
        state
            .moderation
            .submit_for_review(&target, &actor.id)
            .await?,
    ))
}

async fn list_votes(
    State(state): State<Arc<AppState>>,
    Path(path): Path<(String, String)>,
) -> ApiResult<VoteList> {
    let target = parse_target(path)?;
    let votes = state.moderation.votes(&target).await?;
    Ok(Json(VoteList { votes }))
}

async fn audit_log(
    State(state): State<Arc<AppState>>,
    Path(path): Path<(String, String)>,
    query: Result<Query<AuditQuery>, QueryRejection>,
) -> ApiResult<AuditLog> {
    let target = parse_target(path)?;
    let query = query_params(query)?;
    let entries = state.moderation.audit_log(&target, query.limit).await?;
    Ok(Json(AuditLog { entries }))
}
