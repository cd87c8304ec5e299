use axum::{
    extract::{Path, State},
    response::Json,
    Json as RequestJson,
};
use serde::{Deserialize, Serialize};

use crate::api::handlers::{deploy_error, ApiResult, AppState};
use crate::logic::{DeployOutcome, SessionInfo};
use crate::model::{
    ChangeEntry, DiffSummary, Operation, PendingOperation, RepositoryStatus, UserContext,
};
use crate::store::RepositoryHost;

#[derive(Debug, Default, Deserialize)]
pub struct StartSessionRequest {
    /// Commit or branch to stage against; the published base when omitted
    pub base_ref: Option<String>,
    /// Previously recorded operations to resume
    #[serde(default)]
    pub operations: Vec<PendingOperation>,
}

pub async fn start_session<R: RepositoryHost>(
    State(controller): State<AppState<R>>,
    Path(name): Path<String>,
    user: UserContext,
    payload: Option<RequestJson<StartSessionRequest>>,
) -> ApiResult<SessionInfo> {
    let request = payload.map(|RequestJson(r)| r).unwrap_or_default();
    let info = controller
        .start_session(&name, request.base_ref.as_deref(), request.operations, &user)
        .await
        .map_err(deploy_error)?;
    Ok(Json(info))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DiscardResponse {
    pub dataset: String,
    pub discarded_operations: usize,
}

pub async fn discard_session<R: RepositoryHost>(
    State(controller): State<AppState<R>>,
    Path(name): Path<String>,
    user: UserContext,
) -> ApiResult<DiscardResponse> {
    let discarded = controller.discard(&name).map_err(deploy_error)?;
    log::info!("{} discarded the staging session on '{}'", user.user_id, name);
    Ok(Json(DiscardResponse {
        dataset: name,
        discarded_operations: discarded,
    }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PendingResponse {
    pub session: Option<SessionInfo>,
    pub operations: Vec<PendingOperation>,
}

pub async fn list_operations<R: RepositoryHost>(
    State(controller): State<AppState<R>>,
    Path(name): Path<String>,
) -> ApiResult<PendingResponse> {
    let session = controller.session_info(&name).map_err(deploy_error)?;
    let operations = controller.pending(&name).map_err(deploy_error)?;
    Ok(Json(PendingResponse {
        session,
        operations,
    }))
}

/// Body is the operation itself, e.g. `{"kind": "delete", "item_id": "s1"}`
pub async fn stage_operation<R: RepositoryHost>(
    State(controller): State<AppState<R>>,
    Path(name): Path<String>,
    user: UserContext,
    RequestJson(operation): RequestJson<Operation>,
) -> ApiResult<PendingOperation> {
    let staged = controller
        .stage(&name, PendingOperation::new(operation, user.user_id))
        .map_err(deploy_error)?;
    Ok(Json(staged))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UnstageResponse {
    pub item_id: String,
    pub removed_operations: usize,
}

pub async fn unstage_item<R: RepositoryHost>(
    State(controller): State<AppState<R>>,
    Path((name, item_id)): Path<(String, String)>,
) -> ApiResult<UnstageResponse> {
    let removed = controller.unstage(&name, &item_id).map_err(deploy_error)?;
    Ok(Json(UnstageResponse {
        item_id,
        removed_operations: removed,
    }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DiffResponse {
    pub dataset: String,
    pub summary: DiffSummary,
    pub changes: Vec<ChangeEntry>,
}

pub async fn get_diff<R: RepositoryHost>(
    State(controller): State<AppState<R>>,
    Path(name): Path<String>,
) -> ApiResult<DiffResponse> {
    let changes = controller.diff(&name).map_err(deploy_error)?;
    Ok(Json(DiffResponse {
        dataset: name,
        summary: DiffSummary::from_entries(&changes),
        changes,
    }))
}

pub async fn get_status<R: RepositoryHost>(
    State(controller): State<AppState<R>>,
    Path(name): Path<String>,
) -> ApiResult<RepositoryStatus> {
    let status = controller.status(&name).await.map_err(deploy_error)?;
    Ok(Json(status))
}

pub async fn deploy<R: RepositoryHost>(
    State(controller): State<AppState<R>>,
    Path(name): Path<String>,
    user: UserContext,
) -> ApiResult<DeployOutcome> {
    let outcome = controller.deploy(&name, &user).await.map_err(deploy_error)?;
    Ok(Json(outcome))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RefreshResponse {
    pub dataset: String,
    pub base_ref: String,
}

pub async fn refresh<R: RepositoryHost>(
    State(controller): State<AppState<R>>,
    Path(name): Path<String>,
) -> ApiResult<RefreshResponse> {
    let base_ref = controller.refresh(&name).await.map_err(deploy_error)?;
    Ok(Json(RefreshResponse {
        dataset: name,
        base_ref,
    }))
}
