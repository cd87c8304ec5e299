use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::logic::{DeployError, DeploymentController, StagingError};
use crate::model::{ItemLevel, TaxonomyDataset, TaxonomyItem, MAX_DEPTH};
use crate::store::{DatasetSummary, ReadView, RegistryError, RepositoryHost};

pub type AppState<R> = Arc<DeploymentController<R>>;

pub type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

/// Simple health check endpoint
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    /// Machine-readable error code
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    pub fn new(kind: &str, message: &str) -> Self {
        Self {
            error: message.to_string(),
            kind: kind.to_string(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

pub fn api_error(status: StatusCode, kind: &str, message: &str) -> (StatusCode, Json<ErrorResponse>) {
    (status, Json(ErrorResponse::new(kind, message)))
}

/// HTTP status and body for a controller error
pub fn deploy_error(error: DeployError) -> (StatusCode, Json<ErrorResponse>) {
    let message = error.to_string();
    let (status, kind, details) = match &error {
        DeployError::UnknownDataset(_) => (StatusCode::NOT_FOUND, "unknown_dataset", None),
        DeployError::NotLoaded(_) => (StatusCode::SERVICE_UNAVAILABLE, "not_loaded", None),
        DeployError::NoSession { .. } => (StatusCode::CONFLICT, "no_session", None),
        DeployError::SessionActive { .. } => (StatusCode::CONFLICT, "session_active", None),
        DeployError::NothingToDeploy { .. } => (StatusCode::CONFLICT, "nothing_to_deploy", None),
        DeployError::DeployInProgress { .. } => (StatusCode::CONFLICT, "deploy_in_progress", None),
        DeployError::RemoteStale { .. } => (StatusCode::CONFLICT, "remote_stale", None),
        DeployError::ValidationFailed { errors, .. } => (
            StatusCode::UNPROCESSABLE_ENTITY,
            "validation_failed",
            serde_json::to_value(errors).ok(),
        ),
        DeployError::Staging(staging) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            "staging_rejected",
            staging_details(staging),
        ),
        DeployError::Transport(e) => (
            StatusCode::BAD_GATEWAY,
            "transport",
            Some(serde_json::json!({ "retryable": e.is_retryable() })),
        ),
        DeployError::Serialization(_) => (StatusCode::INTERNAL_SERVER_ERROR, "serialization", None),
    };
    let mut body = ErrorResponse::new(kind, &message);
    if let Some(details) = details {
        body = body.with_details(details);
    }
    (status, Json(body))
}

fn staging_details(error: &StagingError) -> Option<serde_json::Value> {
    match error {
        StagingError::Invalid(rule) => serde_json::to_value([rule]).ok(),
        StagingError::WouldInvalidate { errors, .. } => serde_json::to_value(errors).ok(),
        _ => None,
    }
}

fn registry_error(error: RegistryError) -> (StatusCode, Json<ErrorResponse>) {
    deploy_error(error.into())
}

#[derive(Debug, Default, Deserialize)]
pub struct ViewQuery {
    #[serde(default)]
    pub view: ReadView,
}

pub async fn list_datasets<R: RepositoryHost>(
    State(controller): State<AppState<R>>,
) -> Json<Vec<DatasetSummary>> {
    Json(controller.registry().summaries())
}

pub async fn get_dataset<R: RepositoryHost>(
    State(controller): State<AppState<R>>,
    Path(name): Path<String>,
    Query(query): Query<ViewQuery>,
) -> ApiResult<TaxonomyDataset> {
    let dataset = controller
        .registry()
        .get_dataset(&name, query.view)
        .map_err(registry_error)?;
    Ok(Json(TaxonomyDataset::clone(&dataset)))
}

pub async fn get_item<R: RepositoryHost>(
    State(controller): State<AppState<R>>,
    Path((name, item_id)): Path<(String, String)>,
    Query(query): Query<ViewQuery>,
) -> ApiResult<TaxonomyItem> {
    match controller
        .registry()
        .find_by_id(&name, &item_id, query.view)
        .map_err(registry_error)?
    {
        Some(item) => Ok(Json(item)),
        None => Err(api_error(
            StatusCode::NOT_FOUND,
            "item_not_found",
            &format!("Item '{}' not found in '{}'", item_id, name),
        )),
    }
}

#[derive(Debug, Deserialize)]
pub struct LevelSlugQuery {
    pub level: ItemLevel,
    pub slug: String,
    #[serde(default)]
    pub view: ReadView,
}

/// Every item of a level with the given slug, e.g. all `plumbing` subcategories
pub async fn find_by_level_slug<R: RepositoryHost>(
    State(controller): State<AppState<R>>,
    Path(name): Path<String>,
    Query(query): Query<LevelSlugQuery>,
) -> ApiResult<Vec<TaxonomyItem>> {
    let items = controller
        .registry()
        .find_by_level_slug(&name, query.level, &query.slug, query.view)
        .map_err(registry_error)?;
    Ok(Json(items))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ItemPathResponse {
    pub item_id: String,
    /// Slugs from the root down to the item, e.g. `["home", "plumbing"]`
    pub slugs: Vec<String>,
    pub items: Vec<TaxonomyItem>,
}

pub async fn get_item_path<R: RepositoryHost>(
    State(controller): State<AppState<R>>,
    Path((name, item_id)): Path<(String, String)>,
    Query(query): Query<ViewQuery>,
) -> ApiResult<ItemPathResponse> {
    let path = controller
        .registry()
        .ancestor_path(&name, &item_id, query.view)
        .map_err(registry_error)?
        .ok_or_else(|| {
            api_error(
                StatusCode::NOT_FOUND,
                "item_not_found",
                &format!("Item '{}' not found in '{}'", item_id, name),
            )
        })?;
    Ok(Json(ItemPathResponse {
        item_id,
        slugs: path.iter().map(|item| item.slug.clone()).collect(),
        items: path,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ChildrenQuery {
    /// Omit for top-level items
    pub parent: Option<String>,
    #[serde(default)]
    pub view: ReadView,
}

pub async fn get_children<R: RepositoryHost>(
    State(controller): State<AppState<R>>,
    Path(name): Path<String>,
    Query(query): Query<ChildrenQuery>,
) -> ApiResult<Vec<TaxonomyItem>> {
    let children = controller
        .registry()
        .children(&name, query.parent.as_deref(), query.view)
        .map_err(registry_error)?;
    Ok(Json(children))
}

#[derive(Debug, Deserialize)]
pub struct LookupQuery {
    /// Slash-separated slug path, e.g. `home/plumbing`
    pub path: String,
    #[serde(default)]
    pub view: ReadView,
}

pub async fn lookup_by_path<R: RepositoryHost>(
    State(controller): State<AppState<R>>,
    Path(name): Path<String>,
    Query(query): Query<LookupQuery>,
) -> ApiResult<TaxonomyItem> {
    let slugs: Vec<&str> = query.path.split('/').filter(|s| !s.is_empty()).collect();
    if slugs.is_empty() || slugs.len() > MAX_DEPTH {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "malformed_path",
            &format!("Path must have between 1 and {} segments", MAX_DEPTH),
        ));
    }
    controller
        .registry()
        .find_by_path(&name, &slugs, query.view)
        .map_err(registry_error)?
        .map(Json)
        .ok_or_else(|| {
            api_error(
                StatusCode::NOT_FOUND,
                "item_not_found",
                &format!("No item at '{}' in '{}'", query.path, name),
            )
        })
}
