use axum::extract::{rejection::QueryRejection, Extension, Path, Query, State};
use serde::Deserialize;

use crate::api::AppState;
use crate::document::Document;
use crate::gateway::{DeleteResult, ReadParams, ReadResult};
use crate::intercept::RequestContext;
use crate::middleware::{ApiResponse, ApiResult};

#[derive(Debug, Default, Deserialize)]
pub struct DeleteParams {
    pub query: Option<String>,
}

/// GET /api/:database/:collection
///
/// Query string: `query`, `sort`, `skip`, `limit`, `inlineCount`
pub async fn read(
    State(state): State<AppState>,
    Path((database, collection)): Path<(String, String)>,
    params: Result<Query<ReadParams>, QueryRejection>,
    Extension(ctx): Extension<RequestContext>,
) -> ApiResult<ReadResult> {
    let Query(params) = params?;
    let result = state.gateway.read(&database, &collection, params, &ctx).await?;
    Ok(ApiResponse::success(result))
}

/// POST /api/:database/:collection - add one document
pub async fn add(
    State(state): State<AppState>,
    Path((database, collection)): Path<(String, String)>,
    Extension(ctx): Extension<RequestContext>,
    body: String,
) -> ApiResult<Document> {
    let saved = state.gateway.add(&database, &collection, &body, &ctx).await?;
    Ok(ApiResponse::created(saved))
}

/// PUT /api/:database/:collection - replace the document identified by `_id`
pub async fn update(
    State(state): State<AppState>,
    Path((database, collection)): Path<(String, String)>,
    Extension(ctx): Extension<RequestContext>,
    body: String,
) -> ApiResult<Document> {
    let updated = state.gateway.update(&database, &collection, &body, &ctx).await?;
    Ok(ApiResponse::success(updated))
}

/// DELETE /api/:database/:collection[?query=...] - filter from the query string or the body
pub async fn delete(
    State(state): State<AppState>,
    Path((database, collection)): Path<(String, String)>,
    params: Result<Query<DeleteParams>, QueryRejection>,
    Extension(ctx): Extension<RequestContext>,
    body: String,
) -> ApiResult<DeleteResult> {
    let Query(params) = params?;
    let result = state
        .gateway
        .delete(&database, &collection, params.query.as_deref(), &body, &ctx)
        .await?;
    Ok(ApiResponse::success(result))
}

/// DELETE /api/:database/:collection/:query
pub async fn delete_by_path(
    State(state): State<AppState>,
    Path((database, collection, query)): Path<(String, String, String)>,
    Extension(ctx): Extension<RequestContext>,
    body: String,
) -> ApiResult<DeleteResult> {
    let result = state
        .gateway
        .delete(&database, &collection, Some(&query), &body, &ctx)
        .await?;
    Ok(ApiResponse::success(result))
}
