//! Axum handlers for the `/v3` browsing API.
//!
//! Reads take their parameters from the query string, writes from a
//! form-encoded body, matching what the browsing UI sends.

use crate::error::ApiResult;
use crate::service::AppState;
use crate::types::{
    ConnectParams, DeleteParams, GetParams, HealthResponse, KeyParams, NodeResponse, PutParams,
};
use axum::extract::{Form, Query, State};
use axum::{Json, response::IntoResponse};
use std::sync::Arc;
use tracing::info;

/// GET /v3/separator
pub async fn separator(State(state): State<Arc<AppState>>) -> String {
    state.separator().to_string()
}

/// POST /v3/connect
///
/// Body is `ok` when a new connection was opened and `running` when the
/// requested endpoints were already connected.
pub async fn connect(
    State(state): State<Arc<AppState>>,
    Form(params): Form<ConnectParams>,
) -> ApiResult<impl IntoResponse> {
    let status = state.connect(params.endpoints.as_deref()).await?;
    info!("POST v3 connect: {}", status.as_str());
    Ok(status.as_str())
}

/// GET /v3/getpath
pub async fn get_path(
    State(state): State<Arc<AppState>>,
    Query(params): Query<KeyParams>,
) -> ApiResult<Json<NodeResponse>> {
    info!("GET v3 getpath {}", params.key);
    let node = state.get_path(&params.key).await?;
    Ok(Json(NodeResponse { node }))
}

/// GET /v3/get
pub async fn get(
    State(state): State<Arc<AppState>>,
    Query(params): Query<GetParams>,
) -> ApiResult<Json<NodeResponse>> {
    info!("GET v3 {}", params.key);
    let node = if params.wants_prefix() {
        state.list_prefix(&params.key).await?
    } else {
        state.get_node(&params.key).await?
    };
    Ok(Json(NodeResponse { node }))
}

/// POST /v3/put
pub async fn put(
    State(state): State<Arc<AppState>>,
    Form(params): Form<PutParams>,
) -> ApiResult<Json<NodeResponse>> {
    info!("PUT v3 {}", params.key);
    let node = state
        .put(&params.key, &params.value, params.ttl.as_deref())
        .await?;
    Ok(Json(NodeResponse { node }))
}

/// POST /v3/delete
pub async fn delete(
    State(state): State<Arc<AppState>>,
    Form(params): Form<DeleteParams>,
) -> ApiResult<&'static str> {
    info!("DELETE v3 {}", params.key);
    let deleted = state
        .delete(&params.key, params.is_recursive())
        .await?;
    info!("Deleted {} keys for {}", deleted, params.key);
    Ok("ok")
}

/// GET /health
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}
