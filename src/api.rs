use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    routing::{get, patch},
    Json, Router,
};
use serde::Serialize;
use serde_json::{Map, Value};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::{ApiError, ApiResult, RefreshError, StoreError};
use crate::funnel;
use crate::listing::{filter_people, PeopleFilter};
use crate::models::{FlowGraph, FunnelEvent, Person};
use crate::refresh::{DashboardState, RefreshPhase, SharedDashboard};
use crate::store::RecordSource;

#[derive(Clone)]
pub struct AppState {
    pub source: Arc<dyn RecordSource>,
    pub dashboard: SharedDashboard,
}

impl AppState {
    pub fn new(source: Arc<dyn RecordSource>, dashboard: SharedDashboard) -> Self {
        Self { source, dashboard }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/people", get(list_people))
        .route("/api/people/:id", patch(update_person))
        .route("/api/funnel-events", get(list_funnel_events))
        .route("/api/flow-graph", get(flow_graph))
        .route("/api/dashboard", get(dashboard))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /api/people
///
/// Optional `search` and `status` query parameters narrow the listing.
async fn list_people(
    State(state): State<AppState>,
    Query(filter): Query<PeopleFilter>,
) -> ApiResult<Json<Vec<Person>>> {
    let people = state.source.fetch_people().await?;
    if filter.is_empty() {
        return Ok(Json(people));
    }
    Ok(Json(filter_people(people, &filter)))
}

/// GET /api/funnel-events
async fn list_funnel_events(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<FunnelEvent>>> {
    Ok(Json(state.source.fetch_funnel_events().await?))
}

/// PATCH /api/people/:id
///
/// Applies each field in order and returns the person as of the last write.
async fn update_person(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<Map<String, Value>>, JsonRejection>,
) -> ApiResult<Json<Person>> {
    let Json(fields) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let mut updated = None;
    for (field, value) in fields {
        let person = state
            .source
            .update_field(&id, &field, value)
            .await
            .map_err(|e| match e {
                StoreError::NotFound { .. } => ApiError::NotFound(e.to_string()),
                other => ApiError::Store(other),
            })?;
        updated = Some(person);
    }

    let person = updated.ok_or_else(|| {
        ApiError::BadRequest("request body must contain at least one field".into())
    })?;
    info!(person_id = %id, "Person updated");
    Ok(Json(person))
}

/// GET /api/flow-graph
async fn flow_graph(State(state): State<AppState>) -> ApiResult<Json<FlowGraph>> {
    let people = state.source.fetch_people().await?;
    let graph = funnel::build_flow_graph(&people).map_err(RefreshError::from)?;
    Ok(Json(graph))
}

/// GET /api/dashboard
///
/// The last refreshed snapshot. A failed cycle is reported as an error, even
/// while the next cycle is loading, until a cycle succeeds.
async fn dashboard(State(state): State<AppState>) -> ApiResult<Json<DashboardState>> {
    let current = state.dashboard.read().await;
    if let Some(message) = &current.last_error {
        return Err(ApiError::Unavailable(message.clone()));
    }
    if current.phase == RefreshPhase::Error {
        return Err(ApiError::Unavailable("refresh failed".to_string()));
    }
    if current.snapshot.is_none() {
        return Err(ApiError::Unavailable("dashboard has not loaded yet".to_string()));
    }
    Ok(Json(current.clone()))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub module: String,
    pub version: String,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        module: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
