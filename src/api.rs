use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use thiserror::Error;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{ReportError, StoreError};
use crate::format::format_duration;
use crate::models::{
    ActivityReportRequest, AggregatedResult, ApiResponse, EntityInput, GroupInput, MemberInput,
    Page, ReportOptions, ReportRow, ReportTarget, ReportWindow, Session,
};
use crate::pipeline::ReportPipeline;
use crate::store::SessionStore;

/// Shared handler state. The store connection is not `Sync`, so it sits
/// behind a mutex that is only locked on the blocking pool.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Mutex<SessionStore>>,
    pub defaults: ReportOptions,
}

impl AppState {
    pub fn new(store: SessionStore, defaults: ReportOptions) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
            defaults,
        }
    }

    /// Runs blocking SQLite work off the async executor.
    async fn with_store<T, F>(&self, work: F) -> Result<T, ApiError>
    where
        F: FnOnce(&SessionStore) -> Result<T, ApiError> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || {
            let guard = store
                .lock()
                .map_err(|_| ApiError::Internal("session store lock poisoned".to_string()))?;
            work(&guard)
        })
        .await
        .map_err(|e| ApiError::Internal(format!("store task failed: {e}")))?
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Report(#[from] ReportError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Report(ReportError::InvalidWindow { .. })
            | Self::Report(ReportError::InvalidPageSize(_)) => StatusCode::BAD_REQUEST,
            Self::Report(ReportError::MissingLabel(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Store(StoreError::GroupNotFound(_)) => StatusCode::NOT_FOUND,
            Self::Store(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            warn!(error = %self, "request failed");
        }
        (status, Json(ApiResponse::error(self.to_string()))).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/entities", post(create_entity))
        .route("/groups", post(create_group))
        .route("/groups/:group_id/members", post(add_member))
        .route("/sessions", post(record_session))
        .route("/reports/activity", post(activity_report))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn root() -> &'static str {
    "Activity Report API v0.1.0"
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

async fn create_entity(
    State(state): State<AppState>,
    Json(input): Json<EntityInput>,
) -> Result<Json<ApiResponse>, ApiError> {
    let entity_id = input.entity_id.unwrap_or_else(Uuid::new_v4);
    let label = input.label.clone();
    state
        .with_store(move |store| Ok(store.upsert_entity(entity_id, &label)?))
        .await?;

    Ok(Json(ApiResponse::success(
        format!("Entity registered: {}", input.label),
        Some(serde_json::json!({ "entity_id": entity_id })),
    )))
}

async fn create_group(
    State(state): State<AppState>,
    Json(input): Json<GroupInput>,
) -> Result<Json<ApiResponse>, ApiError> {
    let name = input.name.clone();
    let group_id = state
        .with_store(move |store| Ok(store.create_group(&name)?))
        .await?;

    Ok(Json(ApiResponse::success(
        format!("Group created: {}", input.name),
        Some(serde_json::json!({ "group_id": group_id })),
    )))
}

async fn add_member(
    State(state): State<AppState>,
    Path(group_id): Path<Uuid>,
    Json(input): Json<MemberInput>,
) -> Result<Json<ApiResponse>, ApiError> {
    let entity_id = input.entity_id;
    state
        .with_store(move |store| Ok(store.add_member(group_id, entity_id)?))
        .await?;

    Ok(Json(ApiResponse::success(
        format!("Member {} added", input.entity_id),
        None,
    )))
}

async fn record_session(
    State(state): State<AppState>,
    Json(session): Json<Session>,
) -> Result<(StatusCode, Json<ApiResponse>), ApiError> {
    state
        .with_store(move |store| Ok(store.record_session(&session)?))
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success("Session recorded", None)),
    ))
}

/// Fetches sessions and labels up front, then runs the pure pipeline.
async fn activity_report(
    State(state): State<AppState>,
    Json(request): Json<ActivityReportRequest>,
) -> Result<Json<ApiResponse>, ApiError> {
    let options = request.options.unwrap_or_else(|| state.defaults.clone());
    let window = ReportWindow::new(request.begin, request.end)?;

    let target = request.target;
    let (title, roster, sessions, labels) = state
        .with_store(move |store| {
            let (title, roster) = match target {
                ReportTarget::Group(name) => {
                    let (group_id, name) = store.find_group(&name)?;
                    (name, store.group_members(group_id)?)
                }
                ReportTarget::Entities(ids) => ("Selected players".to_string(), unique(ids)),
            };
            let sessions = store.sessions_between(&roster, &window)?;
            let labels = store.labels(&roster)?;
            Ok((title, roster, sessions, labels))
        })
        .await?;

    let page = ReportPipeline::run_with_options(
        &roster,
        &sessions,
        &window,
        &labels,
        &options,
        request.page,
    )?;
    info!(
        title = %title,
        page = page.index,
        total_items = page.total_items,
        "served activity report"
    );

    let message = if page.is_empty() {
        "No data found.".to_string()
    } else {
        format!("Page {}/{}", page.index, page.total_pages)
    };
    Ok(Json(ApiResponse::success(
        message,
        Some(render_page(&title, &window, &page)),
    )))
}

/// Drops repeated ids, keeping first-seen order.
fn unique(ids: Vec<Uuid>) -> Vec<Uuid> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}

fn render_page(title: &str, window: &ReportWindow, page: &Page<AggregatedResult>) -> serde_json::Value {
    let rows: Vec<ReportRow> = page
        .items
        .iter()
        .enumerate()
        .map(|(n, result)| ReportRow {
            rank: page.first_rank() + n,
            entity_id: result.entity_id,
            label: result.label.clone(),
            active_secs: result.total_active_seconds(),
            activity: format_duration(result.total_active),
        })
        .collect();

    serde_json::json!({
        "title": title,
        "period": { "begin": window.begin, "end": window.end },
        "page": page.index,
        "total_pages": page.total_pages,
        "total_items": page.total_items,
        "has_previous": page.has_previous(),
        "has_next": page.has_next(),
        "rows": rows,
    })
}
