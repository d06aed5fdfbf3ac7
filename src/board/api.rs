use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use serde::Deserialize;
use tokio::sync::broadcast;

use super::changes::{ChangeEvent, ChangeFeed, ChangeKind};
use super::db::DbHandle;
use super::models::*;
use super::storage::{ObjectStore, UploadPolicy, image_object_path, validate_object_path};
use super::ws::{WsMessage, broadcast_message};
use crate::errors::BoardError;
use crate::schedule::{build_dashboard, local_now};

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub db: DbHandle,
    pub changes: ChangeFeed,
    pub ws_tx: broadcast::Sender<String>,
    pub store: Arc<dyn ObjectStore>,
    pub upload_policy: UploadPolicy,
}

pub type SharedState = Arc<AppState>;

// ── Request payload types ─────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct ReleaseRequest {
    pub product_name: Option<String>,
    pub dev_end_date: Option<String>,
    pub qa_end_date: Option<String>,
    pub release_date: Option<String>,
    pub version: Option<String>,
    pub release_notes: Option<String>,
    /// Recorded in version history when present.
    pub change_note: Option<String>,
    pub changed_by: Option<String>,
}

impl ReleaseRequest {
    fn to_draft(&self) -> Result<ReleaseDraft, BoardError> {
        let product_name = required_text(self.product_name.as_deref())
            .ok_or_else(BoardError::missing_fields)?;
        let (dev_end_date, qa_end_date, release_date) = parse_schedule(
            self.dev_end_date.as_deref(),
            self.qa_end_date.as_deref(),
            self.release_date.as_deref(),
        )?;
        Ok(ReleaseDraft {
            product_name,
            dev_end_date,
            qa_end_date,
            release_date,
            version: required_text(self.version.as_deref()),
            release_notes: non_blank(self.release_notes.clone()),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryRequest {
    pub release_id: Option<i64>,
    pub version: Option<String>,
    pub product_name: Option<String>,
    pub dev_end_date: Option<String>,
    pub qa_end_date: Option<String>,
    pub release_date: Option<String>,
    pub release_notes: Option<String>,
    pub changed_by: Option<String>,
    pub change_note: Option<String>,
}

impl HistoryRequest {
    fn to_draft(&self) -> Result<HistoryDraft, BoardError> {
        let (Some(version), Some(product_name)) = (
            required_text(self.version.as_deref()),
            required_text(self.product_name.as_deref()),
        ) else {
            return Err(BoardError::missing_fields());
        };
        let (dev_end_date, qa_end_date, release_date) = parse_schedule(
            self.dev_end_date.as_deref(),
            self.qa_end_date.as_deref(),
            self.release_date.as_deref(),
        )?;
        Ok(HistoryDraft {
            version,
            product_name,
            dev_end_date,
            qa_end_date,
            release_date,
            release_notes: non_blank(self.release_notes.clone()),
            changed_by: non_blank(self.changed_by.clone()),
            change_note: non_blank(self.change_note.clone()),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct CustomerRequest {
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ModuleRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CustomerModuleRequest {
    pub customer_id: Option<i64>,
    pub module_id: Option<i64>,
    pub version: Option<String>,
    pub image_url: Option<String>,
    pub notes: Option<String>,
    pub uploaded_by: Option<String>,
}

impl CustomerModuleRequest {
    fn to_draft(&self) -> CustomerModuleDraft {
        CustomerModuleDraft::new(
            self.version.clone(),
            self.image_url.clone(),
            self.notes.clone(),
            self.uploaded_by.clone(),
        )
    }
}

#[derive(Debug, Deserialize)]
pub struct CustomerModuleQuery {
    pub customer_id: Option<i64>,
}

// ── Error handling ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    PayloadTooLarge(String),
    Internal(String),
}

impl ApiError {
    fn from_board(err: &BoardError) -> Self {
        let msg = err.to_string();
        match err {
            e if e.is_not_found() => Self::NotFound(msg),
            BoardError::Validation(_)
            | BoardError::InvalidDate { .. }
            | BoardError::UnsupportedMediaType(_) => Self::BadRequest(msg),
            BoardError::Conflict(_) => Self::Conflict(msg),
            BoardError::UploadTooLarge { .. } => Self::PayloadTooLarge(msg),
            _ => Self::Internal(msg),
        }
    }
}

impl From<BoardError> for ApiError {
    fn from(err: BoardError) -> Self {
        Self::from_board(&err)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast_ref::<BoardError>() {
            Some(board) => Self::from_board(board),
            None => Self::Internal(format!("{:#}", err)),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/api/dashboard", get(get_dashboard))
        .route("/api/releases", get(list_releases).post(create_release))
        .route(
            "/api/releases/{id}",
            get(get_release).put(update_release).delete(delete_release),
        )
        .route("/api/releases/{id}/history", get(list_release_history))
        .route("/api/version-history", post(create_history))
        .route(
            "/api/version-history/{id}",
            put(update_history).delete(delete_history),
        )
        .route("/api/customers", get(list_customers).post(create_customer))
        .route("/api/modules", get(list_modules).post(create_module))
        .route(
            "/api/customer-modules",
            get(list_customer_modules).post(upsert_customer_module),
        )
        .route(
            "/api/customer-modules/{id}",
            put(update_customer_module).delete(delete_customer_module),
        )
        // Size is enforced while streaming against the configured policy.
        .route(
            "/api/upload",
            post(upload_image).layer(DefaultBodyLimit::disable()),
        )
        .route("/uploads/{*path}", get(serve_upload))
        .route("/health", get(health_check))
}

// ── Helpers ───────────────────────────────────────────────────────────

fn publish(state: &AppState, table: Table, kind: ChangeKind, row_id: i64) {
    state.changes.publish(ChangeEvent::new(table, kind, row_id));
}

fn deleted(what: &str) -> Json<serde_json::Value> {
    Json(serde_json::json!({"message": format!("{} deleted successfully", what)}))
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

async fn get_dashboard(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let snapshots = state.db.call(|db| db.list_snapshots()).await?;
    Ok(Json(build_dashboard(&snapshots, local_now())))
}

// ── Releases ──────────────────────────────────────────────────────────

async fn list_releases(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let releases = state.db.call(|db| db.list_releases()).await?;
    Ok(Json(releases))
}

async fn get_release(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let release = state
        .db
        .call(move |db| db.get_release(id))
        .await?
        .ok_or(BoardError::ReleaseNotFound { id })?;
    Ok(Json(release))
}

async fn create_release(
    State(state): State<SharedState>,
    Json(req): Json<ReleaseRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let draft = req.to_draft()?;
    let release = state.db.call(move |db| db.create_release(&draft)).await?;

    tracing::info!(release_id = release.id, product = %release.product_name, "release created");
    publish(&state, Table::Releases, ChangeKind::Insert, release.id);
    broadcast_message(
        &state.ws_tx,
        &WsMessage::ReleaseCreated {
            release: release.clone(),
        },
    );
    Ok((StatusCode::CREATED, Json(release)))
}

async fn update_release(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(req): Json<ReleaseRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let draft = req.to_draft()?;
    let change_note = non_blank(req.change_note);
    let changed_by = non_blank(req.changed_by);

    let (release, entry) = state
        .db
        .call(move |db| db.update_release_with_history(id, &draft, change_note, changed_by))
        .await?
        .ok_or(BoardError::ReleaseNotFound { id })?;

    tracing::info!(release_id = id, recorded_history = entry.is_some(), "release updated");
    publish(&state, Table::Releases, ChangeKind::Update, id);
    if let Some(entry) = entry {
        publish(&state, Table::VersionHistory, ChangeKind::Insert, entry.id);
        broadcast_message(&state.ws_tx, &WsMessage::HistoryRecorded { entry });
    }
    broadcast_message(
        &state.ws_tx,
        &WsMessage::ReleaseUpdated {
            release: release.clone(),
        },
    );
    Ok(Json(release))
}

async fn delete_release(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let removed = state.db.call(move |db| db.delete_release(id)).await?;
    if !removed {
        return Err(BoardError::ReleaseNotFound { id }.into());
    }

    tracing::info!(release_id = id, "release deleted");
    publish(&state, Table::Releases, ChangeKind::Delete, id);
    broadcast_message(&state.ws_tx, &WsMessage::ReleaseDeleted { release_id: id });
    Ok(deleted("Release"))
}

// ── Version history ───────────────────────────────────────────────────

async fn list_release_history(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let history = state
        .db
        .call(move |db| match db.get_release(id)? {
            Some(_) => db.list_history(id).map(Some),
            None => Ok(None),
        })
        .await?
        .ok_or(BoardError::ReleaseNotFound { id })?;
    Ok(Json(history))
}

async fn create_history(
    State(state): State<SharedState>,
    Json(req): Json<HistoryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let release_id = req.release_id.ok_or_else(BoardError::missing_fields)?;
    let draft = req.to_draft()?;
    let entry = state
        .db
        .call(move |db| db.create_history(release_id, &draft))
        .await?;

    publish(&state, Table::VersionHistory, ChangeKind::Insert, entry.id);
    broadcast_message(
        &state.ws_tx,
        &WsMessage::HistoryRecorded {
            entry: entry.clone(),
        },
    );
    Ok((StatusCode::CREATED, Json(entry)))
}

async fn update_history(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(req): Json<HistoryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let draft = req.to_draft()?;
    let entry = state
        .db
        .call(move |db| db.update_history(id, &draft))
        .await?
        .ok_or(BoardError::HistoryNotFound { id })?;

    publish(&state, Table::VersionHistory, ChangeKind::Update, id);
    Ok(Json(entry))
}

async fn delete_history(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let removed = state.db.call(move |db| db.delete_history(id)).await?;
    if !removed {
        return Err(BoardError::HistoryNotFound { id }.into());
    }

    publish(&state, Table::VersionHistory, ChangeKind::Delete, id);
    broadcast_message(&state.ws_tx, &WsMessage::HistoryDeleted { history_id: id });
    Ok(deleted("Version history"))
}

// ── Customers & modules ───────────────────────────────────────────────

async fn list_customers(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let customers = state.db.call(|db| db.list_customers()).await?;
    Ok(Json(customers))
}

async fn create_customer(
    State(state): State<SharedState>,
    Json(req): Json<CustomerRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = required_text(req.name.as_deref())
        .ok_or_else(|| BoardError::Validation("Customer name is required".into()))?;
    let customer = state.db.call(move |db| db.create_customer(&name)).await?;

    publish(&state, Table::Customers, ChangeKind::Insert, customer.id);
    Ok((StatusCode::CREATED, Json(customer)))
}

async fn list_modules(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let modules = state.db.call(|db| db.list_modules()).await?;
    Ok(Json(modules))
}

async fn create_module(
    State(state): State<SharedState>,
    Json(req): Json<ModuleRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = required_text(req.name.as_deref())
        .ok_or_else(|| BoardError::Validation("Module name is required".into()))?;
    let description = non_blank(req.description);
    let module = state
        .db
        .call(move |db| db.create_module(&name, description.as_deref()))
        .await?;

    publish(&state, Table::Modules, ChangeKind::Insert, module.id);
    Ok((StatusCode::CREATED, Json(module)))
}

// ── Customer module versions ──────────────────────────────────────────

async fn list_customer_modules(
    State(state): State<SharedState>,
    Query(query): Query<CustomerModuleQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let customer_id = query.customer_id;
    let records = state
        .db
        .call(move |db| db.list_customer_modules(customer_id))
        .await?;
    Ok(Json(records))
}

async fn upsert_customer_module(
    State(state): State<SharedState>,
    Json(req): Json<CustomerModuleRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (Some(customer_id), Some(module_id)) = (req.customer_id, req.module_id) else {
        return Err(BoardError::missing_fields().into());
    };
    let draft = req.to_draft();
    let record = state
        .db
        .call(move |db| db.upsert_customer_module(customer_id, module_id, &draft))
        .await?;

    publish(&state, Table::CustomerModuleVersions, ChangeKind::Insert, record.id);
    broadcast_message(
        &state.ws_tx,
        &WsMessage::CustomerModuleSaved {
            record: record.clone(),
        },
    );
    Ok((StatusCode::CREATED, Json(record)))
}

async fn update_customer_module(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(req): Json<CustomerModuleRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let draft = req.to_draft();
    let record = state
        .db
        .call(move |db| db.update_customer_module(id, &draft))
        .await?
        .ok_or(BoardError::CustomerModuleNotFound { id })?;

    publish(&state, Table::CustomerModuleVersions, ChangeKind::Update, id);
    broadcast_message(
        &state.ws_tx,
        &WsMessage::CustomerModuleSaved {
            record: record.clone(),
        },
    );
    Ok(Json(record))
}

async fn delete_customer_module(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let removed = state
        .db
        .call(move |db| db.delete_customer_module(id))
        .await?;
    if !removed {
        return Err(BoardError::CustomerModuleNotFound { id }.into());
    }

    publish(&state, Table::CustomerModuleVersions, ChangeKind::Delete, id);
    broadcast_message(
        &state.ws_tx,
        &WsMessage::CustomerModuleDeleted { record_id: id },
    );
    Ok(deleted("Customer module"))
}

// ── Uploads ───────────────────────────────────────────────────────────

async fn upload_image(
    State(state): State<SharedState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let policy = state.upload_policy;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();

        let mut bytes = Vec::new();
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Failed to read upload: {}", e)))?
        {
            bytes.extend_from_slice(&chunk);
            if bytes.len() > policy.max_bytes {
                return Err(BoardError::UploadTooLarge {
                    size: bytes.len(),
                    limit: policy.max_bytes,
                }
                .into());
            }
        }

        policy.validate(&content_type, bytes.len())?;
        let path = image_object_path(&content_type);
        let stored = state.store.put(&path, bytes, &content_type).await?;
        return Ok(Json(stored));
    }

    Err(ApiError::BadRequest("No file provided".into()))
}

async fn serve_upload(
    State(state): State<SharedState>,
    Path(path): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    validate_object_path(&path)?;
    let object = state
        .store
        .get(&path)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Upload not found: {}", path)))?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, object.content_type),
            (header::X_CONTENT_TYPE_OPTIONS, "nosniff".to_string()),
        ],
        object.bytes,
    ))
}

// ── Tests ─────────────────────────────────────────────────────────────
