//! Recording CRUD endpoints

use axum::{
    extract::{Path, Query, State},
    routing::{delete, get},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::db::recordings;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// Build recording routes. `/recordings/all` is registered alongside
/// `/recordings/:id`; the literal segment takes precedence, so the bulk
/// delete is reachable and "all" is not a valid recording id.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/recordings", get(list_recordings))
        .route("/recordings/all", delete(delete_all_recordings))
        .route(
            "/recordings/:id",
            get(get_recording).delete(delete_recording),
        )
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListQuery {
    user_id: Option<String>,
}

/// **GET /recordings** - List recordings, newest first, capped at 100
async fn list_recordings(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Value>> {
    let records = recordings::list_recordings(&state.db, query.user_id.as_deref()).await?;

    Ok(Json(json!({
        "success": true,
        "count": records.len(),
        "recordings": records,
        "timestamp": Utc::now().to_rfc3339(),
    })))
}

/// **GET /recordings/:id** - Fetch one recording by id
async fn get_recording(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let record = recordings::get_recording(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Recording {id}")))?;

    Ok(Json(json!({
        "success": true,
        "recording": record,
    })))
}

/// **DELETE /recordings/:id** - Delete one recording by id
async fn delete_recording(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let removed = recordings::delete_recording(&state.db, &id).await?;
    if !removed {
        return Err(ApiError::NotFound(format!("Recording {id}")));
    }

    tracing::info!(recording_id = %id, "Recording deleted");
    Ok(Json(json!({
        "success": true,
        "message": format!("Recording {id} deleted"),
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteAllQuery {
    user_id: Option<String>,
}

/// **DELETE /recordings/all** - Bulk delete, optionally scoped to one user
async fn delete_all_recordings(
    State(state): State<AppState>,
    Query(query): Query<DeleteAllQuery>,
) -> ApiResult<Json<Value>> {
    let removed = recordings::delete_all_recordings(&state.db, query.user_id.as_deref()).await?;

    tracing::info!(removed, user_id = ?query.user_id, "Bulk recording delete");
    Ok(Json(json!({
        "success": true,
        "deletedCount": removed,
    })))
}
