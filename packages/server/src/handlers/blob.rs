use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use tracing::instrument;
use uuid::Uuid;

use crate::entity::blob;
use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::services::BlobStore;
use crate::services::access::{AccessResolver, student_for_user};
use crate::state::AppState;
use crate::utils::filename::content_disposition_value;

#[utoipa::path(
    get,
    path = "/{id}",
    tag = "Blobs",
    operation_id = "downloadBlob",
    summary = "Download a stored file",
    description = "Staff may read any blob. Students may read a blob only when it backs a material \
        they can access or a visible document of their own; anything else answers 404. \
        Supports ETag-based caching via If-None-Match.",
    params(("id" = Uuid, Path, description = "Blob ID")),
    responses(
        (status = 200, description = "File content"),
        (status = 304, description = "Not Modified (ETag match)"),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Blob not found or not accessible (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, headers), fields(user_id = auth_user.user_id, %id))]
pub async fn download_blob(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let not_found = || AppError::NotFound("File not found".into());

    if !auth_user.is_staff() {
        let student = student_for_user(&state.db, auth_user.user_id)
            .await
            .map_err(|_| not_found())?;
        if !AccessResolver::new(&state.db)
            .can_read_blob(student.id, id)
            .await?
        {
            return Err(not_found());
        }
    }

    let store = BlobStore::new(&state.db);
    let meta = store.read_meta(id).await?.ok_or_else(not_found)?;
    if let Some(cached) = not_modified(&etag(meta.id, meta.uploaded_at), &headers) {
        return Ok(cached);
    }

    let blob = store.read(id).await?.ok_or_else(not_found)?;
    blob_response(blob, true)
}

/// Load a blob referenced by a row that must have one.
pub async fn referenced_blob(state: &AppState, id: Uuid) -> Result<blob::Model, AppError> {
    BlobStore::new(&state.db)
        .read(id)
        .await?
        .ok_or_else(|| AppError::DependencyFailed(format!("Referenced blob {id} is missing")))
}

/// Canonical documents are rewritten in place, so the id alone is not a validator.
pub fn etag(id: Uuid, uploaded_at: DateTime<Utc>) -> String {
    format!("\"{}-{}\"", id, uploaded_at.timestamp_millis())
}

/// `304` when the client already holds this version.
pub fn not_modified(etag_value: &str, headers: &HeaderMap) -> Option<Response> {
    match headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
    {
        Some(val) if val == etag_value || val == "*" => {
            Some(StatusCode::NOT_MODIFIED.into_response())
        }
        _ => None,
    }
}

/// Build a full download response for a blob.
pub fn blob_response(blob: blob::Model, inline: bool) -> Result<Response, AppError> {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, &blob.mime_type)
        .header(header::CONTENT_LENGTH, blob.content.len().to_string())
        .header(
            header::CONTENT_DISPOSITION,
            content_disposition_value(&blob.filename, inline),
        )
        .header(header::ETAG, etag(blob.id, blob.uploaded_at))
        .header(header::CACHE_CONTROL, "private, no-cache")
        .body(Body::from(blob.content))
        .map_err(|e| AppError::Internal(format!("Failed to build response: {e}")))
}
