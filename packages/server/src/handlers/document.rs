use axum::Json;
use axum::body::Body;
use axum::extract::{Multipart, Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use common::acroform::fill_pdf;
use common::{DocumentStatus, DocumentType, Notification, Role};
use sea_orm::*;
use tracing::{info, instrument};

use crate::entity::{acroform_template, student_document};
use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::extractors::json::AppJson;
use crate::handlers::blob::referenced_blob;
use crate::handlers::student::find_student;
use crate::models::document::{
    DocumentResponse, GenerateDocumentRequest, GenerateDocumentResponse, GenerateMode,
    UpdateDocumentRequest,
};
use crate::services::BlobStore;
use crate::services::access::student_for_user;
use crate::services::slot::{SlotManager, SlotWrite};
use crate::state::AppState;
use crate::utils::filename::content_disposition_value;
use crate::utils::upload::{PDF_MIME, read_single_file};

#[utoipa::path(
    post,
    path = "/{id}/documents/{document}/generate",
    tag = "Documents",
    operation_id = "generateDocument",
    summary = "Fill the document type's template for a student",
    description = "`preview` answers with the filled, still editable PDF and stores nothing. \
        `finalize` flattens the form and stores the result as the student's current document \
        of this type, replacing any earlier one.",
    params(
        ("id" = i32, Path, description = "Student ID"),
        ("document" = DocumentType, Path, description = "Document type"),
    ),
    request_body = GenerateDocumentRequest,
    responses(
        (status = 200, description = "Preview PDF (`application/pdf`) or the stored document with a fill report", body = GenerateDocumentResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Student not found (NOT_FOUND)", body = ErrorBody),
        (status = 424, description = "No usable template for this type (DEPENDENCY_FAILED)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(user_id = auth_user.user_id, mode = ?payload.mode))]
pub async fn generate_document(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path((student_id, document_type)): Path<(i32, DocumentType)>,
    AppJson(payload): AppJson<GenerateDocumentRequest>,
) -> Result<Response, AppError> {
    auth_user.require_staff()?;
    payload.validate()?;

    let student = find_student(&state.db, student_id).await?;

    let template = acroform_template::Entity::find()
        .filter(acroform_template::Column::DocumentType.eq(document_type))
        .one(&state.db)
        .await?
        .ok_or_else(|| {
            AppError::DependencyFailed(format!("No template uploaded for {document_type}"))
        })?;
    let template_blob = referenced_blob(&state, template.blob_id).await?;

    let filled = fill_pdf(&template_blob.content, &payload.fields, payload.mode.into())?;

    if payload.mode == GenerateMode::Preview {
        let filename = document_type.canonical_filename(student_id);
        return Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, PDF_MIME)
            .header(header::CONTENT_LENGTH, filled.bytes.len().to_string())
            .header(
                header::CONTENT_DISPOSITION,
                content_disposition_value(&filename, true),
            )
            .header(header::CACHE_CONTROL, "no-store")
            .body(Body::from(filled.bytes))
            .map_err(|e| AppError::Internal(format!("Failed to build response: {e}")));
    }

    let txn = state.db.begin().await?;
    let slot = SlotManager::new(&txn)
        .upsert_by_filename(SlotWrite {
            student_id,
            document_type,
            content: filled.bytes,
            filename: "",
            mime_type: PDF_MIME,
            uploaded_by: auth_user.user_id,
            uploaded_by_role: auth_user.role,
            visible_to_student: payload.visible_to_student.unwrap_or(true),
            status: DocumentStatus::Issued,
        })
        .await?;
    txn.commit().await?;

    info!(
        student_id,
        document_id = slot.id,
        %document_type,
        filled = filled.report.filled.len(),
        skipped = filled.report.skipped.len(),
        failed = filled.report.failed.len(),
        "Document generated"
    );

    state.notifications.emit(Notification::DocumentAssigned {
        student_id,
        email: student.email,
        document_type,
        document_id: slot.id,
    });

    let document = with_blob_meta(&state, slot).await?;
    Ok(Json(GenerateDocumentResponse {
        document,
        report: filled.report,
    })
    .into_response())
}

#[utoipa::path(
    post,
    path = "/{id}/documents/{document}",
    tag = "Documents",
    operation_id = "uploadSignedDocument",
    summary = "Upload a signed PDF as the student's document of this type",
    description = "Multipart body with a single `file` part. Replaces the current document of this type.",
    params(
        ("id" = i32, Path, description = "Student ID"),
        ("document" = DocumentType, Path, description = "Document type"),
    ),
    request_body(content_type = "multipart/form-data", description = "PDF in a `file` part"),
    responses(
        (status = 201, description = "Document stored", body = DocumentResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Student not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, multipart), fields(user_id = auth_user.user_id))]
pub async fn upload_signed_document(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path((student_id, document_type)): Path<(i32, DocumentType)>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    auth_user.require_staff()?;
    let student = find_student(&state.db, student_id).await?;

    let file =
        read_single_file(&mut multipart, "file", state.config.upload.max_upload_size).await?;
    file.require_pdf()?;

    let txn = state.db.begin().await?;
    let slot = SlotManager::new(&txn)
        .upsert_by_filename(SlotWrite {
            student_id,
            document_type,
            content: file.content,
            filename: &file.filename,
            mime_type: PDF_MIME,
            uploaded_by: auth_user.user_id,
            uploaded_by_role: auth_user.role,
            visible_to_student: true,
            status: DocumentStatus::Issued,
        })
        .await?;
    txn.commit().await?;

    info!(student_id, document_id = slot.id, %document_type, "Signed document uploaded");

    state.notifications.emit(Notification::DocumentAssigned {
        student_id,
        email: student.email,
        document_type,
        document_id: slot.id,
    });

    let document = with_blob_meta(&state, slot).await?;
    Ok((StatusCode::CREATED, Json(document)))
}

#[utoipa::path(
    get,
    path = "/{id}/documents",
    tag = "Documents",
    operation_id = "listStudentDocuments",
    summary = "List a student's current documents",
    params(("id" = i32, Path, description = "Student ID")),
    responses(
        (status = 200, description = "One entry per document type held", body = Vec<DocumentResponse>),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Student not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(user_id = auth_user.user_id))]
pub async fn list_student_documents(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(student_id): Path<i32>,
) -> Result<Json<Vec<DocumentResponse>>, AppError> {
    auth_user.require_staff()?;
    find_student(&state.db, student_id).await?;

    let slots = student_document::Entity::find()
        .filter(student_document::Column::StudentId.eq(student_id))
        .order_by_asc(student_document::Column::DocumentType)
        .all(&state.db)
        .await?;

    Ok(Json(with_blob_metas(&state, slots).await?))
}

#[utoipa::path(
    patch,
    path = "/{id}/documents/{document}",
    tag = "Documents",
    operation_id = "updateStudentDocument",
    summary = "Change a document's visibility or status",
    params(
        ("id" = i32, Path, description = "Student ID"),
        ("document" = i32, Path, description = "Document ID"),
    ),
    request_body = UpdateDocumentRequest,
    responses(
        (status = 200, description = "Updated", body = DocumentResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Document not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(user_id = auth_user.user_id))]
pub async fn update_student_document(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path((student_id, document_id)): Path<(i32, i32)>,
    AppJson(payload): AppJson<UpdateDocumentRequest>,
) -> Result<Json<DocumentResponse>, AppError> {
    auth_user.require_staff()?;

    let slot = find_slot(&state.db, student_id, document_id).await?;
    if payload.visible_to_student.is_none() && payload.status.is_none() {
        return Ok(Json(with_blob_meta(&state, slot).await?));
    }

    let mut active = slot.into_active_model();
    if let Some(visible) = payload.visible_to_student {
        active.is_visible_to_student = Set(visible);
    }
    if let Some(status) = payload.status {
        active.status = Set(status);
    }
    let updated = active.update(&state.db).await?;

    info!(
        student_id,
        document_id,
        visible = updated.is_visible_to_student,
        status = %updated.status,
        "Document updated"
    );
    Ok(Json(with_blob_meta(&state, updated).await?))
}

#[utoipa::path(
    delete,
    path = "/{id}/documents/{document}",
    tag = "Documents",
    operation_id = "deleteStudentDocument",
    summary = "Delete a document and its file",
    params(
        ("id" = i32, Path, description = "Student ID"),
        ("document" = i32, Path, description = "Document ID"),
    ),
    responses(
        (status = 204, description = "Deleted"),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Document not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(user_id = auth_user.user_id))]
pub async fn delete_student_document(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path((student_id, document_id)): Path<(i32, i32)>,
) -> Result<impl IntoResponse, AppError> {
    auth_user.require_admin()?;

    let txn = state.db.begin().await?;
    let slot = find_slot(&txn, student_id, document_id).await?;
    SlotManager::new(&txn).delete(slot).await?;
    txn.commit().await?;

    info!(student_id, document_id, "Document deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/me/documents/{document}",
    tag = "Documents",
    operation_id = "uploadMyDocument",
    summary = "Upload one of your own declarations",
    description = "Only self-service document types are accepted. The previous upload of the \
        same type, if any, is discarded.",
    params(("document" = DocumentType, Path, description = "Document type")),
    request_body(content_type = "multipart/form-data", description = "PDF in a `file` part"),
    responses(
        (status = 201, description = "Document stored", body = DocumentResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Type not open to students (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "No enrollment for this account (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, multipart), fields(user_id = auth_user.user_id))]
pub async fn upload_my_document(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(document_type): Path<DocumentType>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    auth_user.require_role(&[Role::Student])?;
    if !document_type.is_self_service() {
        return Err(AppError::PermissionDenied);
    }
    let student = student_for_user(&state.db, auth_user.user_id).await?;

    let file =
        read_single_file(&mut multipart, "file", state.config.upload.max_upload_size).await?;
    file.require_pdf()?;

    let txn = state.db.begin().await?;
    let slot = SlotManager::new(&txn)
        .replace_by_owner(SlotWrite {
            student_id: student.id,
            document_type,
            content: file.content,
            filename: &file.filename,
            mime_type: &file.mime_type,
            uploaded_by: auth_user.user_id,
            uploaded_by_role: Role::Student,
            visible_to_student: true,
            status: DocumentStatus::Submitted,
        })
        .await?;
    txn.commit().await?;

    info!(student_id = student.id, document_id = slot.id, %document_type, "Student uploaded document");

    let document = with_blob_meta(&state, slot).await?;
    Ok((StatusCode::CREATED, Json(document)))
}

#[utoipa::path(
    get,
    path = "/me/documents",
    tag = "Documents",
    operation_id = "listMyDocuments",
    summary = "Your documents",
    description = "Only documents staff made visible are listed.",
    responses(
        (status = 200, description = "Visible documents", body = Vec<DocumentResponse>),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "No enrollment for this account (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(user_id = auth_user.user_id))]
pub async fn list_my_documents(
    auth_user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<DocumentResponse>>, AppError> {
    auth_user.require_role(&[Role::Student])?;
    let student = student_for_user(&state.db, auth_user.user_id).await?;

    let slots = student_document::Entity::find()
        .filter(student_document::Column::StudentId.eq(student.id))
        .filter(student_document::Column::IsVisibleToStudent.eq(true))
        .order_by_asc(student_document::Column::DocumentType)
        .all(&state.db)
        .await?;

    Ok(Json(with_blob_metas(&state, slots).await?))
}

#[utoipa::path(
    delete,
    path = "/me/documents/{document}",
    tag = "Documents",
    operation_id = "deleteMyDocument",
    summary = "Withdraw one of your own uploads",
    params(("document" = i32, Path, description = "Document ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Issued by staff (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Document not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(user_id = auth_user.user_id))]
pub async fn delete_my_document(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(document_id): Path<i32>,
) -> Result<impl IntoResponse, AppError> {
    auth_user.require_role(&[Role::Student])?;
    let student = student_for_user(&state.db, auth_user.user_id).await?;

    let txn = state.db.begin().await?;
    let slot = find_slot(&txn, student.id, document_id).await?;
    if slot.uploaded_by_role != Role::Student || slot.uploaded_by != auth_user.user_id {
        return Err(AppError::PermissionDenied);
    }
    SlotManager::new(&txn).delete(slot).await?;
    txn.commit().await?;

    info!(
        student_id = student.id,
        document_id, "Student withdrew document"
    );
    Ok(StatusCode::NO_CONTENT)
}

async fn find_slot<C: ConnectionTrait>(
    db: &C,
    student_id: i32,
    document_id: i32,
) -> Result<student_document::Model, AppError> {
    student_document::Entity::find_by_id(document_id)
        .filter(student_document::Column::StudentId.eq(student_id))
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Document not found".into()))
}

async fn with_blob_meta(
    state: &AppState,
    slot: student_document::Model,
) -> Result<DocumentResponse, AppError> {
    let meta = BlobStore::new(&state.db)
        .read_meta(slot.blob_id)
        .await?
        .ok_or_else(|| {
            AppError::DependencyFailed(format!("Referenced blob {} is missing", slot.blob_id))
        })?;
    Ok(DocumentResponse::new(slot, meta))
}

async fn with_blob_metas(
    state: &AppState,
    slots: Vec<student_document::Model>,
) -> Result<Vec<DocumentResponse>, AppError> {
    let mut metas = BlobStore::new(&state.db)
        .read_metas(slots.iter().map(|s| s.blob_id).collect())
        .await?;

    slots
        .into_iter()
        .map(|slot| {
            let meta = metas.remove(&slot.blob_id).ok_or_else(|| {
                AppError::DependencyFailed(format!("Referenced blob {} is missing", slot.blob_id))
            })?;
            Ok(DocumentResponse::new(slot, meta))
        })
        .collect()
}
