use axum::Json;
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::Utc;
use common::DocumentType;
use common::acroform::{FormDocument, PdfForm};
use sea_orm::*;
use tracing::{info, instrument, warn};

use crate::database::{LockKey, advisory_xact_lock};
use crate::entity::{acroform_template, user};
use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::handlers::blob::referenced_blob;
use crate::models::document::{TemplateFieldsResponse, TemplateResponse};
use crate::services::BlobStore;
use crate::state::AppState;
use crate::utils::upload::{PDF_MIME, read_single_file};

#[utoipa::path(
    put,
    path = "/{document_type}",
    tag = "Templates",
    operation_id = "putTemplate",
    summary = "Upload or replace the AcroForm template of a document type",
    description = "Multipart body with a single `file` part holding a PDF with an interactive form.",
    params(("document_type" = DocumentType, Path, description = "Document type")),
    request_body(content_type = "multipart/form-data", description = "PDF form in a `file` part"),
    responses(
        (status = 200, description = "Template stored", body = TemplateResponse),
        (status = 400, description = "Not a PDF form (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, multipart), fields(user_id = auth_user.user_id, %document_type))]
pub async fn put_template(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(document_type): Path<DocumentType>,
    mut multipart: Multipart,
) -> Result<Json<TemplateResponse>, AppError> {
    auth_user.require_admin()?;

    let file =
        read_single_file(&mut multipart, "file", state.config.upload.max_upload_size).await?;
    file.require_pdf()?;

    let form = PdfForm::load(&file.content)
        .map_err(|e| AppError::Validation(format!("Template is not a usable PDF form: {e}")))?;
    let field_count = form.field_names().len();
    if field_count == 0 {
        warn!("Template has no form fields; generation will fill nothing");
    }

    let uploader = user::Entity::find_by_id(auth_user.user_id)
        .one(&state.db)
        .await?
        .ok_or(AppError::TokenInvalid)?;

    let now = Utc::now();
    let txn = state.db.begin().await?;
    advisory_xact_lock(&txn, LockKey::Template(document_type)).await?;

    let blobs = BlobStore::new(&txn);
    let existing = acroform_template::Entity::find()
        .filter(acroform_template::Column::DocumentType.eq(document_type))
        .one(&txn)
        .await?;

    let saved = match existing {
        Some(template) => {
            let blob_id = if blobs.read_meta(template.blob_id).await?.is_some() {
                blobs
                    .replace(template.blob_id, file.content, &file.filename, PDF_MIME)
                    .await?;
                template.blob_id
            } else {
                warn!(blob_id = %template.blob_id, "Template blob was missing, storing a new one");
                blobs.create(file.content, &file.filename, PDF_MIME).await?
            };
            let mut active = template.into_active_model();
            active.blob_id = Set(blob_id);
            active.created_by = Set(uploader.id);
            active.created_by_name = Set(uploader.name);
            active.updated_at = Set(now);
            active.update(&txn).await?
        }
        None => {
            let blob_id = blobs.create(file.content, &file.filename, PDF_MIME).await?;
            acroform_template::ActiveModel {
                document_type: Set(document_type),
                blob_id: Set(blob_id),
                created_by: Set(uploader.id),
                created_by_name: Set(uploader.name),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            }
            .insert(&txn)
            .await?
        }
    };

    let meta = blobs.read_meta(saved.blob_id).await?.ok_or_else(|| {
        AppError::Internal("Template blob vanished inside its transaction".into())
    })?;
    txn.commit().await?;

    info!(
        template_id = saved.id,
        fields = field_count,
        "Template stored"
    );
    Ok(Json(TemplateResponse::new(saved, meta)))
}

#[utoipa::path(
    get,
    path = "/",
    tag = "Templates",
    operation_id = "listTemplates",
    summary = "List templates",
    responses(
        (status = 200, description = "One template per configured document type", body = Vec<TemplateResponse>),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(user_id = auth_user.user_id))]
pub async fn list_templates(
    auth_user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<TemplateResponse>>, AppError> {
    auth_user.require_staff()?;

    let templates = acroform_template::Entity::find()
        .order_by_asc(acroform_template::Column::DocumentType)
        .all(&state.db)
        .await?;

    let mut metas = BlobStore::new(&state.db)
        .read_metas(templates.iter().map(|t| t.blob_id).collect())
        .await?;

    let mut out = Vec::with_capacity(templates.len());
    for template in templates {
        match metas.remove(&template.blob_id) {
            Some(meta) => out.push(TemplateResponse::new(template, meta)),
            None => warn!(
                template_id = template.id,
                blob_id = %template.blob_id,
                "Template blob is missing, omitting from list"
            ),
        }
    }
    Ok(Json(out))
}

#[utoipa::path(
    get,
    path = "/{document_type}/fields",
    tag = "Templates",
    operation_id = "listTemplateFields",
    summary = "Form field names of a template",
    params(("document_type" = DocumentType, Path, description = "Document type")),
    responses(
        (status = 200, description = "Fully qualified field names", body = TemplateFieldsResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "No template for this type (NOT_FOUND)", body = ErrorBody),
        (status = 424, description = "Stored template is unreadable (DEPENDENCY_FAILED)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(user_id = auth_user.user_id))]
pub async fn list_template_fields(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(document_type): Path<DocumentType>,
) -> Result<Json<TemplateFieldsResponse>, AppError> {
    auth_user.require_staff()?;

    let template = find_template(&state.db, document_type).await?;
    let blob = referenced_blob(&state, template.blob_id).await?;
    let form = PdfForm::load(&blob.content)?;

    Ok(Json(TemplateFieldsResponse {
        document_type,
        fields: form.field_names(),
    }))
}

#[utoipa::path(
    delete,
    path = "/{document_type}",
    tag = "Templates",
    operation_id = "deleteTemplate",
    summary = "Delete a template",
    params(("document_type" = DocumentType, Path, description = "Document type")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "No template for this type (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(user_id = auth_user.user_id))]
pub async fn delete_template(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(document_type): Path<DocumentType>,
) -> Result<impl IntoResponse, AppError> {
    auth_user.require_admin()?;

    let txn = state.db.begin().await?;
    advisory_xact_lock(&txn, LockKey::Template(document_type)).await?;
    let template = find_template(&txn, document_type).await?;
    let blob_id = template.blob_id;

    acroform_template::Entity::delete_by_id(template.id)
        .exec(&txn)
        .await?;
    BlobStore::new(&txn).delete(blob_id).await?;
    txn.commit().await?;

    info!(%document_type, "Template deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn find_template<C: ConnectionTrait>(
    db: &C,
    document_type: DocumentType,
) -> Result<acroform_template::Model, AppError> {
    acroform_template::Entity::find()
        .filter(acroform_template::Column::DocumentType.eq(document_type))
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No template for {document_type}")))
}
