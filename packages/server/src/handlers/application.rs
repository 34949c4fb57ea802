use axum::Json;
use axum::extract::{Multipart, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use common::ApplicationStatus;
use sea_orm::*;
use tracing::{debug, info, instrument, warn};

use crate::database::{LockKey, advisory_xact_lock};
use crate::entity::student_application;
use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::extractors::json::{AppJson, AppQuery};
use crate::handlers::blob::{blob_response, etag, not_modified, referenced_blob};
use crate::models::application::{
    ApplicationForm, ApplicationListItem, ApplicationListQuery, ApplicationListResponse,
    ApplicationResponse, ApplicationSubmitted, ApprovalResponse, IDENTITY_DOCUMENT_FIELD,
    ReviewRequest,
};
use crate::models::shared::{Pagination, page_params};
use crate::services::BlobStore;
use crate::services::review::{ReviewService, find_application};
use crate::state::AppState;
use crate::utils::upload::{UploadedFile, read_file_field, read_text_field};

#[utoipa::path(
    post,
    path = "/",
    tag = "Applications",
    operation_id = "submitApplication",
    summary = "Submit an application",
    description = "Public endpoint. Text fields are sent as multipart parts; an optional \
        `identity_document` file (PDF, JPEG or PNG) may be attached. The application starts \
        as `pending` and receives the next sequential application number.",
    request_body(content_type = "multipart/form-data", description = "Applicant data with optional identity document"),
    responses(
        (status = 201, description = "Application recorded", body = ApplicationSubmitted),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, multipart))]
pub async fn submit_application(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut form = ApplicationForm::default();
    let mut identity_document: Option<UploadedFile> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Multipart error: {e}")))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        if name == IDENTITY_DOCUMENT_FIELD {
            // Browsers send an empty part for an untouched file input.
            if field.file_name().is_none_or(str::is_empty) {
                continue;
            }
            identity_document =
                Some(read_file_field(field, state.config.upload.max_upload_size).await?);
        } else {
            let value = read_text_field(field).await?;
            if !form.set(&name, value) {
                debug!(field = %name, "Ignoring unknown application field");
            }
        }
    }

    let application = form.validate()?;
    if let Some(file) = &identity_document {
        file.require_mime(&state.config.upload.identity_document_types)?;
    }

    let txn = state.db.begin().await?;

    advisory_xact_lock(&txn, LockKey::ApplicationNumber).await?;
    let last_no: Option<i32> = student_application::Entity::find()
        .select_only()
        .column_as(student_application::Column::ApplicationNo.max(), "max_no")
        .into_tuple::<Option<i32>>()
        .one(&txn)
        .await?
        .flatten();
    let application_no = last_no
        .unwrap_or(0)
        .checked_add(1)
        .ok_or_else(|| AppError::Internal("Application number overflow".into()))?;

    let identity_document_id = match identity_document {
        Some(file) => Some(
            BlobStore::new(&txn)
                .create(file.content, &file.filename, &file.mime_type)
                .await?,
        ),
        None => None,
    };

    let saved = student_application::ActiveModel {
        application_no: Set(application_no),
        email: Set(application.email),
        first_name: Set(application.first_name),
        last_name: Set(application.last_name),
        phone: Set(application.phone),
        cnp: Set(application.cnp),
        birth_date: Set(application.birth_date),
        county: Set(application.county),
        city: Set(application.city),
        street_address: Set(application.street_address),
        postal_code: Set(application.postal_code),
        id_card_series: Set(application.id_card_series),
        id_card_number: Set(application.id_card_number),
        id_card_issued_by: Set(application.id_card_issued_by),
        institution: Set(application.institution),
        specialization: Set(application.specialization),
        study_year: Set(application.study_year),
        identity_document_id: Set(identity_document_id),
        status: Set(ApplicationStatus::Pending),
        admin_note: Set(None),
        reviewed_by: Set(None),
        reviewed_at: Set(None),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    txn.commit().await?;

    info!(
        application_id = saved.id,
        application_no,
        has_identity_document = saved.identity_document_id.is_some(),
        "Application submitted"
    );

    Ok((
        StatusCode::CREATED,
        Json(ApplicationSubmitted {
            id: saved.id,
            application_no: saved.application_no,
            status: saved.status,
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/",
    tag = "Applications",
    operation_id = "listApplications",
    summary = "List applications",
    description = "Paginated, newest first, optionally filtered by status. Staff only.",
    params(ApplicationListQuery),
    responses(
        (status = 200, description = "Applications", body = ApplicationListResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, query), fields(user_id = auth_user.user_id))]
pub async fn list_applications(
    auth_user: AuthUser,
    State(state): State<AppState>,
    AppQuery(query): AppQuery<ApplicationListQuery>,
) -> Result<Json<ApplicationListResponse>, AppError> {
    auth_user.require_staff()?;

    let (page, per_page) = page_params(query.page, query.per_page);

    let mut select = student_application::Entity::find();
    if let Some(status) = query.status {
        select = select.filter(student_application::Column::Status.eq(status));
    }

    let total = select
        .clone()
        .paginate(&state.db, per_page)
        .num_items()
        .await?;

    let data = application_summaries(select)
        .order_by_desc(student_application::Column::CreatedAt)
        .order_by_desc(student_application::Column::Id)
        .offset((page - 1) * per_page)
        .limit(per_page)
        .into_model::<ApplicationListItem>()
        .all(&state.db)
        .await?;

    Ok(Json(ApplicationListResponse {
        data,
        pagination: Pagination::new(page, per_page, total),
    }))
}

/// Narrow an application query to the list-item columns.
pub fn application_summaries(
    select: Select<student_application::Entity>,
) -> Select<student_application::Entity> {
    select
        .select_only()
        .column(student_application::Column::Id)
        .column(student_application::Column::ApplicationNo)
        .column(student_application::Column::Email)
        .column(student_application::Column::FirstName)
        .column(student_application::Column::LastName)
        .column(student_application::Column::Institution)
        .column(student_application::Column::Status)
        .column(student_application::Column::CreatedAt)
}

#[utoipa::path(
    get,
    path = "/{id}",
    tag = "Applications",
    operation_id = "getApplication",
    summary = "Get an application",
    params(("id" = i32, Path, description = "Application ID")),
    responses(
        (status = 200, description = "Application details", body = ApplicationResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Application not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(user_id = auth_user.user_id))]
pub async fn get_application(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<ApplicationResponse>, AppError> {
    auth_user.require_staff()?;
    let application = find_application(&state.db, id).await?;
    Ok(Json(application.into()))
}

#[utoipa::path(
    get,
    path = "/{id}/identity-document",
    tag = "Applications",
    operation_id = "downloadIdentityDocument",
    summary = "Download the identity document attached to an application",
    params(("id" = i32, Path, description = "Application ID")),
    responses(
        (status = 200, description = "File content"),
        (status = 304, description = "Not Modified (ETag match)"),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Application or document not found (NOT_FOUND)", body = ErrorBody),
        (status = 424, description = "Referenced blob is missing (DEPENDENCY_FAILED)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, headers), fields(user_id = auth_user.user_id))]
pub async fn download_identity_document(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    auth_user.require_admin()?;

    let application = find_application(&state.db, id).await?;
    let blob_id = application
        .identity_document_id
        .ok_or_else(|| AppError::NotFound("Application has no identity document".into()))?;

    let blob = referenced_blob(&state, blob_id).await?;
    if let Some(cached) = not_modified(&etag(blob.id, blob.uploaded_at), &headers) {
        return Ok(cached);
    }
    blob_response(blob, false)
}

#[utoipa::path(
    post,
    path = "/{id}/approve",
    tag = "Applications",
    operation_id = "approveApplication",
    summary = "Approve an application",
    description = "Creates (or reuses) the applicant's account and enrollment record. \
        Approving an approved application again is idempotent; a rejected application \
        cannot be approved. Admin only.",
    params(("id" = i32, Path, description = "Application ID")),
    request_body = ReviewRequest,
    responses(
        (status = 200, description = "Application approved", body = ApprovalResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Application not found (NOT_FOUND)", body = ErrorBody),
        (status = 409, description = "Application was rejected (CONFLICT)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(user_id = auth_user.user_id))]
pub async fn approve_application(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    AppJson(payload): AppJson<ReviewRequest>,
) -> Result<Json<ApprovalResponse>, AppError> {
    auth_user.require_admin()?;
    let note = payload.note()?;

    let approval = ReviewService::new(&state.db, state.accounts.as_ref(), &state.notifications)
        .approve(id, auth_user.user_id, note)
        .await?;

    if approval.account.created
        && let Err(e) = state
            .accounts
            .request_password_reset(
                &approval.application.email,
                &state.config.auth.password_reset_redirect_url,
            )
            .await
    {
        warn!(application_id = id, error = ?e, "Failed to issue first-login reset link");
    }

    Ok(Json(ApprovalResponse {
        account_created: approval.account.created,
        application: approval.application.into(),
        student: approval.student.into(),
    }))
}

#[utoipa::path(
    post,
    path = "/{id}/reject",
    tag = "Applications",
    operation_id = "rejectApplication",
    summary = "Reject an application",
    description = "Rejecting a rejected application only refreshes the note. An approved \
        application cannot be rejected. Admin only.",
    params(("id" = i32, Path, description = "Application ID")),
    request_body = ReviewRequest,
    responses(
        (status = 200, description = "Application rejected", body = ApplicationResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Application not found (NOT_FOUND)", body = ErrorBody),
        (status = 409, description = "Application was approved (CONFLICT)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(user_id = auth_user.user_id))]
pub async fn reject_application(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    AppJson(payload): AppJson<ReviewRequest>,
) -> Result<Json<ApplicationResponse>, AppError> {
    auth_user.require_admin()?;
    let note = payload.note()?;

    let rejection = ReviewService::new(&state.db, state.accounts.as_ref(), &state.notifications)
        .reject(id, auth_user.user_id, note)
        .await?;

    Ok(Json(rejection.application.into()))
}
