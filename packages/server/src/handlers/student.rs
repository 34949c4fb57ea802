use axum::Json;
use axum::extract::{Path, State};
use chrono::Utc;
use sea_orm::*;
use tracing::{info, instrument};

use crate::entity::student;
use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::extractors::json::{AppJson, AppQuery};
use crate::models::student::{StudentListQuery, StudentResponse, UpdateStudentRequest};
use crate::services::access::student_for_user;
use crate::state::AppState;

#[utoipa::path(
    get,
    path = "/",
    tag = "Students",
    operation_id = "listStudents",
    summary = "List students",
    params(StudentListQuery),
    responses(
        (status = 200, description = "Students ordered by name", body = Vec<StudentResponse>),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, query), fields(user_id = auth_user.user_id))]
pub async fn list_students(
    auth_user: AuthUser,
    State(state): State<AppState>,
    AppQuery(query): AppQuery<StudentListQuery>,
) -> Result<Json<Vec<StudentResponse>>, AppError> {
    auth_user.require_staff()?;

    let mut select = student::Entity::find();
    if let Some(status) = query.status {
        select = select.filter(student::Column::Status.eq(status));
    }
    if let Some(series_id) = query.series_id {
        select = select.filter(student::Column::SeriesId.eq(series_id));
    }

    let students = select
        .order_by_asc(student::Column::LastName)
        .order_by_asc(student::Column::FirstName)
        .order_by_asc(student::Column::Id)
        .all(&state.db)
        .await?;

    Ok(Json(students.into_iter().map(Into::into).collect()))
}

#[utoipa::path(
    get,
    path = "/me",
    tag = "Students",
    operation_id = "getMyStudentRecord",
    summary = "The caller's enrollment record",
    responses(
        (status = 200, description = "Enrollment record", body = StudentResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "No enrollment for this account (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(user_id = auth_user.user_id))]
pub async fn my_student_record(
    auth_user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<StudentResponse>, AppError> {
    auth_user.require_role(&[common::Role::Student])?;
    let student = student_for_user(&state.db, auth_user.user_id).await?;
    Ok(Json(student.into()))
}

#[utoipa::path(
    patch,
    path = "/{id}",
    tag = "Students",
    operation_id = "updateStudent",
    summary = "Change a student's enrollment status",
    params(("id" = i32, Path, description = "Student ID")),
    request_body = UpdateStudentRequest,
    responses(
        (status = 200, description = "Updated", body = StudentResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Student not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(user_id = auth_user.user_id))]
pub async fn update_student(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    AppJson(payload): AppJson<UpdateStudentRequest>,
) -> Result<Json<StudentResponse>, AppError> {
    auth_user.require_admin()?;

    let existing = find_student(&state.db, id).await?;
    let previous = existing.status;

    let mut active = existing.into_active_model();
    active.status = Set(payload.status);
    active.updated_at = Set(Utc::now());
    let updated = active.update(&state.db).await?;

    info!(student_id = id, from = %previous, to = %updated.status, "Student status changed");
    Ok(Json(updated.into()))
}

pub async fn find_student<C: ConnectionTrait>(db: &C, id: i32) -> Result<student::Model, AppError> {
    student::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Student not found".into()))
}
