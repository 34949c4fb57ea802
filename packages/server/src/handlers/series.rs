use std::collections::{HashMap, HashSet};

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::Utc;
use sea_orm::sea_query::{Expr, Func, LockType};
use sea_orm::*;
use tracing::{info, instrument};

use crate::entity::{material_series_access, series, student};
use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::extractors::json::AppJson;
use crate::models::series::{
    AssignStudentsRequest, AssignStudentsResponse, CreateSeriesRequest, SeriesResponse,
};
use crate::state::AppState;

#[utoipa::path(
    post,
    path = "/",
    tag = "Series",
    operation_id = "createSeries",
    summary = "Create a series",
    description = "Series names are unique regardless of case.",
    request_body = CreateSeriesRequest,
    responses(
        (status = 201, description = "Series created", body = SeriesResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 409, description = "Name already used (CONFLICT)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(user_id = auth_user.user_id))]
pub async fn create_series(
    auth_user: AuthUser,
    State(state): State<AppState>,
    AppJson(payload): AppJson<CreateSeriesRequest>,
) -> Result<impl IntoResponse, AppError> {
    auth_user.require_staff()?;
    let (name, description) = payload.validate()?;

    let taken = series::Entity::find()
        .filter(Expr::expr(Func::lower(Expr::col(series::Column::Name))).eq(name.to_lowercase()))
        .one(&state.db)
        .await?;
    if taken.is_some() {
        return Err(duplicate_name(&name));
    }

    let new_series = series::ActiveModel {
        name: Set(name.clone()),
        description: Set(description),
        created_by: Set(auth_user.user_id),
        created_at: Set(Utc::now()),
        ..Default::default()
    };

    // The LOWER(name) index settles concurrent creates.
    match new_series.insert(&state.db).await {
        Ok(model) => {
            info!(series_id = model.id, name = %model.name, "Series created");
            Ok((StatusCode::CREATED, Json(SeriesResponse::new(model, 0))))
        }
        Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
            Err(duplicate_name(&name))
        }
        Err(e) => Err(e.into()),
    }
}

fn duplicate_name(name: &str) -> AppError {
    AppError::Conflict(format!("A series named '{name}' already exists"))
}

#[utoipa::path(
    get,
    path = "/",
    tag = "Series",
    operation_id = "listSeries",
    summary = "List series with member counts",
    responses(
        (status = 200, description = "All series ordered by name", body = Vec<SeriesResponse>),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(user_id = auth_user.user_id))]
pub async fn list_series(
    auth_user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<SeriesResponse>>, AppError> {
    auth_user.require_staff()?;

    let all = series::Entity::find()
        .order_by_asc(series::Column::Name)
        .all(&state.db)
        .await?;

    let counts: HashMap<i32, i64> = student::Entity::find()
        .select_only()
        .column(student::Column::SeriesId)
        .column_as(student::Column::Id.count(), "member_count")
        .filter(student::Column::SeriesId.is_not_null())
        .group_by(student::Column::SeriesId)
        .into_tuple::<(i32, i64)>()
        .all(&state.db)
        .await?
        .into_iter()
        .collect();

    Ok(Json(
        all.into_iter()
            .map(|s| {
                let members = counts.get(&s.id).copied().unwrap_or(0);
                SeriesResponse::new(s, members)
            })
            .collect(),
    ))
}

#[utoipa::path(
    delete,
    path = "/{id}",
    tag = "Series",
    operation_id = "deleteSeries",
    summary = "Delete a series",
    description = "Members are detached and material grants naming the series are removed.",
    params(("id" = i32, Path, description = "Series ID")),
    responses(
        (status = 204, description = "Series deleted"),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Series not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(user_id = auth_user.user_id))]
pub async fn delete_series(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, AppError> {
    auth_user.require_staff()?;

    let txn = state.db.begin().await?;
    find_series_for_update(&txn, id).await?;

    let detached = student::Entity::update_many()
        .col_expr(student::Column::SeriesId, Expr::value(Option::<i32>::None))
        .col_expr(student::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(student::Column::SeriesId.eq(id))
        .exec(&txn)
        .await?
        .rows_affected;

    let revoked = material_series_access::Entity::delete_many()
        .filter(material_series_access::Column::SeriesId.eq(id))
        .exec(&txn)
        .await?
        .rows_affected;

    series::Entity::delete_by_id(id).exec(&txn).await?;
    txn.commit().await?;

    info!(series_id = id, detached, revoked, "Series deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    put,
    path = "/{id}/students",
    tag = "Series",
    operation_id = "assignStudents",
    summary = "Move students into a series",
    description = "Each listed student leaves its current series, if any. Unknown student IDs fail the whole request.",
    params(("id" = i32, Path, description = "Series ID")),
    request_body = AssignStudentsRequest,
    responses(
        (status = 200, description = "Students assigned", body = AssignStudentsResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Series not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(user_id = auth_user.user_id, count = payload.student_ids.len()))]
pub async fn assign_students(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    AppJson(payload): AppJson<AssignStudentsRequest>,
) -> Result<Json<AssignStudentsResponse>, AppError> {
    auth_user.require_admin()?;
    payload.validate()?;

    let txn = state.db.begin().await?;
    find_series_for_update(&txn, id).await?;

    let existing: HashSet<i32> = student::Entity::find()
        .filter(student::Column::Id.is_in(payload.student_ids.clone()))
        .select_only()
        .column(student::Column::Id)
        .into_tuple::<i32>()
        .all(&txn)
        .await?
        .into_iter()
        .collect();
    let missing: Vec<String> = payload
        .student_ids
        .iter()
        .filter(|sid| !existing.contains(sid))
        .map(ToString::to_string)
        .collect();
    if !missing.is_empty() {
        return Err(AppError::Validation(format!(
            "Unknown student IDs: {}",
            missing.join(", ")
        )));
    }

    let assigned = student::Entity::update_many()
        .col_expr(student::Column::SeriesId, Expr::value(id))
        .col_expr(student::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(student::Column::Id.is_in(payload.student_ids))
        .exec(&txn)
        .await?
        .rows_affected;

    txn.commit().await?;

    info!(series_id = id, assigned, "Students assigned to series");
    Ok(Json(AssignStudentsResponse {
        series_id: id,
        assigned,
    }))
}

#[utoipa::path(
    delete,
    path = "/{id}/students/{student_id}",
    tag = "Series",
    operation_id = "removeStudentFromSeries",
    summary = "Detach one student from a series",
    params(
        ("id" = i32, Path, description = "Series ID"),
        ("student_id" = i32, Path, description = "Student ID"),
    ),
    responses(
        (status = 204, description = "Student detached"),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Student is not in this series (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(user_id = auth_user.user_id))]
pub async fn remove_student(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path((id, student_id)): Path<(i32, i32)>,
) -> Result<impl IntoResponse, AppError> {
    auth_user.require_admin()?;

    let result = student::Entity::update_many()
        .col_expr(student::Column::SeriesId, Expr::value(Option::<i32>::None))
        .col_expr(student::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(student::Column::Id.eq(student_id))
        .filter(student::Column::SeriesId.eq(id))
        .exec(&state.db)
        .await?;

    if result.rows_affected == 0 {
        return Err(AppError::NotFound(
            "Student is not a member of this series".into(),
        ));
    }

    info!(series_id = id, student_id, "Student detached from series");
    Ok(StatusCode::NO_CONTENT)
}

async fn find_series_for_update<C: ConnectionTrait>(
    db: &C,
    id: i32,
) -> Result<series::Model, AppError> {
    series::Entity::find_by_id(id)
        .lock(LockType::Update)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Series not found".into()))
}
