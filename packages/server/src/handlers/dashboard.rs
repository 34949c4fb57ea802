use axum::Json;
use axum::extract::State;
use common::{ApplicationStatus, StudentStatus};
use sea_orm::*;
use tracing::instrument;

use crate::entity::{material, series, student, student_application, student_document};
use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::extractors::json::AppQuery;
use crate::handlers::application::application_summaries;
use crate::models::application::ApplicationListItem;
use crate::models::dashboard::{
    ApplicationCounts, DashboardSummary, RecentApplicationsQuery, RecentApplicationsResponse,
    StudentCounts,
};
use crate::state::AppState;

#[utoipa::path(
    get,
    path = "/summary",
    tag = "Dashboard",
    operation_id = "dashboardSummary",
    summary = "Headline counts for the operator dashboard",
    responses(
        (status = 200, description = "Counts", body = DashboardSummary),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(user_id = auth_user.user_id))]
pub async fn summary(
    auth_user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<DashboardSummary>, AppError> {
    auth_user.require_staff()?;

    let mut applications = ApplicationCounts::default();
    let per_status: Vec<(ApplicationStatus, i64)> = student_application::Entity::find()
        .select_only()
        .column(student_application::Column::Status)
        .column_as(student_application::Column::Id.count(), "n")
        .group_by(student_application::Column::Status)
        .into_tuple()
        .all(&state.db)
        .await?;
    for (status, n) in per_status {
        let n = n as u64;
        match status {
            ApplicationStatus::Pending => applications.pending = n,
            ApplicationStatus::Approved => applications.approved = n,
            ApplicationStatus::Rejected => applications.rejected = n,
        }
    }

    let mut students = StudentCounts::default();
    let per_status: Vec<(StudentStatus, i64)> = student::Entity::find()
        .select_only()
        .column(student::Column::Status)
        .column_as(student::Column::Id.count(), "n")
        .group_by(student::Column::Status)
        .into_tuple()
        .all(&state.db)
        .await?;
    for (status, n) in per_status {
        let n = n as u64;
        match status {
            StudentStatus::Active => students.active = n,
            StudentStatus::Inactive => students.inactive = n,
            StudentStatus::Graduate => students.graduate = n,
        }
    }

    Ok(Json(DashboardSummary {
        applications,
        students,
        series: series::Entity::find().count(&state.db).await?,
        materials: material::Entity::find().count(&state.db).await?,
        documents: student_document::Entity::find().count(&state.db).await?,
    }))
}

#[utoipa::path(
    get,
    path = "/recent-applications",
    tag = "Dashboard",
    operation_id = "recentApplications",
    summary = "Newest applications still awaiting review",
    params(RecentApplicationsQuery),
    responses(
        (status = 200, description = "Pending applications, newest first", body = RecentApplicationsResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, query), fields(user_id = auth_user.user_id))]
pub async fn recent_applications(
    auth_user: AuthUser,
    State(state): State<AppState>,
    AppQuery(query): AppQuery<RecentApplicationsQuery>,
) -> Result<Json<RecentApplicationsResponse>, AppError> {
    auth_user.require_staff()?;

    let limit = query.limit.unwrap_or(5).clamp(1, 50);
    let data = application_summaries(
        student_application::Entity::find()
            .filter(student_application::Column::Status.eq(ApplicationStatus::Pending)),
    )
    .order_by_desc(student_application::Column::CreatedAt)
    .order_by_desc(student_application::Column::Id)
    .limit(limit)
    .into_model::<ApplicationListItem>()
    .all(&state.db)
    .await?;

    Ok(Json(RecentApplicationsResponse { data }))
}
