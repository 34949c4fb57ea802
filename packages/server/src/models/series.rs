use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::series;
use crate::error::AppError;

use super::shared::{optional_text, require_text, validate_bulk_ids};

/// Upper bound on a single bulk assignment.
pub const MAX_BULK_ASSIGN: usize = 500;

#[derive(Deserialize, utoipa::ToSchema)]
pub struct CreateSeriesRequest {
    #[schema(example = "Seria 2025 A")]
    pub name: String,
    pub description: Option<String>,
}

impl CreateSeriesRequest {
    /// Trimmed `(name, description)`.
    pub fn validate(&self) -> Result<(String, Option<String>), AppError> {
        Ok((
            require_text(&self.name, "Series name", 100)?,
            optional_text(self.description.as_deref(), "Description", 1000)?,
        ))
    }
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct SeriesResponse {
    #[schema(example = 3)]
    pub id: i32,
    #[schema(example = "Seria 2025 A")]
    pub name: String,
    pub description: Option<String>,
    pub created_by: i32,
    pub created_at: DateTime<Utc>,
    /// Students currently in the series.
    #[schema(example = 24)]
    pub member_count: i64,
}

impl SeriesResponse {
    pub fn new(model: series::Model, member_count: i64) -> Self {
        Self {
            id: model.id,
            name: model.name,
            description: model.description,
            created_by: model.created_by,
            created_at: model.created_at,
            member_count,
        }
    }
}

/// Bulk assignment body. Listed students move into the series, leaving
/// whatever series they were in before.
#[derive(Deserialize, utoipa::ToSchema)]
pub struct AssignStudentsRequest {
    #[schema(example = json!([7, 8, 9]))]
    pub student_ids: Vec<i32>,
}

impl AssignStudentsRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.student_ids.is_empty() {
            return Err(AppError::Validation("student_ids must not be empty".into()));
        }
        validate_bulk_ids(&self.student_ids, "student", MAX_BULK_ASSIGN)
    }
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct AssignStudentsResponse {
    pub series_id: i32,
    /// Rows updated.
    pub assigned: u64,
}
