use chrono::{DateTime, Utc};
use common::Visibility;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entity::{material, material_category};
use crate::error::AppError;

use super::shared::{require_text, validate_bulk_ids};

const MAX_GRANTS: usize = 1000;

#[derive(Deserialize, utoipa::ToSchema)]
pub struct CreateCategoryRequest {
    #[schema(example = "Legislatie")]
    pub name: String,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct CategoryResponse {
    pub id: i32,
    #[schema(example = "Legislatie")]
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl From<material_category::Model> for CategoryResponse {
    fn from(m: material_category::Model) -> Self {
        Self {
            id: m.id,
            name: m.name,
            created_at: m.created_at,
        }
    }
}

/// Grant lists of a restricted material. Only shown to staff.
#[derive(Serialize, Default, utoipa::ToSchema)]
pub struct MaterialGrants {
    pub series_ids: Vec<i32>,
    pub student_ids: Vec<i32>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct MaterialResponse {
    pub id: i32,
    #[schema(example = "Regulament intern")]
    pub title: String,
    pub category_id: Option<i32>,
    /// Download through `GET /api/v1/blobs/{blob_id}`.
    pub blob_id: Uuid,
    #[schema(example = "regulament.pdf")]
    pub original_filename: String,
    #[schema(example = "application/pdf")]
    pub mime_type: String,
    pub byte_size: i64,
    pub uploaded_by: i32,
    pub uploaded_at: DateTime<Utc>,
    /// Derived from the public flag and the grant rows.
    pub visibility: Visibility,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grants: Option<MaterialGrants>,
}

impl MaterialResponse {
    pub fn new(m: material::Model, visibility: Visibility, grants: Option<MaterialGrants>) -> Self {
        Self {
            id: m.id,
            title: m.title,
            category_id: m.category_id,
            blob_id: m.blob_id,
            original_filename: m.original_filename,
            mime_type: m.mime_type,
            byte_size: m.byte_size,
            uploaded_by: m.uploaded_by,
            uploaded_at: m.uploaded_at,
            visibility,
            grants,
        }
    }
}

#[derive(Deserialize, utoipa::IntoParams)]
pub struct MaterialListQuery {
    pub category_id: Option<i32>,
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct SetVisibilityRequest {
    pub visibility: Visibility,
    /// Series granted access; only meaningful for `restricted`.
    #[serde(default)]
    pub series_ids: Vec<i32>,
    /// Students granted access; only meaningful for `restricted`.
    #[serde(default)]
    pub student_ids: Vec<i32>,
}

impl SetVisibilityRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        validate_bulk_ids(&self.series_ids, "series", MAX_GRANTS)?;
        validate_bulk_ids(&self.student_ids, "student", MAX_GRANTS)
    }

    /// What will actually be stored: grants are dropped unless restricted,
    /// and restricted with no grants collapses to private.
    pub fn effective(&self) -> (Visibility, &[i32], &[i32]) {
        match self.visibility {
            Visibility::Restricted
                if !self.series_ids.is_empty() || !self.student_ids.is_empty() =>
            {
                (Visibility::Restricted, &self.series_ids, &self.student_ids)
            }
            Visibility::Public => (Visibility::Public, &[], &[]),
            _ => (Visibility::Private, &[], &[]),
        }
    }
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct AccessResponse {
    pub allowed: bool,
}

/// Validated material title.
pub fn validate_material_title(title: &str) -> Result<String, AppError> {
    require_text(title, "Title", 256)
}
