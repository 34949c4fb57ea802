use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Study material. Visibility is not stored: it is derived from `is_public`
/// and the two grant tables.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "material")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub blob_id: Uuid,
    #[sea_orm(belongs_to, from = "blob_id", to = "id")]
    pub blob: HasOne<super::blob::Entity>,

    pub title: String,

    pub category_id: Option<i32>,
    #[sea_orm(belongs_to, from = "category_id", to = "id")]
    pub category: HasOne<super::material_category::Entity>,

    pub is_public: bool,

    pub uploaded_by: i32,
    #[sea_orm(belongs_to, from = "uploaded_by", to = "id")]
    pub uploader: HasOne<super::user::Entity>,

    /// Denormalized from the blob for list queries.
    pub original_filename: String,
    pub mime_type: String,
    pub byte_size: i64,

    pub uploaded_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
