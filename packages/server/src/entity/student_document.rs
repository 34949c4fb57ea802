use common::{DocumentStatus, DocumentType, Role};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Current document of a given type held by a student.
///
/// `(student_id, document_type)` is unique; replacing a document replaces the row.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "student_document")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub student_id: i32,
    #[sea_orm(belongs_to, from = "student_id", to = "id")]
    pub student: HasOne<super::student::Entity>,

    pub document_type: DocumentType,

    pub blob_id: Uuid,
    #[sea_orm(belongs_to, from = "blob_id", to = "id")]
    pub blob: HasOne<super::blob::Entity>,

    pub uploaded_by_role: Role,
    pub uploaded_by: i32,
    #[sea_orm(belongs_to, from = "uploaded_by", to = "id")]
    pub uploader: HasOne<super::user::Entity>,

    pub is_visible_to_student: bool,
    pub status: DocumentStatus,

    pub created_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
