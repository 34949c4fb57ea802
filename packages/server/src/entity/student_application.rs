use common::ApplicationStatus;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "student_application")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// Sequential, human-facing number.
    #[sea_orm(unique)]
    pub application_no: i32,

    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    /// National identification number (13 digits).
    pub cnp: String,
    pub birth_date: Option<Date>,

    pub county: String,
    pub city: String,
    pub street_address: String,
    pub postal_code: Option<String>,

    pub id_card_series: String,
    pub id_card_number: String,
    pub id_card_issued_by: Option<String>,

    pub institution: String,
    pub specialization: Option<String>,
    pub study_year: Option<i32>,

    pub identity_document_id: Option<Uuid>,
    #[sea_orm(belongs_to, from = "identity_document_id", to = "id")]
    pub identity_document: HasOne<super::blob::Entity>,

    pub status: ApplicationStatus,
    pub admin_note: Option<String>,

    pub reviewed_by: Option<i32>,
    #[sea_orm(belongs_to, from = "reviewed_by", to = "id")]
    pub reviewer: HasOne<super::user::Entity>,
    pub reviewed_at: Option<DateTimeUtc>,

    pub created_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
