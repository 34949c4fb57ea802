use common::StudentStatus;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Enrollment record materialized from an approved application.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "student")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(unique)]
    pub application_id: i32,
    #[sea_orm(belongs_to, from = "application_id", to = "id")]
    pub application: HasOne<super::student_application::Entity>,

    pub user_id: i32,
    #[sea_orm(belongs_to, from = "user_id", to = "id")]
    pub user: HasOne<super::user::Entity>,

    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub cnp: String,
    pub status: StudentStatus,

    /// At most one series at a time. NULL when unassigned.
    pub series_id: Option<i32>,
    #[sea_orm(belongs_to, from = "series_id", to = "id")]
    pub series: HasOne<super::series::Entity>,

    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
