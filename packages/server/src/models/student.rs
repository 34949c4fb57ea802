use chrono::{DateTime, Utc};
use common::StudentStatus;
use serde::{Deserialize, Serialize};

use crate::entity::student;

#[derive(Serialize, utoipa::ToSchema)]
pub struct StudentResponse {
    #[schema(example = 7)]
    pub id: i32,
    #[schema(example = 12)]
    pub application_id: i32,
    #[schema(example = 42)]
    pub user_id: i32,
    #[schema(example = "ana.pop@example.ro")]
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub cnp: String,
    pub status: StudentStatus,
    /// Current series, if assigned.
    pub series_id: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<student::Model> for StudentResponse {
    fn from(m: student::Model) -> Self {
        Self {
            id: m.id,
            application_id: m.application_id,
            user_id: m.user_id,
            email: m.email,
            first_name: m.first_name,
            last_name: m.last_name,
            phone: m.phone,
            cnp: m.cnp,
            status: m.status,
            series_id: m.series_id,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}

#[derive(Deserialize, utoipa::IntoParams)]
pub struct StudentListQuery {
    pub status: Option<StudentStatus>,
    /// Only members of this series.
    pub series_id: Option<i32>,
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct UpdateStudentRequest {
    pub status: StudentStatus,
}
