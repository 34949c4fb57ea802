use serde::{Deserialize, Serialize};

use super::application::ApplicationListItem;

#[derive(Serialize, Default, utoipa::ToSchema)]
pub struct ApplicationCounts {
    pub pending: u64,
    pub approved: u64,
    pub rejected: u64,
}

#[derive(Serialize, Default, utoipa::ToSchema)]
pub struct StudentCounts {
    pub active: u64,
    pub inactive: u64,
    pub graduate: u64,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct DashboardSummary {
    pub applications: ApplicationCounts,
    pub students: StudentCounts,
    pub series: u64,
    pub materials: u64,
    /// Current document slots across all students.
    pub documents: u64,
}

#[derive(Deserialize, utoipa::IntoParams)]
pub struct RecentApplicationsQuery {
    /// 1-50, default 5.
    #[param(example = 5)]
    pub limit: Option<u64>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct RecentApplicationsResponse {
    pub data: Vec<ApplicationListItem>,
}
