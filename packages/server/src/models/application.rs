use chrono::{DateTime, NaiveDate, Utc};
use common::ApplicationStatus;
use sea_orm::FromQueryResult;
use serde::{Deserialize, Serialize};

use crate::entity::student_application;
use crate::error::AppError;
use crate::services::account::normalize_email;

use super::shared::{Pagination, optional_text, require_text};
use super::student::StudentResponse;

/// Multipart name of the optional identity document upload.
pub const IDENTITY_DOCUMENT_FIELD: &str = "identity_document";

/// Raw text fields of a public application, as collected from multipart.
#[derive(Debug, Default)]
pub struct ApplicationForm {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub cnp: Option<String>,
    pub birth_date: Option<String>,
    pub county: Option<String>,
    pub city: Option<String>,
    pub street_address: Option<String>,
    pub postal_code: Option<String>,
    pub id_card_series: Option<String>,
    pub id_card_number: Option<String>,
    pub id_card_issued_by: Option<String>,
    pub institution: Option<String>,
    pub specialization: Option<String>,
    pub study_year: Option<String>,
}

impl ApplicationForm {
    /// Store a text field. Returns `false` for names the form does not know.
    pub fn set(&mut self, name: &str, value: String) -> bool {
        let slot = match name {
            "email" => &mut self.email,
            "first_name" => &mut self.first_name,
            "last_name" => &mut self.last_name,
            "phone" => &mut self.phone,
            "cnp" => &mut self.cnp,
            "birth_date" => &mut self.birth_date,
            "county" => &mut self.county,
            "city" => &mut self.city,
            "street_address" => &mut self.street_address,
            "postal_code" => &mut self.postal_code,
            "id_card_series" => &mut self.id_card_series,
            "id_card_number" => &mut self.id_card_number,
            "id_card_issued_by" => &mut self.id_card_issued_by,
            "institution" => &mut self.institution,
            "specialization" => &mut self.specialization,
            "study_year" => &mut self.study_year,
            _ => return false,
        };
        *slot = Some(value);
        true
    }

    pub fn validate(self) -> Result<NewApplication, AppError> {
        let required = |value: &Option<String>, label: &str, max: usize| {
            require_text(value.as_deref().unwrap_or_default(), label, max)
        };

        let email = normalize_email(&required(&self.email, "Email", 254)?);
        validate_email(&email)?;

        let cnp = required(&self.cnp, "CNP", 13)?;
        validate_cnp(&cnp)?;

        let phone = required(&self.phone, "Phone", 32)?;
        if !phone
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '+' | ' ' | '-' | '(' | ')'))
        {
            return Err(AppError::Validation(
                "Phone may contain only digits, spaces and + - ( )".into(),
            ));
        }

        let birth_date = match optional_text(self.birth_date.as_deref(), "Birth date", 10)? {
            Some(raw) => Some(NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|_| {
                AppError::Validation("Birth date must be formatted as YYYY-MM-DD".into())
            })?),
            None => None,
        };

        let study_year = match optional_text(self.study_year.as_deref(), "Study year", 2)? {
            Some(raw) => match raw.parse::<i32>() {
                Ok(year @ 1..=10) => Some(year),
                _ => {
                    return Err(AppError::Validation(
                        "Study year must be a number between 1 and 10".into(),
                    ));
                }
            },
            None => None,
        };

        Ok(NewApplication {
            email,
            first_name: required(&self.first_name, "First name", 100)?,
            last_name: required(&self.last_name, "Last name", 100)?,
            phone,
            cnp,
            birth_date,
            county: required(&self.county, "County", 100)?,
            city: required(&self.city, "City", 100)?,
            street_address: required(&self.street_address, "Street address", 255)?,
            postal_code: optional_text(self.postal_code.as_deref(), "Postal code", 16)?,
            id_card_series: required(&self.id_card_series, "ID card series", 8)?.to_uppercase(),
            id_card_number: required(&self.id_card_number, "ID card number", 16)?,
            id_card_issued_by: optional_text(
                self.id_card_issued_by.as_deref(),
                "ID card issuer",
                255,
            )?,
            institution: required(&self.institution, "Institution", 255)?,
            specialization: optional_text(self.specialization.as_deref(), "Specialization", 255)?,
            study_year,
        })
    }
}

/// Validated application, ready to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewApplication {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub cnp: String,
    pub birth_date: Option<NaiveDate>,
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
}

fn validate_email(email: &str) -> Result<(), AppError> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(AppError::Validation("Email address is not valid".into()))
    }
}

/// Romanian personal numeric code: exactly 13 ASCII digits.
fn validate_cnp(cnp: &str) -> Result<(), AppError> {
    if cnp.len() == 13 && cnp.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(AppError::Validation("CNP must be exactly 13 digits".into()))
    }
}

/// Response for a freshly submitted application.
#[derive(Serialize, utoipa::ToSchema)]
pub struct ApplicationSubmitted {
    #[schema(example = 12)]
    pub id: i32,
    #[schema(example = 1042)]
    pub application_no: i32,
    pub status: ApplicationStatus,
}

/// Query parameters for the application list.
#[derive(Deserialize, utoipa::IntoParams)]
pub struct ApplicationListQuery {
    /// Filter by review state.
    pub status: Option<ApplicationStatus>,
    #[param(example = 1)]
    pub page: Option<u64>,
    #[param(example = 20)]
    pub per_page: Option<u64>,
}

/// Application summary for list views.
#[derive(Serialize, FromQueryResult, utoipa::ToSchema)]
pub struct ApplicationListItem {
    pub id: i32,
    pub application_no: i32,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub institution: String,
    pub status: ApplicationStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct ApplicationListResponse {
    pub data: Vec<ApplicationListItem>,
    pub pagination: Pagination,
}

/// Full application details.
#[derive(Serialize, utoipa::ToSchema)]
pub struct ApplicationResponse {
    pub id: i32,
    pub application_no: i32,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub cnp: String,
    pub birth_date: Option<NaiveDate>,
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
    /// Whether an identity document was attached.
    pub has_identity_document: bool,
    pub status: ApplicationStatus,
    pub admin_note: Option<String>,
    pub reviewed_by: Option<i32>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<student_application::Model> for ApplicationResponse {
    fn from(m: student_application::Model) -> Self {
        Self {
            id: m.id,
            application_no: m.application_no,
            email: m.email,
            first_name: m.first_name,
            last_name: m.last_name,
            phone: m.phone,
            cnp: m.cnp,
            birth_date: m.birth_date,
            county: m.county,
            city: m.city,
            street_address: m.street_address,
            postal_code: m.postal_code,
            id_card_series: m.id_card_series,
            id_card_number: m.id_card_number,
            id_card_issued_by: m.id_card_issued_by,
            institution: m.institution,
            specialization: m.specialization,
            study_year: m.study_year,
            has_identity_document: m.identity_document_id.is_some(),
            status: m.status,
            admin_note: m.admin_note,
            reviewed_by: m.reviewed_by,
            reviewed_at: m.reviewed_at,
            created_at: m.created_at,
        }
    }
}

/// Body of approve/reject calls.
#[derive(Deserialize, Default, utoipa::ToSchema)]
pub struct ReviewRequest {
    /// Optional note stored with the decision.
    #[schema(example = "Missing signature on page 2")]
    pub admin_note: Option<String>,
}

impl ReviewRequest {
    pub fn note(&self) -> Result<Option<String>, AppError> {
        optional_text(self.admin_note.as_deref(), "Admin note", 2000)
    }
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct ApprovalResponse {
    pub application: ApplicationResponse,
    pub student: StudentResponse,
    /// `true` when this approval provisioned the account.
    pub account_created: bool,
}
