use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use common::acroform::{FillMode, FillReport};
use common::{DocumentStatus, DocumentType, Role};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entity::{acroform_template, student_document};
use crate::error::AppError;
use crate::services::BlobMeta;

/// Upper bound on the number of fields in one generate call.
const MAX_FIELDS: usize = 200;
const MAX_FIELD_VALUE_CHARS: usize = 2000;

/// A document slot together with its blob metadata.
#[derive(Serialize, utoipa::ToSchema)]
pub struct DocumentResponse {
    #[schema(example = 31)]
    pub id: i32,
    pub student_id: i32,
    pub document_type: DocumentType,
    /// Download through `GET /api/v1/blobs/{blob_id}`.
    pub blob_id: Uuid,
    #[schema(example = "adeverinta_finalizare_stagiu_student_7.pdf")]
    pub filename: String,
    #[schema(example = "application/pdf")]
    pub mime_type: String,
    pub byte_size: i64,
    pub uploaded_by_role: Role,
    pub uploaded_by: i32,
    pub is_visible_to_student: bool,
    pub status: DocumentStatus,
    pub created_at: DateTime<Utc>,
}

impl DocumentResponse {
    pub fn new(slot: student_document::Model, blob: BlobMeta) -> Self {
        Self {
            id: slot.id,
            student_id: slot.student_id,
            document_type: slot.document_type,
            blob_id: slot.blob_id,
            filename: blob.filename,
            mime_type: blob.mime_type,
            byte_size: blob.byte_size,
            uploaded_by_role: slot.uploaded_by_role,
            uploaded_by: slot.uploaded_by,
            is_visible_to_student: slot.is_visible_to_student,
            status: slot.status,
            created_at: slot.created_at,
        }
    }
}

#[derive(Deserialize, Clone, Copy, PartialEq, Eq, Debug, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum GenerateMode {
    /// Return the filled, still editable PDF without storing it.
    Preview,
    /// Flatten and store as the student's current document.
    Finalize,
}

impl From<GenerateMode> for FillMode {
    fn from(mode: GenerateMode) -> Self {
        match mode {
            GenerateMode::Preview => FillMode::Preview,
            GenerateMode::Finalize => FillMode::Finalize,
        }
    }
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct GenerateDocumentRequest {
    /// Template field name to text value.
    #[schema(example = json!({"nume": "Pop", "prenume": "Ana"}))]
    pub fields: BTreeMap<String, String>,
    pub mode: GenerateMode,
    /// Defaults to `true`.
    pub visible_to_student: Option<bool>,
}

impl GenerateDocumentRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.fields.len() > MAX_FIELDS {
            return Err(AppError::Validation(format!(
                "Too many fields: max {MAX_FIELDS}"
            )));
        }
        if let Some((name, _)) = self
            .fields
            .iter()
            .find(|(_, v)| v.chars().count() > MAX_FIELD_VALUE_CHARS)
        {
            return Err(AppError::Validation(format!(
                "Value of field '{name}' exceeds {MAX_FIELD_VALUE_CHARS} characters"
            )));
        }
        Ok(())
    }
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct GenerateDocumentResponse {
    pub document: DocumentResponse,
    pub report: FillReport,
}

#[derive(Deserialize, Default, utoipa::ToSchema)]
pub struct UpdateDocumentRequest {
    pub visible_to_student: Option<bool>,
    pub status: Option<DocumentStatus>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct TemplateResponse {
    pub id: i32,
    pub document_type: DocumentType,
    pub blob_id: Uuid,
    #[schema(example = "adeverinta_template.pdf")]
    pub filename: String,
    pub byte_size: i64,
    pub created_by: i32,
    #[schema(example = "Maria Ionescu")]
    pub created_by_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TemplateResponse {
    pub fn new(template: acroform_template::Model, blob: BlobMeta) -> Self {
        Self {
            id: template.id,
            document_type: template.document_type,
            blob_id: template.blob_id,
            filename: blob.filename,
            byte_size: blob.byte_size,
            created_by: template.created_by,
            created_by_name: template.created_by_name,
            created_at: template.created_at,
            updated_at: template.updated_at,
        }
    }
}

/// Form fields a template exposes, for mapping in the operator UI.
#[derive(Serialize, utoipa::ToSchema)]
pub struct TemplateFieldsResponse {
    pub document_type: DocumentType,
    #[schema(example = json!(["nume", "prenume", "cnp"]))]
    pub fields: Vec<String>,
}
