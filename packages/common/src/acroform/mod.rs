//! AcroForm filling: template PDF + field map -> finished document.
//!
//! Filling is best-effort per field. Unknown field names are skipped and a
//! field that rejects the value is recorded as failed; neither stops the
//! remaining fields from being written.

mod pdf;
pub mod text;

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, warn};

pub use pdf::PdfForm;
pub use text::normalize_field_text;

#[derive(Debug, thiserror::Error)]
pub enum FormError {
    #[error("failed to load PDF: {0}")]
    Load(String),
    #[error("malformed form structure: {0}")]
    Malformed(String),
    #[error("unknown field '{0}'")]
    UnknownField(String),
    #[error("field '{name}' of type {field_type} does not accept text")]
    IncompatibleField { name: String, field_type: String },
    #[error("failed to save PDF: {0}")]
    Save(String),
}

impl From<lopdf::Error> for FormError {
    fn from(err: lopdf::Error) -> Self {
        FormError::Malformed(err.to_string())
    }
}

/// A loaded document exposing named form fields.
pub trait FormDocument {
    /// Fully-qualified names of all terminal fields.
    fn field_names(&self) -> Vec<String>;

    fn has_field(&self, name: &str) -> bool;

    /// Set the value of a text field. `value` must already be normalized.
    fn set_text(&mut self, name: &str, value: &str) -> Result<(), FormError>;

    /// Burn field appearances into page content and drop the interactive form.
    fn flatten(&mut self) -> Result<(), FormError>;

    fn save(&mut self) -> Result<Vec<u8>, FormError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillMode {
    /// Fields stay interactive, for operator review.
    Preview,
    /// Fields are flattened into static content.
    Finalize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct FieldFailure {
    pub field: String,
    pub reason: String,
}

/// Per-field outcome of a fill pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct FillReport {
    pub filled: Vec<String>,
    /// Names absent from the template.
    pub skipped: Vec<String>,
    pub failed: Vec<FieldFailure>,
}

#[derive(Debug)]
pub struct FilledDocument {
    pub bytes: Vec<u8>,
    pub report: FillReport,
}

/// Apply `values` to the form, field by field.
pub fn fill<D: FormDocument>(doc: &mut D, values: &BTreeMap<String, String>) -> FillReport {
    let mut report = FillReport::default();

    for (name, value) in values {
        if !doc.has_field(name) {
            debug!(field = %name, "Template has no such field, skipping");
            report.skipped.push(name.clone());
            continue;
        }

        let normalized = normalize_field_text(value);
        match doc.set_text(name, &normalized) {
            Ok(()) => report.filled.push(name.clone()),
            Err(FormError::UnknownField(_)) => report.skipped.push(name.clone()),
            Err(e) => {
                warn!(field = %name, error = %e, "Failed to fill form field");
                report.failed.push(FieldFailure {
                    field: name.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    report
}

/// Fill and, in finalize mode, flatten the document before serializing it.
pub fn render<D: FormDocument>(
    mut doc: D,
    values: &BTreeMap<String, String>,
    mode: FillMode,
) -> Result<FilledDocument, FormError> {
    let report = fill(&mut doc, values);
    if mode == FillMode::Finalize {
        doc.flatten()?;
    }
    let bytes = doc.save()?;
    Ok(FilledDocument { bytes, report })
}

/// Load a PDF template and render it with `values`.
pub fn fill_pdf(
    template: &[u8],
    values: &BTreeMap<String, String>,
    mode: FillMode,
) -> Result<FilledDocument, FormError> {
    render(PdfForm::load(template)?, values, mode)
}
