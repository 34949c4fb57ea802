use axum::extract::DefaultBodyLimit;
use axum::extract::Multipart;
use axum::extract::multipart::Field;

use crate::error::AppError;
use crate::utils::filename::validate_upload_filename;

pub const PDF_MIME: &str = "application/pdf";

/// Room for multipart boundaries and text parts on top of the file cap.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Body limit layer for routes that accept an upload.
pub fn upload_body_limit(max_upload_size: usize) -> DefaultBodyLimit {
    DefaultBodyLimit::max(max_upload_size.saturating_add(MULTIPART_OVERHEAD))
}

/// A multipart file part read fully into memory.
#[derive(Debug)]
pub struct UploadedFile {
    pub filename: String,
    pub mime_type: String,
    pub content: Vec<u8>,
}

impl UploadedFile {
    pub fn require_mime<S: AsRef<str>>(&self, allowed: &[S]) -> Result<(), AppError> {
        if allowed.iter().any(|m| m.as_ref() == self.mime_type) {
            Ok(())
        } else {
            Err(AppError::Validation(format!(
                "Unsupported file type '{}'",
                self.mime_type
            )))
        }
    }

    /// PDF by name or declared type, and by magic bytes.
    pub fn require_pdf(&self) -> Result<(), AppError> {
        self.require_mime(&[PDF_MIME])?;
        if !self.content.starts_with(b"%PDF-") {
            return Err(AppError::Validation("File is not a PDF document".into()));
        }
        Ok(())
    }
}

/// Read a file field, enforcing `max_size` while streaming.
pub async fn read_file_field(
    mut field: Field<'_>,
    max_size: usize,
) -> Result<UploadedFile, AppError> {
    let raw_name = field
        .file_name()
        .map(str::to_string)
        .ok_or_else(|| AppError::Validation("File field must have a filename".into()))?;
    let filename = validate_upload_filename(&raw_name)
        .map_err(|e| AppError::Validation(e.message().into()))?
        .to_string();
    let declared = field.content_type().map(str::to_string);

    let mut content = Vec::new();
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| AppError::Validation(format!("Failed to read upload: {e}")))?
    {
        if content.len() + chunk.len() > max_size {
            return Err(AppError::Validation(format!(
                "File exceeds the maximum size of {max_size} bytes"
            )));
        }
        content.extend_from_slice(&chunk);
    }

    if content.is_empty() {
        return Err(AppError::Validation("Uploaded file is empty".into()));
    }

    let mime_type = detect_mime(&filename, declared.as_deref());
    Ok(UploadedFile {
        filename,
        mime_type,
        content,
    })
}

/// Read the one file part called `name`, ignoring any other parts.
pub async fn read_single_file(
    multipart: &mut Multipart,
    name: &str,
    max_size: usize,
) -> Result<UploadedFile, AppError> {
    let mut file = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Multipart error: {e}")))?
    {
        if field.name() == Some(name) {
            if file.is_some() {
                return Err(AppError::Validation(format!("Duplicate '{name}' field")));
            }
            file = Some(read_file_field(field, max_size).await?);
        }
    }
    file.ok_or_else(|| AppError::Validation(format!("Missing '{name}' field")))
}

/// Read a text field.
pub async fn read_text_field(field: Field<'_>) -> Result<String, AppError> {
    let name = field.name().unwrap_or_default().to_string();
    field
        .text()
        .await
        .map_err(|e| AppError::Validation(format!("Failed to read field '{name}': {e}")))
}

/// Extension-based type, falling back to the declared one.
pub fn detect_mime(filename: &str, declared: Option<&str>) -> String {
    if let Some(guess) = mime_guess::from_path(filename).first() {
        return guess.essence_str().to_string();
    }
    match declared {
        Some(d) if !d.is_empty() && d != "application/octet-stream" => d.to_string(),
        _ => "application/octet-stream".to_string(),
    }
}
