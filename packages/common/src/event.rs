use serde::{Deserialize, Serialize};

use crate::document_type::DocumentType;

/// Side effect emitted after a unit of work has committed.
///
/// Delivery is best-effort: a notification that fails to go out is logged,
/// never reported back to the request that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    ApplicationApproved {
        application_id: i32,
        application_no: i32,
        email: String,
        name: String,
        student_id: i32,
    },
    ApplicationRejected {
        application_id: i32,
        application_no: i32,
        email: String,
        name: String,
        admin_note: Option<String>,
    },
    DocumentAssigned {
        student_id: i32,
        email: String,
        document_type: DocumentType,
        document_id: i32,
    },
    PasswordReset {
        email: String,
        /// Redirect URL with the single-use token appended.
        reset_url: String,
    },
}

impl Notification {
    /// Event topic, used for routing and log fields.
    pub fn topic(&self) -> &'static str {
        match self {
            Self::ApplicationApproved { .. } => "application-approved",
            Self::ApplicationRejected { .. } => "application-rejected",
            Self::DocumentAssigned { .. } => "document-assigned",
            Self::PasswordReset { .. } => "password-reset",
        }
    }

    pub fn recipient(&self) -> &str {
        match self {
            Self::ApplicationApproved { email, .. }
            | Self::ApplicationRejected { email, .. }
            | Self::DocumentAssigned { email, .. }
            | Self::PasswordReset { email, .. } => email,
        }
    }
}
