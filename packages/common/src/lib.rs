pub mod acroform;
pub mod document_type;
pub mod event;
pub mod status;

pub use document_type::DocumentType;
pub use event::Notification;
pub use status::{ApplicationStatus, DocumentStatus, Role, StudentStatus, Visibility};
