pub mod acroform_template;
pub mod blob;
pub mod material;
pub mod material_category;
pub mod material_series_access;
pub mod material_student_access;
pub mod password_reset;
pub mod series;
pub mod student;
pub mod student_application;
pub mod student_document;
pub mod user;
