pub mod application;
pub mod auth;
pub mod blob;
pub mod dashboard;
pub mod document;
pub mod material;
pub mod series;
pub mod student;
pub mod template;
