pub mod application;
pub mod auth;
pub mod dashboard;
pub mod document;
pub mod material;
pub mod series;
pub mod shared;
pub mod student;
