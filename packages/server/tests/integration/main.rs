mod common;

mod auth;
mod blob;
mod document;
mod material;
mod series;
