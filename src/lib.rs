pub mod api;
pub mod auth;
pub mod backend;
pub mod config;
pub mod db;
pub mod docs;
pub mod error;
pub mod model;
pub mod routes;
pub mod utils;
pub mod validation;
