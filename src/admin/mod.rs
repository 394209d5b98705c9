// src/admin/mod.rs

pub mod extractors;
pub mod handlers;
pub mod models;
pub mod routes;


pub use routes::admin_routes;
