// src/admin/handlers/mod.rs

pub mod dashboard;
pub mod join_requests;
pub mod settings;
