//! # Payments Module
//!
//! Payment requests and their verification:
//! - the ledger of pending and verified payments
//! - receipt upload, OCR and the verify decision
//! - instructions, status and history endpoints

pub mod handlers;
pub mod ledger;
pub mod models;
pub mod routes;
pub mod services;
pub mod validators;

#[cfg(test)]
mod tests;

pub use routes::payments_routes;
