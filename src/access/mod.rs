//! # Access Module
//!
//! What a verified payment buys:
//! - single-use, owner-bound access tokens
//! - redemption into a one-member invite link
//! - the join-request gate and its records

pub mod gate;
pub mod handlers;
pub mod join_records;
pub mod models;
pub mod routes;
pub mod tokens;
pub mod validators;

#[cfg(test)]
mod tests;

pub use routes::access_routes;
