// src/admin/routes.rs

use axum::{
    routing::{get, post, put},
    Router,
};

use super::handlers;

pub fn admin_routes() -> Router {
    Router::new()
        // Statistics and maintenance
        .route("/api/admin/stats", get(handlers::dashboard::get_stats))
        .route(
            "/api/admin/maintenance/sweep",
            post(handlers::dashboard::run_sweep),
        )
        // Pricing
        .route(
            "/api/admin/price",
            put(handlers::settings::set_price).delete(handlers::settings::reset_price),
        )
        // Join request review
        .route(
            "/api/admin/join-requests",
            get(handlers::join_requests::list_join_requests),
        )
        .route(
            "/api/admin/join-requests/:member_id/approve",
            post(handlers::join_requests::approve_join_request),
        )
        .route(
            "/api/admin/join-requests/:member_id/decline",
            post(handlers::join_requests::decline_join_request),
        )
}
