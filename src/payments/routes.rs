use super::handlers;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

/// Creates the payments router with all payment-related routes
pub fn payments_routes() -> Router {
    Router::new()
        .route("/api/payments/instructions", get(handlers::get_instructions))
        .route("/api/payments", post(handlers::create_payment_request))
        .route(
            "/api/payments/active/:requester_id",
            get(handlers::get_active_payment).delete(handlers::cancel_active_payment),
        )
        .route(
            "/api/payments/status/:reference",
            get(handlers::get_payment_status),
        )
        .route(
            "/api/payments/history/:requester_id",
            get(handlers::get_history),
        )
        // Receipt upload (multipart, larger body limit)
        .route(
            "/api/payments/verify",
            post(handlers::verify_receipt)
                .layer(DefaultBodyLimit::max(handlers::MAX_RECEIPT_SIZE + 64 * 1024)),
        )
}
