use super::handlers;
use axum::{routing::post, Router};

/// Creates the access router: token redemption, re-issue and join requests
pub fn access_routes() -> Router {
    Router::new()
        .route("/api/access/redeem", post(handlers::redeem_token))
        .route("/api/access/tokens", post(handlers::reissue_token))
        .route("/api/access/join-requests", post(handlers::join_request))
}
