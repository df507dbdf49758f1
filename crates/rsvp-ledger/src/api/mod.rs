//! HTTP API for the RSVP ledger.

mod handlers;
mod middleware;
mod types;

pub use handlers::*;
pub use middleware::{logging_middleware, rate_limit_middleware, RateLimitState};
pub use types::*;

use crate::service::RsvpService;
use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Credential validation and ledger registration
    pub service: Arc<RsvpService>,
}

impl AppState {
    /// Create new application state.
    pub fn new(service: RsvpService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }
}

/// Create the API router with custom rate limiting.
pub fn create_router_with_rate_limit(state: AppState, rate_limit: RateLimitState) -> Router {
    Router::new()
        .route("/v1/workshops/:workshop_id/rsvp", post(handlers::rsvp))
        .route("/v1/workshops/:workshop_id", get(handlers::get_workshop))
        .route_layer(axum_middleware::from_fn_with_state(
            rate_limit,
            rate_limit_middleware,
        ))
        // Health check (added after route_layer, so not rate limited)
        .route("/health", get(handlers::health))
        .layer(axum_middleware::from_fn(logging_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
