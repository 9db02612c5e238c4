//! HTTP API layer for boardvote.
//!
//! This crate provides the REST API over the voting services:
//!
//! - **Endpoints**: vote lifecycle, ballots, results and audit timeline
//! - **Extractors**: authenticated actor, client details
//! - **Middleware**: actor headers, request metrics
//!
//! Built on Axum 0.8 with Tower middleware stack.

pub mod endpoints;
pub mod extractors;
pub mod middleware;
pub mod response;

pub use endpoints::router;

use axum::Router;

use crate::middleware::AppState;

/// The application router: API routes under `/api` with the actor and
/// metrics middleware applied.
pub fn app(state: AppState) -> Router {
    Router::new()
        .nest("/api", router())
        .layer(axum::middleware::from_fn(middleware::auth_middleware))
        .layer(axum::middleware::from_fn(middleware::metrics_middleware))
        .with_state(state)
}
