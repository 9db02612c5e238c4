//! API endpoints.

mod metrics;
mod votes;

use axum::Router;

use crate::middleware::AppState;

pub use votes::{
    ActionResponse, BallotResponse, CastResponse, CloseResponse, ResultsResponse,
    VoteDetailResponse, VoteResponse,
};

/// Create the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .nest("/votes", votes::router())
        .nest("/entities", votes::entities_router())
        .nest("/meetings", votes::meetings_router())
        .nest("/boards", votes::boards_router())
        .nest("/metrics", metrics::router())
}
