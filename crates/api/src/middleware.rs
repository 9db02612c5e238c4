//! API middleware.

#![allow(missing_docs)]

use axum::{
    body::Body,
    http::{HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use boardvote_common::{Timer, get_metrics};
use boardvote_core::{Actor, VoteLifecycleService, VoteQueryService};

/// Header carrying the authenticated user id, set by the identity gateway.
pub const ACTOR_ID_HEADER: &str = "x-actor-id";
/// Header carrying the display name of the authenticated user.
pub const ACTOR_NAME_HEADER: &str = "x-actor-name";
/// Header carrying the board role of the authenticated user.
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

/// Application state.
#[derive(Clone)]
pub struct AppState {
    pub lifecycle: VoteLifecycleService,
    pub query: VoteQueryService,
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
}

/// Read the gateway's identity headers into an [`Actor`].
#[must_use]
pub fn actor_from_headers(headers: &HeaderMap) -> Option<Actor> {
    let id = header_value(headers, ACTOR_ID_HEADER)?;
    let name = header_value(headers, ACTOR_NAME_HEADER).unwrap_or_else(|| id.clone());

    Some(Actor {
        id,
        name,
        role: header_value(headers, ACTOR_ROLE_HEADER),
    })
}

/// Authentication middleware.
///
/// Requests without identity headers pass through; handlers that need an
/// actor reject them through the `AuthActor` extractor.
pub async fn auth_middleware(mut req: Request<Body>, next: Next) -> Response {
    if let Some(actor) = actor_from_headers(req.headers()) {
        req.extensions_mut().insert(actor);
    }

    next.run(req).await
}

/// Count requests, responses by status class and latency.
pub async fn metrics_middleware(req: Request<Body>, next: Next) -> Response {
    let metrics = get_metrics();
    let timer = Timer::start();
    metrics.start_request();

    let response = next.run(req).await;

    metrics.end_request();
    metrics.record_http_request(response.status().as_u16(), timer.elapsed());
    response
}
