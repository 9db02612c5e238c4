//! Metrics endpoints for monitoring and observability.
//!
//! Provides endpoints for:
//! - Prometheus metrics export
//! - Health checks
//! - Vote lifecycle statistics

use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use boardvote_common::metrics::{MetricsSnapshot, get_metrics};
use chrono::Utc;
use serde::Serialize;

use crate::middleware::AppState;

/// Create the metrics router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_metrics_json))
        .route("/prometheus", get(get_metrics_prometheus))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
}

/// JSON metrics response.
#[derive(Serialize)]
pub struct MetricsResponse {
    pub http: HttpMetrics,
    pub database: DatabaseMetrics,
    pub votes: VoteMetrics,
    pub ballots: BallotMetrics,
}

#[derive(Serialize)]
pub struct HttpMetrics {
    pub requests_total: u64,
    pub requests_active: u64,
    pub requests_2xx: u64,
    pub requests_4xx: u64,
    pub requests_5xx: u64,
    pub latency_avg_us: u64,
}

#[derive(Serialize)]
pub struct DatabaseMetrics {
    pub errors_total: u64,
}

#[derive(Serialize)]
pub struct VoteMetrics {
    pub created: u64,
    pub opened: u64,
    pub closed: u64,
    pub auto_closed: u64,
    pub close_races_lost: u64,
}

#[derive(Serialize)]
pub struct BallotMetrics {
    pub cast: u64,
    pub changed: u64,
    pub rejected: u64,
    pub conflict_retries: u64,
}

impl From<MetricsSnapshot> for MetricsResponse {
    fn from(s: MetricsSnapshot) -> Self {
        Self {
            http: HttpMetrics {
                requests_total: s.http_requests_total,
                requests_active: s.http_requests_active,
                requests_2xx: s.http_requests_2xx,
                requests_4xx: s.http_requests_4xx,
                requests_5xx: s.http_requests_5xx,
                latency_avg_us: s.http_request_latency_avg_us,
            },
            database: DatabaseMetrics {
                errors_total: s.db_errors_total,
            },
            votes: VoteMetrics {
                created: s.votes_created,
                opened: s.votes_opened,
                closed: s.votes_closed,
                auto_closed: s.votes_auto_closed,
                close_races_lost: s.close_races_lost,
            },
            ballots: BallotMetrics {
                cast: s.ballots_cast,
                changed: s.ballots_changed,
                rejected: s.ballots_rejected,
                conflict_retries: s.conflict_retries,
            },
        }
    }
}

/// Get metrics in JSON format.
async fn get_metrics_json() -> Json<MetricsResponse> {
    let snapshot = get_metrics().snapshot();
    Json(MetricsResponse::from(snapshot))
}

/// Get metrics in Prometheus text format.
async fn get_metrics_prometheus() -> Response {
    let prometheus_output = get_metrics().to_prometheus();

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        prometheus_output,
    )
        .into_response()
}

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Simple health check (liveness probe).
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Readiness check response.
#[derive(Serialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub checks: ReadinessChecks,
}

#[derive(Serialize)]
pub struct ReadinessChecks {
    pub database: CheckResult,
}

#[derive(Serialize)]
pub struct CheckResult {
    pub status: String,
    pub latency_ms: Option<u64>,
}

/// Readiness check (readiness probe).
async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<ReadinessResponse>) {
    let start = std::time::Instant::now();

    // Any cheap query proves the pool can reach the database
    let db_check = match state.query.get_overdue_votes(Utc::now()).await {
        Ok(_) => CheckResult {
            status: "ok".to_string(),
            latency_ms: Some(start.elapsed().as_millis() as u64),
        },
        Err(e) => CheckResult {
            status: format!("error: {e}"),
            latency_ms: None,
        },
    };

    let ready = db_check.status == "ok";
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadinessResponse {
            ready,
            checks: ReadinessChecks { database: db_check },
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_response_from_snapshot() {
        let snapshot = MetricsSnapshot {
            http_requests_total: 100,
            http_requests_active: 5,
            http_requests_2xx: 90,
            http_requests_4xx: 8,
            http_requests_5xx: 2,
            http_request_latency_avg_us: 1500,

            db_errors_total: 2,

            votes_created: 12,
            votes_opened: 10,
            votes_closed: 9,
            votes_auto_closed: 4,
            ballots_cast: 80,
            ballots_changed: 6,
            ballots_rejected: 3,
            conflict_retries: 1,
            close_races_lost: 1,
        };

        let response = MetricsResponse::from(snapshot);

        assert_eq!(response.http.requests_total, 100);
        assert_eq!(response.http.latency_avg_us, 1500);
        assert_eq!(response.database.errors_total, 2);
        assert_eq!(response.votes.auto_closed, 4);
        assert_eq!(response.ballots.changed, 6);
    }

    #[test]
    fn test_metrics_response_from_zero_snapshot() {
        let response = MetricsResponse::from(MetricsSnapshot::default());

        // Should not panic on zero values
        assert_eq!(response.http.latency_avg_us, 0);
        assert_eq!(response.votes.closed, 0);
        assert_eq!(response.ballots.conflict_retries, 0);
    }
}
