//! Metrics collection for boardvote.
//!
//! Provides application-level counters for monitoring request load and
//! the vote lifecycle (ballots, closes, write conflicts).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Global metrics instance.
static METRICS: std::sync::OnceLock<Arc<Metrics>> = std::sync::OnceLock::new();

/// Get the global metrics instance.
pub fn get_metrics() -> &'static Arc<Metrics> {
    METRICS.get_or_init(|| Arc::new(Metrics::new()))
}

/// Initialize global metrics with custom instance.
pub fn init_metrics(metrics: Arc<Metrics>) -> Result<(), Arc<Metrics>> {
    METRICS.set(metrics)
}

/// Application metrics collector.
#[derive(Debug, Default)]
pub struct Metrics {
    // === Request Metrics ===
    /// Total HTTP requests received
    pub http_requests_total: AtomicU64,
    /// Active HTTP requests
    pub http_requests_active: AtomicU64,
    /// HTTP requests by status code category (2xx, 4xx, 5xx)
    pub http_requests_2xx: AtomicU64,
    pub http_requests_4xx: AtomicU64,
    pub http_requests_5xx: AtomicU64,
    /// Total request latency in microseconds
    pub http_request_latency_us_total: AtomicU64,
    /// Request count for average calculation
    pub http_request_latency_count: AtomicU64,

    // === Database Metrics ===
    /// Database errors surfaced to callers
    pub db_errors_total: AtomicU64,

    // === Vote Lifecycle Metrics ===
    /// Votes created
    pub votes_created: AtomicU64,
    /// Votes opened (including reopenings)
    pub votes_opened: AtomicU64,
    /// Votes closed
    pub votes_closed: AtomicU64,
    /// Votes closed because every eligible voter had voted
    pub votes_auto_closed: AtomicU64,
    /// First ballots cast
    pub ballots_cast: AtomicU64,
    /// Ballots that replaced an earlier ballot
    pub ballots_changed: AtomicU64,
    /// Ballots rejected by lifecycle rules
    pub ballots_rejected: AtomicU64,
    /// Write conflicts retried by the lifecycle controller
    pub conflict_retries: AtomicU64,
    /// Close attempts that lost the status transition race
    pub close_races_lost: AtomicU64,
}

impl Metrics {
    /// Create a new metrics instance with all counters at zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            http_requests_total: AtomicU64::new(0),
            http_requests_active: AtomicU64::new(0),
            http_requests_2xx: AtomicU64::new(0),
            http_requests_4xx: AtomicU64::new(0),
            http_requests_5xx: AtomicU64::new(0),
            http_request_latency_us_total: AtomicU64::new(0),
            http_request_latency_count: AtomicU64::new(0),

            db_errors_total: AtomicU64::new(0),

            votes_created: AtomicU64::new(0),
            votes_opened: AtomicU64::new(0),
            votes_closed: AtomicU64::new(0),
            votes_auto_closed: AtomicU64::new(0),
            ballots_cast: AtomicU64::new(0),
            ballots_changed: AtomicU64::new(0),
            ballots_rejected: AtomicU64::new(0),
            conflict_retries: AtomicU64::new(0),
            close_races_lost: AtomicU64::new(0),
        }
    }

    /// Record an HTTP request.
    pub fn record_http_request(&self, status_code: u16, latency: Duration) {
        self.http_requests_total.fetch_add(1, Ordering::Relaxed);

        match status_code {
            200..=299 => self.http_requests_2xx.fetch_add(1, Ordering::Relaxed),
            400..=499 => self.http_requests_4xx.fetch_add(1, Ordering::Relaxed),
            500..=599 => self.http_requests_5xx.fetch_add(1, Ordering::Relaxed),
            _ => 0,
        };

        self.http_request_latency_us_total
            .fetch_add(latency.as_micros() as u64, Ordering::Relaxed);
        self.http_request_latency_count
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Start tracking an active request.
    pub fn start_request(&self) {
        self.http_requests_active.fetch_add(1, Ordering::Relaxed);
    }

    /// End tracking an active request.
    pub fn end_request(&self) {
        self.http_requests_active.fetch_sub(1, Ordering::Relaxed);
    }

    /// Record a database error.
    pub fn record_db_error(&self) {
        self.db_errors_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a created vote.
    pub fn record_vote_created(&self) {
        self.votes_created.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an opened or reopened vote.
    pub fn record_vote_opened(&self) {
        self.votes_opened.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a closed vote.
    pub fn record_vote_closed(&self, automatic: bool) {
        self.votes_closed.fetch_add(1, Ordering::Relaxed);
        if automatic {
            self.votes_auto_closed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record an accepted ballot.
    pub fn record_ballot(&self, changed: bool) {
        if changed {
            self.ballots_changed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.ballots_cast.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a rejected ballot.
    pub fn record_ballot_rejected(&self) {
        self.ballots_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a retried write conflict.
    pub fn record_conflict_retry(&self) {
        self.conflict_retries.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a close that lost the transition race.
    pub fn record_close_race_lost(&self) {
        self.close_races_lost.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of all metrics.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            http_requests_total: self.http_requests_total.load(Ordering::Relaxed),
            http_requests_active: self.http_requests_active.load(Ordering::Relaxed),
            http_requests_2xx: self.http_requests_2xx.load(Ordering::Relaxed),
            http_requests_4xx: self.http_requests_4xx.load(Ordering::Relaxed),
            http_requests_5xx: self.http_requests_5xx.load(Ordering::Relaxed),
            http_request_latency_avg_us: self.average_latency_us(),

            db_errors_total: self.db_errors_total.load(Ordering::Relaxed),

            votes_created: self.votes_created.load(Ordering::Relaxed),
            votes_opened: self.votes_opened.load(Ordering::Relaxed),
            votes_closed: self.votes_closed.load(Ordering::Relaxed),
            votes_auto_closed: self.votes_auto_closed.load(Ordering::Relaxed),
            ballots_cast: self.ballots_cast.load(Ordering::Relaxed),
            ballots_changed: self.ballots_changed.load(Ordering::Relaxed),
            ballots_rejected: self.ballots_rejected.load(Ordering::Relaxed),
            conflict_retries: self.conflict_retries.load(Ordering::Relaxed),
            close_races_lost: self.close_races_lost.load(Ordering::Relaxed),
        }
    }

    /// Calculate average HTTP request latency.
    fn average_latency_us(&self) -> u64 {
        let total = self.http_request_latency_us_total.load(Ordering::Relaxed);
        let count = self.http_request_latency_count.load(Ordering::Relaxed);
        if count > 0 {
            total / count
        } else {
            0
        }
    }

    /// Export metrics in Prometheus format.
    #[must_use]
    pub fn to_prometheus(&self) -> String {
        let s = self.snapshot();
        let mut output = String::new();

        let counters: [(&str, &str, u64); 12] = [
            ("http_requests_total", "Total HTTP requests", s.http_requests_total),
            ("db_errors_total", "Database errors", s.db_errors_total),
            ("votes_created_total", "Votes created", s.votes_created),
            ("votes_opened_total", "Votes opened or reopened", s.votes_opened),
            ("votes_closed_total", "Votes closed", s.votes_closed),
            ("votes_auto_closed_total", "Votes closed after all eligible voted", s.votes_auto_closed),
            ("ballots_cast_total", "First ballots cast", s.ballots_cast),
            ("ballots_changed_total", "Ballots replacing an earlier ballot", s.ballots_changed),
            ("ballots_rejected_total", "Ballots rejected", s.ballots_rejected),
            ("conflict_retries_total", "Write conflicts retried", s.conflict_retries),
            ("close_races_lost_total", "Close attempts that lost the transition race", s.close_races_lost),
            ("http_requests_5xx_total", "HTTP requests answered with 5xx", s.http_requests_5xx),
        ];

        for (name, help, value) in counters {
            output.push_str(&format!("# HELP boardvote_{name} {help}\n"));
            output.push_str(&format!("# TYPE boardvote_{name} counter\n"));
            output.push_str(&format!("boardvote_{name} {value}\n"));
        }

        output.push_str("# HELP boardvote_http_requests_active Active HTTP requests\n");
        output.push_str("# TYPE boardvote_http_requests_active gauge\n");
        output.push_str(&format!(
            "boardvote_http_requests_active {}\n",
            s.http_requests_active
        ));

        output.push_str("# HELP boardvote_http_request_latency_avg_us Average request latency\n");
        output.push_str("# TYPE boardvote_http_request_latency_avg_us gauge\n");
        output.push_str(&format!(
            "boardvote_http_request_latency_avg_us {}\n",
            s.http_request_latency_avg_us
        ));

        output
    }
}

/// Point-in-time copy of all counters.
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub http_requests_total: u64,
    pub http_requests_active: u64,
    pub http_requests_2xx: u64,
    pub http_requests_4xx: u64,
    pub http_requests_5xx: u64,
    pub http_request_latency_avg_us: u64,

    pub db_errors_total: u64,

    pub votes_created: u64,
    pub votes_opened: u64,
    pub votes_closed: u64,
    pub votes_auto_closed: u64,
    pub ballots_cast: u64,
    pub ballots_changed: u64,
    pub ballots_rejected: u64,
    pub conflict_retries: u64,
    pub close_races_lost: u64,
}

/// Timer for measuring request latency.
pub struct Timer {
    start: std::time::Instant,
}

impl Timer {
    /// Start a new timer.
    #[must_use]
    pub fn start() -> Self {
        Self {
            start: std::time::Instant::now(),
        }
    }

    /// Elapsed time since the timer started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}
