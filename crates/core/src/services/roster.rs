//! Roster collaborator.
//!
//! The board directory owns who sits on a board and with what voting
//! weight. A vote reads the roster exactly once, when it opens, and keeps
//! its own snapshot afterwards.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use boardvote_common::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use url::Url;

/// One roster row as supplied by the directory (or inline with `open`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    pub user_id: String,
    pub user_name: String,
    pub user_role: String,
    /// Voting weight; the configured default applies when absent.
    #[serde(default)]
    pub weight: Option<f64>,
    /// Defaults to eligible.
    #[serde(default)]
    pub eligible: Option<bool>,
}

/// A roster row after validation, ready to be snapshotted.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotEntry {
    pub user_id: String,
    pub user_name: String,
    pub user_role: String,
    pub weight: f64,
    pub eligible: bool,
}

/// Source of board rosters.
#[async_trait]
pub trait RosterProvider: Send + Sync {
    /// Fetch the roster of a board, optionally narrowed to a meeting's
    /// attendees.
    async fn fetch_roster(
        &self,
        board_id: &str,
        meeting_id: Option<&str>,
    ) -> AppResult<Vec<RosterEntry>>;
}

/// Validate roster rows and resolve their defaults.
///
/// Rejects duplicate user ids and negative or non-finite weights.
pub fn snapshot_entries(
    entries: Vec<RosterEntry>,
    default_weight: f64,
) -> AppResult<Vec<SnapshotEntry>> {
    let mut seen = HashSet::new();
    let mut snapshot = Vec::with_capacity(entries.len());

    for entry in entries {
        if entry.user_id.trim().is_empty() {
            return Err(AppError::Validation(
                "Roster entry without user id".to_string(),
            ));
        }
        if !seen.insert(entry.user_id.clone()) {
            return Err(AppError::Validation(format!(
                "Duplicate roster entry for user {}",
                entry.user_id
            )));
        }

        let weight = entry.weight.unwrap_or(default_weight);
        if !weight.is_finite() || weight < 0.0 {
            return Err(AppError::Validation(format!(
                "Invalid weight {weight} for user {}",
                entry.user_id
            )));
        }

        snapshot.push(SnapshotEntry {
            user_id: entry.user_id,
            user_name: entry.user_name,
            user_role: entry.user_role,
            weight,
            eligible: entry.eligible.unwrap_or(true),
        });
    }

    Ok(snapshot)
}

/// Roster provider backed by the board directory's HTTP API.
#[derive(Clone)]
pub struct HttpRosterProvider {
    base_url: Url,
    http_client: reqwest::Client,
}

impl HttpRosterProvider {
    /// Create a provider for the directory at `base_url`.
    pub fn new(base_url: &str, timeout: Duration) -> AppResult<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| AppError::Config(format!("Invalid roster directory URL: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(AppError::Config(format!(
                "Roster directory URL cannot be a base: {base_url}"
            )));
        }

        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("boardvote/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url,
            http_client,
        })
    }

    /// `{base}/boards/{board_id}/roster[?meetingId=…]`
    fn roster_url(&self, board_id: &str, meeting_id: Option<&str>) -> AppResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| AppError::Config("Roster directory URL cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(["boards", board_id, "roster"]);
        if let Some(meeting_id) = meeting_id {
            url.query_pairs_mut().append_pair("meetingId", meeting_id);
        }
        Ok(url)
    }
}

#[async_trait]
impl RosterProvider for HttpRosterProvider {
    async fn fetch_roster(
        &self,
        board_id: &str,
        meeting_id: Option<&str>,
    ) -> AppResult<Vec<RosterEntry>> {
        let url = self.roster_url(board_id, meeting_id)?;
        tracing::debug!(%url, "Fetching board roster");

        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| AppError::ExternalService(format!("Roster request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(AppError::ExternalService(format!(
                "Roster directory returned {}",
                response.status()
            )));
        }

        response
            .json::<Vec<RosterEntry>>()
            .await
            .map_err(|e| AppError::ExternalService(format!("Invalid roster response: {e}")))
    }
}

/// Roster provider with a fixed set of entries.
#[derive(Debug, Clone, Default)]
pub struct StaticRosterProvider {
    entries: Vec<RosterEntry>,
}

impl StaticRosterProvider {
    /// Create a provider that always returns `entries`.
    #[must_use]
    pub const fn new(entries: Vec<RosterEntry>) -> Self {
        Self { entries }
    }
}

#[async_trait]
impl RosterProvider for StaticRosterProvider {
    async fn fetch_roster(
        &self,
        _board_id: &str,
        _meeting_id: Option<&str>,
    ) -> AppResult<Vec<RosterEntry>> {
        Ok(self.entries.clone())
    }
}

/// Provider used when no directory is configured; votes must then be
/// opened with an inline roster.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRosterProvider;

#[async_trait]
impl RosterProvider for NoRosterProvider {
    async fn fetch_roster(
        &self,
        board_id: &str,
        _meeting_id: Option<&str>,
    ) -> AppResult<Vec<RosterEntry>> {
        Err(AppError::ExternalService(format!(
            "No roster directory configured; supply a roster to open votes of board {board_id}"
        )))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn entry(user_id: &str, weight: Option<f64>) -> RosterEntry {
        RosterEntry {
            user_id: user_id.to_string(),
            user_name: user_id.to_uppercase(),
            user_role: "director".to_string(),
            weight,
            eligible: None,
        }
    }

    #[test]
    fn test_snapshot_defaults() {
        let snapshot = snapshot_entries(vec![entry("a", None), entry("b", Some(2.5))], 1.0).unwrap();

        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].weight, 1.0);
        assert!(snapshot[0].eligible);
        assert_eq!(snapshot[1].weight, 2.5);
    }

    #[test]
    fn test_snapshot_rejects_duplicates() {
        let result = snapshot_entries(vec![entry("a", None), entry("a", None)], 1.0);
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_snapshot_rejects_bad_weights() {
        assert!(snapshot_entries(vec![entry("a", Some(-1.0))], 1.0).is_err());
        assert!(snapshot_entries(vec![entry("a", Some(f64::NAN))], 1.0).is_err());
        assert!(snapshot_entries(vec![entry("a", Some(0.0))], 1.0).is_ok());
    }

    #[test]
    fn test_roster_entry_deserialize() {
        let json = r#"[{"userId":"u1","userName":"Ada","userRole":"chair","weight":2}]"#;
        let entries: Vec<RosterEntry> = serde_json::from_str(json).unwrap();

        assert_eq!(entries[0].user_id, "u1");
        assert_eq!(entries[0].weight, Some(2.0));
        assert_eq!(entries[0].eligible, None);
    }

    #[test]
    fn test_roster_url() {
        let provider =
            HttpRosterProvider::new("https://directory.example.com/api/", Duration::from_secs(5))
                .unwrap();

        let url = provider.roster_url("board 1", Some("m1")).unwrap();
        assert_eq!(
            url.as_str(),
            "https://directory.example.com/api/boards/board%201/roster?meetingId=m1"
        );

        let url = provider.roster_url("b2", None).unwrap();
        assert_eq!(url.as_str(), "https://directory.example.com/api/boards/b2/roster");
    }

    #[test]
    fn test_invalid_directory_url() {
        let result = HttpRosterProvider::new("not a url", Duration::from_secs(5));
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[tokio::test]
    async fn test_static_provider() {
        let provider = StaticRosterProvider::new(vec![entry("a", None)]);
        let roster = provider.fetch_roster("board1", None).await.unwrap();
        assert_eq!(roster.len(), 1);
    }

    #[tokio::test]
    async fn test_no_provider_errors() {
        let result = NoRosterProvider.fetch_roster("board1", None).await;
        assert!(matches!(result, Err(AppError::ExternalService(_))));
    }
}
