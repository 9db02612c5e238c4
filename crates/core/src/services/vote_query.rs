//! Vote query service.
//!
//! Read projections over the stores. Nothing here writes; every view is
//! computed from current store state.

use std::collections::HashMap;

use boardvote_common::{AppError, AppResult};
use boardvote_db::entities::{
    vote::{self, VoteEntityType, VoteOutcome, VoteStatus},
    vote_action::{self, VoteActionType},
    vote_cast, vote_configuration, vote_eligibility, vote_option, vote_result,
    vote_results_summary,
};
use chrono::{DateTime, Utc};
use sea_orm::prelude::DateTimeWithTimeZone;

use super::{
    VoteRepositories,
    tally::{TallyInput, effective_ballots, tally},
};

/// A vote with its rules, options and effective ballots.
#[derive(Debug, Clone)]
pub struct VoteDetail {
    pub vote: vote::Model,
    pub configuration: Option<vote_configuration::Model>,
    pub options: Vec<vote_option::Model>,
    /// Effective ballots in ledger order, or grouped by option on an
    /// anonymous vote.
    pub ballots: Vec<BallotView>,
    pub total_eligible: usize,
}

/// A ballot as shown to readers. Voter identity is withheld on anonymous
/// votes; the weight is always shown.
///
/// The id, revision and cast time are withheld too on anonymous votes:
/// each of them lines a ballot up with the voter's `vote_cast` or
/// `vote_changed` timeline entry.
#[derive(Debug, Clone, PartialEq)]
pub struct BallotView {
    pub id: Option<String>,
    pub option_id: String,
    pub user_id: Option<String>,
    pub user_name: Option<String>,
    pub weight_applied: f64,
    pub revision: Option<i32>,
    pub cast_at: Option<DateTimeWithTimeZone>,
}

/// Per-option result row joined with its option.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRow {
    pub option_id: String,
    pub label: String,
    pub is_abstain: bool,
    pub total_weight: f64,
    pub vote_count: i32,
    pub percentage: f64,
    pub is_winner: bool,
}

/// Results summary. `computed_at` is `None` for a vote that never closed.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultsSummary {
    pub total_eligible: i32,
    pub total_voted: i32,
    pub total_weight: f64,
    pub quorum_required: i32,
    pub quorum_met: bool,
    pub threshold_percentage: f64,
    pub outcome: VoteOutcome,
    pub computed_at: Option<DateTimeWithTimeZone>,
    /// Computed on the fly for an open vote, not read from the cache.
    pub live: bool,
}

/// Results of a vote.
#[derive(Debug, Clone, PartialEq)]
pub struct VoteResults {
    pub vote_id: String,
    pub summary: ResultsSummary,
    pub results: Vec<ResultRow>,
}

impl VoteResults {
    /// Join tally rows with their options, in display order.
    #[must_use]
    pub fn from_rows(
        summary: &vote_results_summary::Model,
        rows: &[vote_result::Model],
        options: &[vote_option::Model],
        live: bool,
    ) -> Self {
        let by_option: HashMap<&str, &vote_result::Model> =
            rows.iter().map(|r| (r.option_id.as_str(), r)).collect();

        let results = options
            .iter()
            .map(|option| {
                let row = by_option.get(option.id.as_str());
                ResultRow {
                    option_id: option.id.clone(),
                    label: option.label.clone(),
                    is_abstain: option.is_abstain,
                    total_weight: row.map_or(0.0, |r| r.total_weight),
                    vote_count: row.map_or(0, |r| r.vote_count),
                    percentage: row.map_or(0.0, |r| r.percentage),
                    is_winner: row.is_some_and(|r| r.is_winner),
                }
            })
            .collect();

        Self {
            vote_id: summary.vote_id.clone(),
            summary: ResultsSummary {
                total_eligible: summary.total_eligible,
                total_voted: summary.total_voted,
                total_weight: summary.total_weight,
                quorum_required: summary.quorum_required,
                quorum_met: summary.quorum_met,
                threshold_percentage: summary.threshold_percentage,
                outcome: summary.outcome,
                computed_at: Some(summary.computed_at),
                live,
            },
            results,
        }
    }

    /// All-zero results for a vote that was never closed.
    #[must_use]
    pub fn empty(vote_id: &str, options: &[vote_option::Model], threshold_percentage: f64) -> Self {
        Self {
            vote_id: vote_id.to_string(),
            summary: ResultsSummary {
                total_eligible: 0,
                total_voted: 0,
                total_weight: 0.0,
                quorum_required: 0,
                quorum_met: false,
                threshold_percentage,
                outcome: VoteOutcome::None,
                computed_at: None,
                live: false,
            },
            results: options
                .iter()
                .map(|option| ResultRow {
                    option_id: option.id.clone(),
                    label: option.label.clone(),
                    is_abstain: option.is_abstain,
                    total_weight: 0.0,
                    vote_count: 0,
                    percentage: 0.0,
                    is_winner: false,
                })
                .collect(),
        }
    }
}

/// The caller's own standing in a vote.
#[derive(Debug, Clone)]
pub struct MyBallot {
    pub vote_id: String,
    pub eligibility: Option<vote_eligibility::Model>,
    pub ballot: Option<vote_cast::Model>,
    /// Number of ballots the caller submitted, including replaced ones.
    pub history_count: usize,
}

/// An open vote past its advisory time limit.
#[derive(Debug, Clone)]
pub struct OverdueVote {
    pub vote: vote::Model,
    pub deadline: DateTimeWithTimeZone,
}

/// Ballot metadata keys that tie a timeline entry to a choice.
const BALLOT_CHOICE_KEYS: [&str; 2] = ["optionId", "previousOptionId"];

/// Strip the choice from a ballot timeline entry of an anonymous vote.
fn redact_ballot_action(action: &mut vote_action::Model) {
    if !matches!(
        action.action_type,
        VoteActionType::VoteCast | VoteActionType::VoteChanged
    ) {
        return;
    }
    if let Some(metadata) = action.metadata.as_object_mut() {
        for key in BALLOT_CHOICE_KEYS {
            metadata.remove(key);
        }
    }
}

/// When an open vote's time limit runs out, if it has one.
#[must_use]
pub fn deadline(
    vote: &vote::Model,
    config: &vote_configuration::Model,
) -> Option<DateTimeWithTimeZone> {
    let minutes = config.time_limit_minutes?;
    let opened_at = vote.opened_at?;
    Some(opened_at + chrono::Duration::minutes(i64::from(minutes)))
}

/// Query service for votes.
#[derive(Clone)]
pub struct VoteQueryService {
    repos: VoteRepositories,
}

impl VoteQueryService {
    /// Create a new vote query service.
    #[must_use]
    pub const fn new(repos: VoteRepositories) -> Self {
        Self { repos }
    }

    /// Get a vote with configuration, options and effective ballots.
    pub async fn get_vote(&self, vote_id: &str) -> AppResult<VoteDetail> {
        let conn = self.repos.votes.conn();
        let vote = self.repos.votes.get_by_id(conn, vote_id).await?;
        let configuration = self.repos.configurations.find_by_vote_id(conn, vote_id).await?;
        let options = self.repos.configurations.find_options(conn, vote_id).await?;
        let eligibility = self.repos.eligibility.find_by_vote(conn, vote_id).await?;
        let ledger = self.repos.casts.find_by_vote(conn, vote_id).await?;

        let anonymous = configuration.as_ref().is_some_and(|c| c.anonymous);
        let names: HashMap<&str, &str> = eligibility
            .iter()
            .map(|e| (e.user_id.as_str(), e.user_name.as_str()))
            .collect();

        let mut ballots: Vec<BallotView> = effective_ballots(&ledger)
            .into_iter()
            .map(|b| {
                if anonymous {
                    BallotView {
                        id: None,
                        option_id: b.option_id.clone(),
                        user_id: None,
                        user_name: None,
                        weight_applied: b.weight_applied,
                        revision: None,
                        cast_at: None,
                    }
                } else {
                    BallotView {
                        id: Some(b.id.clone()),
                        option_id: b.option_id.clone(),
                        user_id: Some(b.user_id.clone()),
                        user_name: names.get(b.user_id.as_str()).map(|n| (*n).to_string()),
                        weight_applied: b.weight_applied,
                        revision: Some(b.revision),
                        cast_at: Some(b.cast_at),
                    }
                }
            })
            .collect();
        // Ledger order would match the timeline order
        if anonymous {
            ballots.sort_by(|a, b| {
                a.option_id
                    .cmp(&b.option_id)
                    .then(a.weight_applied.total_cmp(&b.weight_applied))
            });
        }

        tracing::debug!(vote_id, anonymous, "Loaded vote detail");

        Ok(VoteDetail {
            total_eligible: eligibility.iter().filter(|e| e.eligible).count(),
            vote,
            configuration,
            options,
            ballots,
        })
    }

    /// Latest cached results, or all-zero results if the vote never closed.
    ///
    /// A reopened vote keeps reporting its previous results until it
    /// closes again.
    pub async fn get_results(&self, vote_id: &str) -> AppResult<VoteResults> {
        let conn = self.repos.votes.conn();
        self.repos.votes.get_by_id(conn, vote_id).await?;
        let options = self.repos.configurations.find_options(conn, vote_id).await?;

        match self.repos.results.find_summary(conn, vote_id).await? {
            Some(summary) => {
                let rows = self.repos.results.find_rows(conn, vote_id).await?;
                Ok(VoteResults::from_rows(&summary, &rows, &options, false))
            }
            None => {
                let threshold = self
                    .repos
                    .configurations
                    .find_by_vote_id(conn, vote_id)
                    .await?
                    .map_or(0.0, |c| c.pass_threshold_percentage);
                Ok(VoteResults::empty(vote_id, &options, threshold))
            }
        }
    }

    /// Transient tally of an open, non-anonymous vote. Nothing is stored.
    pub async fn get_live_results(&self, vote_id: &str) -> AppResult<VoteResults> {
        let conn = self.repos.votes.conn();
        let vote = self.repos.votes.get_by_id(conn, vote_id).await?;
        if vote.status != VoteStatus::Open {
            return Err(AppError::VoteNotOpen(format!(
                "Live results need an open vote; {vote_id} is {}",
                vote.status
            )));
        }

        let config = self
            .repos
            .configurations
            .find_by_vote_id(conn, vote_id)
            .await?
            .ok_or_else(|| AppError::Internal(format!("Open vote {vote_id} has no configuration")))?;
        if config.anonymous {
            return Err(AppError::Forbidden(
                "Live results are not shown for anonymous votes".to_string(),
            ));
        }

        let options = self.repos.configurations.find_options(conn, vote_id).await?;
        let eligibility = self.repos.eligibility.find_by_vote(conn, vote_id).await?;
        let ballots = self.repos.casts.find_by_vote(conn, vote_id).await?;

        let result = tally(TallyInput {
            vote_id,
            config: &config,
            options: &options,
            eligibility: &eligibility,
            ballots: &ballots,
            computed_at: Utc::now().into(),
        });

        Ok(VoteResults::from_rows(
            &result.summary,
            &result.results,
            &options,
            true,
        ))
    }

    /// The audit timeline of a vote, oldest first.
    ///
    /// The timeline of a deleted draft is still returned. On an anonymous
    /// vote, ballot entries keep who voted but never what they chose.
    pub async fn get_actions(&self, vote_id: &str) -> AppResult<Vec<vote_action::Model>> {
        let conn = self.repos.actions.conn();
        let mut actions = self.repos.actions.find_by_vote(conn, vote_id).await?;
        if actions.is_empty() {
            self.repos.votes.get_by_id(conn, vote_id).await?;
            return Ok(actions);
        }

        let anonymous = self
            .repos
            .configurations
            .find_by_vote_id(conn, vote_id)
            .await?
            .is_some_and(|c| c.anonymous);
        if anonymous {
            for action in &mut actions {
                redact_ballot_action(action);
            }
        }
        Ok(actions)
    }

    /// Votes attached to a governance record.
    pub async fn get_votes_by_entity(
        &self,
        entity_type: VoteEntityType,
        entity_id: &str,
    ) -> AppResult<Vec<vote::Model>> {
        self.repos
            .votes
            .find_by_entity(self.repos.votes.conn(), entity_type, entity_id)
            .await
    }

    /// Votes held in a meeting.
    pub async fn get_votes_by_meeting(&self, meeting_id: &str) -> AppResult<Vec<vote::Model>> {
        self.repos
            .votes
            .find_by_meeting(self.repos.votes.conn(), meeting_id)
            .await
    }

    /// Votes of a board, optionally filtered by status.
    pub async fn get_votes_by_board(
        &self,
        board_id: &str,
        status: Option<VoteStatus>,
    ) -> AppResult<Vec<vote::Model>> {
        self.repos
            .votes
            .find_by_board(self.repos.votes.conn(), board_id, status)
            .await
    }

    /// The caller's eligibility, effective ballot and ballot count.
    pub async fn get_my_ballot(&self, vote_id: &str, user_id: &str) -> AppResult<MyBallot> {
        let conn = self.repos.votes.conn();
        self.repos.votes.get_by_id(conn, vote_id).await?;
        let eligibility = self
            .repos
            .eligibility
            .find_for_user(conn, vote_id, user_id)
            .await?;
        let history = self.repos.casts.find_by_user(conn, vote_id, user_id).await?;
        let ballot = effective_ballots(&history).first().map(|b| (*b).clone());

        Ok(MyBallot {
            vote_id: vote_id.to_string(),
            eligibility,
            ballot,
            history_count: history.len(),
        })
    }

    /// The eligibility snapshot of a vote; empty before it opens.
    pub async fn get_eligibility(&self, vote_id: &str) -> AppResult<Vec<vote_eligibility::Model>> {
        let conn = self.repos.votes.conn();
        self.repos.votes.get_by_id(conn, vote_id).await?;
        self.repos.eligibility.find_by_vote(conn, vote_id).await
    }

    /// Open votes whose time limit has passed at `now`, earliest deadline
    /// first. Closing them is left to the caller.
    pub async fn get_overdue_votes(&self, now: DateTime<Utc>) -> AppResult<Vec<OverdueVote>> {
        let conn = self.repos.votes.conn();
        let open = self.repos.votes.find_open(conn).await?;
        let ids: Vec<String> = open.iter().map(|v| v.id.clone()).collect();
        let configs: HashMap<String, vote_configuration::Model> = self
            .repos
            .configurations
            .find_by_vote_ids(conn, &ids)
            .await?
            .into_iter()
            .map(|c| (c.vote_id.clone(), c))
            .collect();

        let mut overdue: Vec<OverdueVote> = open
            .into_iter()
            .filter_map(|vote| {
                let deadline = deadline(&vote, configs.get(&vote.id)?)?;
                (deadline <= now).then_some(OverdueVote { vote, deadline })
            })
            .collect();
        overdue.sort_by_key(|o| o.deadline);

        Ok(overdue)
    }
}
