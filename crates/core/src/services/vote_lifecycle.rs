//! Vote lifecycle controller.
//!
//! The only writer of votes, ballots and audit actions. Every operation
//! runs in one database transaction together with the action rows that
//! document it, under a per-vote lock.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use boardvote_common::{AppError, AppResult, IdGenerator, config::VotingConfig, get_metrics};
use boardvote_db::entities::{
    vote::{self, VoteEntityType, VoteOutcome, VoteStatus},
    vote_action::VoteActionType,
    vote_cast, vote_configuration,
    vote_configuration::{PassingRule, VotingMethod},
    vote_eligibility, vote_option,
};
use chrono::{DateTime, SubsecRound, Utc};
use sea_orm::{ConnectionTrait, DatabaseTransaction, Set};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};
use validator::Validate;

use super::{
    VoteRepositories,
    locks::VoteLocks,
    roster::{RosterEntry, RosterProvider, snapshot_entries},
    tally::{Tally, TallyInput, tally},
    vote_query::{VoteResults, deadline},
};

/// The authenticated caller of a mutating operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: String,
    pub name: String,
    pub role: Option<String>,
}

impl Actor {
    /// An actor without a role.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            role: None,
        }
    }
}

/// Client details recorded with a ballot.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// What caused a vote to close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseTrigger {
    /// An explicit `close` call.
    Manual,
    /// The last eligible voter cast a ballot.
    AllVoted,
    /// A forced close after the time limit ran out.
    TimeLimit,
}

impl CloseTrigger {
    /// Stable string form used in audit metadata.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::AllVoted => "all_voted",
            Self::TimeLimit => "time_limit",
        }
    }
}

/// Input for creating a vote.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateVoteInput {
    pub entity_type: Option<VoteEntityType>,
    #[validate(length(min = 1, max = 64))]
    pub entity_id: Option<String>,
    #[validate(length(min = 1, max = 64))]
    pub meeting_id: Option<String>,
    #[validate(length(min = 1, max = 64))]
    pub board_id: String,
    #[validate(length(min = 1))]
    pub title: String,
    #[validate(length(max = 8192))]
    pub description: Option<String>,
}

/// One option of a vote.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct OptionInput {
    #[validate(length(min = 1, max = 256))]
    pub label: String,
    #[validate(length(max = 2048))]
    pub description: Option<String>,
    #[serde(default)]
    pub is_abstain: bool,
}

impl OptionInput {
    fn labelled(label: &str, is_abstain: bool) -> Self {
        Self {
            label: label.to_string(),
            description: None,
            is_abstain,
        }
    }
}

/// Input for configuring a vote. Replaces rules and options wholesale.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ConfigureVoteInput {
    pub voting_method: VotingMethod,
    #[serde(default)]
    pub quorum_required: bool,
    #[serde(default = "default_quorum_percentage")]
    #[validate(range(min = 0.0, max = 100.0))]
    pub quorum_percentage: f64,
    #[serde(default = "default_passing_rule")]
    pub passing_rule: PassingRule,
    /// Overrides the threshold derived from `passing_rule`.
    #[validate(range(min = 0.0, max = 100.0))]
    pub pass_threshold_percentage: Option<f64>,
    #[serde(default)]
    pub anonymous: bool,
    #[serde(default)]
    pub allow_abstain: bool,
    #[serde(default)]
    pub allow_change_vote: bool,
    #[validate(range(min = 1))]
    pub time_limit_minutes: Option<i32>,
    #[serde(default)]
    pub auto_close_when_all_voted: bool,
    /// Empty for motions means the default option set.
    #[serde(default)]
    #[validate(nested)]
    pub options: Vec<OptionInput>,
}

const fn default_quorum_percentage() -> f64 {
    50.0
}

const fn default_passing_rule() -> PassingRule {
    PassingRule::SimpleMajority
}

impl ConfigureVoteInput {
    /// A configuration with defaults for everything but the method.
    #[must_use]
    pub const fn new(voting_method: VotingMethod) -> Self {
        Self {
            voting_method,
            quorum_required: false,
            quorum_percentage: default_quorum_percentage(),
            passing_rule: default_passing_rule(),
            pass_threshold_percentage: None,
            anonymous: false,
            allow_abstain: false,
            allow_change_vote: false,
            time_limit_minutes: None,
            auto_close_when_all_voted: false,
            options: Vec::new(),
        }
    }
}

/// A configured vote.
#[derive(Debug, Clone)]
pub struct ConfiguredVote {
    pub vote: vote::Model,
    pub configuration: vote_configuration::Model,
    pub options: Vec<vote_option::Model>,
}

/// An opened vote.
#[derive(Debug, Clone)]
pub struct OpenedVote {
    pub vote: vote::Model,
    pub total_eligible: usize,
}

/// An accepted ballot.
#[derive(Debug, Clone)]
pub struct CastOutcome {
    pub ballot: vote_cast::Model,
    /// The ballot replaced an earlier one.
    pub changed: bool,
    /// The ballot completed the roster and the vote closed.
    pub auto_closed: bool,
}

/// A completed close.
#[derive(Debug, Clone)]
pub struct CloseOutcome {
    pub vote: vote::Model,
    pub trigger: CloseTrigger,
    pub tally: Tally,
    pub results: VoteResults,
}

/// Result of checking the results cache against the ledger.
#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    pub vote: vote::Model,
    /// The cache disagreed with the ledger and was rewritten.
    pub diverged: bool,
    pub results: VoteResults,
}

/// Cast committed; whether the roster is now complete.
struct CastApplied {
    ballot: vote_cast::Model,
    changed: bool,
    close_now: bool,
}

/// Current time at the precision the database keeps.
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

async fn commit(txn: DatabaseTransaction) -> AppResult<()> {
    txn.commit()
        .await
        .map_err(|e| AppError::Database(e.to_string()))
}

/// Lifecycle controller for votes.
#[derive(Clone)]
pub struct VoteLifecycleService {
    repos: VoteRepositories,
    roster: Arc<dyn RosterProvider>,
    settings: VotingConfig,
    locks: VoteLocks,
    id_gen: IdGenerator,
}

impl VoteLifecycleService {
    /// Create a new lifecycle service.
    #[must_use]
    pub fn new(
        repos: VoteRepositories,
        roster: Arc<dyn RosterProvider>,
        settings: VotingConfig,
    ) -> Self {
        Self {
            repos,
            roster,
            settings,
            locks: VoteLocks::new(),
            id_gen: IdGenerator::new(),
        }
    }

    /// Create a draft vote.
    pub async fn create(&self, actor: &Actor, input: CreateVoteInput) -> AppResult<vote::Model> {
        input.validate()?;

        let title = input.title.trim();
        if title.is_empty() {
            return Err(AppError::Validation("Title must not be blank".to_string()));
        }
        if title.chars().count() > self.settings.max_title_length {
            return Err(AppError::Validation(format!(
                "Title is longer than {} characters",
                self.settings.max_title_length
            )));
        }
        if input.entity_type.is_some() != input.entity_id.is_some() {
            return Err(AppError::Validation(
                "entityType and entityId must be given together".to_string(),
            ));
        }

        let now = now();
        let model = vote::ActiveModel {
            id: Set(self.id_gen.generate()),
            entity_type: Set(input.entity_type),
            entity_id: Set(input.entity_id),
            meeting_id: Set(input.meeting_id),
            board_id: Set(input.board_id),
            title: Set(title.to_string()),
            description: Set(input.description),
            status: Set(VoteStatus::Draft),
            outcome: Set(VoteOutcome::None),
            created_by: Set(actor.id.clone()),
            created_at: Set(now.into()),
            opened_at: Set(None),
            closed_at: Set(None),
            updated_at: Set(None),
        };

        let txn = self.repos.votes.begin().await?;
        let vote = self.repos.votes.create(&txn, model).await?;
        self.record(
            &txn,
            &vote.id,
            VoteActionType::Created,
            actor,
            json!({
                "title": vote.title,
                "boardId": vote.board_id,
                "meetingId": vote.meeting_id,
                "entityType": vote.entity_type,
                "entityId": vote.entity_id,
            }),
            now,
        )
        .await?;
        commit(txn).await?;

        get_metrics().record_vote_created();
        info!(vote_id = %vote.id, actor_id = %actor.id, board_id = %vote.board_id, "Vote created");

        Ok(vote)
    }

    /// Replace the rules and options of a draft or configured vote.
    pub async fn configure(
        &self,
        vote_id: &str,
        actor: &Actor,
        input: ConfigureVoteInput,
    ) -> AppResult<ConfiguredVote> {
        input.validate()?;
        let now = now();
        let (configuration, options) = self.build_configuration(vote_id, &input, now)?;

        let _guard = self.locks.acquire(vote_id).await;
        let txn = self.repos.votes.begin().await?;

        let mut vote = self.repos.votes.get_by_id(&txn, vote_id).await?;
        if !vote.status.is_configurable() {
            return Err(AppError::ConfigurationLocked(format!(
                "Vote {vote_id} is {} and its configuration can no longer change",
                vote.status
            )));
        }

        let configuration = self
            .repos
            .configurations
            .replace(&txn, configuration)
            .await?;
        let options = self
            .repos
            .configurations
            .replace_options(&txn, vote_id, options)
            .await?;

        let changes = vote::ActiveModel {
            status: Set(VoteStatus::Configured),
            updated_at: Set(Some(now.into())),
            ..Default::default()
        };
        let won = self
            .repos
            .votes
            .transition(
                &txn,
                vote_id,
                &[VoteStatus::Draft, VoteStatus::Configured],
                changes,
            )
            .await?;
        if !won {
            return Err(AppError::ConfigurationLocked(format!(
                "Vote {vote_id} left configuration concurrently"
            )));
        }
        vote.status = VoteStatus::Configured;
        vote.updated_at = Some(now.into());

        self.record(
            &txn,
            vote_id,
            VoteActionType::Configured,
            actor,
            json!({
                "votingMethod": configuration.voting_method,
                "passingRule": configuration.passing_rule,
                "passThresholdPercentage": configuration.pass_threshold_percentage,
                "quorumRequired": configuration.quorum_required,
                "quorumPercentage": configuration.quorum_percentage,
                "anonymous": configuration.anonymous,
                "allowAbstain": configuration.allow_abstain,
                "allowChangeVote": configuration.allow_change_vote,
                "timeLimitMinutes": configuration.time_limit_minutes,
                "autoCloseWhenAllVoted": configuration.auto_close_when_all_voted,
                "options": options.iter().map(|o| o.label.as_str()).collect::<Vec<_>>(),
            }),
            now,
        )
        .await?;
        commit(txn).await?;

        info!(vote_id, actor_id = %actor.id, method = ?configuration.voting_method, "Vote configured");

        Ok(ConfiguredVote {
            vote,
            configuration,
            options,
        })
    }

    /// Snapshot the roster and start accepting ballots.
    ///
    /// `roster` overrides the configured roster provider.
    pub async fn open(
        &self,
        vote_id: &str,
        actor: &Actor,
        roster: Option<Vec<RosterEntry>>,
    ) -> AppResult<OpenedVote> {
        // Fail fast before reaching out to the directory
        let vote = self.check_openable(self.repos.votes.conn(), vote_id).await?;

        let (entries, source) = match roster {
            Some(entries) => (entries, "inline"),
            None => (
                self.roster
                    .fetch_roster(&vote.board_id, vote.meeting_id.as_deref())
                    .await?,
                "directory",
            ),
        };
        let snapshot = snapshot_entries(entries, self.settings.default_weight)?;
        let total_eligible = snapshot.iter().filter(|e| e.eligible).count();
        if total_eligible == 0 {
            return Err(AppError::EmptyEligibility(format!(
                "Vote {vote_id} has no eligible voters"
            )));
        }
        let total_weight: f64 = snapshot
            .iter()
            .filter(|e| e.eligible)
            .map(|e| e.weight)
            .sum();

        let _guard = self.locks.acquire(vote_id).await;
        let txn = self.repos.votes.begin().await?;
        let mut vote = self.check_openable(&txn, vote_id).await?;

        let now = now();
        let rows = snapshot
            .into_iter()
            .map(|entry| vote_eligibility::Model {
                id: self.id_gen.generate(),
                vote_id: vote_id.to_string(),
                user_id: entry.user_id,
                user_name: entry.user_name,
                user_role: entry.user_role,
                weight: entry.weight,
                eligible: entry.eligible,
                created_at: now.into(),
            })
            .collect();
        self.repos.eligibility.insert_snapshot(&txn, rows).await?;

        let changes = vote::ActiveModel {
            status: Set(VoteStatus::Open),
            opened_at: Set(Some(now.into())),
            updated_at: Set(Some(now.into())),
            ..Default::default()
        };
        let won = self
            .repos
            .votes
            .transition(&txn, vote_id, &[VoteStatus::Configured], changes)
            .await?;
        if !won {
            return Err(AppError::InvalidTransition(format!(
                "Vote {vote_id} changed status while opening"
            )));
        }
        vote.status = VoteStatus::Open;
        vote.opened_at = Some(now.into());
        vote.updated_at = Some(now.into());

        self.record(
            &txn,
            vote_id,
            VoteActionType::Opened,
            actor,
            json!({
                "totalEligible": total_eligible,
                "totalWeight": total_weight,
                "rosterSource": source,
            }),
            now,
        )
        .await?;
        commit(txn).await?;

        get_metrics().record_vote_opened();
        info!(vote_id, actor_id = %actor.id, total_eligible, "Vote opened");

        Ok(OpenedVote {
            vote,
            total_eligible,
        })
    }

    /// Record a ballot for `actor`.
    ///
    /// Closes the vote afterwards when it auto-closes and every eligible
    /// voter has now voted; losing that close to a concurrent one is fine.
    pub async fn cast(
        &self,
        vote_id: &str,
        actor: &Actor,
        option_id: &str,
        client: ClientInfo,
    ) -> AppResult<CastOutcome> {
        let client = &client;
        let applied = self
            .retry_conflicts("cast", vote_id, move || {
                self.try_cast(vote_id, actor, option_id, client)
            })
            .await;

        let applied = match applied {
            Ok(applied) => applied,
            Err(err) => {
                if !err.is_server_error() {
                    get_metrics().record_ballot_rejected();
                }
                return Err(err);
            }
        };
        get_metrics().record_ballot(applied.changed);

        let mut auto_closed = false;
        if applied.close_now {
            match self
                .close_with_trigger(vote_id, actor, false, CloseTrigger::AllVoted)
                .await
            {
                Ok(Some(_)) => auto_closed = true,
                Ok(None) | Err(AppError::VoteNotOpen(_)) => {
                    debug!(vote_id, "Auto-close already handled by a concurrent close");
                }
                Err(err) => {
                    warn!(vote_id, error = %err, "Auto-close failed; ballot kept");
                }
            }
        }

        Ok(CastOutcome {
            ballot: applied.ballot,
            changed: applied.changed,
            auto_closed,
        })
    }

    async fn try_cast(
        &self,
        vote_id: &str,
        actor: &Actor,
        option_id: &str,
        client: &ClientInfo,
    ) -> AppResult<CastApplied> {
        let _guard = self.locks.acquire(vote_id).await;
        let txn = self.repos.votes.begin().await?;

        let vote = self.repos.votes.get_by_id(&txn, vote_id).await?;
        if vote.status != VoteStatus::Open {
            return Err(AppError::VoteNotOpen(format!(
                "Vote {vote_id} is {}",
                vote.status
            )));
        }
        let config = self.load_configuration(&txn, vote_id).await?;

        let entry = self
            .repos
            .eligibility
            .find_for_user(&txn, vote_id, &actor.id)
            .await?
            .filter(|e| e.eligible)
            .ok_or_else(|| {
                AppError::NotEligible(format!(
                    "User {} is not eligible to vote on {vote_id}",
                    actor.id
                ))
            })?;

        let options = self.repos.configurations.find_options(&txn, vote_id).await?;
        let option = options
            .iter()
            .find(|o| o.id == option_id)
            .ok_or_else(|| {
                AppError::InvalidOption(format!(
                    "Option {option_id} does not belong to vote {vote_id}"
                ))
            })?;
        if option.is_abstain && !config.allow_abstain {
            return Err(AppError::InvalidOption(format!(
                "Vote {vote_id} does not allow abstaining"
            )));
        }

        let previous = self
            .repos
            .casts
            .find_latest_for_user(&txn, vote_id, &actor.id)
            .await?;
        if previous.is_some() && !config.allow_change_vote {
            return Err(AppError::AlreadyVoted(format!(
                "User {} already voted on {vote_id}",
                actor.id
            )));
        }

        let now = now();
        // A replacement must sort after the ballot it replaces
        let cast_at = previous
            .as_ref()
            .map_or(now.into(), |p| p.cast_at.max(now.into()));
        let revision = previous.as_ref().map_or(0, |p| p.revision + 1);
        let sequence = self.repos.casts.next_sequence(&txn, vote_id).await?;

        let ballot = self
            .repos
            .casts
            .append(
                &txn,
                vote_cast::Model {
                    id: self.id_gen.generate(),
                    vote_id: vote_id.to_string(),
                    option_id: option.id.clone(),
                    user_id: actor.id.clone(),
                    weight_applied: entry.weight,
                    revision,
                    sequence,
                    cast_at,
                    ip_address: client.ip_address.clone(),
                    user_agent: client.user_agent.clone(),
                },
            )
            .await?;

        let changed = previous.is_some();
        let mut metadata = json!({
            "weight": ballot.weight_applied,
            "revision": ballot.revision,
        });
        // The entry names its actor, so it must not name the choice as well
        if !config.anonymous {
            metadata["optionId"] = Value::from(ballot.option_id.clone());
            if let Some(previous) = &previous {
                metadata["previousOptionId"] = Value::from(previous.option_id.clone());
            }
            metadata["userName"] = Value::from(entry.user_name.clone());
        }
        let action_type = if changed {
            VoteActionType::VoteChanged
        } else {
            VoteActionType::VoteCast
        };
        self.record(&txn, vote_id, action_type, actor, metadata, now)
            .await?;

        let close_now =
            config.auto_close_when_all_voted && self.all_voted(&txn, vote_id).await?;
        commit(txn).await?;

        info!(vote_id, actor_id = %actor.id, revision, changed, "Ballot cast");

        Ok(CastApplied {
            ballot,
            changed,
            close_now,
        })
    }

    /// Close an open vote and store its results.
    ///
    /// Returns `None` when a concurrent close won the status transition;
    /// the vote is closed either way.
    pub async fn close(
        &self,
        vote_id: &str,
        actor: &Actor,
        force: bool,
    ) -> AppResult<Option<CloseOutcome>> {
        self.close_with_trigger(vote_id, actor, force, CloseTrigger::Manual)
            .await
    }

    async fn close_with_trigger(
        &self,
        vote_id: &str,
        actor: &Actor,
        force: bool,
        trigger: CloseTrigger,
    ) -> AppResult<Option<CloseOutcome>> {
        let outcome = self
            .retry_conflicts("close", vote_id, move || {
                self.try_close(vote_id, actor, force, trigger)
            })
            .await?;

        match &outcome {
            Some(closed) => get_metrics().record_vote_closed(closed.trigger != CloseTrigger::Manual),
            None => get_metrics().record_close_race_lost(),
        }
        Ok(outcome)
    }

    async fn try_close(
        &self,
        vote_id: &str,
        actor: &Actor,
        force: bool,
        trigger: CloseTrigger,
    ) -> AppResult<Option<CloseOutcome>> {
        let _guard = self.locks.acquire(vote_id).await;
        let txn = self.repos.votes.begin().await?;

        let mut vote = self.repos.votes.get_by_id(&txn, vote_id).await?;
        if vote.status != VoteStatus::Open {
            return Err(AppError::VoteNotOpen(format!(
                "Vote {vote_id} is {}",
                vote.status
            )));
        }
        let config = self.load_configuration(&txn, vote_id).await?;

        let now = now();
        let trigger = match trigger {
            CloseTrigger::Manual if force && deadline(&vote, &config).is_some_and(|d| d <= now) => {
                CloseTrigger::TimeLimit
            }
            other => other,
        };

        let options = self.repos.configurations.find_options(&txn, vote_id).await?;
        let eligibility = self.repos.eligibility.find_by_vote(&txn, vote_id).await?;
        let ballots = self.repos.casts.find_by_vote(&txn, vote_id).await?;
        let result = tally(TallyInput {
            vote_id,
            config: &config,
            options: &options,
            eligibility: &eligibility,
            ballots: &ballots,
            computed_at: now.into(),
        });
        let outcome = result.summary.outcome;

        let changes = vote::ActiveModel {
            status: Set(VoteStatus::Closed),
            outcome: Set(outcome),
            closed_at: Set(Some(now.into())),
            updated_at: Set(Some(now.into())),
            ..Default::default()
        };
        let won = self
            .repos
            .votes
            .transition(&txn, vote_id, &[VoteStatus::Open], changes)
            .await?;
        if !won {
            debug!(vote_id, "Close lost the status transition");
            return Ok(None);
        }
        vote.status = VoteStatus::Closed;
        vote.outcome = outcome;
        vote.closed_at = Some(now.into());
        vote.updated_at = Some(now.into());

        self.record(
            &txn,
            vote_id,
            VoteActionType::Closed,
            actor,
            json!({
                "forced": force,
                "trigger": trigger.as_str(),
                "ballotCount": ballots.len(),
            }),
            now,
        )
        .await?;
        self.repos
            .results
            .replace(
                &txn,
                vote_id,
                result.results.clone(),
                result.summary.clone(),
            )
            .await?;
        self.record(
            &txn,
            vote_id,
            VoteActionType::ResultsGenerated,
            actor,
            Self::results_metadata(&result),
            now,
        )
        .await?;
        commit(txn).await?;

        info!(
            vote_id,
            actor_id = %actor.id,
            trigger = trigger.as_str(),
            outcome = outcome.as_str(),
            total_voted = result.summary.total_voted,
            "Vote closed"
        );

        let results = VoteResults::from_rows(&result.summary, &result.results, &options, false);
        Ok(Some(CloseOutcome {
            vote,
            trigger,
            tally: result,
            results,
        }))
    }

    /// Reopen a closed vote for further ballots.
    ///
    /// The vote's outcome resets until the next close; the previous
    /// results stay in the results cache and in the `reopened` action.
    pub async fn reopen(&self, vote_id: &str, actor: &Actor, reason: &str) -> AppResult<vote::Model> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(AppError::ReasonRequired(format!(
                "Reopening vote {vote_id} requires a reason"
            )));
        }

        let _guard = self.locks.acquire(vote_id).await;
        let txn = self.repos.votes.begin().await?;

        let mut vote = self.repos.votes.get_by_id(&txn, vote_id).await?;
        if vote.status != VoteStatus::Closed {
            return Err(AppError::InvalidTransition(format!(
                "Only closed votes can be reopened; {vote_id} is {}",
                vote.status
            )));
        }

        let now = now();
        let changes = vote::ActiveModel {
            status: Set(VoteStatus::Open),
            outcome: Set(VoteOutcome::None),
            closed_at: Set(None),
            updated_at: Set(Some(now.into())),
            ..Default::default()
        };
        let won = self
            .repos
            .votes
            .transition(&txn, vote_id, &[VoteStatus::Closed], changes)
            .await?;
        if !won {
            return Err(AppError::InvalidTransition(format!(
                "Vote {vote_id} changed status while reopening"
            )));
        }

        self.record(
            &txn,
            vote_id,
            VoteActionType::Reopened,
            actor,
            json!({
                "reason": reason,
                "previousOutcome": vote.outcome,
                "previousClosedAt": vote.closed_at,
            }),
            now,
        )
        .await?;
        commit(txn).await?;

        vote.status = VoteStatus::Open;
        vote.outcome = VoteOutcome::None;
        vote.closed_at = None;
        vote.updated_at = Some(now.into());

        get_metrics().record_vote_opened();
        info!(vote_id, actor_id = %actor.id, reason, "Vote reopened");

        Ok(vote)
    }

    /// Archive a closed vote. Archived votes are final.
    pub async fn archive(&self, vote_id: &str, actor: &Actor) -> AppResult<vote::Model> {
        let _guard = self.locks.acquire(vote_id).await;
        let txn = self.repos.votes.begin().await?;

        let mut vote = self.repos.votes.get_by_id(&txn, vote_id).await?;
        if vote.status != VoteStatus::Closed {
            return Err(AppError::InvalidTransition(format!(
                "Only closed votes can be archived; {vote_id} is {}",
                vote.status
            )));
        }

        let now = now();
        let changes = vote::ActiveModel {
            status: Set(VoteStatus::Archived),
            updated_at: Set(Some(now.into())),
            ..Default::default()
        };
        let won = self
            .repos
            .votes
            .transition(&txn, vote_id, &[VoteStatus::Closed], changes)
            .await?;
        if !won {
            return Err(AppError::InvalidTransition(format!(
                "Vote {vote_id} changed status while archiving"
            )));
        }

        self.record(
            &txn,
            vote_id,
            VoteActionType::Archived,
            actor,
            json!({ "outcome": vote.outcome }),
            now,
        )
        .await?;
        commit(txn).await?;

        vote.status = VoteStatus::Archived;
        vote.updated_at = Some(now.into());
        info!(vote_id, actor_id = %actor.id, "Vote archived");

        Ok(vote)
    }

    /// Delete a vote that never opened.
    pub async fn delete(&self, vote_id: &str, actor: &Actor) -> AppResult<()> {
        let _guard = self.locks.acquire(vote_id).await;
        let txn = self.repos.votes.begin().await?;

        let vote = self.repos.votes.get_by_id(&txn, vote_id).await?;
        if !vote.status.is_configurable() {
            return Err(AppError::CannotDeleteAfterOpening(format!(
                "Vote {vote_id} is {}",
                vote.status
            )));
        }
        if !self.repos.casts.find_voter_ids(&txn, vote_id).await?.is_empty() {
            return Err(AppError::CannotDeleteAfterOpening(format!(
                "Vote {vote_id} has ballots"
            )));
        }

        let deleted = self
            .repos
            .votes
            .delete(
                &txn,
                vote_id,
                &[VoteStatus::Draft, VoteStatus::Configured],
            )
            .await?;
        if !deleted {
            return Err(AppError::CannotDeleteAfterOpening(format!(
                "Vote {vote_id} changed status while deleting"
            )));
        }
        commit(txn).await?;

        info!(vote_id, actor_id = %actor.id, "Vote deleted");
        Ok(())
    }

    /// Rerun the tally of a closed or archived vote and repair the results
    /// cache if it no longer matches the ledger.
    pub async fn reconcile(&self, vote_id: &str, actor: &Actor) -> AppResult<ReconcileOutcome> {
        let _guard = self.locks.acquire(vote_id).await;
        let txn = self.repos.votes.begin().await?;

        let mut vote = self.repos.votes.get_by_id(&txn, vote_id).await?;
        if !vote.status.has_outcome() {
            return Err(AppError::InvalidTransition(format!(
                "Only closed or archived votes have results; {vote_id} is {}",
                vote.status
            )));
        }

        let config = self.load_configuration(&txn, vote_id).await?;
        let options = self.repos.configurations.find_options(&txn, vote_id).await?;
        let eligibility = self.repos.eligibility.find_by_vote(&txn, vote_id).await?;
        let ballots = self.repos.casts.find_by_vote(&txn, vote_id).await?;
        let cached_summary = self.repos.results.find_summary(&txn, vote_id).await?;
        let cached_rows = self.repos.results.find_rows(&txn, vote_id).await?;

        let now = now();
        let computed_at = cached_summary
            .as_ref()
            .map(|s| s.computed_at)
            .or(vote.closed_at)
            .unwrap_or_else(|| now.into());
        let result = tally(TallyInput {
            vote_id,
            config: &config,
            options: &options,
            eligibility: &eligibility,
            ballots: &ballots,
            computed_at,
        });

        let mut expected_rows = result.results.clone();
        expected_rows.sort_by(|a, b| a.option_id.cmp(&b.option_id));
        let diverged = cached_summary.as_ref() != Some(&result.summary)
            || cached_rows != expected_rows
            || vote.outcome != result.summary.outcome;

        if diverged {
            warn!(vote_id, outcome = result.summary.outcome.as_str(), "Results cache diverged from ledger; rewriting");

            self.repos
                .results
                .replace(
                    &txn,
                    vote_id,
                    result.results.clone(),
                    result.summary.clone(),
                )
                .await?;

            if vote.outcome != result.summary.outcome {
                let changes = vote::ActiveModel {
                    outcome: Set(result.summary.outcome),
                    updated_at: Set(Some(now.into())),
                    ..Default::default()
                };
                self.repos
                    .votes
                    .transition(&txn, vote_id, &[vote.status], changes)
                    .await?;
                vote.outcome = result.summary.outcome;
                vote.updated_at = Some(now.into());
            }

            let mut metadata = Self::results_metadata(&result);
            metadata["reconciled"] = Value::Bool(true);
            self.record(
                &txn,
                vote_id,
                VoteActionType::ResultsGenerated,
                actor,
                metadata,
                now,
            )
            .await?;
        } else {
            debug!(vote_id, "Results cache matches ledger");
        }
        commit(txn).await?;

        Ok(ReconcileOutcome {
            vote,
            diverged,
            results: VoteResults::from_rows(&result.summary, &result.results, &options, false),
        })
    }

    // ==================== Helpers ====================

    /// Retry `attempt` on write conflicts, up to the configured limit.
    async fn retry_conflicts<T, F, Fut>(
        &self,
        operation: &'static str,
        vote_id: &str,
        mut attempt: F,
    ) -> AppResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let mut retries = 0;
        loop {
            match attempt().await {
                Err(err) if err.is_retryable() && retries < self.settings.max_conflict_retries => {
                    retries += 1;
                    get_metrics().record_conflict_retry();
                    let delay = self.settings.conflict_retry_delay(retries);
                    warn!(
                        vote_id,
                        operation,
                        retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Write conflict, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                result => return result,
            }
        }
    }

    async fn check_openable<C: ConnectionTrait>(
        &self,
        conn: &C,
        vote_id: &str,
    ) -> AppResult<vote::Model> {
        let vote = self.repos.votes.get_by_id(conn, vote_id).await?;
        if vote.status != VoteStatus::Configured {
            return Err(AppError::InvalidTransition(format!(
                "Only configured votes can be opened; {vote_id} is {}",
                vote.status
            )));
        }

        let config = self.load_configuration(conn, vote_id).await?;
        if config.voting_method == VotingMethod::Ranked {
            return Err(AppError::Validation(
                "Ranked-choice votes cannot be opened: ranked tallying is not supported"
                    .to_string(),
            ));
        }

        Ok(vote)
    }

    async fn load_configuration<C: ConnectionTrait>(
        &self,
        conn: &C,
        vote_id: &str,
    ) -> AppResult<vote_configuration::Model> {
        self.repos
            .configurations
            .find_by_vote_id(conn, vote_id)
            .await?
            .ok_or_else(|| AppError::Internal(format!("Vote {vote_id} has no configuration")))
    }

    /// Whether every eligible voter has an effective ballot.
    async fn all_voted<C: ConnectionTrait>(&self, conn: &C, vote_id: &str) -> AppResult<bool> {
        let voters: HashSet<String> = self
            .repos
            .casts
            .find_voter_ids(conn, vote_id)
            .await?
            .into_iter()
            .collect();
        let eligibility = self.repos.eligibility.find_by_vote(conn, vote_id).await?;

        Ok(eligibility
            .iter()
            .filter(|e| e.eligible)
            .all(|e| voters.contains(&e.user_id)))
    }

    async fn record<C: ConnectionTrait>(
        &self,
        conn: &C,
        vote_id: &str,
        action_type: VoteActionType,
        actor: &Actor,
        metadata: Value,
        at: DateTime<Utc>,
    ) -> AppResult<()> {
        self.repos
            .actions
            .append(
                conn,
                self.id_gen.generate(),
                vote_id,
                action_type,
                &actor.id,
                &actor.name,
                metadata,
                at,
            )
            .await?;
        Ok(())
    }

    fn results_metadata(result: &Tally) -> Value {
        let summary = &result.summary;
        json!({
            "outcome": summary.outcome,
            "totalEligible": summary.total_eligible,
            "totalVoted": summary.total_voted,
            "totalWeight": summary.total_weight,
            "quorumRequired": summary.quorum_required,
            "quorumMet": summary.quorum_met,
            "thresholdPercentage": summary.threshold_percentage,
            "winner": result.results.iter().find(|r| r.is_winner).map(|r| r.option_id.as_str()),
        })
    }

    /// Validate a configuration request and build the rows it stores.
    fn build_configuration(
        &self,
        vote_id: &str,
        input: &ConfigureVoteInput,
        now: DateTime<Utc>,
    ) -> AppResult<(vote_configuration::Model, Vec<vote_option::Model>)> {
        let method = input.voting_method;
        let allow_abstain = input.allow_abstain || method == VotingMethod::YesNoAbstain;

        let mut requested = input.options.clone();
        if requested.is_empty() {
            if !method.is_motion() {
                return Err(AppError::Validation(
                    "Multiple-choice and ranked votes need at least two options".to_string(),
                ));
            }
            requested.push(OptionInput::labelled("Yes", false));
            requested.push(OptionInput::labelled("No", false));
            if allow_abstain {
                requested.push(OptionInput::labelled("Abstain", true));
            }
        } else if method == VotingMethod::YesNoAbstain && !requested.iter().any(|o| o.is_abstain) {
            requested.push(OptionInput::labelled("Abstain", true));
        }

        if requested.len() > self.settings.max_options {
            return Err(AppError::Validation(format!(
                "A vote can have at most {} options",
                self.settings.max_options
            )));
        }

        let mut labels = HashSet::new();
        for option in &requested {
            let label = option.label.trim().to_lowercase();
            if label.is_empty() {
                return Err(AppError::Validation(
                    "Option labels must not be blank".to_string(),
                ));
            }
            if !labels.insert(label) {
                return Err(AppError::Validation(format!(
                    "Duplicate option label: {}",
                    option.label.trim()
                )));
            }
        }

        let abstain = requested.iter().filter(|o| o.is_abstain).count();
        let decisive = requested.len() - abstain;
        if abstain > 0 && !allow_abstain {
            return Err(AppError::Validation(
                "Abstain options require allowAbstain".to_string(),
            ));
        }
        if abstain > 1 {
            return Err(AppError::Validation(
                "A vote can have at most one abstain option".to_string(),
            ));
        }
        if method.is_motion() && decisive != 2 {
            return Err(AppError::Validation(
                "Yes/no votes take exactly two decisive options".to_string(),
            ));
        }
        if decisive < 2 {
            return Err(AppError::Validation(
                "A vote needs at least two decisive options".to_string(),
            ));
        }

        let configuration = vote_configuration::Model {
            vote_id: vote_id.to_string(),
            voting_method: method,
            quorum_required: input.quorum_required,
            quorum_percentage: input.quorum_percentage,
            passing_rule: input.passing_rule,
            pass_threshold_percentage: input
                .pass_threshold_percentage
                .unwrap_or_else(|| input.passing_rule.default_threshold()),
            anonymous: input.anonymous,
            allow_abstain,
            allow_change_vote: input.allow_change_vote,
            time_limit_minutes: input.time_limit_minutes,
            auto_close_when_all_voted: input.auto_close_when_all_voted,
            updated_at: now.into(),
        };

        let options = requested
            .into_iter()
            .enumerate()
            .map(|(index, option)| vote_option::Model {
                id: self.id_gen.generate(),
                vote_id: vote_id.to_string(),
                label: option.label.trim().to_string(),
                description: option.description,
                display_order: index as i32,
                is_abstain: option.is_abstain,
            })
            .collect();

        Ok((configuration, options))
    }
}
