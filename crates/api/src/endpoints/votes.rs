//! Vote endpoints.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{get, post, put},
};
use boardvote_common::{AppError, AppResult};
use boardvote_core::{
    BallotView, CastOutcome, CloseOutcome, ConfigureVoteInput, ConfiguredVote, CreateVoteInput,
    MyBallot, OverdueVote, ReconcileOutcome, ResultRow, RosterEntry, VoteDetail, VoteResults,
};
use boardvote_db::entities::{
    vote::{self, VoteEntityType, VoteOutcome, VoteStatus},
    vote_action::{self, VoteActionType},
    vote_cast,
    vote_configuration::{self, PassingRule, VotingMethod},
    vote_eligibility, vote_option,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::{
    extractors::{AuthActor, Client},
    middleware::AppState,
    response::{ApiResponse, no_content},
};

// ==================== Request/Response Types ====================

/// Vote response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteResponse {
    pub id: String,
    pub entity_type: Option<VoteEntityType>,
    pub entity_id: Option<String>,
    pub meeting_id: Option<String>,
    pub board_id: String,
    pub title: String,
    pub description: Option<String>,
    pub status: VoteStatus,
    pub outcome: VoteOutcome,
    pub created_by: String,
    pub created_at: String,
    pub opened_at: Option<String>,
    pub closed_at: Option<String>,
    pub updated_at: Option<String>,
}

impl From<vote::Model> for VoteResponse {
    fn from(v: vote::Model) -> Self {
        Self {
            id: v.id,
            entity_type: v.entity_type,
            entity_id: v.entity_id,
            meeting_id: v.meeting_id,
            board_id: v.board_id,
            title: v.title,
            description: v.description,
            status: v.status,
            outcome: v.outcome,
            created_by: v.created_by,
            created_at: v.created_at.to_rfc3339(),
            opened_at: v.opened_at.map(|t| t.to_rfc3339()),
            closed_at: v.closed_at.map(|t| t.to_rfc3339()),
            updated_at: v.updated_at.map(|t| t.to_rfc3339()),
        }
    }
}

/// Vote configuration response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationResponse {
    pub voting_method: VotingMethod,
    pub quorum_required: bool,
    pub quorum_percentage: f64,
    pub passing_rule: PassingRule,
    pub pass_threshold_percentage: f64,
    pub anonymous: bool,
    pub allow_abstain: bool,
    pub allow_change_vote: bool,
    pub time_limit_minutes: Option<i32>,
    pub auto_close_when_all_voted: bool,
    pub updated_at: String,
}

impl From<vote_configuration::Model> for ConfigurationResponse {
    fn from(c: vote_configuration::Model) -> Self {
        Self {
            voting_method: c.voting_method,
            quorum_required: c.quorum_required,
            quorum_percentage: c.quorum_percentage,
            passing_rule: c.passing_rule,
            pass_threshold_percentage: c.pass_threshold_percentage,
            anonymous: c.anonymous,
            allow_abstain: c.allow_abstain,
            allow_change_vote: c.allow_change_vote,
            time_limit_minutes: c.time_limit_minutes,
            auto_close_when_all_voted: c.auto_close_when_all_voted,
            updated_at: c.updated_at.to_rfc3339(),
        }
    }
}

/// Vote option response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionResponse {
    pub id: String,
    pub label: String,
    pub description: Option<String>,
    pub display_order: i32,
    pub is_abstain: bool,
}

impl From<vote_option::Model> for OptionResponse {
    fn from(o: vote_option::Model) -> Self {
        Self {
            id: o.id,
            label: o.label,
            description: o.description,
            display_order: o.display_order,
            is_abstain: o.is_abstain,
        }
    }
}

/// Ballot response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BallotResponse {
    pub id: Option<String>,
    pub option_id: String,
    pub user_id: Option<String>,
    pub user_name: Option<String>,
    pub weight_applied: f64,
    pub revision: Option<i32>,
    pub cast_at: Option<String>,
}

impl From<BallotView> for BallotResponse {
    fn from(b: BallotView) -> Self {
        Self {
            id: b.id,
            option_id: b.option_id,
            user_id: b.user_id,
            user_name: b.user_name,
            weight_applied: b.weight_applied,
            revision: b.revision,
            cast_at: b.cast_at.map(|at| at.to_rfc3339()),
        }
    }
}

impl From<vote_cast::Model> for BallotResponse {
    fn from(b: vote_cast::Model) -> Self {
        Self {
            id: Some(b.id),
            option_id: b.option_id,
            user_id: Some(b.user_id),
            user_name: None,
            weight_applied: b.weight_applied,
            revision: Some(b.revision),
            cast_at: Some(b.cast_at.to_rfc3339()),
        }
    }
}

/// Vote with rules, options and ballots.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteDetailResponse {
    #[serde(flatten)]
    pub vote: VoteResponse,
    pub configuration: Option<ConfigurationResponse>,
    pub options: Vec<OptionResponse>,
    pub ballots: Vec<BallotResponse>,
    pub total_eligible: usize,
}

impl From<VoteDetail> for VoteDetailResponse {
    fn from(d: VoteDetail) -> Self {
        Self {
            vote: d.vote.into(),
            configuration: d.configuration.map(Into::into),
            options: d.options.into_iter().map(Into::into).collect(),
            ballots: d.ballots.into_iter().map(Into::into).collect(),
            total_eligible: d.total_eligible,
        }
    }
}

/// Configured vote response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfiguredVoteResponse {
    pub vote: VoteResponse,
    pub configuration: ConfigurationResponse,
    pub options: Vec<OptionResponse>,
}

impl From<ConfiguredVote> for ConfiguredVoteResponse {
    fn from(c: ConfiguredVote) -> Self {
        Self {
            vote: c.vote.into(),
            configuration: c.configuration.into(),
            options: c.options.into_iter().map(Into::into).collect(),
        }
    }
}

/// Result row response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultRowResponse {
    pub option_id: String,
    pub label: String,
    pub is_abstain: bool,
    pub total_weight: f64,
    pub vote_count: i32,
    pub percentage: f64,
    pub is_winner: bool,
}

impl From<ResultRow> for ResultRowResponse {
    fn from(r: ResultRow) -> Self {
        Self {
            option_id: r.option_id,
            label: r.label,
            is_abstain: r.is_abstain,
            total_weight: r.total_weight,
            vote_count: r.vote_count,
            percentage: r.percentage,
            is_winner: r.is_winner,
        }
    }
}

/// Results response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultsResponse {
    pub vote_id: String,
    pub total_eligible: i32,
    pub total_voted: i32,
    pub total_weight: f64,
    pub quorum_required: i32,
    pub quorum_met: bool,
    pub threshold_percentage: f64,
    pub outcome: VoteOutcome,
    pub computed_at: Option<String>,
    pub live: bool,
    pub results: Vec<ResultRowResponse>,
}

impl From<VoteResults> for ResultsResponse {
    fn from(r: VoteResults) -> Self {
        let s = r.summary;
        Self {
            vote_id: r.vote_id,
            total_eligible: s.total_eligible,
            total_voted: s.total_voted,
            total_weight: s.total_weight,
            quorum_required: s.quorum_required,
            quorum_met: s.quorum_met,
            threshold_percentage: s.threshold_percentage,
            outcome: s.outcome,
            computed_at: s.computed_at.map(|t| t.to_rfc3339()),
            live: s.live,
            results: r.results.into_iter().map(Into::into).collect(),
        }
    }
}

/// Audit action response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResponse {
    pub id: String,
    pub vote_id: String,
    pub action_type: VoteActionType,
    pub performed_by: String,
    pub performed_by_name: String,
    pub metadata: Value,
    pub sequence: i64,
    pub created_at: String,
}

impl From<vote_action::Model> for ActionResponse {
    fn from(a: vote_action::Model) -> Self {
        Self {
            id: a.id,
            vote_id: a.vote_id,
            action_type: a.action_type,
            performed_by: a.performed_by,
            performed_by_name: a.performed_by_name,
            metadata: a.metadata,
            sequence: a.sequence,
            created_at: a.created_at.to_rfc3339(),
        }
    }
}

/// Eligibility snapshot entry response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EligibilityResponse {
    pub user_id: String,
    pub user_name: String,
    pub user_role: String,
    pub weight: f64,
    pub eligible: bool,
}

impl From<vote_eligibility::Model> for EligibilityResponse {
    fn from(e: vote_eligibility::Model) -> Self {
        Self {
            user_id: e.user_id,
            user_name: e.user_name,
            user_role: e.user_role,
            weight: e.weight,
            eligible: e.eligible,
        }
    }
}

/// The caller's own ballot.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MyBallotResponse {
    pub vote_id: String,
    pub eligible: bool,
    pub weight: Option<f64>,
    pub ballot: Option<BallotResponse>,
    pub history_count: usize,
}

impl From<MyBallot> for MyBallotResponse {
    fn from(m: MyBallot) -> Self {
        Self {
            vote_id: m.vote_id,
            eligible: m.eligibility.as_ref().is_some_and(|e| e.eligible),
            weight: m.eligibility.map(|e| e.weight),
            ballot: m.ballot.map(Into::into),
            history_count: m.history_count,
        }
    }
}

/// Overdue vote response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverdueVoteResponse {
    #[serde(flatten)]
    pub vote: VoteResponse,
    pub deadline: String,
}

impl From<OverdueVote> for OverdueVoteResponse {
    fn from(o: OverdueVote) -> Self {
        Self {
            vote: o.vote.into(),
            deadline: o.deadline.to_rfc3339(),
        }
    }
}

/// Opened vote response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenedVoteResponse {
    pub vote: VoteResponse,
    pub total_eligible: usize,
}

/// Cast response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CastResponse {
    pub ballot: BallotResponse,
    pub changed: bool,
    pub auto_closed: bool,
}

impl From<CastOutcome> for CastResponse {
    fn from(c: CastOutcome) -> Self {
        Self {
            ballot: c.ballot.into(),
            changed: c.changed,
            auto_closed: c.auto_closed,
        }
    }
}

/// Close response. `closed` is false when a concurrent close got there
/// first; the vote and results are then the ones that close produced.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseResponse {
    pub closed: bool,
    pub trigger: Option<&'static str>,
    pub vote: VoteResponse,
    pub results: ResultsResponse,
}

impl From<CloseOutcome> for CloseResponse {
    fn from(c: CloseOutcome) -> Self {
        Self {
            closed: true,
            trigger: Some(c.trigger.as_str()),
            vote: c.vote.into(),
            results: c.results.into(),
        }
    }
}

/// Reconcile response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileResponse {
    pub diverged: bool,
    pub vote: VoteResponse,
    pub results: ResultsResponse,
}

impl From<ReconcileOutcome> for ReconcileResponse {
    fn from(r: ReconcileOutcome) -> Self {
        Self {
            diverged: r.diverged,
            vote: r.vote.into(),
            results: r.results.into(),
        }
    }
}

/// Open vote request.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenVoteRequest {
    /// Inline roster; the roster directory is asked when absent.
    #[serde(default)]
    pub roster: Option<Vec<RosterEntry>>,
}

/// Cast request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CastRequest {
    pub option_id: String,
}

/// Close request.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseRequest {
    #[serde(default)]
    pub force: bool,
}

/// Reopen request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReopenRequest {
    #[serde(default)]
    pub reason: String,
}

/// Results query.
#[derive(Debug, Default, Deserialize)]
pub struct ResultsQuery {
    #[serde(default)]
    pub live: bool,
}

/// Board listing query.
#[derive(Debug, Default, Deserialize)]
pub struct BoardVotesQuery {
    pub status: Option<VoteStatus>,
}

// ==================== Routers ====================

/// Create the votes router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create))
        .route("/overdue", get(overdue))
        .route("/{id}", get(show).delete(delete))
        .route("/{id}/configure", put(configure))
        .route("/{id}/open", post(open))
        .route("/{id}/cast", post(cast))
        .route("/{id}/close", post(close))
        .route("/{id}/reopen", post(reopen))
        .route("/{id}/archive", post(archive))
        .route("/{id}/reconcile", post(reconcile))
        .route("/{id}/results", get(results))
        .route("/{id}/actions", get(actions))
        .route("/{id}/ballot", get(my_ballot))
        .route("/{id}/eligibility", get(eligibility))
}

/// Create the entities router.
pub fn entities_router() -> Router<AppState> {
    Router::new().route("/{entity_type}/{entity_id}/votes", get(votes_by_entity))
}

/// Create the meetings router.
pub fn meetings_router() -> Router<AppState> {
    Router::new().route("/{id}/votes", get(votes_by_meeting))
}

/// Create the boards router.
pub fn boards_router() -> Router<AppState> {
    Router::new().route("/{id}/votes", get(votes_by_board))
}

// ==================== Handlers ====================

/// Create a draft vote.
async fn create(
    AuthActor(actor): AuthActor,
    State(state): State<AppState>,
    Json(req): Json<CreateVoteInput>,
) -> AppResult<ApiResponse<VoteResponse>> {
    let vote = state.lifecycle.create(&actor, req).await?;

    Ok(ApiResponse::created(vote.into()))
}

/// Replace the rules and options of a vote.
async fn configure(
    AuthActor(actor): AuthActor,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ConfigureVoteInput>,
) -> AppResult<ApiResponse<ConfiguredVoteResponse>> {
    let configured = state.lifecycle.configure(&id, &actor, req).await?;

    Ok(ApiResponse::ok(configured.into()))
}

/// Snapshot eligibility and open the vote.
async fn open(
    AuthActor(actor): AuthActor,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<OpenVoteRequest>,
) -> AppResult<ApiResponse<OpenedVoteResponse>> {
    let opened = state.lifecycle.open(&id, &actor, req.roster).await?;

    Ok(ApiResponse::ok(OpenedVoteResponse {
        vote: opened.vote.into(),
        total_eligible: opened.total_eligible,
    }))
}

/// Cast or change a ballot.
async fn cast(
    AuthActor(actor): AuthActor,
    Client(client): Client,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<CastRequest>,
) -> AppResult<ApiResponse<CastResponse>> {
    let outcome = state
        .lifecycle
        .cast(&id, &actor, &req.option_id, client)
        .await?;

    Ok(ApiResponse::ok(outcome.into()))
}

/// Close a vote and publish its results.
async fn close(
    AuthActor(actor): AuthActor,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<CloseRequest>,
) -> AppResult<ApiResponse<CloseResponse>> {
    if let Some(closed) = state.lifecycle.close(&id, &actor, req.force).await? {
        return Ok(ApiResponse::ok(closed.into()));
    }

    debug!(vote_id = %id, "Close lost to a concurrent close; returning stored results");
    let detail = state.query.get_vote(&id).await?;
    let results = state.query.get_results(&id).await?;

    Ok(ApiResponse::ok(CloseResponse {
        closed: false,
        trigger: None,
        vote: detail.vote.into(),
        results: results.into(),
    }))
}

/// Reopen a closed vote.
async fn reopen(
    AuthActor(actor): AuthActor,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ReopenRequest>,
) -> AppResult<ApiResponse<VoteResponse>> {
    let vote = state.lifecycle.reopen(&id, &actor, &req.reason).await?;

    Ok(ApiResponse::ok(vote.into()))
}

/// Archive a closed vote.
async fn archive(
    AuthActor(actor): AuthActor,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<VoteResponse>> {
    let vote = state.lifecycle.archive(&id, &actor).await?;

    Ok(ApiResponse::ok(vote.into()))
}

/// Check the results cache against the ballot ledger.
async fn reconcile(
    AuthActor(actor): AuthActor,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<ReconcileResponse>> {
    let outcome = state.lifecycle.reconcile(&id, &actor).await?;

    Ok(ApiResponse::ok(outcome.into()))
}

/// Delete a vote that never opened.
async fn delete(
    AuthActor(actor): AuthActor,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    state.lifecycle.delete(&id, &actor).await?;

    Ok(no_content())
}

/// Show a vote.
async fn show(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<VoteDetailResponse>> {
    let detail = state.query.get_vote(&id).await?;

    Ok(ApiResponse::ok(detail.into()))
}

/// Stored results, or a live tally with `?live=true`.
async fn results(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ResultsQuery>,
) -> AppResult<ApiResponse<ResultsResponse>> {
    let results = if query.live {
        state.query.get_live_results(&id).await?
    } else {
        state.query.get_results(&id).await?
    };

    Ok(ApiResponse::ok(results.into()))
}

/// Audit timeline of a vote.
async fn actions(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<Vec<ActionResponse>>> {
    let actions = state.query.get_actions(&id).await?;

    Ok(ApiResponse::ok(actions.into_iter().map(Into::into).collect()))
}

/// The caller's own ballot.
async fn my_ballot(
    AuthActor(actor): AuthActor,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<MyBallotResponse>> {
    let mine = state.query.get_my_ballot(&id, &actor.id).await?;

    Ok(ApiResponse::ok(mine.into()))
}

/// Eligibility snapshot of a vote.
async fn eligibility(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<Vec<EligibilityResponse>>> {
    let entries = state.query.get_eligibility(&id).await?;

    Ok(ApiResponse::ok(entries.into_iter().map(Into::into).collect()))
}

/// Open votes past their time limit.
async fn overdue(State(state): State<AppState>) -> AppResult<ApiResponse<Vec<OverdueVoteResponse>>> {
    let votes = state.query.get_overdue_votes(Utc::now()).await?;

    Ok(ApiResponse::ok(votes.into_iter().map(Into::into).collect()))
}

/// Votes attached to a governance record.
async fn votes_by_entity(
    State(state): State<AppState>,
    Path((entity_type, entity_id)): Path<(String, String)>,
) -> AppResult<ApiResponse<Vec<VoteResponse>>> {
    let entity_type = entity_type
        .parse::<VoteEntityType>()
        .map_err(AppError::BadRequest)?;
    let votes = state
        .query
        .get_votes_by_entity(entity_type, &entity_id)
        .await?;

    Ok(ApiResponse::ok(votes.into_iter().map(Into::into).collect()))
}

/// Votes held in a meeting.
async fn votes_by_meeting(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<Vec<VoteResponse>>> {
    let votes = state.query.get_votes_by_meeting(&id).await?;

    Ok(ApiResponse::ok(votes.into_iter().map(Into::into).collect()))
}

/// Votes of a board.
async fn votes_by_board(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<BoardVotesQuery>,
) -> AppResult<ApiResponse<Vec<VoteResponse>>> {
    let votes = state.query.get_votes_by_board(&id, query.status).await?;

    Ok(ApiResponse::ok(votes.into_iter().map(Into::into).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_results_query_defaults_to_stored() {
        let query: ResultsQuery = serde_json::from_str("{}").unwrap_or_default();
        assert!(!query.live);
    }

    #[test]
    fn test_vote_response_timestamps() {
        let now = Utc::now().fixed_offset();
        let response = VoteResponse::from(vote::Model {
            id: "v1".to_string(),
            entity_type: Some(VoteEntityType::Minutes),
            entity_id: Some("m1".to_string()),
            meeting_id: None,
            board_id: "b1".to_string(),
            title: "Approve minutes".to_string(),
            description: None,
            status: VoteStatus::Draft,
            outcome: VoteOutcome::None,
            created_by: "u1".to_string(),
            created_at: now,
            opened_at: None,
            closed_at: None,
            updated_at: None,
        });

        assert_eq!(response.created_at, now.to_rfc3339());
        assert!(response.opened_at.is_none());

        let json = serde_json::to_value(&response).unwrap_or_default();
        assert_eq!(json["entityType"], "minutes");
        assert_eq!(json["status"], "draft");
        assert_eq!(json["outcome"], "none");
    }
}
