//! API integration tests.
//!
//! These tests drive the full router over an in-memory database.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use boardvote_api::{app, middleware::AppState};
use boardvote_common::config::VotingConfig;
use boardvote_core::{NoRosterProvider, VoteLifecycleService, VoteQueryService, VoteRepositories};
use boardvote_db::test_utils::memory_database;
use serde_json::{Value, json};
use tower::ServiceExt;

/// Create the test router over a fresh database.
async fn create_test_router() -> Router {
    let db = Arc::new(memory_database().await.unwrap());
    let repos = VoteRepositories::new(db);

    app(AppState {
        lifecycle: VoteLifecycleService::new(
            repos.clone(),
            Arc::new(NoRosterProvider),
            VotingConfig::default(),
        ),
        query: VoteQueryService::new(repos),
    })
}

/// Send a request and decode the JSON body (`Null` when empty).
async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    actor: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(actor) = actor {
        builder = builder
            .header("X-Actor-Id", actor)
            .header("X-Actor-Name", format!("Director {actor}"));
    }
    let request = match body {
        Some(body) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };

    (status, json)
}

fn roster() -> Value {
    json!([
        { "userId": "u1", "userName": "Director 1", "userRole": "director" },
        { "userId": "u2", "userName": "Director 2", "userRole": "director" },
        { "userId": "u3", "userName": "Director 3", "userRole": "treasurer", "weight": 2.0 },
    ])
}

/// Create, configure and open a yes/no vote; returns (vote id, yes id, no id).
async fn open_motion(app: &Router, configure: Value) -> (String, String, String) {
    let (status, created) = send(
        app,
        "POST",
        "/api/votes",
        Some("chair"),
        Some(json!({
            "boardId": "board1",
            "meetingId": "meeting1",
            "entityType": "agenda_item",
            "entityId": "item7",
            "title": "Approve the annual budget",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let vote_id = created["data"]["id"].as_str().unwrap().to_string();

    let (status, configured) = send(
        app,
        "PUT",
        &format!("/api/votes/{vote_id}/configure"),
        Some("chair"),
        Some(configure),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let options = configured["data"]["options"].as_array().unwrap();
    let yes = options[0]["id"].as_str().unwrap().to_string();
    let no = options[1]["id"].as_str().unwrap().to_string();

    let (status, opened) = send(
        app,
        "POST",
        &format!("/api/votes/{vote_id}/open"),
        Some("chair"),
        Some(json!({ "roster": roster() })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(opened["data"]["totalEligible"], 3);

    (vote_id, yes, no)
}

#[tokio::test]
async fn test_full_vote_lifecycle() {
    let app = create_test_router().await;
    let (vote_id, yes, no) = open_motion(&app, json!({ "votingMethod": "yes_no" })).await;

    for (voter, option) in [("u1", &yes), ("u2", &no), ("u3", &yes)] {
        let (status, cast) = send(
            &app,
            "POST",
            &format!("/api/votes/{vote_id}/cast"),
            Some(voter),
            Some(json!({ "optionId": option })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(cast["data"]["changed"], false);
    }

    let (status, closed) = send(
        &app,
        "POST",
        &format!("/api/votes/{vote_id}/close"),
        Some("chair"),
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(closed["data"]["closed"], true);
    assert_eq!(closed["data"]["trigger"], "manual");
    assert_eq!(closed["data"]["vote"]["status"], "closed");
    assert_eq!(closed["data"]["vote"]["outcome"], "passed");

    let (status, results) = send(&app, "GET", &format!("/api/votes/{vote_id}/results"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(results["data"]["totalVoted"], 3);
    assert_eq!(results["data"]["totalWeight"], 4.0);
    assert_eq!(results["data"]["results"][0]["percentage"], 75.0);
    assert_eq!(results["data"]["results"][0]["isWinner"], true);

    let (status, actions) = send(&app, "GET", &format!("/api/votes/{vote_id}/actions"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    let kinds: Vec<_> = actions["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["actionType"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(
        kinds,
        [
            "created",
            "configured",
            "opened",
            "vote_cast",
            "vote_cast",
            "vote_cast",
            "closed",
            "results_generated",
        ]
    );

    let (status, listed) = send(&app, "GET", "/api/entities/agenda_item/item7/votes", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed["data"].as_array().unwrap().len(), 1);

    let (status, listed) = send(&app, "GET", "/api/meetings/meeting1/votes", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed["data"][0]["id"], vote_id.as_str());

    let (status, listed) = send(&app, "GET", "/api/boards/board1/votes?status=open", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(listed["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_anonymous_vote_never_pairs_voter_with_choice() {
    let app = create_test_router().await;
    let (vote_id, yes, no) = open_motion(
        &app,
        json!({ "votingMethod": "yes_no", "anonymous": true, "allowChangeVote": true }),
    )
    .await;

    for (voter, option) in [("u1", &no), ("u2", &yes), ("u1", &yes)] {
        let (status, _) = send(
            &app,
            "POST",
            &format!("/api/votes/{vote_id}/cast"),
            Some(voter),
            Some(json!({ "optionId": option })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, detail) = send(&app, "GET", &format!("/api/votes/{vote_id}"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    let ballots = detail["data"]["ballots"].as_array().unwrap();
    assert_eq!(ballots.len(), 2);
    for ballot in ballots {
        assert!(ballot["userId"].is_null());
        assert!(ballot["userName"].is_null());
        assert!(ballot["id"].is_null());
        assert!(ballot["castAt"].is_null());
        assert!(ballot["revision"].is_null());
    }

    let (status, actions) = send(&app, "GET", &format!("/api/votes/{vote_id}/actions"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    let ballot_actions: Vec<&Value> = actions["data"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|a| a["actionType"] == "vote_cast" || a["actionType"] == "vote_changed")
        .collect();
    assert_eq!(ballot_actions.len(), 3);
    for action in ballot_actions {
        let text = action.to_string();
        assert!(!text.contains(yes.as_str()), "{text}");
        assert!(!text.contains(no.as_str()), "{text}");
    }

    // The caller can still see their own choice
    let (status, mine) = send(&app, "GET", &format!("/api/votes/{vote_id}/ballot"), Some("u1"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(mine["data"]["ballot"]["optionId"], yes.as_str());
}

#[tokio::test]
async fn test_mutation_without_actor_is_unauthorized() {
    let app = create_test_router().await;

    let (status, _) = send(
        &app,
        "POST",
        "/api/votes",
        None,
        Some(json!({ "boardId": "board1", "title": "Approve minutes" })),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_unknown_vote_returns_404() {
    let app = create_test_router().await;

    let (status, body) = send(&app, "GET", "/api/votes/missing", None, None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "VOTE_NOT_FOUND");
}

#[tokio::test]
async fn test_duplicate_ballot_conflicts() {
    let app = create_test_router().await;
    let (vote_id, yes, no) = open_motion(&app, json!({ "votingMethod": "yes_no" })).await;
    let uri = format!("/api/votes/{vote_id}/cast");

    let (status, _) = send(&app, "POST", &uri, Some("u1"), Some(json!({ "optionId": yes }))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, "POST", &uri, Some("u1"), Some(json!({ "optionId": no }))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "ALREADY_VOTED");

    let (status, body) = send(&app, "POST", &uri, Some("u9"), Some(json!({ "optionId": yes }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "NOT_ELIGIBLE");

    let (status, mine) = send(&app, "GET", &format!("/api/votes/{vote_id}/ballot"), Some("u1"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(mine["data"]["ballot"]["optionId"], yes.as_str());
    assert_eq!(mine["data"]["historyCount"], 1);
}

#[tokio::test]
async fn test_configure_after_open_is_locked() {
    let app = create_test_router().await;
    let (vote_id, _, _) = open_motion(&app, json!({ "votingMethod": "yes_no" })).await;

    let (status, body) = send(
        &app,
        "PUT",
        &format!("/api/votes/{vote_id}/configure"),
        Some("chair"),
        Some(json!({ "votingMethod": "yes_no", "anonymous": true })),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONFIGURATION_LOCKED");
}

#[tokio::test]
async fn test_reopen_requires_reason() {
    let app = create_test_router().await;
    let (vote_id, yes, _) = open_motion(&app, json!({ "votingMethod": "yes_no" })).await;

    send(
        &app,
        "POST",
        &format!("/api/votes/{vote_id}/cast"),
        Some("u1"),
        Some(json!({ "optionId": yes })),
    )
    .await;
    let (status, _) = send(
        &app,
        "POST",
        &format!("/api/votes/{vote_id}/close"),
        Some("chair"),
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/votes/{vote_id}/reopen"),
        Some("chair"),
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "REASON_REQUIRED");

    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/votes/{vote_id}/reopen"),
        Some("chair"),
        Some(json!({ "reason": "Director 2 arrived late" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "open");
    assert_eq!(body["data"]["outcome"], "none");
}

#[tokio::test]
async fn test_delete_draft_vote() {
    let app = create_test_router().await;
    let (_, created) = send(
        &app,
        "POST",
        "/api/votes",
        Some("chair"),
        Some(json!({ "boardId": "board1", "title": "Withdrawn motion" })),
    )
    .await;
    let vote_id = created["data"]["id"].as_str().unwrap();

    let (status, _) = send(&app, "DELETE", &format!("/api/votes/{vote_id}"), Some("chair"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, "GET", &format!("/api/votes/{vote_id}"), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_open_without_roster_directory_fails() {
    let app = create_test_router().await;
    let (_, created) = send(
        &app,
        "POST",
        "/api/votes",
        Some("chair"),
        Some(json!({ "boardId": "board1", "title": "Approve minutes" })),
    )
    .await;
    let vote_id = created["data"]["id"].as_str().unwrap();
    send(
        &app,
        "PUT",
        &format!("/api/votes/{vote_id}/configure"),
        Some("chair"),
        Some(json!({ "votingMethod": "yes_no" })),
    )
    .await;

    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/votes/{vote_id}/open"),
        Some("chair"),
        Some(json!({})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["code"], "EXTERNAL_SERVICE_ERROR");
}

#[tokio::test]
async fn test_unknown_entity_type_is_bad_request() {
    let app = create_test_router().await;

    let (status, body) = send(&app, "GET", "/api/entities/meeting/m1/votes", None, None).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = create_test_router().await;

    let (status, body) = send(&app, "GET", "/api/metrics/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}
