//! Database integration tests.
//!
//! These tests require a running `PostgreSQL` instance.
//! Run with: `cargo test --test db_integration -- --ignored`
//!
//! Environment variables:
//!   `TEST_DB_HOST` (default: localhost)
//!   `TEST_DB_PORT` (default: 5433)
//!   `TEST_DB_USER` (default: `boardvote_test`)
//!   `TEST_DB_PASSWORD` (default: `boardvote_test`)
//!   `TEST_DB_NAME` (default: `boardvote_test`)

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use boardvote_common::AppError;
use boardvote_db::entities::{
    vote::{self, VoteOutcome, VoteStatus},
    vote_cast, vote_option,
};
use boardvote_db::repositories::{VoteCastRepository, VoteConfigurationRepository, VoteRepository};
use boardvote_db::test_utils::{TestDatabase, TestDbConfig};
use chrono::{SubsecRound, Utc};
use sea_orm::{DatabaseConnection, Set};

/// A connection to a freshly emptied test database.
async fn setup() -> Arc<DatabaseConnection> {
    let db = TestDatabase::new().await.expect("Failed to connect");
    db.cleanup().await.expect("Failed to clean up");
    Arc::new(db.conn)
}

async fn insert_vote(repo: &VoteRepository, id: &str, status: VoteStatus) -> vote::Model {
    let model = vote::ActiveModel {
        id: Set(id.to_string()),
        entity_type: Set(None),
        entity_id: Set(None),
        meeting_id: Set(None),
        board_id: Set("board1".to_string()),
        title: Set("Approve budget".to_string()),
        description: Set(None),
        status: Set(status),
        outcome: Set(VoteOutcome::None),
        created_by: Set("chair".to_string()),
        created_at: Set(Utc::now().trunc_subsecs(6).into()),
        opened_at: Set(None),
        closed_at: Set(None),
        updated_at: Set(None),
    };
    repo.create(repo.conn(), model).await.unwrap()
}

fn option(vote_id: &str, id: &str, order: i32) -> vote_option::Model {
    vote_option::Model {
        id: id.to_string(),
        vote_id: vote_id.to_string(),
        label: id.to_uppercase(),
        description: None,
        display_order: order,
        is_abstain: false,
    }
}

fn ballot(id: &str, user_id: &str, revision: i32, sequence: i64) -> vote_cast::Model {
    vote_cast::Model {
        id: id.to_string(),
        vote_id: "vote1".to_string(),
        option_id: "yes".to_string(),
        user_id: user_id.to_string(),
        weight_applied: 1.0,
        revision,
        sequence,
        cast_at: Utc::now().trunc_subsecs(6).into(),
        ip_address: None,
        user_agent: None,
    }
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_database_connection() {
    let config = TestDbConfig::default();
    let result = TestDatabase::with_config(config).await;
    assert!(result.is_ok(), "Failed to connect: {:?}", result.err());
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_ledger_unique_indexes_reject_duplicates() {
    let conn = setup().await;
    let votes = VoteRepository::new(Arc::clone(&conn));
    let configurations = VoteConfigurationRepository::new(Arc::clone(&conn));
    let casts = VoteCastRepository::new(conn);

    insert_vote(&votes, "vote1", VoteStatus::Open).await;
    configurations
        .replace_options(configurations.conn(), "vote1", vec![option("vote1", "yes", 0)])
        .await
        .unwrap();

    casts.append(casts.conn(), ballot("c1", "u1", 0, 1)).await.unwrap();

    // Same voter and revision
    let duplicate = casts.append(casts.conn(), ballot("c2", "u1", 0, 2)).await;
    assert!(matches!(duplicate, Err(AppError::Conflict(_))));

    // Same ledger position
    let reordered = casts.append(casts.conn(), ballot("c3", "u2", 0, 1)).await;
    assert!(matches!(reordered, Err(AppError::Conflict(_))));

    let ledger = casts.find_by_vote(casts.conn(), "vote1").await.unwrap();
    assert_eq!(ledger.len(), 1);
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_status_transition_has_single_winner() {
    let votes = VoteRepository::new(setup().await);
    insert_vote(&votes, "vote1", VoteStatus::Open).await;

    let close = || vote::ActiveModel {
        status: Set(VoteStatus::Closed),
        ..Default::default()
    };
    let (first, second) = tokio::join!(
        votes.transition(votes.conn(), "vote1", &[VoteStatus::Open], close()),
        votes.transition(votes.conn(), "vote1", &[VoteStatus::Open], close()),
    );

    assert_ne!(first.unwrap(), second.unwrap());
    let vote = votes.get_by_id(votes.conn(), "vote1").await.unwrap();
    assert_eq!(vote.status, VoteStatus::Closed);
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_guarded_delete_skips_open_votes() {
    let votes = VoteRepository::new(setup().await);
    insert_vote(&votes, "draft1", VoteStatus::Draft).await;
    insert_vote(&votes, "open1", VoteStatus::Open).await;

    let deletable = [VoteStatus::Draft, VoteStatus::Configured];
    assert!(votes.delete(votes.conn(), "draft1", &deletable).await.unwrap());
    assert!(!votes.delete(votes.conn(), "open1", &deletable).await.unwrap());

    assert!(votes.find_by_id(votes.conn(), "draft1").await.unwrap().is_none());
    assert!(votes.find_by_id(votes.conn(), "open1").await.unwrap().is_some());
}

#[test]
fn test_config_from_env() {
    let config = TestDbConfig::default();
    assert!(!config.host.is_empty());
    assert!(config.port > 0);
    assert!(config.database_url().starts_with("postgres://"));
}
