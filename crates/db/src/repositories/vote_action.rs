//! Audit log repository. Insert and read only.

use std::sync::Arc;

use boardvote_common::AppResult;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde_json::Value;

use super::db_err;
use crate::entities::{
    vote_action::{self, VoteActionType},
    VoteAction,
};

/// Repository for vote audit actions.
#[derive(Clone)]
pub struct VoteActionRepository {
    db: Arc<DatabaseConnection>,
}

impl VoteActionRepository {
    /// Create a new audit repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// The shared connection, for reads outside a transaction.
    #[must_use]
    pub fn conn(&self) -> &DatabaseConnection {
        self.db.as_ref()
    }

    /// Append an action at the next sequence position of its vote.
    pub async fn append<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: String,
        vote_id: &str,
        action_type: VoteActionType,
        performed_by: &str,
        performed_by_name: &str,
        metadata: Value,
        at: DateTime<Utc>,
    ) -> AppResult<vote_action::Model> {
        let last = VoteAction::find()
            .filter(vote_action::Column::VoteId.eq(vote_id))
            .order_by_desc(vote_action::Column::Sequence)
            .one(conn)
            .await
            .map_err(db_err)?;
        let sequence = last.map_or(1, |a| a.sequence + 1);

        let model = vote_action::ActiveModel {
            id: Set(id),
            vote_id: Set(vote_id.to_string()),
            action_type: Set(action_type),
            performed_by: Set(performed_by.to_string()),
            performed_by_name: Set(performed_by_name.to_string()),
            metadata: Set(metadata),
            sequence: Set(sequence),
            created_at: Set(at.into()),
        };

        model.insert(conn).await.map_err(db_err)
    }

    /// The full timeline of a vote in causal order.
    pub async fn find_by_vote<C: ConnectionTrait>(
        &self,
        conn: &C,
        vote_id: &str,
    ) -> AppResult<Vec<vote_action::Model>> {
        VoteAction::find()
            .filter(vote_action::Column::VoteId.eq(vote_id))
            .order_by_asc(vote_action::Column::Sequence)
            .all(conn)
            .await
            .map_err(db_err)
    }

    /// Number of actions of one kind recorded for a vote.
    pub async fn count_by_type<C: ConnectionTrait>(
        &self,
        conn: &C,
        vote_id: &str,
        action_type: VoteActionType,
    ) -> AppResult<u64> {
        VoteAction::find()
            .filter(vote_action::Column::VoteId.eq(vote_id))
            .filter(vote_action::Column::ActionType.eq(action_type))
            .count(conn)
            .await
            .map_err(db_err)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase};
    use serde_json::json;

    fn create_test_action(sequence: i64, action_type: VoteActionType) -> vote_action::Model {
        vote_action::Model {
            id: format!("act-{sequence}"),
            vote_id: "vote1".to_string(),
            action_type,
            performed_by: "user1".to_string(),
            performed_by_name: "User One".to_string(),
            metadata: json!({}),
            sequence,
            created_at: Utc::now().into(),
        }
    }

    #[tokio::test]
    async fn test_append_takes_next_sequence() {
        let inserted = create_test_action(3, VoteActionType::Opened);

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[create_test_action(2, VoteActionType::Configured)]])
                .append_query_results([[inserted.clone()]])
                .into_connection(),
        );

        let repo = VoteActionRepository::new(db);
        let action = repo
            .append(
                repo.conn(),
                "act-3".to_string(),
                "vote1",
                VoteActionType::Opened,
                "user1",
                "User One",
                json!({}),
                Utc::now(),
            )
            .await
            .unwrap();

        assert_eq!(action.sequence, 3);
        assert_eq!(action.action_type, VoteActionType::Opened);
    }

    #[tokio::test]
    async fn test_find_by_vote() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[
                    create_test_action(1, VoteActionType::Created),
                    create_test_action(2, VoteActionType::Configured),
                ]])
                .into_connection(),
        );

        let repo = VoteActionRepository::new(db);
        let actions = repo.find_by_vote(repo.conn(), "vote1").await.unwrap();

        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0].action_type, VoteActionType::Created);
    }
}
