//! Vote repository.

use std::sync::Arc;

use boardvote_common::{AppError, AppResult};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction,
    EntityTrait, QueryFilter, QueryOrder, TransactionTrait,
};

use super::db_err;
use crate::entities::{
    vote::{self, VoteEntityType, VoteStatus},
    Vote,
};

/// Repository for vote records.
#[derive(Clone)]
pub struct VoteRepository {
    db: Arc<DatabaseConnection>,
}

impl VoteRepository {
    /// Create a new vote repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// The shared connection, for reads outside a transaction.
    #[must_use]
    pub fn conn(&self) -> &DatabaseConnection {
        self.db.as_ref()
    }

    /// Start a transaction on the shared connection.
    pub async fn begin(&self) -> AppResult<DatabaseTransaction> {
        self.db.begin().await.map_err(db_err)
    }

    /// Find vote by ID.
    pub async fn find_by_id<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &str,
    ) -> AppResult<Option<vote::Model>> {
        Vote::find_by_id(id).one(conn).await.map_err(db_err)
    }

    /// Get vote by ID, failing with `VoteNotFound`.
    pub async fn get_by_id<C: ConnectionTrait>(&self, conn: &C, id: &str) -> AppResult<vote::Model> {
        self.find_by_id(conn, id)
            .await?
            .ok_or_else(|| AppError::VoteNotFound(id.to_string()))
    }

    /// Insert a new vote.
    pub async fn create<C: ConnectionTrait>(
        &self,
        conn: &C,
        model: vote::ActiveModel,
    ) -> AppResult<vote::Model> {
        model.insert(conn).await.map_err(db_err)
    }

    /// Update a vote unconditionally.
    pub async fn update<C: ConnectionTrait>(
        &self,
        conn: &C,
        model: vote::ActiveModel,
    ) -> AppResult<vote::Model> {
        model.update(conn).await.map_err(db_err)
    }

    /// Apply `changes` only if the vote is currently in one of `from`.
    ///
    /// Returns `false` when another writer moved the vote first; exactly one
    /// of several concurrent transitions out of the same status wins.
    pub async fn transition<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &str,
        from: &[VoteStatus],
        changes: vote::ActiveModel,
    ) -> AppResult<bool> {
        let result = Vote::update_many()
            .set(changes)
            .filter(vote::Column::Id.eq(id))
            .filter(vote::Column::Status.is_in(from.iter().copied()))
            .exec(conn)
            .await
            .map_err(db_err)?;

        Ok(result.rows_affected == 1)
    }

    /// Delete a vote if it is still in one of `from`. Configuration and
    /// options cascade; audit actions stay.
    pub async fn delete<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &str,
        from: &[VoteStatus],
    ) -> AppResult<bool> {
        let result = Vote::delete_many()
            .filter(vote::Column::Id.eq(id))
            .filter(vote::Column::Status.is_in(from.iter().copied()))
            .exec(conn)
            .await
            .map_err(db_err)?;

        Ok(result.rows_affected == 1)
    }

    /// Votes attached to a governance record, newest first.
    pub async fn find_by_entity<C: ConnectionTrait>(
        &self,
        conn: &C,
        entity_type: VoteEntityType,
        entity_id: &str,
    ) -> AppResult<Vec<vote::Model>> {
        Vote::find()
            .filter(vote::Column::EntityType.eq(entity_type))
            .filter(vote::Column::EntityId.eq(entity_id))
            .order_by_desc(vote::Column::CreatedAt)
            .order_by_desc(vote::Column::Id)
            .all(conn)
            .await
            .map_err(db_err)
    }

    /// Votes held in a meeting, newest first.
    pub async fn find_by_meeting<C: ConnectionTrait>(
        &self,
        conn: &C,
        meeting_id: &str,
    ) -> AppResult<Vec<vote::Model>> {
        Vote::find()
            .filter(vote::Column::MeetingId.eq(meeting_id))
            .order_by_desc(vote::Column::CreatedAt)
            .order_by_desc(vote::Column::Id)
            .all(conn)
            .await
            .map_err(db_err)
    }

    /// Votes of a board, optionally restricted to one status, newest first.
    pub async fn find_by_board<C: ConnectionTrait>(
        &self,
        conn: &C,
        board_id: &str,
        status: Option<VoteStatus>,
    ) -> AppResult<Vec<vote::Model>> {
        let mut query = Vote::find().filter(vote::Column::BoardId.eq(board_id));
        if let Some(status) = status {
            query = query.filter(vote::Column::Status.eq(status));
        }

        query
            .order_by_desc(vote::Column::CreatedAt)
            .order_by_desc(vote::Column::Id)
            .all(conn)
            .await
            .map_err(db_err)
    }

    /// All votes currently accepting ballots, oldest opening first.
    pub async fn find_open<C: ConnectionTrait>(&self, conn: &C) -> AppResult<Vec<vote::Model>> {
        Vote::find()
            .filter(vote::Column::Status.eq(VoteStatus::Open))
            .order_by_asc(vote::Column::OpenedAt)
            .all(conn)
            .await
            .map_err(db_err)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::entities::vote::VoteOutcome;
    use chrono::Utc;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult, Set};

    fn create_test_vote(id: &str, status: VoteStatus) -> vote::Model {
        vote::Model {
            id: id.to_string(),
            entity_type: Some(VoteEntityType::AgendaItem),
            entity_id: Some("item1".to_string()),
            meeting_id: Some("meeting1".to_string()),
            board_id: "board1".to_string(),
            title: "Approve budget".to_string(),
            description: None,
            status,
            outcome: VoteOutcome::None,
            created_by: "user1".to_string(),
            created_at: Utc::now().into(),
            opened_at: None,
            closed_at: None,
            updated_at: None,
        }
    }

    #[tokio::test]
    async fn test_get_by_id() {
        let vote = create_test_vote("vote1", VoteStatus::Draft);

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[vote.clone()]])
                .into_connection(),
        );

        let repo = VoteRepository::new(db);
        let result = repo.get_by_id(repo.conn(), "vote1").await.unwrap();

        assert_eq!(result.title, "Approve budget");
        assert_eq!(result.status, VoteStatus::Draft);
    }

    #[tokio::test]
    async fn test_get_by_id_not_found() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<vote::Model>::new()])
                .into_connection(),
        );

        let repo = VoteRepository::new(db);
        let result = repo.get_by_id(repo.conn(), "missing").await;

        assert!(matches!(result, Err(AppError::VoteNotFound(id)) if id == "missing"));
    }

    #[tokio::test]
    async fn test_transition_won() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                }])
                .into_connection(),
        );

        let repo = VoteRepository::new(db);
        let changes = vote::ActiveModel {
            status: Set(VoteStatus::Closed),
            ..Default::default()
        };
        let won = repo
            .transition(repo.conn(), "vote1", &[VoteStatus::Open], changes)
            .await
            .unwrap();

        assert!(won);
    }

    #[tokio::test]
    async fn test_transition_lost() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 0,
                }])
                .into_connection(),
        );

        let repo = VoteRepository::new(db);
        let changes = vote::ActiveModel {
            status: Set(VoteStatus::Closed),
            ..Default::default()
        };
        let won = repo
            .transition(repo.conn(), "vote1", &[VoteStatus::Open], changes)
            .await
            .unwrap();

        assert!(!won);
    }

    #[tokio::test]
    async fn test_find_by_board() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[
                    create_test_vote("vote2", VoteStatus::Open),
                    create_test_vote("vote1", VoteStatus::Open),
                ]])
                .into_connection(),
        );

        let repo = VoteRepository::new(db);
        let result = repo
            .find_by_board(repo.conn(), "board1", Some(VoteStatus::Open))
            .await
            .unwrap();

        assert_eq!(result.len(), 2);
        assert_eq!(result[0].id, "vote2");
    }
}
