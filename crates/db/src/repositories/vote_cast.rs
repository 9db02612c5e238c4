//! Ballot ledger repository.

use std::sync::Arc;

use boardvote_common::AppResult;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    IntoActiveModel, QueryFilter, QueryOrder, QuerySelect,
};

use super::db_err;
use crate::entities::{vote_cast, VoteCast};

/// Repository for the append-only ballot ledger.
#[derive(Clone)]
pub struct VoteCastRepository {
    db: Arc<DatabaseConnection>,
}

impl VoteCastRepository {
    /// Create a new ballot repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// The shared connection, for reads outside a transaction.
    #[must_use]
    pub fn conn(&self) -> &DatabaseConnection {
        self.db.as_ref()
    }

    /// Append a ballot. A duplicate `(vote, user, revision)` or
    /// `(vote, sequence)` surfaces as `Conflict`.
    pub async fn append<C: ConnectionTrait>(
        &self,
        conn: &C,
        ballot: vote_cast::Model,
    ) -> AppResult<vote_cast::Model> {
        ballot
            .into_active_model()
            .reset_all()
            .insert(conn)
            .await
            .map_err(db_err)
    }

    /// Sequence number for the next ballot of a vote.
    pub async fn next_sequence<C: ConnectionTrait>(&self, conn: &C, vote_id: &str) -> AppResult<i64> {
        let last = VoteCast::find()
            .filter(vote_cast::Column::VoteId.eq(vote_id))
            .order_by_desc(vote_cast::Column::Sequence)
            .one(conn)
            .await
            .map_err(db_err)?;

        Ok(last.map_or(1, |b| b.sequence + 1))
    }

    /// All ballots of a vote in submission order.
    pub async fn find_by_vote<C: ConnectionTrait>(
        &self,
        conn: &C,
        vote_id: &str,
    ) -> AppResult<Vec<vote_cast::Model>> {
        VoteCast::find()
            .filter(vote_cast::Column::VoteId.eq(vote_id))
            .order_by_asc(vote_cast::Column::Sequence)
            .all(conn)
            .await
            .map_err(db_err)
    }

    /// One user's ballot history, oldest first.
    pub async fn find_by_user<C: ConnectionTrait>(
        &self,
        conn: &C,
        vote_id: &str,
        user_id: &str,
    ) -> AppResult<Vec<vote_cast::Model>> {
        VoteCast::find()
            .filter(vote_cast::Column::VoteId.eq(vote_id))
            .filter(vote_cast::Column::UserId.eq(user_id))
            .order_by_asc(vote_cast::Column::Revision)
            .all(conn)
            .await
            .map_err(db_err)
    }

    /// A user's most recent ballot.
    pub async fn find_latest_for_user<C: ConnectionTrait>(
        &self,
        conn: &C,
        vote_id: &str,
        user_id: &str,
    ) -> AppResult<Option<vote_cast::Model>> {
        VoteCast::find()
            .filter(vote_cast::Column::VoteId.eq(vote_id))
            .filter(vote_cast::Column::UserId.eq(user_id))
            .order_by_desc(vote_cast::Column::Revision)
            .one(conn)
            .await
            .map_err(db_err)
    }

    /// Distinct users with at least one ballot.
    pub async fn find_voter_ids<C: ConnectionTrait>(
        &self,
        conn: &C,
        vote_id: &str,
    ) -> AppResult<Vec<String>> {
        VoteCast::find()
            .select_only()
            .column(vote_cast::Column::UserId)
            .distinct()
            .filter(vote_cast::Column::VoteId.eq(vote_id))
            .into_tuple::<String>()
            .all(conn)
            .await
            .map_err(db_err)
    }
}
