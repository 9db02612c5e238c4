//! Vote eligibility repository.

use std::sync::Arc;

use boardvote_common::AppResult;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    IntoActiveModel, PaginatorTrait, QueryFilter, QueryOrder,
};

use super::db_err;
use crate::entities::{vote_eligibility, VoteEligibility};

/// Repository for the eligibility snapshot taken when a vote opens.
#[derive(Clone)]
pub struct VoteEligibilityRepository {
    db: Arc<DatabaseConnection>,
}

impl VoteEligibilityRepository {
    /// Create a new eligibility repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// The shared connection, for reads outside a transaction.
    #[must_use]
    pub fn conn(&self) -> &DatabaseConnection {
        self.db.as_ref()
    }

    /// Write the snapshot rows of a vote.
    pub async fn insert_snapshot<C: ConnectionTrait>(
        &self,
        conn: &C,
        entries: Vec<vote_eligibility::Model>,
    ) -> AppResult<()> {
        for entry in entries {
            entry
                .into_active_model()
                .reset_all()
                .insert(conn)
                .await
                .map_err(db_err)?;
        }
        Ok(())
    }

    /// Whether the vote already has a snapshot.
    pub async fn has_snapshot<C: ConnectionTrait>(&self, conn: &C, vote_id: &str) -> AppResult<bool> {
        let count = VoteEligibility::find()
            .filter(vote_eligibility::Column::VoteId.eq(vote_id))
            .count(conn)
            .await
            .map_err(db_err)?;
        Ok(count > 0)
    }

    /// The whole snapshot, ordered by user.
    pub async fn find_by_vote<C: ConnectionTrait>(
        &self,
        conn: &C,
        vote_id: &str,
    ) -> AppResult<Vec<vote_eligibility::Model>> {
        VoteEligibility::find()
            .filter(vote_eligibility::Column::VoteId.eq(vote_id))
            .order_by_asc(vote_eligibility::Column::UserId)
            .all(conn)
            .await
            .map_err(db_err)
    }

    /// The snapshot row of one user, if any.
    pub async fn find_for_user<C: ConnectionTrait>(
        &self,
        conn: &C,
        vote_id: &str,
        user_id: &str,
    ) -> AppResult<Option<vote_eligibility::Model>> {
        VoteEligibility::find()
            .filter(vote_eligibility::Column::VoteId.eq(vote_id))
            .filter(vote_eligibility::Column::UserId.eq(user_id))
            .one(conn)
            .await
            .map_err(db_err)
    }

    /// Number of users allowed to vote.
    pub async fn count_eligible<C: ConnectionTrait>(&self, conn: &C, vote_id: &str) -> AppResult<u64> {
        VoteEligibility::find()
            .filter(vote_eligibility::Column::VoteId.eq(vote_id))
            .filter(vote_eligibility::Column::Eligible.eq(true))
            .count(conn)
            .await
            .map_err(db_err)
    }
}
