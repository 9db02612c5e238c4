//! Tally cache repository.

use std::sync::Arc;

use boardvote_common::AppResult;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    IntoActiveModel, QueryFilter, QueryOrder,
};

use super::db_err;
use crate::entities::{vote_result, vote_results_summary, VoteResult, VoteResultsSummary};

/// Repository for the cached tally of closed votes.
///
/// The cache is a projection of ballots and eligibility; it is only ever
/// replaced as a whole.
#[derive(Clone)]
pub struct VoteResultRepository {
    db: Arc<DatabaseConnection>,
}

impl VoteResultRepository {
    /// Create a new result repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// The shared connection, for reads outside a transaction.
    #[must_use]
    pub fn conn(&self) -> &DatabaseConnection {
        self.db.as_ref()
    }

    /// Replace the per-option rows and the summary of a vote.
    pub async fn replace<C: ConnectionTrait>(
        &self,
        conn: &C,
        vote_id: &str,
        rows: Vec<vote_result::Model>,
        summary: vote_results_summary::Model,
    ) -> AppResult<()> {
        VoteResult::delete_many()
            .filter(vote_result::Column::VoteId.eq(vote_id))
            .exec(conn)
            .await
            .map_err(db_err)?;
        VoteResultsSummary::delete_by_id(vote_id)
            .exec(conn)
            .await
            .map_err(db_err)?;

        for row in rows {
            row.into_active_model()
                .reset_all()
                .insert(conn)
                .await
                .map_err(db_err)?;
        }
        summary
            .into_active_model()
            .reset_all()
            .insert(conn)
            .await
            .map_err(db_err)?;

        Ok(())
    }

    /// Cached per-option rows.
    pub async fn find_rows<C: ConnectionTrait>(
        &self,
        conn: &C,
        vote_id: &str,
    ) -> AppResult<Vec<vote_result::Model>> {
        VoteResult::find()
            .filter(vote_result::Column::VoteId.eq(vote_id))
            .order_by_asc(vote_result::Column::OptionId)
            .all(conn)
            .await
            .map_err(db_err)
    }

    /// Cached summary.
    pub async fn find_summary<C: ConnectionTrait>(
        &self,
        conn: &C,
        vote_id: &str,
    ) -> AppResult<Option<vote_results_summary::Model>> {
        VoteResultsSummary::find_by_id(vote_id)
            .one(conn)
            .await
            .map_err(db_err)
    }
}
