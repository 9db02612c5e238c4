//! Vote configuration and option repository.

use std::sync::Arc;

use boardvote_common::AppResult;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    IntoActiveModel, QueryFilter, QueryOrder,
};

use super::db_err;
use crate::entities::{vote_configuration, vote_option, VoteConfiguration, VoteOption};

/// Repository for vote rules and the option set.
#[derive(Clone)]
pub struct VoteConfigurationRepository {
    db: Arc<DatabaseConnection>,
}

impl VoteConfigurationRepository {
    /// Create a new configuration repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// The shared connection, for reads outside a transaction.
    #[must_use]
    pub fn conn(&self) -> &DatabaseConnection {
        self.db.as_ref()
    }

    /// Find the configuration of a vote.
    pub async fn find_by_vote_id<C: ConnectionTrait>(
        &self,
        conn: &C,
        vote_id: &str,
    ) -> AppResult<Option<vote_configuration::Model>> {
        VoteConfiguration::find_by_id(vote_id)
            .one(conn)
            .await
            .map_err(db_err)
    }

    /// Find the configurations of several votes at once.
    pub async fn find_by_vote_ids<C: ConnectionTrait>(
        &self,
        conn: &C,
        vote_ids: &[String],
    ) -> AppResult<Vec<vote_configuration::Model>> {
        if vote_ids.is_empty() {
            return Ok(vec![]);
        }

        VoteConfiguration::find()
            .filter(vote_configuration::Column::VoteId.is_in(vote_ids.iter().cloned()))
            .all(conn)
            .await
            .map_err(db_err)
    }

    /// Store the configuration of a vote, replacing any earlier one.
    pub async fn replace<C: ConnectionTrait>(
        &self,
        conn: &C,
        config: vote_configuration::Model,
    ) -> AppResult<vote_configuration::Model> {
        VoteConfiguration::delete_by_id(config.vote_id.clone())
            .exec(conn)
            .await
            .map_err(db_err)?;

        config
            .into_active_model()
            .reset_all()
            .insert(conn)
            .await
            .map_err(db_err)
    }

    /// Options of a vote in display order.
    pub async fn find_options<C: ConnectionTrait>(
        &self,
        conn: &C,
        vote_id: &str,
    ) -> AppResult<Vec<vote_option::Model>> {
        VoteOption::find()
            .filter(vote_option::Column::VoteId.eq(vote_id))
            .order_by_asc(vote_option::Column::DisplayOrder)
            .order_by_asc(vote_option::Column::Id)
            .all(conn)
            .await
            .map_err(db_err)
    }

    /// Replace the full option set of a vote.
    pub async fn replace_options<C: ConnectionTrait>(
        &self,
        conn: &C,
        vote_id: &str,
        options: Vec<vote_option::Model>,
    ) -> AppResult<Vec<vote_option::Model>> {
        VoteOption::delete_many()
            .filter(vote_option::Column::VoteId.eq(vote_id))
            .exec(conn)
            .await
            .map_err(db_err)?;

        let mut inserted = Vec::with_capacity(options.len());
        for option in options {
            let model = option
                .into_active_model()
                .reset_all()
                .insert(conn)
                .await
                .map_err(db_err)?;
            inserted.push(model);
        }

        Ok(inserted)
    }
}
