//! Audit action entity. Insert-only; the canonical history of a vote.
//!
//! Actions have no foreign key to `vote` so the history of a deleted draft
//! is kept.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Kind of lifecycle event recorded in the audit log.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
pub enum VoteActionType {
    #[sea_orm(string_value = "created")]
    Created,
    #[sea_orm(string_value = "configured")]
    Configured,
    #[sea_orm(string_value = "opened")]
    Opened,
    #[sea_orm(string_value = "vote_cast")]
    VoteCast,
    #[sea_orm(string_value = "vote_changed")]
    VoteChanged,
    #[sea_orm(string_value = "closed")]
    Closed,
    #[sea_orm(string_value = "results_generated")]
    ResultsGenerated,
    #[sea_orm(string_value = "reopened")]
    Reopened,
    #[sea_orm(string_value = "archived")]
    Archived,
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "vote_action")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    #[sea_orm(indexed)]
    pub vote_id: String,

    pub action_type: VoteActionType,

    pub performed_by: String,

    pub performed_by_name: String,

    /// Action-specific details (reason, totals, option ids).
    #[sea_orm(column_type = "JsonBinary")]
    pub metadata: Json,

    /// Per-vote position; strictly increasing in causal order.
    pub sequence: i64,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
