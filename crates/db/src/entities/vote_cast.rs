//! Ballot entity. Insert-only.
//!
//! A changed vote is a new row with the next `revision`; the row with the
//! greatest `(cast_at, sequence)` per voter is that voter's effective ballot.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "vote_cast")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    #[sea_orm(indexed)]
    pub vote_id: String,

    pub option_id: String,

    /// Always the real voter; anonymity is applied in read projections.
    pub user_id: String,

    /// Weight copied from the eligibility snapshot at cast time.
    pub weight_applied: f64,

    /// 0 for the voter's first ballot, +1 per change.
    pub revision: i32,

    /// Per-vote append position.
    pub sequence: i64,

    pub cast_at: DateTimeWithTimeZone,

    #[sea_orm(nullable)]
    pub ip_address: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub user_agent: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::vote::Entity",
        from = "Column::VoteId",
        to = "super::vote::Column::Id",
        on_delete = "Restrict"
    )]
    Vote,
    #[sea_orm(
        belongs_to = "super::vote_option::Entity",
        from = "Column::OptionId",
        to = "super::vote_option::Column::Id",
        on_delete = "Restrict"
    )]
    VoteOption,
}

impl Related<super::vote::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Vote.def()
    }
}

impl Related<super::vote_option::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::VoteOption.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
