//! Per-option tally cache. Rebuilt from the ledger on every close.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "vote_result")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub vote_id: String,

    #[sea_orm(primary_key, auto_increment = false)]
    pub option_id: String,

    pub total_weight: f64,

    pub vote_count: i32,

    /// Share of decisive weight; 0 for abstain options.
    pub percentage: f64,

    pub is_winner: bool,

    pub computed_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::vote::Entity",
        from = "Column::VoteId",
        to = "super::vote::Column::Id",
        on_delete = "Cascade"
    )]
    Vote,
}

impl Related<super::vote::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Vote.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
