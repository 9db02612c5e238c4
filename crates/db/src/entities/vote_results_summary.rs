//! Tally summary cache, one row per closed vote.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::vote::VoteOutcome;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "vote_results_summary")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub vote_id: String,

    pub total_eligible: i32,

    /// Distinct voters with an effective ballot, abstentions included.
    pub total_voted: i32,

    pub total_weight: f64,

    /// Absolute number of voters needed for quorum.
    pub quorum_required: i32,

    pub quorum_met: bool,

    pub threshold_percentage: f64,

    pub outcome: VoteOutcome,

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
