//! Vote configuration entity: the rules a vote is decided under.
//!
//! Exactly one row per vote. The row is replaced wholesale while the vote is
//! `draft` or `configured` and never written again once the vote opens.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// How ballots are expressed.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum VotingMethod {
    #[sea_orm(string_value = "yes_no")]
    YesNo,
    #[sea_orm(string_value = "yes_no_abstain")]
    YesNoAbstain,
    #[sea_orm(string_value = "multiple_choice")]
    MultipleChoice,
    /// Reserved; ranked tallying is not computed.
    #[sea_orm(string_value = "ranked")]
    Ranked,
}

impl VotingMethod {
    /// Whether the vote decides a single motion (for/against).
    #[must_use]
    pub const fn is_motion(self) -> bool {
        matches!(self, Self::YesNo | Self::YesNoAbstain)
    }
}

/// Rule that sets the default pass threshold.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum PassingRule {
    #[sea_orm(string_value = "simple_majority")]
    SimpleMajority,
    #[sea_orm(string_value = "two_thirds")]
    TwoThirds,
    #[sea_orm(string_value = "three_quarters")]
    ThreeQuarters,
    #[sea_orm(string_value = "unanimous")]
    Unanimous,
}

impl PassingRule {
    /// Threshold percentage implied by the rule.
    #[must_use]
    pub const fn default_threshold(self) -> f64 {
        match self {
            Self::SimpleMajority => 50.0,
            Self::TwoThirds => 200.0 / 3.0,
            Self::ThreeQuarters => 75.0,
            Self::Unanimous => 100.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "vote_configuration")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub vote_id: String,

    pub voting_method: VotingMethod,

    pub quorum_required: bool,

    /// Share of eligible voters (0-100) that must take part.
    pub quorum_percentage: f64,

    pub passing_rule: PassingRule,

    /// Share of decisive weight (0-100) the winning option needs.
    pub pass_threshold_percentage: f64,

    /// Voter identities are hidden from ballot projections.
    pub anonymous: bool,

    pub allow_abstain: bool,

    pub allow_change_vote: bool,

    /// Advisory time limit in minutes; closing is left to the caller.
    #[sea_orm(nullable)]
    pub time_limit_minutes: Option<i32>,

    pub auto_close_when_all_voted: bool,

    pub updated_at: DateTimeWithTimeZone,
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
