//! Vote entity: one voting instance and its lifecycle state.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Lifecycle status of a vote.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum VoteStatus {
    /// Created, rules not yet set.
    #[sea_orm(string_value = "draft")]
    Draft,
    /// Rules and options set; may still be reconfigured.
    #[sea_orm(string_value = "configured")]
    Configured,
    /// Accepting ballots.
    #[sea_orm(string_value = "open")]
    Open,
    /// Tallied; may be reopened or archived.
    #[sea_orm(string_value = "closed")]
    Closed,
    /// Terminal.
    #[sea_orm(string_value = "archived")]
    Archived,
}

impl VoteStatus {
    /// Whether configuration and options may still be replaced.
    #[must_use]
    pub const fn is_configurable(self) -> bool {
        matches!(self, Self::Draft | Self::Configured)
    }

    /// Whether an outcome may be recorded in this status.
    #[must_use]
    pub const fn has_outcome(self) -> bool {
        matches!(self, Self::Closed | Self::Archived)
    }

    /// Stable string form used in logs and error messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Configured => "configured",
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Archived => "archived",
        }
    }
}

impl std::fmt::Display for VoteStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final classification of a closed vote.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum VoteOutcome {
    #[sea_orm(string_value = "none")]
    None,
    #[sea_orm(string_value = "passed")]
    Passed,
    #[sea_orm(string_value = "failed")]
    Failed,
    #[sea_orm(string_value = "invalid")]
    Invalid,
}

impl VoteOutcome {
    /// Stable string form used in logs and audit metadata.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Invalid => "invalid",
        }
    }
}

/// Kind of governance record a vote is attached to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum VoteEntityType {
    #[sea_orm(string_value = "agenda")]
    Agenda,
    #[sea_orm(string_value = "agenda_item")]
    AgendaItem,
    #[sea_orm(string_value = "minutes")]
    Minutes,
    #[sea_orm(string_value = "action_item")]
    ActionItem,
    #[sea_orm(string_value = "resolution")]
    Resolution,
}

impl std::str::FromStr for VoteEntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "agenda" => Ok(Self::Agenda),
            "agenda_item" => Ok(Self::AgendaItem),
            "minutes" => Ok(Self::Minutes),
            "action_item" => Ok(Self::ActionItem),
            "resolution" => Ok(Self::Resolution),
            other => Err(format!("Unknown entity type: {other}")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "vote")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// Kind of record this vote decides on (agenda item, minutes, ...).
    #[sea_orm(nullable)]
    pub entity_type: Option<VoteEntityType>,

    /// Opaque id of the target record; never dereferenced here.
    #[sea_orm(nullable, indexed)]
    pub entity_id: Option<String>,

    #[sea_orm(nullable, indexed)]
    pub meeting_id: Option<String>,

    #[sea_orm(indexed)]
    pub board_id: String,

    pub title: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,

    pub status: VoteStatus,

    /// `none` unless the vote is closed or archived.
    pub outcome: VoteOutcome,

    pub created_by: String,

    pub created_at: DateTimeWithTimeZone,

    #[sea_orm(nullable)]
    pub opened_at: Option<DateTimeWithTimeZone>,

    #[sea_orm(nullable)]
    pub closed_at: Option<DateTimeWithTimeZone>,

    #[sea_orm(nullable)]
    pub updated_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_one = "super::vote_configuration::Entity")]
    Configuration,
    #[sea_orm(has_many = "super::vote_option::Entity")]
    Options,
    #[sea_orm(has_many = "super::vote_eligibility::Entity")]
    Eligibility,
    #[sea_orm(has_many = "super::vote_cast::Entity")]
    Casts,
}

impl Related<super::vote_configuration::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Configuration.def()
    }
}

impl Related<super::vote_option::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Options.def()
    }
}

impl Related<super::vote_eligibility::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Eligibility.def()
    }
}

impl Related<super::vote_cast::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Casts.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configurable_statuses() {
        assert!(VoteStatus::Draft.is_configurable());
        assert!(VoteStatus::Configured.is_configurable());
        assert!(!VoteStatus::Open.is_configurable());
        assert!(!VoteStatus::Closed.is_configurable());
        assert!(!VoteStatus::Archived.is_configurable());
    }

    #[test]
    fn test_outcome_statuses() {
        assert!(!VoteStatus::Open.has_outcome());
        assert!(VoteStatus::Closed.has_outcome());
        assert!(VoteStatus::Archived.has_outcome());
    }

    #[test]
    fn test_entity_type_from_str() {
        assert_eq!(
            "agenda_item".parse::<VoteEntityType>(),
            Ok(VoteEntityType::AgendaItem)
        );
        assert!("meeting".parse::<VoteEntityType>().is_err());
    }
}
