//! Create `vote_result` and `vote_results_summary` tables (tally cache).

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(VoteResult::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(VoteResult::VoteId).string_len(32).not_null())
                    .col(
                        ColumnDef::new(VoteResult::OptionId)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(VoteResult::TotalWeight)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(VoteResult::VoteCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(VoteResult::Percentage)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(VoteResult::IsWinner)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(VoteResult::ComputedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .col(VoteResult::VoteId)
                            .col(VoteResult::OptionId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_vote_result_vote")
                            .from(VoteResult::Table, VoteResult::VoteId)
                            .to(Vote::Table, Vote::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(VoteResultsSummary::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(VoteResultsSummary::VoteId)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(VoteResultsSummary::TotalEligible)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(VoteResultsSummary::TotalVoted)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(VoteResultsSummary::TotalWeight)
                            .double()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(VoteResultsSummary::QuorumRequired)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(VoteResultsSummary::QuorumMet)
                            .boolean()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(VoteResultsSummary::ThresholdPercentage)
                            .double()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(VoteResultsSummary::Outcome)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(VoteResultsSummary::ComputedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_vote_results_summary_vote")
                            .from(VoteResultsSummary::Table, VoteResultsSummary::VoteId)
                            .to(Vote::Table, Vote::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(VoteResultsSummary::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(VoteResult::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum VoteResult {
    Table,
    VoteId,
    OptionId,
    TotalWeight,
    VoteCount,
    Percentage,
    IsWinner,
    ComputedAt,
}

#[derive(Iden)]
enum VoteResultsSummary {
    Table,
    VoteId,
    TotalEligible,
    TotalVoted,
    TotalWeight,
    QuorumRequired,
    QuorumMet,
    ThresholdPercentage,
    Outcome,
    ComputedAt,
}

#[derive(Iden)]
enum Vote {
    Table,
    Id,
}
