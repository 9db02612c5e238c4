//! Create `vote_configuration` and `vote_option` tables.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(VoteConfiguration::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(VoteConfiguration::VoteId)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(VoteConfiguration::VotingMethod)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(VoteConfiguration::QuorumRequired)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(VoteConfiguration::QuorumPercentage)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(VoteConfiguration::PassingRule)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(VoteConfiguration::PassThresholdPercentage)
                            .double()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(VoteConfiguration::Anonymous)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(VoteConfiguration::AllowAbstain)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(VoteConfiguration::AllowChangeVote)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(VoteConfiguration::TimeLimitMinutes).integer())
                    .col(
                        ColumnDef::new(VoteConfiguration::AutoCloseWhenAllVoted)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(VoteConfiguration::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_vote_configuration_vote")
                            .from(VoteConfiguration::Table, VoteConfiguration::VoteId)
                            .to(Vote::Table, Vote::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(VoteOption::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(VoteOption::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(VoteOption::VoteId).string_len(32).not_null())
                    .col(ColumnDef::new(VoteOption::Label).string_len(256).not_null())
                    .col(ColumnDef::new(VoteOption::Description).text())
                    .col(
                        ColumnDef::new(VoteOption::DisplayOrder)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(VoteOption::IsAbstain)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_vote_option_vote")
                            .from(VoteOption::Table, VoteOption::VoteId)
                            .to(Vote::Table, Vote::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Options are always listed per vote in display order
        manager
            .create_index(
                Index::create()
                    .name("idx_vote_option_vote_id_display_order")
                    .table(VoteOption::Table)
                    .col(VoteOption::VoteId)
                    .col(VoteOption::DisplayOrder)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(VoteOption::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(VoteConfiguration::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum VoteConfiguration {
    Table,
    VoteId,
    VotingMethod,
    QuorumRequired,
    QuorumPercentage,
    PassingRule,
    PassThresholdPercentage,
    Anonymous,
    AllowAbstain,
    AllowChangeVote,
    TimeLimitMinutes,
    AutoCloseWhenAllVoted,
    UpdatedAt,
}

#[derive(Iden)]
enum VoteOption {
    Table,
    Id,
    VoteId,
    Label,
    Description,
    DisplayOrder,
    IsAbstain,
}

#[derive(Iden)]
enum Vote {
    Table,
    Id,
}
