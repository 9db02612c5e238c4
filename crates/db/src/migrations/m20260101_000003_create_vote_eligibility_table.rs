//! Create `vote_eligibility` table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(VoteEligibility::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(VoteEligibility::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(VoteEligibility::VoteId)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(VoteEligibility::UserId)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(VoteEligibility::UserName)
                            .string_len(256)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(VoteEligibility::UserRole)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(VoteEligibility::Weight)
                            .double()
                            .not_null()
                            .default(1.0),
                    )
                    .col(
                        ColumnDef::new(VoteEligibility::Eligible)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(VoteEligibility::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_vote_eligibility_vote")
                            .from(VoteEligibility::Table, VoteEligibility::VoteId)
                            .to(Vote::Table, Vote::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // One snapshot row per voter per vote
        manager
            .create_index(
                Index::create()
                    .name("idx_vote_eligibility_vote_id_user_id")
                    .table(VoteEligibility::Table)
                    .col(VoteEligibility::VoteId)
                    .col(VoteEligibility::UserId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(VoteEligibility::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum VoteEligibility {
    Table,
    Id,
    VoteId,
    UserId,
    UserName,
    UserRole,
    Weight,
    Eligible,
    CreatedAt,
}

#[derive(Iden)]
enum Vote {
    Table,
    Id,
}
