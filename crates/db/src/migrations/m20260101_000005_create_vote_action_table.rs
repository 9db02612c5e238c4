//! Create `vote_action` table (audit log).

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(VoteAction::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(VoteAction::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(VoteAction::VoteId).string_len(32).not_null())
                    .col(
                        ColumnDef::new(VoteAction::ActionType)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(VoteAction::PerformedBy)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(VoteAction::PerformedByName)
                            .string_len(256)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(VoteAction::Metadata)
                            .json_binary()
                            .not_null()
                            .default("{}"),
                    )
                    .col(ColumnDef::new(VoteAction::Sequence).big_integer().not_null())
                    .col(
                        ColumnDef::new(VoteAction::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Causal order within a vote's timeline
        manager
            .create_index(
                Index::create()
                    .name("idx_vote_action_vote_id_sequence")
                    .table(VoteAction::Table)
                    .col(VoteAction::VoteId)
                    .col(VoteAction::Sequence)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(VoteAction::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum VoteAction {
    Table,
    Id,
    VoteId,
    ActionType,
    PerformedBy,
    PerformedByName,
    Metadata,
    Sequence,
    CreatedAt,
}
