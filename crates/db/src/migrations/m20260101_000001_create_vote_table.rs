//! Create `vote` table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Vote::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Vote::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Vote::EntityType).string_len(16))
                    .col(ColumnDef::new(Vote::EntityId).string_len(64))
                    .col(ColumnDef::new(Vote::MeetingId).string_len(64))
                    .col(ColumnDef::new(Vote::BoardId).string_len(64).not_null())
                    .col(ColumnDef::new(Vote::Title).string_len(256).not_null())
                    .col(ColumnDef::new(Vote::Description).text())
                    .col(
                        ColumnDef::new(Vote::Status)
                            .string_len(16)
                            .not_null()
                            .default("draft"),
                    )
                    .col(
                        ColumnDef::new(Vote::Outcome)
                            .string_len(16)
                            .not_null()
                            .default("none"),
                    )
                    .col(ColumnDef::new(Vote::CreatedBy).string_len(64).not_null())
                    .col(
                        ColumnDef::new(Vote::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(Vote::OpenedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Vote::ClosedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Vote::UpdatedAt).timestamp_with_time_zone())
                    .to_owned(),
            )
            .await?;

        // Index for per-entity vote lists
        manager
            .create_index(
                Index::create()
                    .name("idx_vote_entity")
                    .table(Vote::Table)
                    .col(Vote::EntityType)
                    .col(Vote::EntityId)
                    .to_owned(),
            )
            .await?;

        // Index for per-meeting vote lists
        manager
            .create_index(
                Index::create()
                    .name("idx_vote_meeting_id")
                    .table(Vote::Table)
                    .col(Vote::MeetingId)
                    .to_owned(),
            )
            .await?;

        // Composite index for board listings filtered by status
        manager
            .create_index(
                Index::create()
                    .name("idx_vote_board_id_status")
                    .table(Vote::Table)
                    .col(Vote::BoardId)
                    .col(Vote::Status)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Vote::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Vote {
    Table,
    Id,
    EntityType,
    EntityId,
    MeetingId,
    BoardId,
    Title,
    Description,
    Status,
    Outcome,
    CreatedBy,
    CreatedAt,
    OpenedAt,
    ClosedAt,
    UpdatedAt,
}
