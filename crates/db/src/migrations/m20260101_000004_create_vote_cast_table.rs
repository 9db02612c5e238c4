//! Create `vote_cast` table (ballot ledger).

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(VoteCast::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(VoteCast::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(VoteCast::VoteId).string_len(32).not_null())
                    .col(ColumnDef::new(VoteCast::OptionId).string_len(32).not_null())
                    .col(ColumnDef::new(VoteCast::UserId).string_len(64).not_null())
                    .col(ColumnDef::new(VoteCast::WeightApplied).double().not_null())
                    .col(
                        ColumnDef::new(VoteCast::Revision)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(VoteCast::Sequence).big_integer().not_null())
                    .col(
                        ColumnDef::new(VoteCast::CastAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(VoteCast::IpAddress).string_len(64))
                    .col(ColumnDef::new(VoteCast::UserAgent).text())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_vote_cast_vote")
                            .from(VoteCast::Table, VoteCast::VoteId)
                            .to(Vote::Table, Vote::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_vote_cast_option")
                            .from(VoteCast::Table, VoteCast::OptionId)
                            .to(VoteOption::Table, VoteOption::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        // A voter's n-th ballot can only be written once; concurrent
        // double-submits collide here.
        manager
            .create_index(
                Index::create()
                    .name("idx_vote_cast_vote_id_user_id_revision")
                    .table(VoteCast::Table)
                    .col(VoteCast::VoteId)
                    .col(VoteCast::UserId)
                    .col(VoteCast::Revision)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Append position within the vote
        manager
            .create_index(
                Index::create()
                    .name("idx_vote_cast_vote_id_sequence")
                    .table(VoteCast::Table)
                    .col(VoteCast::VoteId)
                    .col(VoteCast::Sequence)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Effective-ballot lookups
        manager
            .create_index(
                Index::create()
                    .name("idx_vote_cast_vote_id_user_id_cast_at")
                    .table(VoteCast::Table)
                    .col(VoteCast::VoteId)
                    .col(VoteCast::UserId)
                    .col(VoteCast::CastAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(VoteCast::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum VoteCast {
    Table,
    Id,
    VoteId,
    OptionId,
    UserId,
    WeightApplied,
    Revision,
    Sequence,
    CastAt,
    IpAddress,
    UserAgent,
}

#[derive(Iden)]
enum Vote {
    Table,
    Id,
}

#[derive(Iden)]
enum VoteOption {
    Table,
    Id,
}
