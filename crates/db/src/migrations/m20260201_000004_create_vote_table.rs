//! Create vote table migration.

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
                    .col(ColumnDef::new(Vote::VoterId).string_len(32).not_null())
                    .col(ColumnDef::new(Vote::VotedForId).string_len(32).not_null())
                    .col(ColumnDef::new(Vote::CategoryId).string_len(32).not_null())
                    .col(
                        ColumnDef::new(Vote::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(Vote::UpdatedAt).timestamp_with_time_zone())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_vote_voter")
                            .from(Vote::Table, Vote::VoterId)
                            .to(User::Table, User::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_vote_voted_for")
                            .from(Vote::Table, Vote::VotedForId)
                            .to(User::Table, User::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_vote_category")
                            .from(Vote::Table, Vote::CategoryId)
                            .to(Category::Table, Category::Id),
                    )
                    .to_owned(),
            )
            .await?;

        // Unique index: (voter_id, category_id) - one vote per voter per category
        manager
            .create_index(
                Index::create()
                    .name("idx_vote_voter_category")
                    .table(Vote::Table)
                    .col(Vote::VoterId)
                    .col(Vote::CategoryId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Index: (voted_for_id, category_id) - votes received
        manager
            .create_index(
                Index::create()
                    .name("idx_vote_voted_for_category")
                    .table(Vote::Table)
                    .col(Vote::VotedForId)
                    .col(Vote::CategoryId)
                    .to_owned(),
            )
            .await?;

        // Index: category_id (for totals and reconciliation)
        manager
            .create_index(
                Index::create()
                    .name("idx_vote_category_id")
                    .table(Vote::Table)
                    .col(Vote::CategoryId)
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
    VoterId,
    VotedForId,
    CategoryId,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum User {
    Table,
    Id,
}

#[derive(Iden)]
enum Category {
    Table,
    Id,
}
