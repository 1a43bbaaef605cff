//! Create category member table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(CategoryMember::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CategoryMember::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(CategoryMember::CategoryId)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CategoryMember::UserId)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CategoryMember::Status)
                            .string_len(16)
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(CategoryMember::VoteCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(CategoryMember::CurrentRank).integer())
                    .col(ColumnDef::new(CategoryMember::PreviousRank).integer())
                    .col(
                        ColumnDef::new(CategoryMember::RankChange)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(CategoryMember::ApplicationReason)
                            .text()
                            .not_null(),
                    )
                    .col(ColumnDef::new(CategoryMember::ApprovedBy).string_len(32))
                    .col(ColumnDef::new(CategoryMember::ApprovedAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(CategoryMember::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(CategoryMember::UpdatedAt).timestamp_with_time_zone())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_category_member_category")
                            .from(CategoryMember::Table, CategoryMember::CategoryId)
                            .to(Category::Table, Category::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_category_member_user")
                            .from(CategoryMember::Table, CategoryMember::UserId)
                            .to(User::Table, User::Id),
                    )
                    .to_owned(),
            )
            .await?;

        // Unique index: (category_id, user_id) - one membership per user per category
        manager
            .create_index(
                Index::create()
                    .name("idx_category_member_category_user")
                    .table(CategoryMember::Table)
                    .col(CategoryMember::CategoryId)
                    .col(CategoryMember::UserId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Index: (category_id, status, vote_count) - leaderboard and ranking reads
        manager
            .create_index(
                Index::create()
                    .name("idx_category_member_leaderboard")
                    .table(CategoryMember::Table)
                    .col(CategoryMember::CategoryId)
                    .col(CategoryMember::Status)
                    .col(CategoryMember::VoteCount)
                    .to_owned(),
            )
            .await?;

        // Index: (user_id, status) - single-category lookups
        manager
            .create_index(
                Index::create()
                    .name("idx_category_member_user_status")
                    .table(CategoryMember::Table)
                    .col(CategoryMember::UserId)
                    .col(CategoryMember::Status)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(CategoryMember::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum CategoryMember {
    Table,
    Id,
    CategoryId,
    UserId,
    Status,
    VoteCount,
    CurrentRank,
    PreviousRank,
    RankChange,
    ApplicationReason,
    ApprovedBy,
    ApprovedAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum Category {
    Table,
    Id,
}

#[derive(Iden)]
enum User {
    Table,
    Id,
}
