//! Create badge and user badge tables migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Badge::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Badge::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Badge::Slug)
                            .string_len(64)
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Badge::Name).string_len(128).not_null())
                    .col(ColumnDef::new(Badge::Description).text().not_null())
                    .col(
                        ColumnDef::new(Badge::Icon)
                            .string_len(64)
                            .not_null()
                            .default("Award"),
                    )
                    .col(
                        ColumnDef::new(Badge::Color)
                            .string_len(16)
                            .not_null()
                            .default("#FFFFFF"),
                    )
                    .col(ColumnDef::new(Badge::CriteriaType).string_len(16).not_null())
                    .col(
                        ColumnDef::new(Badge::CriteriaValue)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Badge::AwardedCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Badge::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(UserBadge::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(UserBadge::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(UserBadge::UserId).string_len(32).not_null())
                    .col(ColumnDef::new(UserBadge::BadgeId).string_len(32).not_null())
                    .col(
                        ColumnDef::new(UserBadge::EarnedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_user_badge_user")
                            .from(UserBadge::Table, UserBadge::UserId)
                            .to(User::Table, User::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_user_badge_badge")
                            .from(UserBadge::Table, UserBadge::BadgeId)
                            .to(Badge::Table, Badge::Id),
                    )
                    .to_owned(),
            )
            .await?;

        // Unique index: (user_id, badge_id) - each badge is earned once
        manager
            .create_index(
                Index::create()
                    .name("idx_user_badge_user_badge")
                    .table(UserBadge::Table)
                    .col(UserBadge::UserId)
                    .col(UserBadge::BadgeId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(UserBadge::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Badge::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Badge {
    Table,
    Id,
    Slug,
    Name,
    Description,
    Icon,
    Color,
    CriteriaType,
    CriteriaValue,
    AwardedCount,
    CreatedAt,
}

#[derive(Iden)]
enum UserBadge {
    Table,
    Id,
    UserId,
    BadgeId,
    EarnedAt,
}

#[derive(Iden)]
enum User {
    Table,
    Id,
}
