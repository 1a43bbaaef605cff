//! Category membership entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Participation state of a user in a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
#[derive(Default)]
pub enum MembershipStatus {
    #[sea_orm(string_value = "pending")]
    #[default]
    Pending,
    #[sea_orm(string_value = "approved")]
    Approved,
    #[sea_orm(string_value = "rejected")]
    Rejected,
}

impl MembershipStatus {
    /// Approved and pending memberships count towards the single-category rule.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Approved | Self::Pending)
    }

    /// Lowercase name, as stored.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

/// Membership of a user in a category.
///
/// `current_rank` is `None` unless `status` is approved.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "category_member")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    #[sea_orm(indexed)]
    pub category_id: String,

    #[sea_orm(indexed)]
    pub user_id: String,

    pub status: MembershipStatus,

    /// Votes received in this category (denormalized)
    #[sea_orm(default_value = 0)]
    pub vote_count: i32,

    #[sea_orm(nullable)]
    pub current_rank: Option<i32>,

    /// Value of `current_rank` before the most recent recompute
    #[sea_orm(nullable)]
    pub previous_rank: Option<i32>,

    /// `previous_rank - current_rank`; positive means the member moved up
    #[sea_orm(default_value = 0)]
    pub rank_change: i32,

    #[sea_orm(column_type = "Text")]
    pub application_reason: String,

    #[sea_orm(nullable)]
    pub approved_by: Option<String>,

    #[sea_orm(nullable)]
    pub approved_at: Option<DateTimeWithTimeZone>,

    pub created_at: DateTimeWithTimeZone,

    #[sea_orm(nullable)]
    pub updated_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
    #[sea_orm(
        belongs_to = "super::category::Entity",
        from = "Column::CategoryId",
        to = "super::category::Column::Id"
    )]
    Category,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl Related<super::category::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Category.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
