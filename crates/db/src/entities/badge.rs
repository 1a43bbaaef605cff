//! Badge entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// What a badge is awarded for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum BadgeCriteria {
    #[sea_orm(string_value = "votes")]
    Votes,
    #[sea_orm(string_value = "rank")]
    Rank,
    #[sea_orm(string_value = "categories")]
    Categories,
    #[sea_orm(string_value = "engagement")]
    Engagement,
    #[sea_orm(string_value = "social")]
    Social,
    #[sea_orm(string_value = "special")]
    Special,
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "badge")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    #[sea_orm(unique)]
    pub slug: String,

    pub name: String,

    #[sea_orm(column_type = "Text")]
    pub description: String,

    pub icon: String,

    pub color: String,

    pub criteria_type: BadgeCriteria,

    #[sea_orm(default_value = 0)]
    pub criteria_value: i32,

    /// How many users hold this badge (denormalized)
    #[sea_orm(default_value = 0)]
    pub awarded_count: i32,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::user_badge::Entity")]
    Holders,
}

impl Related<super::user_badge::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Holders.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
