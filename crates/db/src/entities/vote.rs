//! Vote entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// "voter voted for `voted_for` in category".
///
/// `(voter_id, category_id)` is unique at the storage layer.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "vote")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    #[sea_orm(indexed)]
    pub voter_id: String,

    #[sea_orm(indexed)]
    pub voted_for_id: String,

    #[sea_orm(indexed)]
    pub category_id: String,

    pub created_at: DateTimeWithTimeZone,

    #[sea_orm(nullable)]
    pub updated_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::VoterId",
        to = "super::user::Column::Id"
    )]
    Voter,

    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::VotedForId",
        to = "super::user::Column::Id"
    )]
    VotedFor,

    #[sea_orm(
        belongs_to = "super::category::Entity",
        from = "Column::CategoryId",
        to = "super::category::Column::Id"
    )]
    Category,
}

impl Related<super::category::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Category.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
