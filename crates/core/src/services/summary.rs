//! Read-side summaries shared by projections.

use rankx_db::entities::{category, user};
use serde::Serialize;

/// Public user fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserSummary {
    pub id: String,
    pub handle: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub followers_count: i32,
}

impl From<&user::Model> for UserSummary {
    fn from(user: &user::Model) -> Self {
        Self {
            id: user.id.clone(),
            handle: user.handle.clone(),
            display_name: user.display_name.clone(),
            avatar_url: user.avatar_url.clone(),
            followers_count: user.followers_count,
        }
    }
}

/// Public category fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategorySummary {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub icon: String,
    pub color: String,
}

impl From<&category::Model> for CategorySummary {
    fn from(category: &category::Model) -> Self {
        Self {
            id: category.id.clone(),
            name: category.name.clone(),
            slug: category.slug.clone(),
            icon: category.icon.clone(),
            color: category.color.clone(),
        }
    }
}
