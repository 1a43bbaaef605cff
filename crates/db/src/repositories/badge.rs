//! Badge repository.

use std::sync::Arc;

use crate::entities::{Badge, UserBadge, badge, user_badge};
use rankx_common::{AppError, AppResult};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, QuerySelect,
    sea_query::Expr,
};

/// Badge repository for database operations.
#[derive(Clone)]
pub struct BadgeRepository {
    db: Arc<DatabaseConnection>,
}

impl BadgeRepository {
    /// Create a new badge repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a badge by slug.
    pub async fn find_by_slug(&self, slug: &str) -> AppResult<Option<badge::Model>> {
        Badge::find()
            .filter(badge::Column::Slug.eq(slug))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// The whole catalog, ordered by criteria then threshold.
    pub async fn find_all(&self) -> AppResult<Vec<badge::Model>> {
        Badge::find()
            .order_by_asc(badge::Column::CriteriaType)
            .order_by_asc(badge::Column::CriteriaValue)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Badges earned by a user with their earn records, newest first.
    pub async fn find_earned_by_user(
        &self,
        user_id: &str,
    ) -> AppResult<Vec<(user_badge::Model, Option<badge::Model>)>> {
        UserBadge::find()
            .filter(user_badge::Column::UserId.eq(user_id))
            .order_by_desc(user_badge::Column::EarnedAt)
            .find_also_related(Badge)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Users holding the most badges, as `(user_id, badge_count)`.
    pub async fn count_by_user(&self, limit: u64) -> AppResult<Vec<(String, i64)>> {
        UserBadge::find()
            .select_only()
            .column(user_badge::Column::UserId)
            .column_as(Expr::col(user_badge::Column::Id).count(), "badge_count")
            .group_by(user_badge::Column::UserId)
            .order_by_desc(Expr::col(user_badge::Column::Id).count())
            .order_by_asc(user_badge::Column::UserId)
            .limit(limit)
            .into_tuple()
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::entities::badge::BadgeCriteria;
    use chrono::Utc;
    use sea_orm::{DatabaseBackend, MockDatabase};

    fn create_test_badge(slug: &str) -> badge::Model {
        badge::Model {
            id: format!("b-{slug}"),
            slug: slug.to_string(),
            name: slug.to_string(),
            description: String::new(),
            icon: "Award".to_string(),
            color: "#FFFFFF".to_string(),
            criteria_type: BadgeCriteria::Votes,
            criteria_value: 1,
            awarded_count: 0,
            created_at: Utc::now().into(),
        }
    }

    #[tokio::test]
    async fn test_find_by_slug() {
        let badge = create_test_badge("first-supporter");

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[badge]])
                .into_connection(),
        );

        let repo = BadgeRepository::new(db);
        let result = repo.find_by_slug("first-supporter").await.unwrap();

        assert_eq!(result.unwrap().criteria_type, BadgeCriteria::Votes);
    }

    #[tokio::test]
    async fn test_find_by_slug_missing() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<badge::Model>::new()])
                .into_connection(),
        );

        let repo = BadgeRepository::new(db);
        assert!(repo.find_by_slug("nope").await.unwrap().is_none());
    }
}
