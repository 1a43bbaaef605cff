//! Category membership repository.

use std::sync::Arc;

use crate::entities::{
    Membership,
    membership::{self, MembershipStatus},
};
use rankx_common::{AppError, AppResult};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect,
};

/// Membership repository for database operations.
#[derive(Clone)]
pub struct MembershipRepository {
    db: Arc<DatabaseConnection>,
}

impl MembershipRepository {
    /// Create a new membership repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a membership by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<membership::Model>> {
        Membership::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Get a membership by ID, returning an error if not found.
    pub async fn get_by_id(&self, id: &str) -> AppResult<membership::Model> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::MembershipNotFound(id.to_string()))
    }

    /// Find the membership of a user in a category, in any status.
    pub async fn find_by_user_and_category(
        &self,
        user_id: &str,
        category_id: &str,
    ) -> AppResult<Option<membership::Model>> {
        Membership::find()
            .filter(membership::Column::UserId.eq(user_id))
            .filter(membership::Column::CategoryId.eq(category_id))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Approved or pending memberships of a user, oldest first.
    ///
    /// At most one at any settled point in time.
    pub async fn find_active_by_user(&self, user_id: &str) -> AppResult<Vec<membership::Model>> {
        Membership::find()
            .filter(membership::Column::UserId.eq(user_id))
            .filter(
                membership::Column::Status
                    .is_in([MembershipStatus::Approved, MembershipStatus::Pending]),
            )
            .order_by_asc(membership::Column::CreatedAt)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Memberships of a user with the given status.
    pub async fn find_by_user_and_status(
        &self,
        user_id: &str,
        status: MembershipStatus,
    ) -> AppResult<Vec<membership::Model>> {
        Membership::find()
            .filter(membership::Column::UserId.eq(user_id))
            .filter(membership::Column::Status.eq(status))
            .order_by_asc(membership::Column::CurrentRank)
            .order_by_asc(membership::Column::CreatedAt)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Approved memberships of the given users, for admin listings.
    pub async fn find_approved_by_users(
        &self,
        user_ids: &[String],
    ) -> AppResult<Vec<membership::Model>> {
        if user_ids.is_empty() {
            return Ok(vec![]);
        }

        Membership::find()
            .filter(membership::Column::UserId.is_in(user_ids.iter().cloned()))
            .filter(membership::Column::Status.eq(MembershipStatus::Approved))
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Approved members of a category in ranking order.
    ///
    /// Ordered by votes descending, then by join order so equal tallies
    /// have a stable sequence.
    pub async fn find_ranked(
        &self,
        category_id: &str,
        limit: Option<u64>,
    ) -> AppResult<Vec<membership::Model>> {
        Membership::find()
            .filter(membership::Column::CategoryId.eq(category_id))
            .filter(membership::Column::Status.eq(MembershipStatus::Approved))
            .order_by_desc(membership::Column::VoteCount)
            .order_by_asc(membership::Column::CreatedAt)
            .order_by_asc(membership::Column::Id)
            .limit(limit)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Memberships with the given status across all categories, newest first.
    pub async fn find_by_status(
        &self,
        status: MembershipStatus,
        limit: u64,
        offset: u64,
    ) -> AppResult<Vec<membership::Model>> {
        Membership::find()
            .filter(membership::Column::Status.eq(status))
            .order_by_desc(membership::Column::CreatedAt)
            .order_by_desc(membership::Column::Id)
            .offset(offset)
            .limit(limit)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Count memberships with the given status across all categories.
    pub async fn count_by_status(&self, status: MembershipStatus) -> AppResult<u64> {
        Membership::find()
            .filter(membership::Column::Status.eq(status))
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// 1-based approval order of a member within its category.
    ///
    /// Returns `None` for memberships that are not approved.
    pub async fn approval_position(&self, member: &membership::Model) -> AppResult<Option<u64>> {
        let Some(approved_at) = member.approved_at else {
            return Ok(None);
        };
        if member.status != MembershipStatus::Approved {
            return Ok(None);
        }

        let position = Membership::find()
            .filter(membership::Column::CategoryId.eq(&member.category_id))
            .filter(membership::Column::Status.eq(MembershipStatus::Approved))
            .filter(membership::Column::ApprovedAt.lte(approved_at))
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(Some(position))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sea_orm::{DatabaseBackend, MockDatabase};

    fn create_test_membership(
        id: &str,
        user_id: &str,
        status: MembershipStatus,
        vote_count: i32,
    ) -> membership::Model {
        membership::Model {
            id: id.to_string(),
            category_id: "c1".to_string(),
            user_id: user_id.to_string(),
            status,
            vote_count,
            current_rank: None,
            previous_rank: None,
            rank_change: 0,
            application_reason: "I have been writing Rust for years".to_string(),
            approved_by: None,
            approved_at: None,
            created_at: Utc::now().into(),
            updated_at: None,
        }
    }

    #[tokio::test]
    async fn test_get_by_id_not_found() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<membership::Model>::new()])
                .into_connection(),
        );

        let repo = MembershipRepository::new(db);
        let result = repo.get_by_id("m404").await;

        assert!(matches!(result, Err(AppError::MembershipNotFound(_))));
    }

    #[tokio::test]
    async fn test_find_active_by_user() {
        let m = create_test_membership("m1", "u1", MembershipStatus::Pending, 0);

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[m]])
                .into_connection(),
        );

        let repo = MembershipRepository::new(db);
        let result = repo.find_active_by_user("u1").await.unwrap();

        assert_eq!(result.len(), 1);
        assert!(result[0].status.is_active());
    }

    #[tokio::test]
    async fn test_find_ranked_keeps_store_order() {
        let m1 = create_test_membership("m1", "u1", MembershipStatus::Approved, 9);
        let m2 = create_test_membership("m2", "u2", MembershipStatus::Approved, 4);

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[m1, m2]])
                .into_connection(),
        );

        let repo = MembershipRepository::new(db);
        let result = repo.find_ranked("c1", Some(3)).await.unwrap();

        assert_eq!(result.len(), 2);
        assert_eq!(result[0].vote_count, 9);
        assert_eq!(result[1].vote_count, 4);
    }

    #[tokio::test]
    async fn test_find_approved_by_users_empty() {
        let db = Arc::new(MockDatabase::new(DatabaseBackend::Postgres).into_connection());

        let repo = MembershipRepository::new(db);
        assert!(repo.find_approved_by_users(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_count_by_status() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[maplit::btreemap! {
                    "num_items" => sea_orm::Value::BigInt(Some(7))
                }]])
                .into_connection(),
        );

        let repo = MembershipRepository::new(db);
        let count = repo
            .count_by_status(MembershipStatus::Pending)
            .await
            .unwrap();

        assert_eq!(count, 7);
    }

    #[tokio::test]
    async fn test_approval_position_skips_unapproved() {
        let db = Arc::new(MockDatabase::new(DatabaseBackend::Postgres).into_connection());
        let repo = MembershipRepository::new(db);

        let pending = create_test_membership("m1", "u1", MembershipStatus::Pending, 0);
        assert_eq!(repo.approval_position(&pending).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_approval_position() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[maplit::btreemap! {
                    "num_items" => sea_orm::Value::BigInt(Some(4))
                }]])
                .into_connection(),
        );
        let repo = MembershipRepository::new(db);

        let mut member = create_test_membership("m1", "u1", MembershipStatus::Approved, 0);
        member.approved_at = Some(Utc::now().into());
        assert_eq!(repo.approval_position(&member).await.unwrap(), Some(4));
    }
}
