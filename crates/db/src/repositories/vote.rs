//! Vote repository.

use std::sync::Arc;

use crate::entities::{Vote, vote};
use rankx_common::{AppError, AppResult};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect,
};

/// Vote repository. Reads only; the ledger writes votes inside transactions.
#[derive(Clone)]
pub struct VoteRepository {
    db: Arc<DatabaseConnection>,
}

impl VoteRepository {
    /// Create a new vote repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find the vote a voter holds in a category.
    pub async fn find_by_voter_and_category(
        &self,
        voter_id: &str,
        category_id: &str,
    ) -> AppResult<Option<vote::Model>> {
        Vote::find()
            .filter(vote::Column::VoterId.eq(voter_id))
            .filter(vote::Column::CategoryId.eq(category_id))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Votes cast by a user, newest first.
    pub async fn find_by_voter(&self, voter_id: &str) -> AppResult<Vec<vote::Model>> {
        Vote::find()
            .filter(vote::Column::VoterId.eq(voter_id))
            .order_by_desc(vote::Column::CreatedAt)
            .order_by_desc(vote::Column::Id)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Count votes cast by a user.
    pub async fn count_by_voter(&self, voter_id: &str) -> AppResult<u64> {
        Vote::find()
            .filter(vote::Column::VoterId.eq(voter_id))
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Count distinct users who voted for a user.
    pub async fn count_distinct_voters(&self, voted_for_id: &str) -> AppResult<u64> {
        Vote::find()
            .select_only()
            .column(vote::Column::VoterId)
            .distinct()
            .filter(vote::Column::VotedForId.eq(voted_for_id))
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Count all votes.
    pub async fn count(&self) -> AppResult<u64> {
        Vote::find()
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sea_orm::{DatabaseBackend, MockDatabase};

    fn create_test_vote(id: &str, voter_id: &str, voted_for_id: &str) -> vote::Model {
        vote::Model {
            id: id.to_string(),
            voter_id: voter_id.to_string(),
            voted_for_id: voted_for_id.to_string(),
            category_id: "c1".to_string(),
            created_at: Utc::now().into(),
            updated_at: None,
        }
    }

    #[tokio::test]
    async fn test_find_by_voter_and_category_found() {
        let vote = create_test_vote("v1", "u1", "u2");

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[vote]])
                .into_connection(),
        );

        let repo = VoteRepository::new(db);
        let result = repo.find_by_voter_and_category("u1", "c1").await.unwrap();

        assert_eq!(result.unwrap().voted_for_id, "u2");
    }

    #[tokio::test]
    async fn test_find_by_voter_and_category_none() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<vote::Model>::new()])
                .into_connection(),
        );

        let repo = VoteRepository::new(db);
        let result = repo.find_by_voter_and_category("u1", "c1").await.unwrap();

        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_count_distinct_voters() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[maplit::btreemap! {
                    "num_items" => sea_orm::Value::BigInt(Some(12))
                }]])
                .into_connection(),
        );

        let repo = VoteRepository::new(db);
        assert_eq!(repo.count_distinct_voters("u2").await.unwrap(), 12);
    }
}
