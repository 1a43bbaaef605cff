//! Vote ledger primitives.
//!
//! Every write is conditional on the row still looking the way the caller
//! read it, so a concurrent change surfaces as a conflict instead of being
//! overwritten. Callers run these inside the transaction that also moves
//! the counters.

use chrono::Utc;
use rankx_common::{AppError, AppResult};
use rankx_db::{
    entities::{Vote, vote},
    is_unique_violation,
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
    sea_query::Expr,
};

/// Vote ledger writes and transactional reads.
#[derive(Debug, Clone, Copy, Default)]
pub struct VoteLedger;

impl VoteLedger {
    /// Record a first vote. A second vote for the same (voter, category)
    /// is rejected by the unique index and reported as `AlreadyVoted`.
    pub async fn insert<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: String,
        voter_id: &str,
        voted_for_id: &str,
        category_id: &str,
    ) -> AppResult<vote::Model> {
        let model = vote::ActiveModel {
            id: Set(id),
            voter_id: Set(voter_id.to_string()),
            voted_for_id: Set(voted_for_id.to_string()),
            category_id: Set(category_id.to_string()),
            created_at: Set(Utc::now().into()),
            updated_at: Set(None),
        };

        model.insert(conn).await.map_err(|e| {
            if is_unique_violation(&e) {
                AppError::AlreadyVoted
            } else {
                AppError::Database(e.to_string())
            }
        })
    }

    /// Point an existing vote at a new target.
    pub async fn repoint<C: ConnectionTrait>(
        &self,
        conn: &C,
        vote: &vote::Model,
        new_target_id: &str,
    ) -> AppResult<()> {
        let result = Vote::update_many()
            .col_expr(vote::Column::VotedForId, Expr::value(new_target_id))
            .col_expr(vote::Column::UpdatedAt, Expr::value(Utc::now().fixed_offset()))
            .filter(vote::Column::Id.eq(&vote.id))
            .filter(vote::Column::VotedForId.eq(&vote.voted_for_id))
            .exec(conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        if result.rows_affected == 0 {
            return Err(AppError::Conflict(
                "vote was changed by another request".to_string(),
            ));
        }
        Ok(())
    }

    /// Delete a vote, provided it still points where the caller saw it.
    pub async fn remove<C: ConnectionTrait>(&self, conn: &C, vote: &vote::Model) -> AppResult<()> {
        let result = Vote::delete_many()
            .filter(vote::Column::Id.eq(&vote.id))
            .filter(vote::Column::VotedForId.eq(&vote.voted_for_id))
            .exec(conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        if result.rows_affected == 0 {
            return Err(AppError::Conflict(
                "vote was changed by another request".to_string(),
            ));
        }
        Ok(())
    }

    /// The vote a user cast in a category.
    pub async fn cast_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        voter_id: &str,
        category_id: &str,
    ) -> AppResult<Option<vote::Model>> {
        Vote::find()
            .filter(vote::Column::VoterId.eq(voter_id))
            .filter(vote::Column::CategoryId.eq(category_id))
            .one(conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Votes a user received in a category.
    pub async fn received_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        voted_for_id: &str,
        category_id: &str,
    ) -> AppResult<Vec<vote::Model>> {
        Vote::find()
            .filter(vote::Column::VotedForId.eq(voted_for_id))
            .filter(vote::Column::CategoryId.eq(category_id))
            .order_by_asc(vote::Column::Id)
            .all(conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Every vote a user cast.
    pub async fn cast_by<C: ConnectionTrait>(
        &self,
        conn: &C,
        voter_id: &str,
    ) -> AppResult<Vec<vote::Model>> {
        Vote::find()
            .filter(vote::Column::VoterId.eq(voter_id))
            .order_by_asc(vote::Column::Id)
            .all(conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Every vote a user received.
    pub async fn received_by<C: ConnectionTrait>(
        &self,
        conn: &C,
        voted_for_id: &str,
    ) -> AppResult<Vec<vote::Model>> {
        Vote::find()
            .filter(vote::Column::VotedForId.eq(voted_for_id))
            .order_by_asc(vote::Column::Id)
            .all(conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    fn create_test_vote(voted_for_id: &str) -> vote::Model {
        vote::Model {
            id: "v1".to_string(),
            voter_id: "u1".to_string(),
            voted_for_id: voted_for_id.to_string(),
            category_id: "c1".to_string(),
            created_at: Utc::now().into(),
            updated_at: None,
        }
    }

    #[tokio::test]
    async fn test_repoint_conflict_when_vote_moved() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 0,
            }])
            .into_connection();

        let result = VoteLedger.repoint(&db, &create_test_vote("u2"), "u3").await;

        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_remove_succeeds_when_row_matches() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .into_connection();

        VoteLedger.remove(&db, &create_test_vote("u2")).await.unwrap();
    }
}
