//! Counter synchronizer.
//!
//! The only writer of `category_member.vote_count`, `category.total_votes`,
//! `category.member_count` and `user.total_votes_received`. Every method
//! takes the connection of the transaction that also carries the ledger
//! write justifying the change.
//!
//! Increments and decrements are single `UPDATE ... SET x = x + 1`
//! statements. Decrements only match rows where the counter is positive;
//! a decrement that matches nothing is a synchronization bug and fails
//! the whole transaction with [`AppError::CounterSync`].

use std::collections::{BTreeSet, HashMap};

use rankx_common::{AppError, AppResult};
use rankx_db::entities::{
    Category, Membership, User, Vote, category,
    membership::{self, MembershipStatus},
    user, vote,
};
use sea_orm::{
    ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter, QuerySelect,
    sea_query::Expr,
};
use serde::Serialize;
use tracing::{error, info, warn};

use super::ledger::VoteLedger;

/// Result of forfeiting one membership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Forfeiture {
    pub membership_id: String,
    pub category_id: String,
    /// Whether the membership counted towards `member_count`.
    pub was_approved: bool,
    /// Received votes deleted with the membership.
    pub votes_lost: i32,
    /// Recipient of the vote the user had cast in the category, if any.
    pub withdrawn_vote_for: Option<String>,
}

/// A denormalized counter that disagrees with its source relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterKind {
    MembershipVoteCount,
    CategoryTotalVotes,
    CategoryMemberCount,
    UserVotesReceived,
}

/// One counter drift found by an audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CounterDrift {
    pub kind: CounterKind,
    /// Row id of the membership, category or user holding the counter.
    pub id: String,
    /// Category the counter belongs to, when there is one.
    pub category_id: Option<String>,
    pub stored: i32,
    pub actual: i32,
}

/// Outcome of a counter audit or reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub drifts: Vec<CounterDrift>,
    /// Votes whose target holds no approved membership in the category.
    /// Reported, never deleted.
    pub orphaned_votes: Vec<String>,
}

impl ReconcileReport {
    /// Whether every counter matched.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.drifts.is_empty()
    }

    /// Categories whose membership tallies changed and need re-ranking.
    #[must_use]
    pub fn categories_to_rerank(&self) -> BTreeSet<String> {
        self.drifts
            .iter()
            .filter(|d| d.kind == CounterKind::MembershipVoteCount)
            .filter_map(|d| d.category_id.clone())
            .collect()
    }
}

/// Coordinated counter updates.
#[derive(Debug, Clone, Copy, Default)]
pub struct CounterSynchronizer;

impl CounterSynchronizer {
    /// A vote for `target_id` in `category_id` was recorded.
    ///
    /// Fails with `TargetNotEligible` when the target no longer holds an
    /// approved membership, which rolls the vote back with it.
    pub async fn vote_added<C: ConnectionTrait>(
        &self,
        conn: &C,
        target_id: &str,
        category_id: &str,
    ) -> AppResult<()> {
        let result = Membership::update_many()
            .col_expr(
                membership::Column::VoteCount,
                Expr::col(membership::Column::VoteCount).add(1),
            )
            .filter(membership::Column::UserId.eq(target_id))
            .filter(membership::Column::CategoryId.eq(category_id))
            .filter(membership::Column::Status.eq(MembershipStatus::Approved))
            .exec(conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        if result.rows_affected == 0 {
            return Err(AppError::TargetNotEligible);
        }

        self.adjust_category_votes(conn, category_id, 1).await?;
        self.adjust_votes_received(conn, target_id, 1).await
    }

    /// A vote for `target_id` in `category_id` was deleted or repointed away.
    pub async fn vote_removed<C: ConnectionTrait>(
        &self,
        conn: &C,
        target_id: &str,
        category_id: &str,
    ) -> AppResult<()> {
        let result = Membership::update_many()
            .col_expr(
                membership::Column::VoteCount,
                Expr::col(membership::Column::VoteCount).sub(1),
            )
            .filter(membership::Column::UserId.eq(target_id))
            .filter(membership::Column::CategoryId.eq(category_id))
            .filter(membership::Column::VoteCount.gt(0))
            .exec(conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        if result.rows_affected == 0 {
            let has_membership = Membership::find()
                .filter(membership::Column::UserId.eq(target_id))
                .filter(membership::Column::CategoryId.eq(category_id))
                .count(conn)
                .await
                .map_err(|e| AppError::Database(e.to_string()))?
                > 0;

            if has_membership {
                return Err(sync_error(format!(
                    "vote_count of {target_id} in {category_id} would go negative"
                )));
            }
            warn!(
                target_id = %target_id,
                category_id = %category_id,
                "Removed vote targeted a user without a membership"
            );
        }

        self.adjust_category_votes(conn, category_id, -1).await?;
        self.adjust_votes_received(conn, target_id, -1).await
    }

    /// An approved membership was added to a category.
    pub async fn member_added<C: ConnectionTrait>(
        &self,
        conn: &C,
        category_id: &str,
    ) -> AppResult<()> {
        let result = Category::update_many()
            .col_expr(
                category::Column::MemberCount,
                Expr::col(category::Column::MemberCount).add(1),
            )
            .filter(category::Column::Id.eq(category_id))
            .exec(conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        if result.rows_affected == 0 {
            return Err(AppError::CategoryNotFound(category_id.to_string()));
        }
        Ok(())
    }

    /// An approved membership left a category.
    pub async fn member_removed<C: ConnectionTrait>(
        &self,
        conn: &C,
        category_id: &str,
    ) -> AppResult<()> {
        let result = Category::update_many()
            .col_expr(
                category::Column::MemberCount,
                Expr::col(category::Column::MemberCount).sub(1),
            )
            .filter(category::Column::Id.eq(category_id))
            .filter(category::Column::MemberCount.gt(0))
            .exec(conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        if result.rows_affected == 0 {
            return Err(sync_error(format!(
                "member_count of {category_id} would go negative"
            )));
        }
        Ok(())
    }

    /// Clear tally and rank history of a membership being reused.
    pub async fn reset_membership<C: ConnectionTrait>(
        &self,
        conn: &C,
        membership_id: &str,
    ) -> AppResult<()> {
        Membership::update_many()
            .col_expr(membership::Column::VoteCount, Expr::value(0))
            .col_expr(membership::Column::CurrentRank, Expr::value(Option::<i32>::None))
            .col_expr(membership::Column::PreviousRank, Expr::value(Option::<i32>::None))
            .col_expr(membership::Column::RankChange, Expr::value(0))
            .filter(membership::Column::Id.eq(membership_id))
            .exec(conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Forfeit a membership with every vote tied to it.
    ///
    /// Deletes the membership row, each vote the user received in the
    /// category and the vote the user cast there. Every deleted vote is
    /// reversed individually.
    pub async fn forfeit<C: ConnectionTrait>(
        &self,
        conn: &C,
        member: &membership::Model,
    ) -> AppResult<Forfeiture> {
        let result = Membership::delete_many()
            .filter(membership::Column::Id.eq(&member.id))
            .filter(membership::Column::Status.eq(member.status))
            .exec(conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        if result.rows_affected == 0 {
            return Err(AppError::Conflict(
                "membership was changed by another request".to_string(),
            ));
        }

        let was_approved = member.status == MembershipStatus::Approved;
        if was_approved {
            self.member_removed(conn, &member.category_id).await?;
        }

        let received = VoteLedger
            .received_in(conn, &member.user_id, &member.category_id)
            .await?;
        for vote in &received {
            VoteLedger.remove(conn, vote).await?;
            self.adjust_category_votes(conn, &member.category_id, -1)
                .await?;
            self.adjust_votes_received(conn, &member.user_id, -1)
                .await?;
        }

        let withdrawn_vote_for = match VoteLedger
            .cast_in(conn, &member.user_id, &member.category_id)
            .await?
        {
            Some(vote) => {
                VoteLedger.remove(conn, &vote).await?;
                self.vote_removed(conn, &vote.voted_for_id, &vote.category_id)
                    .await?;
                Some(vote.voted_for_id)
            }
            None => None,
        };

        info!(
            membership_id = %member.id,
            user_id = %member.user_id,
            category_id = %member.category_id,
            votes_lost = received.len(),
            "Membership forfeited"
        );

        Ok(Forfeiture {
            membership_id: member.id.clone(),
            category_id: member.category_id.clone(),
            was_approved,
            votes_lost: received.len() as i32,
            withdrawn_vote_for,
        })
    }

    /// Reverse a vote whose target user is being deleted.
    ///
    /// Only the category total moves; the target's own counters go away
    /// with the target.
    pub async fn drop_vote_for_deleted_target<C: ConnectionTrait>(
        &self,
        conn: &C,
        vote: &vote::Model,
    ) -> AppResult<()> {
        VoteLedger.remove(conn, vote).await?;
        self.adjust_category_votes(conn, &vote.category_id, -1)
            .await
    }

    /// Compare every counter against the source-of-truth relations.
    pub async fn audit<C: ConnectionTrait>(&self, conn: &C) -> AppResult<ReconcileReport> {
        let votes: Vec<(String, String, String)> = Vote::find()
            .select_only()
            .column(vote::Column::Id)
            .column(vote::Column::VotedForId)
            .column(vote::Column::CategoryId)
            .into_tuple()
            .all(conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let memberships = Membership::find()
            .all(conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let categories: Vec<(String, i32, i32)> = Category::find()
            .select_only()
            .column(category::Column::Id)
            .column(category::Column::TotalVotes)
            .column(category::Column::MemberCount)
            .into_tuple()
            .all(conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let users: Vec<(String, i32)> = User::find()
            .select_only()
            .column(user::Column::Id)
            .column(user::Column::TotalVotesReceived)
            .into_tuple()
            .all(conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let mut per_member: HashMap<(&str, &str), i32> = HashMap::new();
        let mut per_category: HashMap<&str, i32> = HashMap::new();
        let mut per_user: HashMap<&str, i32> = HashMap::new();
        for (_, target, category_id) in &votes {
            *per_member
                .entry((target.as_str(), category_id.as_str()))
                .or_default() += 1;
            *per_category.entry(category_id.as_str()).or_default() += 1;
            *per_user.entry(target.as_str()).or_default() += 1;
        }

        let mut approved_per_category: HashMap<&str, i32> = HashMap::new();
        for m in memberships
            .iter()
            .filter(|m| m.status == MembershipStatus::Approved)
        {
            *approved_per_category
                .entry(m.category_id.as_str())
                .or_default() += 1;
        }

        let mut report = ReconcileReport::default();

        for m in &memberships {
            let actual = per_member
                .get(&(m.user_id.as_str(), m.category_id.as_str()))
                .copied()
                .unwrap_or(0);
            if m.vote_count != actual {
                report.drifts.push(CounterDrift {
                    kind: CounterKind::MembershipVoteCount,
                    id: m.id.clone(),
                    category_id: Some(m.category_id.clone()),
                    stored: m.vote_count,
                    actual,
                });
            }
        }

        for (id, total_votes, member_count) in &categories {
            let actual_votes = per_category.get(id.as_str()).copied().unwrap_or(0);
            if *total_votes != actual_votes {
                report.drifts.push(CounterDrift {
                    kind: CounterKind::CategoryTotalVotes,
                    id: id.clone(),
                    category_id: Some(id.clone()),
                    stored: *total_votes,
                    actual: actual_votes,
                });
            }

            let actual_members = approved_per_category
                .get(id.as_str())
                .copied()
                .unwrap_or(0);
            if *member_count != actual_members {
                report.drifts.push(CounterDrift {
                    kind: CounterKind::CategoryMemberCount,
                    id: id.clone(),
                    category_id: Some(id.clone()),
                    stored: *member_count,
                    actual: actual_members,
                });
            }
        }

        for (id, total) in &users {
            let actual = per_user.get(id.as_str()).copied().unwrap_or(0);
            if *total != actual {
                report.drifts.push(CounterDrift {
                    kind: CounterKind::UserVotesReceived,
                    id: id.clone(),
                    category_id: None,
                    stored: *total,
                    actual,
                });
            }
        }

        let approved: BTreeSet<(&str, &str)> = memberships
            .iter()
            .filter(|m| m.status == MembershipStatus::Approved)
            .map(|m| (m.user_id.as_str(), m.category_id.as_str()))
            .collect();
        report.orphaned_votes = votes
            .iter()
            .filter(|(_, target, category_id)| {
                !approved.contains(&(target.as_str(), category_id.as_str()))
            })
            .map(|(id, _, _)| id.clone())
            .collect();

        Ok(report)
    }

    /// Audit, then correct every drifted counter.
    ///
    /// Drifts whose counter moved since the audit read it are left alone
    /// and dropped from the returned report; the next run sees them again.
    pub async fn reconcile<C: ConnectionTrait>(&self, conn: &C) -> AppResult<ReconcileReport> {
        let audit = self.audit(conn).await?;

        let mut corrected = Vec::with_capacity(audit.drifts.len());
        for drift in audit.drifts {
            if self.correct(conn, &drift).await? {
                warn!(
                    kind = ?drift.kind,
                    id = %drift.id,
                    stored = drift.stored,
                    actual = drift.actual,
                    "Corrected counter drift"
                );
                corrected.push(drift);
            } else {
                info!(
                    kind = ?drift.kind,
                    id = %drift.id,
                    "Counter changed during reconciliation, skipped"
                );
            }
        }

        if !audit.orphaned_votes.is_empty() {
            warn!(
                count = audit.orphaned_votes.len(),
                "Votes target users without an approved membership"
            );
        }

        Ok(ReconcileReport {
            drifts: corrected,
            orphaned_votes: audit.orphaned_votes,
        })
    }

    /// Set a drifted counter to its actual value, but only if it still
    /// holds the stored value the audit saw.
    ///
    /// Returns whether the row was updated.
    pub async fn correct<C: ConnectionTrait>(
        &self,
        conn: &C,
        drift: &CounterDrift,
    ) -> AppResult<bool> {
        let result = match drift.kind {
            CounterKind::MembershipVoteCount => {
                Membership::update_many()
                    .col_expr(membership::Column::VoteCount, Expr::value(drift.actual))
                    .filter(membership::Column::Id.eq(&drift.id))
                    .filter(membership::Column::VoteCount.eq(drift.stored))
                    .exec(conn)
                    .await
            }
            CounterKind::CategoryTotalVotes => {
                Category::update_many()
                    .col_expr(category::Column::TotalVotes, Expr::value(drift.actual))
                    .filter(category::Column::Id.eq(&drift.id))
                    .filter(category::Column::TotalVotes.eq(drift.stored))
                    .exec(conn)
                    .await
            }
            CounterKind::CategoryMemberCount => {
                Category::update_many()
                    .col_expr(category::Column::MemberCount, Expr::value(drift.actual))
                    .filter(category::Column::Id.eq(&drift.id))
                    .filter(category::Column::MemberCount.eq(drift.stored))
                    .exec(conn)
                    .await
            }
            CounterKind::UserVotesReceived => {
                User::update_many()
                    .col_expr(user::Column::TotalVotesReceived, Expr::value(drift.actual))
                    .filter(user::Column::Id.eq(&drift.id))
                    .filter(user::Column::TotalVotesReceived.eq(drift.stored))
                    .exec(conn)
                    .await
            }
        };

        let result = result.map_err(|e| AppError::Database(e.to_string()))?;
        Ok(result.rows_affected > 0)
    }

    async fn adjust_category_votes<C: ConnectionTrait>(
        &self,
        conn: &C,
        category_id: &str,
        delta: i32,
    ) -> AppResult<()> {
        let mut query = Category::update_many()
            .col_expr(
                category::Column::TotalVotes,
                Expr::col(category::Column::TotalVotes).add(delta),
            )
            .filter(category::Column::Id.eq(category_id));
        if delta < 0 {
            query = query.filter(category::Column::TotalVotes.gte(-delta));
        }

        let result = query
            .exec(conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        if result.rows_affected == 0 {
            return Err(sync_error(format!(
                "total_votes of {category_id} could not move by {delta}"
            )));
        }
        Ok(())
    }

    async fn adjust_votes_received<C: ConnectionTrait>(
        &self,
        conn: &C,
        user_id: &str,
        delta: i32,
    ) -> AppResult<()> {
        let mut query = User::update_many()
            .col_expr(
                user::Column::TotalVotesReceived,
                Expr::col(user::Column::TotalVotesReceived).add(delta),
            )
            .filter(user::Column::Id.eq(user_id));
        if delta < 0 {
            query = query.filter(user::Column::TotalVotesReceived.gte(-delta));
        }

        let result = query
            .exec(conn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        if result.rows_affected == 0 {
            return Err(sync_error(format!(
                "total_votes_received of {user_id} could not move by {delta}"
            )));
        }
        Ok(())
    }
}

fn sync_error(message: String) -> AppError {
    error!(reason = %message, "Counter synchronization failed");
    AppError::CounterSync(message)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult, Transaction};

    fn affected(rows_affected: u64) -> MockExecResult {
        MockExecResult {
            last_insert_id: 0,
            rows_affected,
        }
    }

    #[tokio::test]
    async fn test_correct_skips_counter_moved_since_audit() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([affected(0), affected(1)])
            .into_connection();
        let drift = CounterDrift {
            kind: CounterKind::MembershipVoteCount,
            id: "m1".to_string(),
            category_id: Some("c1".to_string()),
            stored: 4,
            actual: 3,
        };

        assert!(!CounterSynchronizer.correct(&db, &drift).await.unwrap());
        assert!(CounterSynchronizer.correct(&db, &drift).await.unwrap());

        let log = db.into_transaction_log();
        assert_eq!(log.len(), 2);
        assert_eq!(
            log[0],
            Transaction::from_sql_and_values(
                DatabaseBackend::Postgres,
                r#"UPDATE "category_member" SET "vote_count" = $1 WHERE "category_member"."id" = $2 AND "category_member"."vote_count" = $3"#,
                [3i32.into(), "m1".into(), 4i32.into()],
            )
        );
    }

    #[tokio::test]
    async fn test_vote_added_moves_three_counters() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([affected(1), affected(1), affected(1)])
            .into_connection();

        CounterSynchronizer
            .vote_added(&db, "target", "c1")
            .await
            .unwrap();

        assert_eq!(db.into_transaction_log().len(), 3);
    }

    #[tokio::test]
    async fn test_vote_added_requires_approved_membership() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([affected(0)])
            .into_connection();

        let result = CounterSynchronizer.vote_added(&db, "target", "c1").await;

        assert!(matches!(result, Err(AppError::TargetNotEligible)));
    }

    #[tokio::test]
    async fn test_member_removed_at_zero_is_sync_error() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([affected(0)])
            .into_connection();

        let result = CounterSynchronizer.member_removed(&db, "c1").await;

        assert!(matches!(result, Err(AppError::CounterSync(_))));
    }

    #[tokio::test]
    async fn test_vote_removed_underflow_is_sync_error() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([affected(0)])
            .append_query_results([[maplit::btreemap! {
                "num_items" => sea_orm::Value::BigInt(Some(1))
            }]])
            .into_connection();

        let result = CounterSynchronizer.vote_removed(&db, "target", "c1").await;

        assert!(matches!(result, Err(AppError::CounterSync(_))));
    }

    #[test]
    fn test_categories_to_rerank_only_follow_tallies() {
        let report = ReconcileReport {
            drifts: vec![
                CounterDrift {
                    kind: CounterKind::MembershipVoteCount,
                    id: "m1".to_string(),
                    category_id: Some("c1".to_string()),
                    stored: 3,
                    actual: 2,
                },
                CounterDrift {
                    kind: CounterKind::CategoryTotalVotes,
                    id: "c2".to_string(),
                    category_id: Some("c2".to_string()),
                    stored: 3,
                    actual: 2,
                },
            ],
            orphaned_votes: vec![],
        };

        let categories = report.categories_to_rerank();
        assert_eq!(categories.len(), 1);
        assert!(categories.contains("c1"));
        assert!(!report.is_clean());
    }
}
