//! Ranking engine.
//!
//! Full recomputation of competition ranks (1, 1, 3, 4, 4, 6) for the
//! approved members of one category.

use std::sync::Arc;

use rankx_common::{AppError, AppResult};
use rankx_db::entities::{
    Membership,
    membership::{self, MembershipStatus},
};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, TransactionTrait,
    sea_query::Expr,
};
use tracing::{debug, error, warn};

use super::jobs::JobSender;

/// Competition ranks for vote counts sorted in descending order.
///
/// Equal counts share a rank; the next distinct count takes its 1-based
/// position.
#[must_use]
pub fn compute_competition_ranks(sorted_vote_counts: &[i32]) -> Vec<i32> {
    let mut ranks = Vec::with_capacity(sorted_vote_counts.len());
    for (i, count) in sorted_vote_counts.iter().enumerate() {
        let rank = match ranks.last() {
            Some(&prev_rank) if i > 0 && sorted_vote_counts[i - 1] == *count => prev_rank,
            _ => i as i32 + 1,
        };
        ranks.push(rank);
    }
    ranks
}

/// Rank columns after one recompute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankUpdate {
    pub previous_rank: Option<i32>,
    pub current_rank: i32,
    pub rank_change: i32,
}

impl RankUpdate {
    /// Shift `current` into `previous` and record the delta.
    ///
    /// A member without a previous rank shows no change.
    #[must_use]
    pub const fn next(current: Option<i32>, computed: i32) -> Self {
        let rank_change = match current {
            Some(previous) => previous - computed,
            None => 0,
        };
        Self {
            previous_rank: current,
            current_rank: computed,
            rank_change,
        }
    }
}

/// Recomputes and persists ranks.
#[derive(Clone)]
pub struct RankingEngine {
    db: Arc<DatabaseConnection>,
    jobs: Option<JobSender>,
}

impl RankingEngine {
    /// Create a ranking engine without retry support.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db, jobs: None }
    }

    /// Create a ranking engine that hands failed recomputes to the job queue.
    #[must_use]
    pub const fn with_jobs(db: Arc<DatabaseConnection>, jobs: JobSender) -> Self {
        Self {
            db,
            jobs: Some(jobs),
        }
    }

    /// Recompute every approved member's rank in a category.
    ///
    /// Idempotent: a second call with no vote changes in between writes
    /// the same ranks and a zero `rank_change` everywhere. Returns the
    /// number of ranked members.
    pub async fn recalculate(&self, category_id: &str) -> AppResult<usize> {
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let mut members = Membership::find()
            .filter(membership::Column::CategoryId.eq(category_id))
            .filter(membership::Column::Status.eq(MembershipStatus::Approved))
            .order_by_desc(membership::Column::VoteCount)
            .order_by_asc(membership::Column::CreatedAt)
            .order_by_asc(membership::Column::Id)
            .all(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        // Stable, so store order still breaks ties
        members.sort_by(|a, b| b.vote_count.cmp(&a.vote_count));

        let counts: Vec<i32> = members.iter().map(|m| m.vote_count).collect();
        let ranks = compute_competition_ranks(&counts);

        for (member, rank) in members.iter().zip(ranks) {
            let update = RankUpdate::next(member.current_rank, rank);
            Membership::update_many()
                .col_expr(
                    membership::Column::PreviousRank,
                    Expr::value(update.previous_rank),
                )
                .col_expr(
                    membership::Column::CurrentRank,
                    Expr::value(Some(update.current_rank)),
                )
                .col_expr(
                    membership::Column::RankChange,
                    Expr::value(update.rank_change),
                )
                .filter(membership::Column::Id.eq(&member.id))
                .exec(&txn)
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
        }

        // Only approved members carry a rank
        Membership::update_many()
            .col_expr(
                membership::Column::CurrentRank,
                Expr::value(Option::<i32>::None),
            )
            .filter(membership::Column::CategoryId.eq(category_id))
            .filter(membership::Column::Status.ne(MembershipStatus::Approved))
            .filter(membership::Column::CurrentRank.is_not_null())
            .exec(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        debug!(category_id = %category_id, members = members.len(), "Rankings recalculated");
        Ok(members.len())
    }

    /// Recompute after a committed change, without failing the caller.
    ///
    /// The committed vote is the source of truth, so a failed recompute is
    /// logged and queued for retry instead of propagated.
    pub async fn recalculate_or_retry(&self, category_id: &str) {
        let Err(e) = self.recalculate(category_id).await else {
            return;
        };

        warn!(category_id = %category_id, error = %e, "Ranking recompute failed");

        match self.jobs {
            Some(ref jobs) => {
                if let Err(qe) = jobs.retry_rankings(category_id.to_string(), 1) {
                    error!(
                        category_id = %category_id,
                        error = %qe,
                        "Failed to enqueue ranking retry"
                    );
                }
            }
            None => {
                error!(
                    category_id = %category_id,
                    "No job queue configured, ranking stays stale until the next recompute"
                );
            }
        }
    }
}
