//! Vote casting.

use std::sync::Arc;

use rankx_common::{AppError, AppResult, IdGenerator};
use rankx_db::{
    entities::membership::MembershipStatus,
    repositories::{CategoryRepository, MembershipRepository, UserRepository, VoteRepository},
};
use sea_orm::{DatabaseConnection, TransactionTrait};
use serde::Serialize;
use tracing::{info, warn};

use super::counters::CounterSynchronizer;
use super::jobs::JobSender;
use super::ledger::VoteLedger;
use super::ranking::RankingEngine;

/// What a cast did to the voter's vote in the category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteAction {
    /// First vote in the category.
    Voted,
    /// Existing vote moved to a new target.
    Changed,
    /// Voted again for the same target, which withdraws the vote.
    Removed,
}

/// Vote casting service.
#[derive(Clone)]
pub struct VotingService {
    db: Arc<DatabaseConnection>,
    user_repo: UserRepository,
    category_repo: CategoryRepository,
    membership_repo: MembershipRepository,
    vote_repo: VoteRepository,
    ledger: VoteLedger,
    counters: CounterSynchronizer,
    ranking: RankingEngine,
    jobs: Option<JobSender>,
    id_gen: IdGenerator,
}

impl VotingService {
    /// Create a new voting service.
    #[must_use]
    pub fn new(db: Arc<DatabaseConnection>, ranking: RankingEngine) -> Self {
        Self {
            user_repo: UserRepository::new(db.clone()),
            category_repo: CategoryRepository::new(db.clone()),
            membership_repo: MembershipRepository::new(db.clone()),
            vote_repo: VoteRepository::new(db.clone()),
            db,
            ledger: VoteLedger,
            counters: CounterSynchronizer,
            ranking,
            jobs: None,
            id_gen: IdGenerator::new(),
        }
    }

    /// Set the job sender used for badge checks.
    pub fn set_jobs(&mut self, jobs: JobSender) {
        self.jobs = Some(jobs);
    }

    /// Cast, change or withdraw a vote.
    ///
    /// The ledger write and its counter updates commit together. Ranking
    /// is recomputed after the commit; a failed recompute is retried in
    /// the background and does not fail the vote.
    pub async fn cast_vote(
        &self,
        voter_id: &str,
        category_id: &str,
        target_id: &str,
    ) -> AppResult<VoteAction> {
        if voter_id == target_id {
            return Err(AppError::SelfVote);
        }

        let category = self.category_repo.get_by_id(category_id).await?;
        if !category.is_active {
            return Err(AppError::CategoryInactive(category.slug));
        }

        self.user_repo.get_by_id(voter_id).await?;

        let eligible = self
            .membership_repo
            .find_by_user_and_category(target_id, category_id)
            .await?
            .is_some_and(|m| m.status == MembershipStatus::Approved);
        if !eligible {
            return Err(AppError::TargetNotEligible);
        }

        let existing = self
            .vote_repo
            .find_by_voter_and_category(voter_id, category_id)
            .await?;

        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let (action, previous_target) = match existing {
            None => {
                self.ledger
                    .insert(
                        &txn,
                        self.id_gen.generate(),
                        voter_id,
                        target_id,
                        category_id,
                    )
                    .await?;
                self.counters
                    .vote_added(&txn, target_id, category_id)
                    .await?;
                (VoteAction::Voted, None)
            }
            Some(vote) if vote.voted_for_id == target_id => {
                self.ledger.remove(&txn, &vote).await?;
                self.counters
                    .vote_removed(&txn, target_id, category_id)
                    .await?;
                (VoteAction::Removed, None)
            }
            Some(vote) => {
                self.ledger.repoint(&txn, &vote, target_id).await?;
                self.counters
                    .vote_removed(&txn, &vote.voted_for_id, category_id)
                    .await?;
                self.counters
                    .vote_added(&txn, target_id, category_id)
                    .await?;
                (VoteAction::Changed, Some(vote.voted_for_id))
            }
        };

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        info!(
            voter_id = %voter_id,
            target_id = %target_id,
            category_id = %category_id,
            action = ?action,
            "Vote recorded"
        );

        self.ranking.recalculate_or_retry(category_id).await;

        let mut badge_users = vec![voter_id.to_string(), target_id.to_string()];
        badge_users.extend(previous_target);
        self.enqueue_badge_checks(badge_users, category_id);

        Ok(action)
    }

    fn enqueue_badge_checks(&self, user_ids: Vec<String>, category_id: &str) {
        let Some(ref jobs) = self.jobs else {
            return;
        };
        for user_id in user_ids {
            if let Err(e) = jobs.check_badges(user_id, Some(category_id.to_string())) {
                warn!(error = %e, "Failed to enqueue badge check");
            }
        }
    }
}
