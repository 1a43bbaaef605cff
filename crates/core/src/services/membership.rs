//! Membership lifecycle.
//!
//! `pending -> approved | rejected`, `rejected -> pending | approved` by
//! re-application, and `approved | pending -> [deleted]` by forfeiture.
//! A user holds at most one approved or pending membership. Every
//! transition runs in one transaction that first locks the user row, so
//! concurrent applications by the same user serialize.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use rankx_common::{AppError, AppResult, IdGenerator, MembershipConfig};
use rankx_db::{
    entities::{
        Category, Membership, User, category,
        membership::{self, MembershipStatus},
        user,
    },
    is_unique_violation,
    repositories::{CategoryRepository, MembershipRepository, UserRepository},
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseBackend, DatabaseConnection,
    DatabaseTransaction, EntityTrait, QueryFilter, QuerySelect, Set, TransactionTrait,
    sea_query::Expr,
};
use serde::Serialize;
use tracing::{info, warn};

use super::counters::{CounterSynchronizer, Forfeiture};
use super::jobs::JobSender;
use super::policy::{AutoApprovePolicy, FollowerThresholdPolicy};
use super::ranking::RankingEngine;
use super::summary::{CategorySummary, UserSummary};

/// A stored application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Application {
    pub membership: membership::Model,
    pub auto_approved: bool,
}

/// The membership a user would forfeit by switching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CurrentMembership {
    pub membership_id: String,
    pub category: CategorySummary,
    pub status: MembershipStatus,
    pub vote_count: i32,
    pub current_rank: Option<i32>,
}

/// Result of applying to a category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ApplyOutcome {
    /// The application was stored.
    Applied(Application),
    /// The user is active elsewhere and must confirm the switch first.
    ConfirmationRequired(CurrentMembership),
}

/// Result of a confirmed category switch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SwitchOutcome {
    pub application: Application,
    /// Received votes deleted with the forfeited membership.
    pub votes_lost: i32,
    pub forfeited: Vec<Forfeiture>,
}

/// An application with its applicant and category, for review lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplicationSummary {
    pub membership: membership::Model,
    pub user: UserSummary,
    pub category: CategorySummary,
}

/// Membership lifecycle service.
#[derive(Clone)]
pub struct MembershipService {
    db: Arc<DatabaseConnection>,
    user_repo: UserRepository,
    category_repo: CategoryRepository,
    membership_repo: MembershipRepository,
    counters: CounterSynchronizer,
    ranking: RankingEngine,
    policy: Arc<dyn AutoApprovePolicy>,
    config: MembershipConfig,
    jobs: Option<JobSender>,
    id_gen: IdGenerator,
}

impl MembershipService {
    /// Create a new membership service with the follower-threshold policy.
    #[must_use]
    pub fn new(
        db: Arc<DatabaseConnection>,
        ranking: RankingEngine,
        config: MembershipConfig,
    ) -> Self {
        let policy = Arc::new(FollowerThresholdPolicy::from_config(&config));
        Self::with_policy(db, ranking, config, policy)
    }

    /// Create a new membership service with a custom auto-approve policy.
    #[must_use]
    pub fn with_policy(
        db: Arc<DatabaseConnection>,
        ranking: RankingEngine,
        config: MembershipConfig,
        policy: Arc<dyn AutoApprovePolicy>,
    ) -> Self {
        Self {
            user_repo: UserRepository::new(db.clone()),
            category_repo: CategoryRepository::new(db.clone()),
            membership_repo: MembershipRepository::new(db.clone()),
            db,
            counters: CounterSynchronizer,
            ranking,
            policy,
            config,
            jobs: None,
            id_gen: IdGenerator::new(),
        }
    }

    /// Set the job sender used for badge checks.
    pub fn set_jobs(&mut self, jobs: JobSender) {
        self.jobs = Some(jobs);
    }

    /// Trim the reason and check its length in characters.
    pub fn validate_reason(&self, reason: &str) -> AppResult<String> {
        let reason = reason.trim();
        let len = reason.chars().count();
        let (min, max) = (self.config.reason_min_chars, self.config.reason_max_chars);

        if len < min || len > max {
            return Err(AppError::Validation(format!(
                "Application reason must be between {min} and {max} characters, got {len}"
            )));
        }
        Ok(reason.to_string())
    }

    /// Apply to a category.
    ///
    /// Returns [`ApplyOutcome::ConfirmationRequired`] instead of applying
    /// when the user is active in another category.
    pub async fn apply(
        &self,
        user_id: &str,
        category_slug: &str,
        reason: &str,
    ) -> AppResult<ApplyOutcome> {
        let reason = self.validate_reason(reason)?;
        self.user_repo.get_by_id(user_id).await?;
        let category = self.category_repo.get_by_slug(category_slug).await?;

        self.ensure_not_applied(user_id, &category.id).await?;

        let active = self.membership_repo.find_active_by_user(user_id).await?;
        if let Some(current) = active.iter().find(|m| m.category_id != category.id) {
            let current_category = self.category_repo.get_by_id(&current.category_id).await?;
            return Ok(ApplyOutcome::ConfirmationRequired(CurrentMembership {
                membership_id: current.id.clone(),
                category: CategorySummary::from(&current_category),
                status: current.status,
                vote_count: current.vote_count,
                current_rank: current.current_rank,
            }));
        }

        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let application = self.apply_in_txn(&txn, user_id, &category, reason).await?;

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        info!(
            user_id = %user_id,
            category_id = %category.id,
            status = application.membership.status.as_str(),
            "Application submitted"
        );

        self.after_apply(&application).await;
        Ok(ApplyOutcome::Applied(application))
    }

    /// Forfeit the current membership and apply to another category.
    ///
    /// Requires `confirmed`; forfeiture and the new application commit
    /// together.
    pub async fn confirm_switch(
        &self,
        user_id: &str,
        category_slug: &str,
        reason: &str,
        confirmed: bool,
    ) -> AppResult<SwitchOutcome> {
        if !confirmed {
            return Err(AppError::ConfirmationRequired);
        }

        let reason = self.validate_reason(reason)?;
        self.user_repo.get_by_id(user_id).await?;
        let category = self.category_repo.get_by_slug(category_slug).await?;

        self.ensure_not_applied(user_id, &category.id).await?;

        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        lock_user(&txn, user_id).await?;

        let active = Membership::find()
            .filter(membership::Column::UserId.eq(user_id))
            .filter(
                membership::Column::Status
                    .is_in([MembershipStatus::Approved, MembershipStatus::Pending]),
            )
            .all(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let mut forfeited = Vec::new();
        for current in active.iter().filter(|m| m.category_id != category.id) {
            forfeited.push(self.counters.forfeit(&txn, current).await?);
        }

        let application = self.apply_in_txn(&txn, user_id, &category, reason).await?;

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let votes_lost = forfeited.iter().map(|f| f.votes_lost).sum();

        info!(
            user_id = %user_id,
            category_id = %category.id,
            forfeited = forfeited.len(),
            votes_lost = votes_lost,
            "Category switched"
        );

        for f in &forfeited {
            self.ranking.recalculate_or_retry(&f.category_id).await;
            if let Some(ref recipient) = f.withdrawn_vote_for {
                self.enqueue_badge_check(recipient, Some(&f.category_id));
            }
        }
        self.after_apply(&application).await;

        Ok(SwitchOutcome {
            application,
            votes_lost,
            forfeited,
        })
    }

    /// Approve a pending application.
    pub async fn approve(&self, admin_id: &str, membership_id: &str) -> AppResult<membership::Model> {
        let member = self.load_for_review(admin_id, membership_id).await?;
        let now = Utc::now().fixed_offset();

        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let result = Membership::update_many()
            .col_expr(
                membership::Column::Status,
                Expr::value(MembershipStatus::Approved),
            )
            .col_expr(
                membership::Column::ApprovedBy,
                Expr::value(Some(admin_id.to_string())),
            )
            .col_expr(membership::Column::ApprovedAt, Expr::value(Some(now)))
            .col_expr(membership::Column::UpdatedAt, Expr::value(Some(now)))
            .filter(membership::Column::Id.eq(membership_id))
            .filter(membership::Column::Status.eq(MembershipStatus::Pending))
            .exec(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        if result.rows_affected == 0 {
            return Err(AppError::NotPending("reviewed".to_string()));
        }

        self.counters
            .member_added(&txn, &member.category_id)
            .await?;

        let approved = find_membership(&txn, membership_id).await?;

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        info!(
            membership_id = %membership_id,
            admin_id = %admin_id,
            user_id = %approved.user_id,
            "Application approved"
        );

        self.ranking
            .recalculate_or_retry(&approved.category_id)
            .await;
        self.enqueue_badge_check(&approved.user_id, Some(&approved.category_id));

        Ok(approved)
    }

    /// Reject a pending application. Counters are untouched.
    pub async fn reject(&self, admin_id: &str, membership_id: &str) -> AppResult<membership::Model> {
        self.load_for_review(admin_id, membership_id).await?;
        let now = Utc::now().fixed_offset();

        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let result = Membership::update_many()
            .col_expr(
                membership::Column::Status,
                Expr::value(MembershipStatus::Rejected),
            )
            .col_expr(membership::Column::UpdatedAt, Expr::value(Some(now)))
            .filter(membership::Column::Id.eq(membership_id))
            .filter(membership::Column::Status.eq(MembershipStatus::Pending))
            .exec(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        if result.rows_affected == 0 {
            return Err(AppError::NotPending("reviewed".to_string()));
        }

        let rejected = find_membership(&txn, membership_id).await?;

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        info!(
            membership_id = %membership_id,
            admin_id = %admin_id,
            "Application rejected"
        );
        Ok(rejected)
    }

    /// Applications with the given status, newest first.
    ///
    /// Rows whose user or category no longer exists are skipped.
    pub async fn list_applications(
        &self,
        status: MembershipStatus,
        limit: u64,
        offset: u64,
    ) -> AppResult<Vec<ApplicationSummary>> {
        let memberships = self
            .membership_repo
            .find_by_status(status, limit, offset)
            .await?;

        let user_ids: Vec<String> = memberships.iter().map(|m| m.user_id.clone()).collect();
        let category_ids: Vec<String> = memberships.iter().map(|m| m.category_id.clone()).collect();

        let users: HashMap<String, user::Model> = self
            .user_repo
            .find_by_ids(&user_ids)
            .await?
            .into_iter()
            .map(|u| (u.id.clone(), u))
            .collect();
        let categories: HashMap<String, category::Model> = self
            .category_repo
            .find_by_ids(&category_ids)
            .await?
            .into_iter()
            .map(|c| (c.id.clone(), c))
            .collect();

        let total = memberships.len();
        let summaries: Vec<ApplicationSummary> = memberships
            .into_iter()
            .filter_map(|m| {
                let user = users.get(&m.user_id)?;
                let category = categories.get(&m.category_id)?;
                Some(ApplicationSummary {
                    user: UserSummary::from(user),
                    category: CategorySummary::from(category),
                    membership: m,
                })
            })
            .collect();

        if summaries.len() < total {
            warn!(
                skipped = total - summaries.len(),
                "Skipped applications with missing user or category"
            );
        }
        Ok(summaries)
    }

    async fn ensure_not_applied(&self, user_id: &str, category_id: &str) -> AppResult<()> {
        if let Some(existing) = self
            .membership_repo
            .find_by_user_and_category(user_id, category_id)
            .await?
        {
            if existing.status.is_active() {
                return Err(AppError::DuplicateApplication(
                    existing.status.as_str().to_string(),
                ));
            }
        }
        Ok(())
    }

    async fn load_for_review(
        &self,
        admin_id: &str,
        membership_id: &str,
    ) -> AppResult<membership::Model> {
        let admin = self.user_repo.get_by_id(admin_id).await?;
        if !admin.is_admin {
            return Err(AppError::Forbidden(
                "Only admins can review applications".to_string(),
            ));
        }

        let member = self.membership_repo.get_by_id(membership_id).await?;
        if member.user_id == admin_id {
            return Err(AppError::SelfApproval);
        }
        if member.status != MembershipStatus::Pending {
            return Err(AppError::NotPending(member.status.as_str().to_string()));
        }
        Ok(member)
    }

    /// Store the application inside `txn`.
    ///
    /// Re-checks the single-category rule under the user lock, reactivates
    /// an inactive category and reuses a rejected row.
    async fn apply_in_txn(
        &self,
        txn: &DatabaseTransaction,
        user_id: &str,
        category: &category::Model,
        reason: String,
    ) -> AppResult<Application> {
        let user = lock_user(txn, user_id).await?;

        let active = Membership::find()
            .filter(membership::Column::UserId.eq(user_id))
            .filter(
                membership::Column::Status
                    .is_in([MembershipStatus::Approved, MembershipStatus::Pending]),
            )
            .all(txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        if let Some(m) = active.first() {
            return Err(if m.category_id == category.id {
                AppError::DuplicateApplication(m.status.as_str().to_string())
            } else {
                AppError::AlreadyInAnotherCategory(m.category_id.clone())
            });
        }

        let now = Utc::now().fixed_offset();

        if !category.is_active {
            Category::update_many()
                .col_expr(category::Column::IsActive, Expr::value(true))
                .col_expr(category::Column::UpdatedAt, Expr::value(Some(now)))
                .filter(category::Column::Id.eq(&category.id))
                .exec(txn)
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
            info!(category_id = %category.id, "Category reactivated");
        }

        let auto_approved = self.policy.should_auto_approve(&user);
        let status = if auto_approved {
            MembershipStatus::Approved
        } else {
            MembershipStatus::Pending
        };
        let approved_at = auto_approved.then_some(now);

        let existing = Membership::find()
            .filter(membership::Column::UserId.eq(user_id))
            .filter(membership::Column::CategoryId.eq(&category.id))
            .one(txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let membership = match existing {
            Some(previous) => {
                self.counters.reset_membership(txn, &previous.id).await?;

                let result = Membership::update_many()
                    .col_expr(membership::Column::Status, Expr::value(status))
                    .col_expr(membership::Column::ApplicationReason, Expr::value(reason))
                    .col_expr(
                        membership::Column::ApprovedBy,
                        Expr::value(Option::<String>::None),
                    )
                    .col_expr(membership::Column::ApprovedAt, Expr::value(approved_at))
                    .col_expr(membership::Column::CreatedAt, Expr::value(now))
                    .col_expr(membership::Column::UpdatedAt, Expr::value(Some(now)))
                    .filter(membership::Column::Id.eq(&previous.id))
                    .filter(membership::Column::Status.eq(MembershipStatus::Rejected))
                    .exec(txn)
                    .await
                    .map_err(|e| AppError::Database(e.to_string()))?;

                if result.rows_affected == 0 {
                    return Err(AppError::DuplicateApplication(
                        previous.status.as_str().to_string(),
                    ));
                }
                find_membership(txn, &previous.id).await?
            }
            None => {
                let model = membership::ActiveModel {
                    id: Set(self.id_gen.generate()),
                    category_id: Set(category.id.clone()),
                    user_id: Set(user_id.to_string()),
                    status: Set(status),
                    vote_count: Set(0),
                    current_rank: Set(None),
                    previous_rank: Set(None),
                    rank_change: Set(0),
                    application_reason: Set(reason),
                    approved_by: Set(None),
                    approved_at: Set(approved_at),
                    created_at: Set(now),
                    updated_at: Set(None),
                };
                model.insert(txn).await.map_err(|e| {
                    if is_unique_violation(&e) {
                        AppError::DuplicateApplication("pending".to_string())
                    } else {
                        AppError::Database(e.to_string())
                    }
                })?
            }
        };

        if auto_approved {
            self.counters.member_added(txn, &category.id).await?;
        }

        Ok(Application {
            membership,
            auto_approved,
        })
    }

    async fn after_apply(&self, application: &Application) {
        let m = &application.membership;
        if application.auto_approved {
            self.ranking.recalculate_or_retry(&m.category_id).await;
        }
        self.enqueue_badge_check(&m.user_id, Some(&m.category_id));
    }

    fn enqueue_badge_check(&self, user_id: &str, category_id: Option<&str>) {
        let Some(ref jobs) = self.jobs else {
            return;
        };
        if let Err(e) = jobs.check_badges(user_id.to_string(), category_id.map(String::from)) {
            warn!(user_id = %user_id, error = %e, "Failed to enqueue badge check");
        }
    }
}

/// Read the user row inside `txn`, locking it where the backend can.
pub(crate) async fn lock_user(txn: &DatabaseTransaction, user_id: &str) -> AppResult<user::Model> {
    let mut query = User::find_by_id(user_id);
    if txn.get_database_backend() != DatabaseBackend::Sqlite {
        query = query.lock_exclusive();
    }

    query
        .one(txn)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?
        .ok_or_else(|| AppError::UserNotFound(user_id.to_string()))
}

async fn find_membership(txn: &DatabaseTransaction, id: &str) -> AppResult<membership::Model> {
    Membership::find_by_id(id)
        .one(txn)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?
        .ok_or_else(|| AppError::MembershipNotFound(id.to_string()))
}
