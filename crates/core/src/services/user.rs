//! User service: identity upsert, admin user list and account deletion.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};
use rankx_common::{AppError, AppResult, IdGenerator, IdentityConfig};
use rankx_db::{
    entities::{
        Badge, Membership, User, UserBadge, badge, category, membership,
        user, user_badge,
    },
    is_unique_violation,
    repositories::{CategoryRepository, MembershipRepository, UserRepository},
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait, sea_query::Expr,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use validator::Validate;

use super::counters::{CounterSynchronizer, Forfeiture};
use super::jobs::JobSender;
use super::ledger::VoteLedger;
use super::membership::lock_user;
use super::ranking::RankingEngine;
use super::summary::{CategorySummary, UserSummary};

/// Attempts at finding a free handle before giving up.
const HANDLE_ATTEMPTS: usize = 5;

/// An identity already authenticated by the external provider.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ExternalIdentity {
    #[validate(length(min = 1, max = 128))]
    pub external_id: String,
    #[validate(length(min = 1, max = 64))]
    pub handle: String,
    #[validate(length(max = 128))]
    pub display_name: String,
    #[validate(url)]
    pub avatar_url: Option<String>,
    #[validate(length(max = 2048))]
    pub bio: Option<String>,
    #[validate(range(min = 0))]
    pub followers_count: i32,
}

/// A row of the admin user list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdminUserRow {
    pub user: UserSummary,
    pub is_admin: bool,
    pub total_votes_received: i32,
    pub category: Option<CategorySummary>,
    pub current_rank: Option<i32>,
    pub vote_count: i32,
    pub created_at: DateTime<FixedOffset>,
}

/// What an account deletion removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeletedUser {
    pub user_id: String,
    pub forfeited: Vec<Forfeiture>,
    /// Votes the user had cast outside their own categories.
    pub votes_withdrawn: usize,
    /// Votes the user received without holding a membership.
    pub votes_dropped: usize,
    pub badges_removed: usize,
    /// Categories re-ranked after the commit.
    pub affected_categories: Vec<String>,
}

/// User service.
#[derive(Clone)]
pub struct UserService {
    db: Arc<DatabaseConnection>,
    user_repo: UserRepository,
    category_repo: CategoryRepository,
    membership_repo: MembershipRepository,
    ledger: VoteLedger,
    counters: CounterSynchronizer,
    ranking: RankingEngine,
    identity: IdentityConfig,
    jobs: Option<JobSender>,
    id_gen: IdGenerator,
}

impl UserService {
    /// Create a new user service.
    #[must_use]
    pub fn new(db: Arc<DatabaseConnection>, ranking: RankingEngine, identity: IdentityConfig) -> Self {
        Self {
            user_repo: UserRepository::new(db.clone()),
            category_repo: CategoryRepository::new(db.clone()),
            membership_repo: MembershipRepository::new(db.clone()),
            db,
            ledger: VoteLedger,
            counters: CounterSynchronizer,
            ranking,
            identity,
            jobs: None,
            id_gen: IdGenerator::new(),
        }
    }

    /// Set the job sender used for badge checks.
    pub fn set_jobs(&mut self, jobs: JobSender) {
        self.jobs = Some(jobs);
    }

    /// Create or refresh the local user for an external identity.
    ///
    /// Profile fields follow the provider on every sign-in. A handle taken
    /// by another local user gets a random suffix. Admin is granted by
    /// configured handle and never revoked here.
    pub async fn upsert_from_identity(&self, identity: ExternalIdentity) -> AppResult<user::Model> {
        identity.validate()?;

        let now = Utc::now().fixed_offset();
        let grant_admin = self.identity.is_admin_handle(&identity.handle);
        let display_name = if identity.display_name.trim().is_empty() {
            identity.handle.clone()
        } else {
            identity.display_name.clone()
        };

        if let Some(existing) = self
            .user_repo
            .find_by_external_id(&identity.external_id)
            .await?
        {
            let handle = self
                .available_handle(&identity.handle, Some(&existing.id))
                .await?;
            let promote = grant_admin && !existing.is_admin;

            let mut model: user::ActiveModel = existing.into();
            model.handle = Set(handle);
            model.display_name = Set(display_name);
            model.avatar_url = Set(identity.avatar_url);
            model.bio = Set(identity.bio);
            model.followers_count = Set(identity.followers_count);
            model.last_login_at = Set(Some(now));
            model.updated_at = Set(Some(now));
            if promote {
                model.is_admin = Set(true);
            }

            let updated = model.update(self.db.as_ref()).await.map_err(|e| {
                if is_unique_violation(&e) {
                    AppError::Conflict("handle was taken concurrently".to_string())
                } else {
                    AppError::Database(e.to_string())
                }
            })?;

            if promote {
                info!(user_id = %updated.id, handle = %updated.handle, "User granted admin");
            }
            self.enqueue_badge_check(&updated.id);
            return Ok(updated);
        }

        let handle = self.available_handle(&identity.handle, None).await?;
        let model = user::ActiveModel {
            id: Set(self.id_gen.generate()),
            external_id: Set(identity.external_id),
            handle: Set(handle),
            display_name: Set(display_name),
            avatar_url: Set(identity.avatar_url),
            bio: Set(identity.bio),
            followers_count: Set(identity.followers_count),
            total_votes_received: Set(0),
            is_admin: Set(grant_admin),
            last_login_at: Set(Some(now)),
            created_at: Set(now),
            updated_at: Set(None),
        };

        let created = model.insert(self.db.as_ref()).await.map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict("identity or handle was registered concurrently".to_string())
            } else {
                AppError::Database(e.to_string())
            }
        })?;

        info!(
            user_id = %created.id,
            handle = %created.handle,
            is_admin = created.is_admin,
            "User created"
        );
        self.enqueue_badge_check(&created.id);
        Ok(created)
    }

    /// Users for the admin list, newest first, with their approved category.
    pub async fn list_users(&self, limit: u64, offset: u64) -> AppResult<Vec<AdminUserRow>> {
        let users = self.user_repo.find_all(limit, offset).await?;
        let user_ids: Vec<String> = users.iter().map(|u| u.id.clone()).collect();

        let memberships: HashMap<String, membership::Model> = self
            .membership_repo
            .find_approved_by_users(&user_ids)
            .await?
            .into_iter()
            .map(|m| (m.user_id.clone(), m))
            .collect();

        let category_ids: Vec<String> = memberships.values().map(|m| m.category_id.clone()).collect();
        let categories: HashMap<String, category::Model> = self
            .category_repo
            .find_by_ids(&category_ids)
            .await?
            .into_iter()
            .map(|c| (c.id.clone(), c))
            .collect();

        Ok(users
            .iter()
            .map(|u| {
                let member = memberships.get(&u.id);
                AdminUserRow {
                    user: UserSummary::from(u),
                    is_admin: u.is_admin,
                    total_votes_received: u.total_votes_received,
                    category: member
                        .and_then(|m| categories.get(&m.category_id))
                        .map(CategorySummary::from),
                    current_rank: member.and_then(|m| m.current_rank),
                    vote_count: member.map_or(0, |m| m.vote_count),
                    created_at: u.created_at,
                }
            })
            .collect())
    }

    /// Delete a user with everything tied to them.
    ///
    /// Memberships are forfeited, votes cast are withdrawn from their
    /// recipients, votes received are dropped from their category totals
    /// and badges are released, all in one transaction. Affected
    /// categories are re-ranked after the commit.
    pub async fn delete_user(&self, admin_id: &str, target_id: &str) -> AppResult<DeletedUser> {
        let admin = self.user_repo.get_by_id(admin_id).await?;
        if !admin.is_admin {
            return Err(AppError::Forbidden("Only admins can delete users".to_string()));
        }
        if admin_id == target_id {
            return Err(AppError::SelfDeletion);
        }

        let target = self.user_repo.get_by_id(target_id).await?;
        if target.is_admin {
            return Err(AppError::AdminProtected);
        }

        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        lock_user(&txn, target_id).await?;

        let mut affected = BTreeSet::new();
        let mut recipients = BTreeSet::new();

        let memberships = Membership::find()
            .filter(membership::Column::UserId.eq(target_id))
            .all(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let mut forfeited = Vec::with_capacity(memberships.len());
        for member in &memberships {
            let f = self.counters.forfeit(&txn, member).await?;
            if f.was_approved || f.withdrawn_vote_for.is_some() {
                affected.insert(f.category_id.clone());
            }
            if let Some(ref recipient) = f.withdrawn_vote_for {
                recipients.insert(recipient.clone());
            }
            forfeited.push(f);
        }

        let cast = self.ledger.cast_by(&txn, target_id).await?;
        for vote in &cast {
            self.ledger.remove(&txn, vote).await?;
            self.counters
                .vote_removed(&txn, &vote.voted_for_id, &vote.category_id)
                .await?;
            affected.insert(vote.category_id.clone());
            recipients.insert(vote.voted_for_id.clone());
        }

        let received = self.ledger.received_by(&txn, target_id).await?;
        for vote in &received {
            self.counters
                .drop_vote_for_deleted_target(&txn, vote)
                .await?;
        }

        let earned = UserBadge::find()
            .filter(user_badge::Column::UserId.eq(target_id))
            .all(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        for held in &earned {
            UserBadge::delete_by_id(held.id.clone())
                .exec(&txn)
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;

            let result = Badge::update_many()
                .col_expr(
                    badge::Column::AwardedCount,
                    Expr::col(badge::Column::AwardedCount).sub(1),
                )
                .filter(badge::Column::Id.eq(&held.badge_id))
                .filter(badge::Column::AwardedCount.gt(0))
                .exec(&txn)
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;

            if result.rows_affected == 0 {
                warn!(badge_id = %held.badge_id, "Badge awarded_count already zero");
            }
        }

        User::delete_by_id(target_id.to_string())
            .exec(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        info!(
            user_id = %target_id,
            admin_id = %admin_id,
            memberships = forfeited.len(),
            votes_withdrawn = cast.len(),
            votes_dropped = received.len(),
            "User deleted"
        );

        for category_id in &affected {
            self.ranking.recalculate_or_retry(category_id).await;
        }
        for recipient in &recipients {
            self.enqueue_badge_check(recipient);
        }

        Ok(DeletedUser {
            user_id: target_id.to_string(),
            forfeited,
            votes_withdrawn: cast.len(),
            votes_dropped: received.len(),
            badges_removed: earned.len(),
            affected_categories: affected.into_iter().collect(),
        })
    }

    /// `handle` if free (or owned by `owner`), else `handle_<suffix>`.
    async fn available_handle(&self, handle: &str, owner: Option<&str>) -> AppResult<String> {
        let mut candidate = handle.to_string();
        for _ in 0..HANDLE_ATTEMPTS {
            match self.user_repo.find_by_handle(&candidate).await? {
                None => return Ok(candidate),
                Some(u) if Some(u.id.as_str()) == owner => return Ok(candidate),
                Some(_) => {
                    candidate = format!("{handle}_{}", self.id_gen.generate_suffix());
                }
            }
        }
        Err(AppError::Conflict(format!("No free handle derived from {handle}")))
    }

    fn enqueue_badge_check(&self, user_id: &str) {
        let Some(ref jobs) = self.jobs else {
            return;
        };
        if let Err(e) = jobs.check_badges(user_id.to_string(), None) {
            warn!(user_id = %user_id, error = %e, "Failed to enqueue badge check");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase};

    fn create_test_user(id: &str, is_admin: bool) -> user::Model {
        user::Model {
            id: id.to_string(),
            external_id: format!("ext-{id}"),
            handle: id.to_string(),
            display_name: id.to_string(),
            avatar_url: None,
            bio: None,
            followers_count: 0,
            total_votes_received: 0,
            is_admin,
            last_login_at: None,
            created_at: Utc::now().into(),
            updated_at: None,
        }
    }

    fn service(db: MockDatabase) -> UserService {
        let db = Arc::new(db.into_connection());
        UserService::new(db.clone(), RankingEngine::new(db), IdentityConfig::default())
    }

    #[tokio::test]
    async fn test_delete_requires_admin() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[create_test_user("mod", false)]]);

        let result = service(db).delete_user("mod", "target").await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_delete_self_is_rejected() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[create_test_user("root", true)]]);

        let result = service(db).delete_user("root", "root").await;
        assert!(matches!(result, Err(AppError::SelfDeletion)));
    }

    #[tokio::test]
    async fn test_delete_other_admin_is_rejected() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[create_test_user("root", true)]])
            .append_query_results([[create_test_user("other", true)]]);

        let result = service(db).delete_user("root", "other").await;
        assert!(matches!(result, Err(AppError::AdminProtected)));
    }

    #[tokio::test]
    async fn test_identity_is_validated() {
        let db = MockDatabase::new(DatabaseBackend::Postgres);
        let result = service(db)
            .upsert_from_identity(ExternalIdentity {
                external_id: "ext-1".to_string(),
                handle: String::new(),
                display_name: "Nobody".to_string(),
                avatar_url: None,
                bio: None,
                followers_count: 0,
            })
            .await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }
}
