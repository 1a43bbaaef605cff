//! Shared fixtures for the engine integration tests.
//!
//! Every test gets its own migrated in-memory SQLite database.

#![allow(dead_code, clippy::unwrap_used)]

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use rankx_common::{IdentityConfig, MembershipConfig};
use rankx_core::{
    AlwaysAutoApprove, ApplyOutcome, CounterSynchronizer, LeaderboardService, MembershipService,
    NeverAutoApprove, RankingEngine, ReconcileService, UserService, VotingService,
};
use rankx_db::entities::{
    Category, Membership, User, Vote, category,
    membership::{self, MembershipStatus},
    user, vote,
};
use rankx_db::test_utils::TestDatabase;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    Set,
};

/// A reason inside the accepted length range.
pub const REASON: &str = "I have been part of this community for years";

/// Services wired against one in-memory database.
pub struct Harness {
    pub db: Arc<DatabaseConnection>,
    pub ranking: RankingEngine,
    pub voting: VotingService,
    /// Applications wait for review.
    pub membership: MembershipService,
    /// Applications are approved immediately.
    pub auto_membership: MembershipService,
    pub users: UserService,
    pub leaderboard: LeaderboardService,
    pub reconcile: ReconcileService,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_identity(IdentityConfig::default()).await
    }

    pub async fn with_identity(identity: IdentityConfig) -> Self {
        let db = Arc::new(TestDatabase::sqlite_memory().await.unwrap().conn);
        let ranking = RankingEngine::new(db.clone());

        Self {
            voting: VotingService::new(db.clone(), ranking.clone()),
            membership: MembershipService::with_policy(
                db.clone(),
                ranking.clone(),
                MembershipConfig::default(),
                Arc::new(NeverAutoApprove),
            ),
            auto_membership: MembershipService::with_policy(
                db.clone(),
                ranking.clone(),
                MembershipConfig::default(),
                Arc::new(AlwaysAutoApprove),
            ),
            users: UserService::new(db.clone(), ranking.clone(), identity),
            leaderboard: LeaderboardService::new(db.clone()),
            reconcile: ReconcileService::new(db.clone(), ranking.clone()),
            ranking,
            db,
        }
    }

    pub fn conn(&self) -> &DatabaseConnection {
        self.db.as_ref()
    }

    pub async fn user(&self, handle: &str) -> user::Model {
        self.create_user(handle, 0, false).await
    }

    pub async fn admin(&self, handle: &str) -> user::Model {
        self.create_user(handle, 0, true).await
    }

    pub async fn create_user(&self, handle: &str, followers_count: i32, is_admin: bool) -> user::Model {
        user::ActiveModel {
            id: Set(format!("u-{handle}")),
            external_id: Set(format!("ext-{handle}")),
            handle: Set(handle.to_string()),
            display_name: Set(handle.to_string()),
            avatar_url: Set(None),
            bio: Set(None),
            followers_count: Set(followers_count),
            total_votes_received: Set(0),
            is_admin: Set(is_admin),
            last_login_at: Set(None),
            created_at: Set(Utc::now().fixed_offset()),
            updated_at: Set(None),
        }
        .insert(self.conn())
        .await
        .unwrap()
    }

    pub async fn category(&self, slug: &str) -> category::Model {
        category::ActiveModel {
            id: Set(format!("c-{slug}")),
            name: Set(slug.to_uppercase()),
            slug: Set(slug.to_string()),
            description: Set(format!("All about {slug}")),
            icon: Set("Trophy".to_string()),
            color: Set("#3B82F6".to_string()),
            member_count: Set(0),
            total_votes: Set(0),
            is_active: Set(true),
            requires_approval: Set(true),
            created_at: Set(Utc::now().fixed_offset()),
            updated_at: Set(None),
        }
        .insert(self.conn())
        .await
        .unwrap()
    }

    /// Apply with auto-approval and return the approved membership.
    pub async fn join(&self, user: &user::Model, category: &category::Model) -> membership::Model {
        match self
            .auto_membership
            .apply(&user.id, &category.slug, REASON)
            .await
            .unwrap()
        {
            ApplyOutcome::Applied(application) => {
                assert_eq!(application.membership.status, MembershipStatus::Approved);
                application.membership
            }
            ApplyOutcome::ConfirmationRequired(current) => {
                panic!("{} is already in {}", user.handle, current.category.slug)
            }
        }
    }

    /// `n` fresh users who each vote for `target` in `category`.
    pub async fn votes_for(&self, target: &user::Model, category: &category::Model, n: usize) {
        for i in 0..n {
            let voter = self.user(&format!("{}-fan{i}", target.handle)).await;
            self.voting
                .cast_vote(&voter.id, &category.id, &target.id)
                .await
                .unwrap();
        }
    }

    pub async fn member(&self, user_id: &str, category_id: &str) -> Option<membership::Model> {
        Membership::find()
            .filter(membership::Column::UserId.eq(user_id))
            .filter(membership::Column::CategoryId.eq(category_id))
            .one(self.conn())
            .await
            .unwrap()
    }

    pub async fn reload_user(&self, id: &str) -> Option<user::Model> {
        User::find_by_id(id).one(self.conn()).await.unwrap()
    }

    pub async fn reload_category(&self, id: &str) -> category::Model {
        Category::find_by_id(id).one(self.conn()).await.unwrap().unwrap()
    }

    pub async fn votes_in(&self, category_id: &str) -> Vec<vote::Model> {
        Vote::find()
            .filter(vote::Column::CategoryId.eq(category_id))
            .all(self.conn())
            .await
            .unwrap()
    }

    pub async fn vote_count(&self) -> u64 {
        Vote::find().count(self.conn()).await.unwrap()
    }

    /// Assert every counter matches the ledger and nobody is active twice.
    pub async fn assert_invariants(&self) {
        let report = CounterSynchronizer.audit(self.conn()).await.unwrap();
        assert!(report.is_clean(), "counter drift: {:?}", report.drifts);
        assert!(
            report.orphaned_votes.is_empty(),
            "orphaned votes: {:?}",
            report.orphaned_votes
        );

        let active = Membership::find()
            .filter(
                membership::Column::Status
                    .is_in([MembershipStatus::Approved, MembershipStatus::Pending]),
            )
            .all(self.conn())
            .await
            .unwrap();
        let mut per_user: HashMap<&str, usize> = HashMap::new();
        for m in &active {
            *per_user.entry(m.user_id.as_str()).or_default() += 1;
        }
        for (user_id, n) in per_user {
            assert!(n <= 1, "{user_id} holds {n} active memberships");
        }
    }
}
