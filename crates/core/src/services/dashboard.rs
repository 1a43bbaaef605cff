//! Dashboard, profile and admin overview projections.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset};
use rankx_common::AppResult;
use rankx_db::{
    entities::{badge, category, membership, membership::MembershipStatus, user, user_badge},
    repositories::{
        BadgeRepository, CategoryRepository, MembershipRepository, UserRepository, VoteRepository,
    },
};
use sea_orm::DatabaseConnection;
use serde::Serialize;

use super::summary::{CategorySummary, UserSummary};

/// A user's standing in one approved category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankingSummary {
    pub membership_id: String,
    pub category: CategorySummary,
    pub vote_count: i32,
    pub current_rank: Option<i32>,
    pub rank_change: i32,
    pub member_count: i32,
}

/// An application awaiting review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingApplication {
    pub membership_id: String,
    pub category: CategorySummary,
    pub created_at: DateTime<FixedOffset>,
}

/// A vote the user cast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CastVote {
    pub vote_id: String,
    pub category: CategorySummary,
    pub recipient: UserSummary,
    pub created_at: DateTime<FixedOffset>,
}

/// The signed-in user's dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dashboard {
    pub user: UserSummary,
    pub is_admin: bool,
    pub rankings: Vec<RankingSummary>,
    pub pending: Vec<PendingApplication>,
    /// Votes summed over approved memberships.
    pub total_votes: i32,
    /// Numerically smallest current rank.
    pub best_rank: Option<i32>,
    pub votes_cast: Vec<CastVote>,
}

/// A badge on a public profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EarnedBadge {
    pub slug: String,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub color: String,
    pub earned_at: DateTime<FixedOffset>,
}

impl EarnedBadge {
    pub(crate) fn from_record(earned: &user_badge::Model, badge: badge::Model) -> Self {
        Self {
            slug: badge.slug,
            name: badge.name,
            description: badge.description,
            icon: badge.icon,
            color: badge.color,
            earned_at: earned.earned_at,
        }
    }
}

/// Profile counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProfileStats {
    pub total_votes: i32,
    pub best_rank: Option<i32>,
    pub votes_cast: u64,
    pub categories: usize,
}

/// A public profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Profile {
    pub user: UserSummary,
    pub bio: Option<String>,
    pub created_at: DateTime<FixedOffset>,
    pub rankings: Vec<RankingSummary>,
    pub stats: ProfileStats,
    pub badges: Vec<EarnedBadge>,
}

/// Site-wide totals for the admin panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AdminOverview {
    pub total_users: u64,
    pub active_categories: u64,
    pub total_votes: u64,
    pub pending_applications: u64,
    pub approved_members: u64,
}

/// Dashboard service.
#[derive(Clone)]
pub struct DashboardService {
    user_repo: UserRepository,
    category_repo: CategoryRepository,
    membership_repo: MembershipRepository,
    vote_repo: VoteRepository,
    badge_repo: BadgeRepository,
}

impl DashboardService {
    /// Create a new dashboard service.
    #[must_use]
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            user_repo: UserRepository::new(db.clone()),
            category_repo: CategoryRepository::new(db.clone()),
            membership_repo: MembershipRepository::new(db.clone()),
            vote_repo: VoteRepository::new(db.clone()),
            badge_repo: BadgeRepository::new(db),
        }
    }

    /// The user's rankings, pending applications and votes cast.
    pub async fn dashboard(&self, user_id: &str) -> AppResult<Dashboard> {
        let user = self.user_repo.get_by_id(user_id).await?;

        let approved = self
            .membership_repo
            .find_by_user_and_status(user_id, MembershipStatus::Approved)
            .await?;
        let pending = self
            .membership_repo
            .find_by_user_and_status(user_id, MembershipStatus::Pending)
            .await?;
        let votes = self.vote_repo.find_by_voter(user_id).await?;

        let category_ids: Vec<String> = approved
            .iter()
            .chain(&pending)
            .map(|m| m.category_id.clone())
            .chain(votes.iter().map(|v| v.category_id.clone()))
            .collect();
        let categories = self.categories_by_id(&category_ids).await?;

        let recipient_ids: Vec<String> = votes.iter().map(|v| v.voted_for_id.clone()).collect();
        let recipients: HashMap<String, user::Model> = self
            .user_repo
            .find_by_ids(&recipient_ids)
            .await?
            .into_iter()
            .map(|u| (u.id.clone(), u))
            .collect();

        let rankings = rankings_of(&approved, &categories);
        let (total_votes, best_rank) = totals(&rankings);

        let pending: Vec<PendingApplication> = pending
            .iter()
            .filter_map(|m| {
                categories.get(&m.category_id).map(|c| PendingApplication {
                    membership_id: m.id.clone(),
                    category: CategorySummary::from(c),
                    created_at: m.created_at,
                })
            })
            .collect();

        let votes_cast: Vec<CastVote> = votes
            .iter()
            .filter_map(|v| {
                let category = categories.get(&v.category_id)?;
                let recipient = recipients.get(&v.voted_for_id)?;
                Some(CastVote {
                    vote_id: v.id.clone(),
                    category: CategorySummary::from(category),
                    recipient: UserSummary::from(recipient),
                    created_at: v.created_at,
                })
            })
            .collect();

        Ok(Dashboard {
            user: UserSummary::from(&user),
            is_admin: user.is_admin,
            rankings,
            pending,
            total_votes,
            best_rank,
            votes_cast,
        })
    }

    /// Public profile by handle.
    pub async fn profile(&self, handle: &str) -> AppResult<Profile> {
        let user = self.user_repo.get_by_handle(handle).await?;

        let approved = self
            .membership_repo
            .find_by_user_and_status(&user.id, MembershipStatus::Approved)
            .await?;
        let category_ids: Vec<String> = approved.iter().map(|m| m.category_id.clone()).collect();
        let categories = self.categories_by_id(&category_ids).await?;

        let rankings = rankings_of(&approved, &categories);
        let (total_votes, best_rank) = totals(&rankings);
        let votes_cast = self.vote_repo.count_by_voter(&user.id).await?;

        let badges: Vec<EarnedBadge> = self
            .badge_repo
            .find_earned_by_user(&user.id)
            .await?
            .into_iter()
            .filter_map(|(earned, badge)| badge.map(|b| EarnedBadge::from_record(&earned, b)))
            .collect();

        Ok(Profile {
            user: UserSummary::from(&user),
            bio: user.bio.clone(),
            created_at: user.created_at,
            stats: ProfileStats {
                total_votes,
                best_rank,
                votes_cast,
                categories: rankings.len(),
            },
            rankings,
            badges,
        })
    }

    /// Site-wide totals.
    pub async fn admin_overview(&self) -> AppResult<AdminOverview> {
        Ok(AdminOverview {
            total_users: self.user_repo.count().await?,
            active_categories: self.category_repo.count_active().await?,
            total_votes: self.vote_repo.count().await?,
            pending_applications: self
                .membership_repo
                .count_by_status(MembershipStatus::Pending)
                .await?,
            approved_members: self
                .membership_repo
                .count_by_status(MembershipStatus::Approved)
                .await?,
        })
    }

    async fn categories_by_id(
        &self,
        ids: &[String],
    ) -> AppResult<HashMap<String, category::Model>> {
        let mut ids = ids.to_vec();
        ids.sort_unstable();
        ids.dedup();

        Ok(self
            .category_repo
            .find_by_ids(&ids)
            .await?
            .into_iter()
            .map(|c| (c.id.clone(), c))
            .collect())
    }
}

fn rankings_of(
    approved: &[membership::Model],
    categories: &HashMap<String, category::Model>,
) -> Vec<RankingSummary> {
    approved
        .iter()
        .filter_map(|m| {
            categories.get(&m.category_id).map(|c| RankingSummary {
                membership_id: m.id.clone(),
                category: CategorySummary::from(c),
                vote_count: m.vote_count,
                current_rank: m.current_rank,
                rank_change: m.rank_change,
                member_count: c.member_count,
            })
        })
        .collect()
}

/// Vote total and best rank over rankings.
fn totals(rankings: &[RankingSummary]) -> (i32, Option<i32>) {
    let total = rankings.iter().map(|r| r.vote_count).sum();
    let best = rankings.iter().filter_map(|r| r.current_rank).min();
    (total, best)
}
