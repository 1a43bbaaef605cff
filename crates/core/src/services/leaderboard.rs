//! Leaderboard projections.
//!
//! Read-only. Viewer-relative fields are computed per call.

use std::collections::HashMap;
use std::sync::Arc;

use rankx_common::{AppError, AppResult};
use rankx_db::{
    entities::{category, membership, user},
    repositories::{CategoryRepository, MembershipRepository, UserRepository, VoteRepository},
};
use sea_orm::DatabaseConnection;
use serde::Serialize;
use tracing::warn;

use super::ranking::compute_competition_ranks;
use super::summary::{CategorySummary, UserSummary};

/// Members shown per category in the category listing.
const TOP_MEMBERS: u64 = 3;

/// One ranked member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeaderboardEntry {
    pub rank: i32,
    pub user: UserSummary,
    pub vote_count: i32,
    pub rank_change: i32,
    /// The viewer's vote in this category points at this member.
    pub is_voted: bool,
    /// This member is the viewer.
    pub is_self: bool,
}

/// A category leaderboard as seen by one viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Leaderboard {
    pub category: CategorySummary,
    pub description: String,
    pub member_count: i32,
    pub total_votes: i32,
    pub entries: Vec<LeaderboardEntry>,
    /// Member the viewer voted for, if any.
    pub viewer_vote: Option<String>,
}

/// A top member in the category listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopMember {
    pub rank: i32,
    pub user: UserSummary,
    pub vote_count: i32,
}

/// An active category with its leaders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryOverview {
    pub category: CategorySummary,
    pub description: String,
    pub member_count: i32,
    pub total_votes: i32,
    pub top_members: Vec<TopMember>,
}

/// Leaderboard service.
#[derive(Clone)]
pub struct LeaderboardService {
    user_repo: UserRepository,
    category_repo: CategoryRepository,
    membership_repo: MembershipRepository,
    vote_repo: VoteRepository,
}

impl LeaderboardService {
    /// Create a new leaderboard service.
    #[must_use]
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            user_repo: UserRepository::new(db.clone()),
            category_repo: CategoryRepository::new(db.clone()),
            membership_repo: MembershipRepository::new(db.clone()),
            vote_repo: VoteRepository::new(db),
        }
    }

    /// Ranked members of a category.
    ///
    /// Inactive categories are reported as not found. Members whose user
    /// row is gone are skipped.
    pub async fn get_leaderboard(
        &self,
        category_slug: &str,
        viewer_id: Option<&str>,
    ) -> AppResult<Leaderboard> {
        let category = self.category_repo.get_by_slug(category_slug).await?;
        if !category.is_active {
            return Err(AppError::CategoryNotFound(category_slug.to_string()));
        }
        let members = self.membership_repo.find_ranked(&category.id, None).await?;
        let users = self.users_of(&members).await?;

        let viewer_vote = match viewer_id {
            Some(viewer) => self
                .vote_repo
                .find_by_voter_and_category(viewer, &category.id)
                .await?
                .map(|v| v.voted_for_id),
            None => None,
        };

        let ranks = ranks_of(&members);
        let mut skipped = 0usize;
        let entries: Vec<LeaderboardEntry> = members
            .iter()
            .zip(ranks)
            .filter_map(|(m, rank)| {
                let Some(user) = users.get(&m.user_id) else {
                    skipped += 1;
                    return None;
                };
                Some(LeaderboardEntry {
                    rank,
                    user: UserSummary::from(user),
                    vote_count: m.vote_count,
                    rank_change: m.rank_change,
                    is_voted: viewer_vote.as_deref() == Some(m.user_id.as_str()),
                    is_self: viewer_id == Some(m.user_id.as_str()),
                })
            })
            .collect();

        if skipped > 0 {
            warn!(
                category_id = %category.id,
                skipped = skipped,
                "Skipped memberships without a user"
            );
        }

        Ok(Leaderboard {
            category: CategorySummary::from(&category),
            description: category.description.clone(),
            member_count: category.member_count,
            total_votes: category.total_votes,
            entries,
            viewer_vote,
        })
    }

    /// Active categories by name, each with its top members.
    pub async fn list_categories(&self) -> AppResult<Vec<CategoryOverview>> {
        let categories = self.category_repo.find_active().await?;

        let mut overviews = Vec::with_capacity(categories.len());
        for category in &categories {
            let members = self
                .membership_repo
                .find_ranked(&category.id, Some(TOP_MEMBERS))
                .await?;
            let users = self.users_of(&members).await?;
            let ranks = ranks_of(&members);

            let top_members: Vec<TopMember> = members
                .iter()
                .zip(ranks)
                .filter_map(|(m, rank)| {
                    users.get(&m.user_id).map(|user| TopMember {
                        rank,
                        user: UserSummary::from(user),
                        vote_count: m.vote_count,
                    })
                })
                .collect();

            overviews.push(overview(category, top_members));
        }
        Ok(overviews)
    }

    async fn users_of(
        &self,
        members: &[membership::Model],
    ) -> AppResult<HashMap<String, user::Model>> {
        let ids: Vec<String> = members.iter().map(|m| m.user_id.clone()).collect();
        Ok(self
            .user_repo
            .find_by_ids(&ids)
            .await?
            .into_iter()
            .map(|u| (u.id.clone(), u))
            .collect())
    }
}

fn overview(category: &category::Model, top_members: Vec<TopMember>) -> CategoryOverview {
    CategoryOverview {
        category: CategorySummary::from(category),
        description: category.description.clone(),
        member_count: category.member_count,
        total_votes: category.total_votes,
        top_members,
    }
}

/// Stored ranks, falling back to competition ranks computed from the
/// current order for members not yet ranked.
fn ranks_of(members: &[membership::Model]) -> Vec<i32> {
    let counts: Vec<i32> = members.iter().map(|m| m.vote_count).collect();
    members
        .iter()
        .zip(compute_competition_ranks(&counts))
        .map(|(m, computed)| m.current_rank.unwrap_or(computed))
        .collect()
}
