//! Badge evaluator.
//!
//! Badges are cosmetic. A failed evaluation is logged by the job worker
//! and never reaches the vote or membership path that triggered it.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use rankx_common::{AppError, AppResult, BadgeConfig, IdGenerator};
use rankx_db::{
    entities::{
        Badge, badge,
        badge::BadgeCriteria,
        membership::MembershipStatus,
        user, user_badge,
    },
    is_unique_violation,
    repositories::{BadgeRepository, MembershipRepository, UserRepository, VoteRepository},
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait, sea_query::Expr,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::dashboard::EarnedBadge;
use super::summary::UserSummary;

/// A catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BadgeDefinition {
    pub slug: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub icon: &'static str,
    pub color: &'static str,
    pub criteria: BadgeCriteria,
    pub value: i32,
}

const fn def(
    slug: &'static str,
    name: &'static str,
    description: &'static str,
    icon: &'static str,
    color: &'static str,
    criteria: BadgeCriteria,
    value: i32,
) -> BadgeDefinition {
    BadgeDefinition {
        slug,
        name,
        description,
        icon,
        color,
        criteria,
        value,
    }
}

const GOLD: &str = "#FFD700";
const SILVER: &str = "#C0C0C0";
const BRONZE: &str = "#CD7F32";
const PURPLE: &str = "#9333EA";
const BLUE: &str = "#3B82F6";
const GREEN: &str = "#10B981";
const GRAY: &str = "#6B7280";

/// The default catalog seeded at startup.
#[rustfmt::skip]
pub const DEFAULT_BADGES: &[BadgeDefinition] = &[
    // Rank
    def("category-king", "Category King", "Held the #1 spot in a category", "Crown", GOLD, BadgeCriteria::Rank, 1),
    def("gold-medalist", "Gold Medalist", "Finished first in a category", "Medal", GOLD, BadgeCriteria::Rank, 1),
    def("silver-medalist", "Silver Medalist", "Finished second in a category", "Medal", SILVER, BadgeCriteria::Rank, 2),
    def("bronze-medalist", "Bronze Medalist", "Finished third in a category", "Medal", BRONZE, BadgeCriteria::Rank, 3),
    def("elite-ranker", "Elite Ranker", "Reached the top 5 of a category", "Award", PURPLE, BadgeCriteria::Rank, 5),
    def("top-10-club", "Top 10 Club", "Reached the top 10 of a category", "BarChart3", PURPLE, BadgeCriteria::Rank, 10),
    def("on-the-board", "On The Board", "Appeared on a leaderboard", "BarChart3", GRAY, BadgeCriteria::Rank, 100),
    // Votes received
    def("first-supporter", "First Supporter", "Received a first vote", "Gift", GREEN, BadgeCriteria::Votes, 1),
    def("appreciated", "Appreciated", "Received 10 votes", "Heart", BLUE, BadgeCriteria::Votes, 10),
    def("well-known", "Well Known", "Received 25 votes", "Award", BLUE, BadgeCriteria::Votes, 25),
    def("popular", "Popular", "Received 50 votes", "Star", BLUE, BadgeCriteria::Votes, 50),
    def("century-club", "Century Club", "Received 100 votes", "Award", GOLD, BadgeCriteria::Votes, 100),
    def("half-thousand", "Half Thousand", "Received 500 votes", "Sparkles", GOLD, BadgeCriteria::Votes, 500),
    def("thousand-fans", "Thousand Fans", "Received 1,000 votes", "Users", GOLD, BadgeCriteria::Votes, 1000),
    def("five-thousand-club", "Five Thousand Club", "Received 5,000 votes", "Star", GOLD, BadgeCriteria::Votes, 5000),
    def("ten-thousand-legend", "Ten Thousand Legend", "Received 10,000 votes", "Gem", GOLD, BadgeCriteria::Votes, 10000),
    // Unique voters
    def("community-loved", "Community Loved", "Voted for by 10 different people", "Users", GREEN, BadgeCriteria::Votes, 10),
    def("widely-supported", "Widely Supported", "Voted for by 25 different people", "Globe", GREEN, BadgeCriteria::Votes, 25),
    def("crowd-favorite", "Crowd Favorite", "Voted for by 50 different people", "Users", GREEN, BadgeCriteria::Votes, 50),
    def("universally-acclaimed", "Universally Acclaimed", "Voted for by 100 different people", "Sparkles", GREEN, BadgeCriteria::Votes, 100),
    // Votes cast
    def("first-vote", "First Vote", "Cast a first vote", "ThumbsUp", GRAY, BadgeCriteria::Engagement, 1),
    def("voter", "Voter", "Cast 10 votes", "Target", GREEN, BadgeCriteria::Engagement, 10),
    def("active-voter", "Active Voter", "Cast 25 votes", "Vote", BLUE, BadgeCriteria::Engagement, 25),
    def("super-voter", "Super Voter", "Cast 50 votes", "Trophy", PURPLE, BadgeCriteria::Engagement, 50),
    def("elite-voter", "Elite Voter", "Cast 100 votes", "Gem", GOLD, BadgeCriteria::Engagement, 100),
    // Distinct people voted for
    def("supporter", "Supporter", "Voted for 10 different people", "Users", GREEN, BadgeCriteria::Engagement, 10),
    def("community-builder", "Community Builder", "Voted for 25 different people", "Globe", BLUE, BadgeCriteria::Engagement, 25),
    def("connector", "Connector", "Voted for 50 different people", "Sparkles", PURPLE, BadgeCriteria::Engagement, 50),
    def("network-king", "Network King", "Voted for 100 different people", "Users", GOLD, BadgeCriteria::Engagement, 100),
    // Account age, in days
    def("one-week-old", "One Week Old", "Member for a week", "Cake", GRAY, BadgeCriteria::Engagement, 7),
    def("one-month-member", "One Month Member", "Member for a month", "PartyPopper", GREEN, BadgeCriteria::Engagement, 30),
    def("three-month-veteran", "Three Month Veteran", "Member for three months", "Sparkles", BLUE, BadgeCriteria::Engagement, 90),
    def("half-year-legend", "Half Year Legend", "Member for six months", "Gem", PURPLE, BadgeCriteria::Engagement, 180),
    def("one-year-king", "One Year King", "Member for a year", "Crown", GOLD, BadgeCriteria::Engagement, 365),
    // Followers and profile
    def("twitter-newbie", "Rising Voice", "Reached 100 followers", "Bird", GRAY, BadgeCriteria::Social, 100),
    def("growing-account", "Growing Account", "Reached 500 followers", "Sprout", GREEN, BadgeCriteria::Social, 500),
    def("influencer", "Influencer", "Reached 1,000 followers", "Megaphone", BLUE, BadgeCriteria::Social, 1000),
    def("notable", "Notable", "Reached 5,000 followers", "Star", PURPLE, BadgeCriteria::Social, 5000),
    def("twitter-star", "Star", "Reached 10,000 followers", "Gem", GOLD, BadgeCriteria::Social, 10000),
    def("mega-influencer", "Mega Influencer", "Reached 100,000 followers", "Crown", GOLD, BadgeCriteria::Social, 100_000),
    def("bio-writer", "Bio Writer", "Wrote a profile bio", "Edit3", GRAY, BadgeCriteria::Social, 1),
    def("profile-picture", "Profile Picture", "Set a profile picture", "Image", GRAY, BadgeCriteria::Social, 1),
    def("styled", "Styled", "Has both a bio and a profile picture", "Palette", GREEN, BadgeCriteria::Social, 2),
    // Special
    def("admin", "Admin", "Runs the place", "Shield", GOLD, BadgeCriteria::Special, 1),
    def("launch-day", "Launch Day", "Joined on launch day", "Trophy", GOLD, BadgeCriteria::Special, 1),
    def("beta-tester", "Beta Tester", "Joined during the beta", "Award", PURPLE, BadgeCriteria::Special, 1),
    // Categories
    def("applicant", "Applicant", "Applied to a category", "FileText", GRAY, BadgeCriteria::Categories, 1),
    def("approved", "Approved", "Accepted into a category", "CheckCircle", GRAY, BadgeCriteria::Categories, 1),
    def("new-member", "New Member", "Joined a category", "UserPlus", GRAY, BadgeCriteria::Categories, 1),
    def("first-blood", "First Blood", "First approved member of a category", "Users", GREEN, BadgeCriteria::Categories, 1),
    def("founding-member", "Founding Member", "Among the first 10 members of a category", "Star", GREEN, BadgeCriteria::Categories, 10),
    def("early-adopter", "Early Adopter", "Among the first 50 members of a category", "Zap", GREEN, BadgeCriteria::Categories, 50),
];

/// Tiers as `(threshold, slug)`, highest first.
type Tiers = &'static [(i64, &'static str)];

const VOTES_RECEIVED: Tiers = &[
    (10_000, "ten-thousand-legend"),
    (5_000, "five-thousand-club"),
    (1_000, "thousand-fans"),
    (500, "half-thousand"),
    (100, "century-club"),
    (50, "popular"),
    (25, "well-known"),
    (10, "appreciated"),
    (1, "first-supporter"),
];

const UNIQUE_VOTERS: Tiers = &[
    (100, "universally-acclaimed"),
    (50, "crowd-favorite"),
    (25, "widely-supported"),
    (10, "community-loved"),
];

const VOTES_CAST: Tiers = &[
    (100, "elite-voter"),
    (50, "super-voter"),
    (25, "active-voter"),
    (10, "voter"),
    (1, "first-vote"),
];

const DISTINCT_TARGETS: Tiers = &[
    (100, "network-king"),
    (50, "connector"),
    (25, "community-builder"),
    (10, "supporter"),
];

const ACCOUNT_AGE_DAYS: Tiers = &[
    (365, "one-year-king"),
    (180, "half-year-legend"),
    (90, "three-month-veteran"),
    (30, "one-month-member"),
    (7, "one-week-old"),
];

const FOLLOWERS: Tiers = &[
    (100_000, "mega-influencer"),
    (10_000, "twitter-star"),
    (5_000, "notable"),
    (1_000, "influencer"),
    (500, "growing-account"),
    (100, "twitter-newbie"),
];

/// Only the highest tier reached is awarded.
#[must_use]
pub fn highest_tier(value: i64, tiers: Tiers) -> Option<&'static str> {
    tiers
        .iter()
        .find(|(threshold, _)| value >= *threshold)
        .map(|(_, slug)| *slug)
}

/// Badges for holding `rank` on a leaderboard.
#[must_use]
pub fn rank_badges(rank: i32) -> Vec<&'static str> {
    let mut slugs = Vec::new();
    match rank {
        1 => slugs.extend(["category-king", "gold-medalist"]),
        2 => slugs.push("silver-medalist"),
        3 => slugs.push("bronze-medalist"),
        _ => {}
    }
    if rank <= 5 {
        slugs.push("elite-ranker");
    }
    if rank <= 10 {
        slugs.push("top-10-club");
    }
    slugs.push("on-the-board");
    slugs
}

/// Badge for being the `position`-th approved member of a category.
#[must_use]
pub const fn join_order_badge(position: u64) -> Option<&'static str> {
    match position {
        1 => Some("first-blood"),
        2..=10 => Some("founding-member"),
        11..=50 => Some("early-adopter"),
        _ => None,
    }
}

/// Profile and follower badges.
#[must_use]
pub fn social_badges(user: &user::Model) -> Vec<&'static str> {
    let has_bio = user.bio.as_deref().is_some_and(|b| !b.trim().is_empty());
    let has_avatar = user.avatar_url.as_deref().is_some_and(|a| !a.is_empty());

    let mut slugs: Vec<&'static str> =
        highest_tier(i64::from(user.followers_count), FOLLOWERS).into_iter().collect();
    if has_bio {
        slugs.push("bio-writer");
    }
    if has_avatar {
        slugs.push("profile-picture");
    }
    if has_bio && has_avatar {
        slugs.push("styled");
    }
    slugs
}

/// Admin, launch-day and beta badges.
#[must_use]
pub fn special_badges(user: &user::Model, config: &BadgeConfig) -> Vec<&'static str> {
    let joined: NaiveDate = user.created_at.date_naive();

    let mut slugs = Vec::new();
    if user.is_admin {
        slugs.push("admin");
    }
    if config.launch_date == Some(joined) {
        slugs.push("launch-day");
    }
    if config.beta_end.is_some_and(|end| joined < end) {
        slugs.push("beta-tester");
    }
    slugs
}

/// Users shown on the badge leaderboard.
pub const BADGE_LEADERBOARD_SIZE: u64 = 100;

/// A catalog entry with the viewer's progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogBadge {
    #[serde(flatten)]
    pub badge: badge::Model,
    pub earned: bool,
    pub earned_at: Option<DateTime<FixedOffset>>,
}

/// A row of the badge leaderboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BadgeLeader {
    pub user: UserSummary,
    pub badge_count: i64,
}

/// Badge evaluator service.
#[derive(Clone)]
pub struct BadgeService {
    db: Arc<DatabaseConnection>,
    badge_repo: BadgeRepository,
    user_repo: UserRepository,
    membership_repo: MembershipRepository,
    vote_repo: VoteRepository,
    config: BadgeConfig,
    id_gen: IdGenerator,
}

impl BadgeService {
    /// Create a new badge service.
    #[must_use]
    pub fn new(db: Arc<DatabaseConnection>, config: BadgeConfig) -> Self {
        Self {
            badge_repo: BadgeRepository::new(db.clone()),
            user_repo: UserRepository::new(db.clone()),
            membership_repo: MembershipRepository::new(db.clone()),
            vote_repo: VoteRepository::new(db.clone()),
            db,
            config,
            id_gen: IdGenerator::new(),
        }
    }

    /// Insert catalog entries that are missing. Returns how many were added.
    pub async fn seed_default_badges(&self) -> AppResult<usize> {
        let existing: HashSet<String> = self
            .badge_repo
            .find_all()
            .await?
            .into_iter()
            .map(|b| b.slug)
            .collect();

        let mut added = 0;
        for definition in DEFAULT_BADGES.iter().filter(|d| !existing.contains(d.slug)) {
            let model = badge::ActiveModel {
                id: Set(self.id_gen.generate()),
                slug: Set(definition.slug.to_string()),
                name: Set(definition.name.to_string()),
                description: Set(definition.description.to_string()),
                icon: Set(definition.icon.to_string()),
                color: Set(definition.color.to_string()),
                criteria_type: Set(definition.criteria),
                criteria_value: Set(definition.value),
                awarded_count: Set(0),
                created_at: Set(Utc::now().fixed_offset()),
            };

            match model.insert(self.db.as_ref()).await {
                Ok(_) => added += 1,
                Err(e) if is_unique_violation(&e) => {}
                Err(e) => return Err(AppError::Database(e.to_string())),
            }
        }

        if added > 0 {
            info!(added = added, "Badge catalog seeded");
        }
        Ok(added)
    }

    /// Award a badge once. Returns whether it was newly awarded.
    pub async fn award(&self, user_id: &str, slug: &str) -> AppResult<bool> {
        let Some(badge) = self.badge_repo.find_by_slug(slug).await? else {
            warn!(slug = %slug, "Badge not in catalog");
            return Ok(false);
        };

        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let earned = user_badge::ActiveModel {
            id: Set(self.id_gen.generate()),
            user_id: Set(user_id.to_string()),
            badge_id: Set(badge.id.clone()),
            earned_at: Set(Utc::now().fixed_offset()),
        };

        match earned.insert(&txn).await {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => return Ok(false),
            Err(e) => return Err(AppError::Database(e.to_string())),
        }

        Badge::update_many()
            .col_expr(
                badge::Column::AwardedCount,
                Expr::col(badge::Column::AwardedCount).add(1),
            )
            .filter(badge::Column::Id.eq(&badge.id))
            .exec(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        info!(user_id = %user_id, badge = %slug, "Badge awarded");
        Ok(true)
    }

    /// The whole catalog, flagged with what `viewer_id` has earned.
    pub async fn catalog(&self, viewer_id: Option<&str>) -> AppResult<Vec<CatalogBadge>> {
        let earned: HashMap<String, DateTime<FixedOffset>> = match viewer_id {
            Some(viewer) => self
                .badge_repo
                .find_earned_by_user(viewer)
                .await?
                .into_iter()
                .map(|(ub, _)| (ub.badge_id, ub.earned_at))
                .collect(),
            None => HashMap::new(),
        };

        Ok(self
            .badge_repo
            .find_all()
            .await?
            .into_iter()
            .map(|badge| {
                let earned_at = earned.get(&badge.id).copied();
                CatalogBadge {
                    badge,
                    earned: earned_at.is_some(),
                    earned_at,
                }
            })
            .collect())
    }

    /// Badges a user holds, newest first.
    pub async fn user_badges(&self, user_id: &str) -> AppResult<Vec<EarnedBadge>> {
        Ok(self
            .badge_repo
            .find_earned_by_user(user_id)
            .await?
            .into_iter()
            .filter_map(|(earned, badge)| badge.map(|b| EarnedBadge::from_record(&earned, b)))
            .collect())
    }

    /// Users with the most badges.
    ///
    /// Ties are ordered by user id. Holders whose user row is gone are
    /// skipped.
    pub async fn badge_leaderboard(&self) -> AppResult<Vec<BadgeLeader>> {
        let counts = self.badge_repo.count_by_user(BADGE_LEADERBOARD_SIZE).await?;
        let ids: Vec<String> = counts.iter().map(|(id, _)| id.clone()).collect();
        let users: HashMap<String, user::Model> = self
            .user_repo
            .find_by_ids(&ids)
            .await?
            .into_iter()
            .map(|u| (u.id.clone(), u))
            .collect();

        let leaders: Vec<BadgeLeader> = counts
            .into_iter()
            .filter_map(|(user_id, badge_count)| {
                users.get(&user_id).map(|user| BadgeLeader {
                    user: UserSummary::from(user),
                    badge_count,
                })
            })
            .collect();

        if leaders.len() < ids.len() {
            warn!(
                skipped = ids.len() - leaders.len(),
                "Skipped badge holders without a user"
            );
        }
        Ok(leaders)
    }

    /// Evaluate every rule for a user and award what is missing.
    ///
    /// Rank badges are evaluated for all approved memberships; `category_id`
    /// only narrows them when given. Returns the newly awarded slugs.
    pub async fn check_all(
        &self,
        user_id: &str,
        category_id: Option<&str>,
    ) -> AppResult<Vec<String>> {
        let Some(user) = self.user_repo.find_by_id(user_id).await? else {
            debug!(user_id = %user_id, "Skipping badge check for missing user");
            return Ok(vec![]);
        };

        let held: HashSet<String> = self
            .badge_repo
            .find_earned_by_user(user_id)
            .await?
            .into_iter()
            .filter_map(|(_, badge)| badge.map(|b| b.slug))
            .collect();

        let candidates = self.candidates(&user, category_id).await?;

        let mut awarded = Vec::new();
        for slug in candidates.into_iter().filter(|s| !held.contains(*s)) {
            if self.award(user_id, slug).await? {
                awarded.push(slug.to_string());
            }
        }
        Ok(awarded)
    }

    async fn candidates(
        &self,
        user: &user::Model,
        category_id: Option<&str>,
    ) -> AppResult<BTreeSet<&'static str>> {
        let mut slugs = BTreeSet::new();

        slugs.extend(highest_tier(
            i64::from(user.total_votes_received),
            VOTES_RECEIVED,
        ));
        let unique_voters = self.vote_repo.count_distinct_voters(&user.id).await?;
        slugs.extend(highest_tier(to_i64(unique_voters), UNIQUE_VOTERS));

        let cast = self.vote_repo.find_by_voter(&user.id).await?;
        let targets: HashSet<&str> = cast.iter().map(|v| v.voted_for_id.as_str()).collect();
        slugs.extend(highest_tier(to_i64(cast.len() as u64), VOTES_CAST));
        slugs.extend(highest_tier(to_i64(targets.len() as u64), DISTINCT_TARGETS));

        let age_days = (Utc::now().fixed_offset() - user.created_at).num_days();
        slugs.extend(highest_tier(age_days, ACCOUNT_AGE_DAYS));

        slugs.extend(social_badges(user));
        slugs.extend(special_badges(user, &self.config));

        let active = self.membership_repo.find_active_by_user(&user.id).await?;
        if !active.is_empty() {
            slugs.insert("applicant");
        }

        for member in active
            .iter()
            .filter(|m| m.status == MembershipStatus::Approved)
            .filter(|m| category_id.is_none_or(|c| c == m.category_id))
        {
            slugs.extend(["approved", "new-member"]);
            if let Some(position) = self.membership_repo.approval_position(member).await? {
                slugs.extend(join_order_badge(position));
            }
            if let Some(rank) = member.current_rank {
                slugs.extend(rank_badges(rank));
            }
        }

        Ok(slugs)
    }
}

fn to_i64(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}
