//! Business logic services.

#![allow(missing_docs)]

pub mod badge;
pub mod counters;
pub mod dashboard;
pub mod jobs;
pub mod leaderboard;
pub mod ledger;
pub mod membership;
pub mod policy;
pub mod ranking;
pub mod reconcile;
pub mod summary;
pub mod user;
pub mod voting;

pub use badge::{
    BADGE_LEADERBOARD_SIZE, BadgeDefinition, BadgeLeader, BadgeService, CatalogBadge, DEFAULT_BADGES,
};
pub use counters::{CounterDrift, CounterKind, CounterSynchronizer, Forfeiture, ReconcileReport};
pub use dashboard::{
    AdminOverview, CastVote, Dashboard, DashboardService, EarnedBadge, PendingApplication,
    Profile, ProfileStats, RankingSummary,
};
pub use jobs::{Job, JobSender, JobService, JobWorkerContext};
pub use leaderboard::{
    CategoryOverview, Leaderboard, LeaderboardEntry, LeaderboardService, TopMember,
};
pub use ledger::VoteLedger;
pub use membership::{
    Application, ApplicationSummary, ApplyOutcome, CurrentMembership, MembershipService,
    SwitchOutcome,
};
pub use policy::{AlwaysAutoApprove, AutoApprovePolicy, FollowerThresholdPolicy, NeverAutoApprove};
pub use ranking::{RankUpdate, RankingEngine, compute_competition_ranks};
pub use reconcile::ReconcileService;
pub use summary::{CategorySummary, UserSummary};
pub use user::{AdminUserRow, DeletedUser, ExternalIdentity, UserService};
pub use voting::{VoteAction, VotingService};
