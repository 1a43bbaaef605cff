//! Ranking and vote-consistency engine for rankx.
//!
//! The write path is split into four collaborators:
//!
//! - [`VoteLedger`]: the authoritative vote rows, one per (voter, category)
//! - [`CounterSynchronizer`]: the only writer of denormalized counters
//! - [`RankingEngine`]: competition ranking with rank-change tracking
//! - [`MembershipService`]: the membership lifecycle and category switching
//!
//! Around them sit [`VotingService`], [`UserService`], the read-side
//! projections ([`LeaderboardService`], [`DashboardService`]), the
//! [`BadgeService`] and the background [`JobService`].

pub mod services;

pub use services::*;
