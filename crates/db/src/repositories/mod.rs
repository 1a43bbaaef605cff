//! Database repositories.
//!
//! Repositories are the read side of the engine plus plain record writes.
//! Denormalized counters and ranks are written only by the counter
//! synchronizer and ranking engine in `rankx-core`.

mod badge;
mod category;
mod membership;
mod user;
mod vote;

pub use badge::BadgeRepository;
pub use category::CategoryRepository;
pub use membership::MembershipRepository;
pub use user::UserRepository;
pub use vote::VoteRepository;
