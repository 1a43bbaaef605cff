//! Database entities.

pub mod badge;
pub mod category;
pub mod membership;
pub mod user;
pub mod user_badge;
pub mod vote;

pub use badge::Entity as Badge;
pub use category::Entity as Category;
pub use membership::Entity as Membership;
pub use user::Entity as User;
pub use user_badge::Entity as UserBadge;
pub use vote::Entity as Vote;
