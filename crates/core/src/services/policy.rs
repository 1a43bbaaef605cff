//! Membership policies.
//!
//! Auto-approval is a business rule with a magic threshold, so the
//! lifecycle controller receives it as a trait object instead of
//! branching on constants.

use rankx_common::MembershipConfig;
use rankx_db::entities::user;

/// Decides whether an application skips admin review.
pub trait AutoApprovePolicy: Send + Sync {
    /// Whether the applicant is approved at application time.
    fn should_auto_approve(&self, user: &user::Model) -> bool;
}

/// Approves admins and applicants with enough followers.
#[derive(Debug, Clone, Copy)]
pub struct FollowerThresholdPolicy {
    threshold: i32,
}

impl FollowerThresholdPolicy {
    /// Create a policy with the given follower threshold.
    #[must_use]
    pub const fn new(threshold: i32) -> Self {
        Self { threshold }
    }

    /// Create a policy from the membership configuration.
    #[must_use]
    pub const fn from_config(config: &MembershipConfig) -> Self {
        Self::new(config.auto_approve_followers)
    }
}

impl Default for FollowerThresholdPolicy {
    fn default() -> Self {
        Self::from_config(&MembershipConfig::default())
    }
}

impl AutoApprovePolicy for FollowerThresholdPolicy {
    fn should_auto_approve(&self, user: &user::Model) -> bool {
        user.is_admin || user.followers_count >= self.threshold
    }
}

/// Every application waits for review.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverAutoApprove;

impl AutoApprovePolicy for NeverAutoApprove {
    fn should_auto_approve(&self, _user: &user::Model) -> bool {
        false
    }
}

/// Every application is approved immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysAutoApprove;

impl AutoApprovePolicy for AlwaysAutoApprove {
    fn should_auto_approve(&self, _user: &user::Model) -> bool {
        true
    }
}
