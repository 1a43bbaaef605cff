//! ID generation utilities.

use ulid::Ulid;
use uuid::Uuid;

/// ID generator for users, categories, memberships, votes and badges.
#[derive(Debug, Clone, Default)]
pub struct IdGenerator {
    _private: (),
}

impl IdGenerator {
    /// Create a new ID generator.
    #[must_use]
    pub const fn new() -> Self {
        Self { _private: () }
    }

    /// Generate a new lowercase ULID.
    ///
    /// ULIDs sort by creation time, so `ORDER BY id` doubles as a
    /// creation-order tie-breaker for ranking and listings.
    #[must_use]
    pub fn generate(&self) -> String {
        Ulid::new().to_string().to_lowercase()
    }

    /// Generate a short random suffix, used to de-duplicate handles.
    #[must_use]
    pub fn generate_suffix(&self) -> String {
        let simple = Uuid::new_v4().simple().to_string();
        simple[..6].to_string()
    }
}
