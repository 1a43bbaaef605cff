//! Common utilities and shared types for rankx.
//!
//! This crate provides foundational components used across all rankx crates:
//!
//! - **Configuration**: Application settings via [`Config`]
//! - **Error handling**: Unified error types via [`AppError`] and [`AppResult`],
//!   resolved to stable [`ErrorCategory`] values for the calling layer
//! - **ID Generation**: ULID-based unique identifiers via [`IdGenerator`]
//!
//! # Example
//!
//! ```no_run
//! use rankx_common::{Config, IdGenerator, AppResult};
//!
//! fn example() -> AppResult<()> {
//!     let config = Config::load()?;
//!     let id_gen = IdGenerator::new();
//!     let id = id_gen.generate();
//!     println!("{id}: auto-approve at {} followers", config.membership.auto_approve_followers);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod id;

pub use config::{
    BadgeConfig, Config, DatabaseConfig, IdentityConfig, LoggingConfig, MembershipConfig,
    WorkerConfig,
};
pub use error::{AppError, AppResult, ErrorCategory};
pub use id::IdGenerator;
