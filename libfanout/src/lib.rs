//! Fanout - a scheduled post publishing engine
//!
//! Posts are stored in a local SQLite database, released when their schedule
//! arrives, and fanned out concurrently to every platform they target.
//! A post counts as published as soon as one platform accepts it.

pub mod config;
pub mod db;
pub mod eligibility;
pub mod error;
pub mod events;
pub mod logging;
pub mod orchestrator;
pub mod platforms;
pub mod scheduler;
pub mod scheduling;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use db::Database;
pub use error::{FanoutError, PlatformError, Result};
pub use orchestrator::Publisher;
pub use platforms::{Platform, PlatformRegistry};
pub use scheduler::{CycleOutcome, Scheduler, SchedulerState, SweepSummary};
pub use types::{NewPost, Post, PostFilter, PostUpdate, PublishResult, Schedule};
