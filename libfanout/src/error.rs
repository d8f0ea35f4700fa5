//! Error types for Fanout

use thiserror::Error;

pub type Result<T> = std::result::Result<T, FanoutError>;

#[derive(Error, Debug)]
pub enum FanoutError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Post not found: {0}")]
    NotFound(String),

    #[error("Post already published: {0}")]
    AlreadyPublished(String),

    #[error("Post is already being published: {0}")]
    PublishInProgress(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
}

impl FanoutError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            FanoutError::Validation(_) | FanoutError::InvariantViolation(_) => 3,
            FanoutError::NotFound(_)
            | FanoutError::AlreadyPublished(_)
            | FanoutError::PublishInProgress(_) => 4,
            FanoutError::Platform(PlatformError::Authentication(_))
            | FanoutError::Platform(PlatformError::Configuration(_)) => 2,
            FanoutError::Config(_) => 2,
            FanoutError::Platform(_) => 1,
            FanoutError::Database(_) => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value: {0}")]
    Invalid(String),
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database operation failed: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

/// Adapter-level failures.
///
/// These are caught per platform by the orchestrator and become one entry in
/// the publish result map; they never abort a multi-platform publish.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    #[error("Unknown platform: {0}")]
    UnknownPlatform(String),

    #[error("Platform not configured: {0}")]
    Configuration(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Delivery failed: {0}")]
    Delivery(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),
}
