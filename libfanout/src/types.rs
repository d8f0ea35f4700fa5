//! Core types for Fanout

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{FanoutError, PlatformError, Result};

/// When a post becomes eligible for release.
///
/// A `Date` carries no time-of-day and is eligible from the start of that
/// calendar day (UTC). An `At` is eligible only once that exact instant has
/// passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Schedule {
    Date(NaiveDate),
    At(DateTime<Utc>),
}

impl Schedule {
    /// Storage form: `YYYY-MM-DD` or `YYYY-MM-DDTHH:MM:SS.nnnnnnnnnZ`.
    ///
    /// Instants keep all nine fractional digits so the value round-trips
    /// exactly. Both forms are fixed width and sort lexically in chronological
    /// order, which the store relies on for `ORDER BY scheduled_at`.
    pub fn to_storage(&self) -> String {
        match self {
            Schedule::Date(date) => date.format("%Y-%m-%d").to_string(),
            Schedule::At(instant) => instant.to_rfc3339_opts(SecondsFormat::Nanos, true),
        }
    }

    /// Parse the storage form back into a schedule
    pub fn from_storage(value: &str) -> Result<Self> {
        let value = value.trim();
        if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
            return Ok(Schedule::Date(date));
        }
        DateTime::parse_from_rfc3339(value)
            .map(|dt| Schedule::At(dt.with_timezone(&Utc)))
            .map_err(|e| FanoutError::Validation(format!("Invalid schedule '{}': {}", value, e)))
    }

    pub fn is_date_only(&self) -> bool {
        matches!(self, Schedule::Date(_))
    }
}

/// Shortest readable form; whole-second instants print without a fraction
impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Schedule::Date(_) => f.write_str(&self.to_storage()),
            Schedule::At(instant) => {
                f.write_str(&instant.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
        }
    }
}

impl TryFrom<String> for Schedule {
    type Error = FanoutError;

    fn try_from(value: String) -> Result<Self> {
        Schedule::from_storage(&value)
    }
}

impl From<Schedule> for String {
    fn from(schedule: Schedule) -> Self {
        schedule.to_storage()
    }
}

/// A scheduled unit of content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub title: Option<String>,
    pub content: String,
    pub platforms: Vec<String>,
    pub scheduled_at: Option<Schedule>,
    pub published: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Fields supplied by a content source when creating a post
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewPost {
    pub title: Option<String>,
    pub content: String,
    pub platforms: Vec<String>,
    pub scheduled_at: Option<Schedule>,
}

impl NewPost {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_platforms<I, S>(mut self, platforms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.platforms = platforms.into_iter().map(Into::into).collect();
        self
    }

    pub fn scheduled(mut self, schedule: Schedule) -> Self {
        self.scheduled_at = Some(schedule);
        self
    }

    /// Validate and normalise into a fresh, unpublished post
    pub fn into_post(self, now: i64) -> Result<Post> {
        validate_content(&self.content)?;
        Ok(Post {
            id: Uuid::new_v4().to_string(),
            title: self.title,
            content: self.content,
            platforms: normalize_platforms(self.platforms)?,
            scheduled_at: self.scheduled_at,
            published: false,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Reject empty or whitespace-only bodies
pub fn validate_content(content: &str) -> Result<()> {
    if content.trim().is_empty() {
        return Err(FanoutError::Validation(
            "Content cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// Trim and lowercase platform identifiers, dropping later duplicates.
pub fn normalize_platforms<I, S>(platforms: I) -> Result<Vec<String>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut normalized: Vec<String> = Vec::new();
    for platform in platforms {
        let name = platform.as_ref().trim().to_lowercase();
        if name.is_empty() {
            return Err(FanoutError::Validation(
                "Platform identifier cannot be empty".to_string(),
            ));
        }
        if !normalized.contains(&name) {
            normalized.push(name);
        }
    }
    Ok(normalized)
}

/// Whitelisted partial update of a post.
///
/// `title` and `scheduled_at` use a nested option: `Some(None)` clears the
/// field, `None` leaves it untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostUpdate {
    pub title: Option<Option<String>>,
    pub content: Option<String>,
    pub platforms: Option<Vec<String>>,
    pub scheduled_at: Option<Option<Schedule>>,
}

impl PostUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: Option<String>) -> Self {
        self.title = Some(title);
        self
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn platforms<I, S>(mut self, platforms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.platforms = Some(platforms.into_iter().map(Into::into).collect());
        self
    }

    pub fn scheduled_at(mut self, schedule: Option<Schedule>) -> Self {
        self.scheduled_at = Some(schedule);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.content.is_none()
            && self.platforms.is_none()
            && self.scheduled_at.is_none()
    }

    /// Names of the fields this update touches, for the audit log
    pub fn field_names(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.title.is_some() {
            fields.push("title");
        }
        if self.content.is_some() {
            fields.push("content");
        }
        if self.platforms.is_some() {
            fields.push("platforms");
        }
        if self.scheduled_at.is_some() {
            fields.push("scheduled_at");
        }
        fields
    }

    /// Build an update from a loosely-typed JSON object.
    ///
    /// Only `title`, `content`, `platforms` and `scheduled_at` are accepted.
    /// `published` is an invariant violation; any other key is invalid input.
    pub fn from_json(value: &Value) -> Result<Self> {
        let object = value.as_object().ok_or_else(|| {
            FanoutError::Validation("Update must be a JSON object".to_string())
        })?;

        let mut update = PostUpdate::new();
        for (key, field) in object {
            match key.as_str() {
                "title" => {
                    update.title = Some(optional_string(key, field)?);
                }
                "content" => {
                    let content = field.as_str().ok_or_else(|| {
                        FanoutError::Validation("content must be a string".to_string())
                    })?;
                    update.content = Some(content.to_string());
                }
                "platforms" => {
                    let items = field.as_array().ok_or_else(|| {
                        FanoutError::Validation("platforms must be an array".to_string())
                    })?;
                    let platforms = items
                        .iter()
                        .map(|item| {
                            item.as_str().map(str::to_string).ok_or_else(|| {
                                FanoutError::Validation(
                                    "platforms must contain strings".to_string(),
                                )
                            })
                        })
                        .collect::<Result<Vec<_>>>()?;
                    update.platforms = Some(platforms);
                }
                "scheduled_at" | "scheduledAt" => {
                    update.scheduled_at = Some(
                        optional_string(key, field)?
                            .map(|s| Schedule::from_storage(&s))
                            .transpose()?,
                    );
                }
                "published" => {
                    return Err(FanoutError::InvariantViolation(
                        "published can only change through publishing".to_string(),
                    ));
                }
                other => {
                    return Err(FanoutError::Validation(format!(
                        "Field '{}' cannot be updated",
                        other
                    )));
                }
            }
        }
        Ok(update)
    }
}

fn optional_string(key: &str, value: &Value) -> Result<Option<String>> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        _ => Err(FanoutError::Validation(format!(
            "{} must be a string or null",
            key
        ))),
    }
}

/// Filter for listing posts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PostFilter {
    pub published: Option<bool>,
}

impl PostFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn unpublished() -> Self {
        Self {
            published: Some(false),
        }
    }

    pub fn published() -> Self {
        Self {
            published: Some(true),
        }
    }
}

/// Immutable audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: i64,
    pub action: String,
    pub post_id: Option<String>,
    pub details: Value,
    pub timestamp: i64,
}

/// Filter for reading the audit log
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogFilter {
    pub action: Option<String>,
    pub post_id: Option<String>,
}

/// Audit log action tags
pub mod actions {
    pub const POST_CREATED: &str = "post_created";
    pub const POST_UPDATED: &str = "post_updated";
    pub const POST_DELETED: &str = "post_deleted";
    pub const POST_PUBLISHED: &str = "post_published";
    pub const POST_PUBLISH_FAILED: &str = "post_publish_failed";
}

/// Uniform payload handed to every adapter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PublishPayload {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub media_refs: Vec<String>,
    /// Platform-specific settings; adapters ignore keys they do not know
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub options: Map<String, Value>,
}

impl PublishPayload {
    pub fn from_post(post: &Post) -> Self {
        Self {
            text: post.content.clone(),
            title: post.title.clone(),
            media_refs: Vec::new(),
            options: Map::new(),
        }
    }
}

/// Outcome of publishing to a single platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PlatformOutcome {
    pub fn delivered(reference: impl Into<String>) -> Self {
        Self {
            success: true,
            reference: Some(reference.into()),
            error: None,
        }
    }

    pub fn failed(error: &PlatformError) -> Self {
        Self {
            success: false,
            reference: None,
            error: Some(error.to_string()),
        }
    }
}

/// Aggregate of one publish call across a post's platforms
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishResult {
    pub post_id: String,
    /// At least one platform succeeded, or there were no platforms at all
    pub success: bool,
    pub platforms: BTreeMap<String, PlatformOutcome>,
}

impl PublishResult {
    pub fn new(post_id: impl Into<String>, platforms: BTreeMap<String, PlatformOutcome>) -> Self {
        let success = platforms.is_empty() || platforms.values().any(|o| o.success);
        Self {
            post_id: post_id.into(),
            success,
            platforms,
        }
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &str> {
        self.platforms
            .iter()
            .filter(|(_, o)| o.success)
            .map(|(name, _)| name.as_str())
    }

    pub fn failed(&self) -> impl Iterator<Item = &str> {
        self.platforms
            .iter()
            .filter(|(_, o)| !o.success)
            .map(|(name, _)| name.as_str())
    }
}

/// Delivery state reported by an adapter for a reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryState {
    Published,
    Deleted,
    Unknown,
}

impl fmt::Display for DeliveryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryState::Published => write!(f, "published"),
            DeliveryState::Deleted => write!(f, "deleted"),
            DeliveryState::Unknown => write!(f, "unknown"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformStatus {
    pub reference: String,
    pub state: DeliveryState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}
