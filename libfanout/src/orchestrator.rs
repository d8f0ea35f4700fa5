//! Publish orchestration
//!
//! Fans a single post out to every platform it targets, concurrently, and
//! aggregates the per-platform outcomes into a [`PublishResult`]. A failure on
//! one platform is recorded and never stops the attempts on the others.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

use futures::future::join_all;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::db::Database;
use crate::error::{FanoutError, PlatformError, Result};
use crate::events::{Event, EventBus};
use crate::platforms::{PlatformRegistry, PlatformResult};
use crate::types::{actions, PlatformOutcome, Post, PublishPayload, PublishResult};

/// Publishes posts through the platform registry
///
/// Cloning is cheap; clones share the store, the registry, the event bus and
/// the set of posts currently being published.
#[derive(Clone)]
pub struct Publisher {
    db: Arc<Database>,
    registry: Arc<PlatformRegistry>,
    events: EventBus,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

/// Claim on a post id for the duration of one publish
struct InFlightGuard {
    posts: Arc<Mutex<HashSet<String>>>,
    post_id: String,
}

impl InFlightGuard {
    fn acquire(posts: &Arc<Mutex<HashSet<String>>>, post_id: &str) -> Option<Self> {
        let inserted = posts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(post_id.to_string());
        inserted.then(|| Self {
            posts: Arc::clone(posts),
            post_id: post_id.to_string(),
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.posts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&self.post_id);
    }
}

impl Publisher {
    pub fn new(db: Arc<Database>, registry: Arc<PlatformRegistry>) -> Self {
        Self::with_events(db, registry, EventBus::default())
    }

    pub fn with_events(db: Arc<Database>, registry: Arc<PlatformRegistry>, events: EventBus) -> Self {
        Self {
            db,
            registry,
            events,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn registry(&self) -> &Arc<PlatformRegistry> {
        &self.registry
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Publish a post to every platform it targets
    ///
    /// The post is marked published when at least one platform accepted it, or
    /// when it targets no platforms at all. When every platform fails the post
    /// stays unpublished and a later call may try again.
    ///
    /// # Errors
    ///
    /// - `FanoutError::PublishInProgress` if this publisher (or a clone of it)
    ///   is already publishing the post
    /// - `FanoutError::NotFound` if no post has this id
    /// - `FanoutError::AlreadyPublished` if the post was already released; the
    ///   store and the audit log are left untouched
    /// - `FanoutError::Database` if the store cannot be read or updated
    ///
    /// Platform failures are never returned as errors; they are reported in
    /// the result map.
    pub async fn publish(&self, post_id: &str) -> Result<PublishResult> {
        let _claim = InFlightGuard::acquire(&self.in_flight, post_id)
            .ok_or_else(|| FanoutError::PublishInProgress(post_id.to_string()))?;

        let post = self
            .db
            .get_post(post_id)
            .await?
            .ok_or_else(|| FanoutError::NotFound(post_id.to_string()))?;

        if post.published {
            return Err(FanoutError::AlreadyPublished(post_id.to_string()));
        }

        info!(
            "Publishing post {} to {} platform(s)",
            post.id,
            post.platforms.len()
        );
        self.events.emit(Event::PublishStarted {
            post_id: post.id.clone(),
            platforms: post.platforms.clone(),
        });

        let outcomes = self.deliver_all(&post).await;
        let result = PublishResult::new(post.id.clone(), outcomes);

        self.record(&result).await?;

        self.events.emit(Event::PublishFinished {
            result: result.clone(),
        });

        Ok(result)
    }

    /// Run every platform attempt concurrently and collect the outcomes
    async fn deliver_all(&self, post: &Post) -> BTreeMap<String, PlatformOutcome> {
        let payload = PublishPayload::from_post(post);

        let attempts = post.platforms.iter().map(|platform_name| {
            let payload = &payload;
            async move {
                let outcome = match self.deliver(platform_name, payload).await {
                    Ok(reference) => {
                        info!("Published {} to {}: {}", post.id, platform_name, reference);
                        PlatformOutcome::delivered(reference)
                    }
                    Err(e) => {
                        warn!("Failed to publish {} to {}: {}", post.id, platform_name, e);
                        PlatformOutcome::failed(&e)
                    }
                };

                self.events.emit(Event::PlatformCompleted {
                    post_id: post.id.clone(),
                    platform: platform_name.clone(),
                    outcome: outcome.clone(),
                });

                (platform_name.clone(), outcome)
            }
        });

        join_all(attempts).await.into_iter().collect()
    }

    /// One platform attempt: resolve, check, authenticate, publish
    async fn deliver(&self, platform_name: &str, payload: &PublishPayload) -> PlatformResult<String> {
        let platform = self.registry.resolve(platform_name)?;

        if !platform.is_configured() {
            return Err(PlatformError::Configuration(format!(
                "{} is not configured",
                platform_name
            )));
        }

        if !platform.is_authenticated() {
            debug!("Authenticating with {}", platform_name);
            platform.authenticate().await?;
        }

        match self.registry.options(platform_name) {
            Some(options) if !options.is_empty() => {
                let mut payload = payload.clone();
                for (key, value) in options {
                    payload.options.insert(key.clone(), value.clone());
                }
                platform.publish(&payload).await
            }
            _ => platform.publish(payload).await,
        }
    }

    /// Apply the outcome to the store and the audit log
    async fn record(&self, result: &PublishResult) -> Result<()> {
        let details = serde_json::to_value(&result.platforms).unwrap_or(Value::Null);

        if !result.success {
            warn!("Every platform failed for post {}", result.post_id);
            self.db
                .append_log(
                    actions::POST_PUBLISH_FAILED,
                    Some(&result.post_id),
                    details,
                )
                .await;
            return Ok(());
        }

        if self.db.mark_published(&result.post_id).await? {
            self.db
                .append_log(actions::POST_PUBLISHED, Some(&result.post_id), details)
                .await;
            return Ok(());
        }

        match self.db.get_post(&result.post_id).await? {
            Some(post) if post.published => {
                // Another publisher released it between our read and our write
                info!(
                    "Post {} was already marked published by a concurrent publish",
                    result.post_id
                );
            }
            _ => {
                // Delivered, but the row went away while the platforms were called
                warn!(
                    "Post {} disappeared while it was being published",
                    result.post_id
                );
                let mut details = details;
                if let Value::Object(map) = &mut details {
                    map.insert("post_missing".to_string(), Value::Bool(true));
                }
                self.db
                    .append_log(actions::POST_PUBLISHED, Some(&result.post_id), details)
                    .await;
            }
        }

        Ok(())
    }
}
