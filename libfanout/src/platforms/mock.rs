//! Mock platform implementation for testing
//!
//! This module provides a configurable mock platform that can simulate various
//! behaviors including successes, failures, and delays. It's designed for use
//! in integration tests to verify multi-platform publishing logic without
//! requiring credentials or network access.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;

use crate::error::PlatformError;
use crate::platforms::{Platform, PlatformResult};
use crate::types::{DeliveryState, PlatformStatus, PublishPayload};

/// Configuration for mock platform behavior
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Platform name (e.g., "feed", "x")
    pub name: String,

    /// Error message for authentication; `None` means authentication succeeds
    pub auth_error: Option<String>,

    /// Error returned by publish; `None` means publishing succeeds
    pub publish_error: Option<PlatformError>,

    /// Fixed reference to return instead of a generated one
    pub reference: Option<String>,

    /// Delay before completing operations (simulates network latency)
    pub delay: Duration,

    /// Whether the platform is configured
    pub is_configured: bool,

    /// Whether delete_post is supported
    pub supports_delete: bool,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            name: "mock".to_string(),
            auth_error: None,
            publish_error: None,
            reference: None,
            delay: Duration::from_millis(0),
            is_configured: true,
            supports_delete: true,
        }
    }
}

/// Mock platform for testing
pub struct MockPlatform {
    config: MockConfig,
    authenticated: AtomicBool,
    auth_calls: AtomicUsize,
    publish_calls: AtomicUsize,
    published: Mutex<Vec<PublishPayload>>,
    live: Mutex<HashSet<String>>,
    deleted: Mutex<HashSet<String>>,
}

impl MockPlatform {
    /// Create a new mock platform with the given configuration
    pub fn new(config: MockConfig) -> Self {
        Self {
            config,
            authenticated: AtomicBool::new(false),
            auth_calls: AtomicUsize::new(0),
            publish_calls: AtomicUsize::new(0),
            published: Mutex::new(Vec::new()),
            live: Mutex::new(HashSet::new()),
            deleted: Mutex::new(HashSet::new()),
        }
    }

    /// Create a mock platform that always succeeds
    pub fn success(name: &str) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            ..Default::default()
        })
    }

    /// Create a mock platform that succeeds with a fixed reference
    pub fn with_reference(name: &str, reference: &str) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            reference: Some(reference.to_string()),
            ..Default::default()
        })
    }

    /// Create a mock platform that fails authentication
    pub fn auth_failure(name: &str, error: &str) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            auth_error: Some(error.to_string()),
            ..Default::default()
        })
    }

    /// Create a mock platform whose deliveries fail
    pub fn publish_failure(name: &str, error: &str) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            publish_error: Some(PlatformError::Delivery(error.to_string())),
            ..Default::default()
        })
    }

    /// Create a mock platform with a delay
    pub fn with_delay(name: &str, delay: Duration) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            delay,
            ..Default::default()
        })
    }

    /// Create a mock platform that is not configured
    pub fn not_configured(name: &str) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            is_configured: false,
            ..Default::default()
        })
    }

    /// Get the number of times authenticate was called
    pub fn auth_call_count(&self) -> usize {
        self.auth_calls.load(Ordering::SeqCst)
    }

    /// Get the number of times publish was called
    pub fn publish_call_count(&self) -> usize {
        self.publish_calls.load(Ordering::SeqCst)
    }

    /// Get every payload that was delivered
    pub fn published_payloads(&self) -> Vec<PublishPayload> {
        lock(&self.published).clone()
    }

    async fn simulate_latency(&self) {
        if !self.config.delay.is_zero() {
            sleep(self.config.delay).await;
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl Platform for MockPlatform {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn is_configured(&self) -> bool {
        self.config.is_configured
    }

    fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::SeqCst)
    }

    async fn authenticate(&self) -> PlatformResult<()> {
        self.auth_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        if !self.config.is_configured {
            self.authenticated.store(false, Ordering::SeqCst);
            return Err(PlatformError::Configuration(format!(
                "{} is not configured",
                self.config.name
            )));
        }

        match &self.config.auth_error {
            None => {
                self.authenticated.store(true, Ordering::SeqCst);
                Ok(())
            }
            Some(error) => {
                self.authenticated.store(false, Ordering::SeqCst);
                Err(PlatformError::Authentication(error.clone()))
            }
        }
    }

    async fn publish(&self, payload: &PublishPayload) -> PlatformResult<String> {
        self.publish_calls.fetch_add(1, Ordering::SeqCst);

        if !self.config.is_configured {
            return Err(PlatformError::Configuration(format!(
                "{} is not configured",
                self.config.name
            )));
        }
        if !self.is_authenticated() {
            return Err(PlatformError::Authentication("Not authenticated".to_string()));
        }

        self.simulate_latency().await;

        if let Some(error) = &self.config.publish_error {
            return Err(error.clone());
        }

        let reference = self
            .config
            .reference
            .clone()
            .unwrap_or_else(|| format!("{}:mock-{}", self.config.name, uuid::Uuid::new_v4()));

        lock(&self.published).push(payload.clone());
        lock(&self.live).insert(reference.clone());
        Ok(reference)
    }

    async fn get_status(&self, reference: &str) -> PlatformResult<PlatformStatus> {
        let state = if lock(&self.live).contains(reference) {
            DeliveryState::Published
        } else if lock(&self.deleted).contains(reference) {
            DeliveryState::Deleted
        } else {
            DeliveryState::Unknown
        };

        Ok(PlatformStatus {
            reference: reference.to_string(),
            state,
            detail: None,
        })
    }

    async fn delete_post(&self, reference: &str) -> PlatformResult<bool> {
        if !self.config.supports_delete {
            return Err(PlatformError::UnsupportedOperation(format!(
                "{} does not support deleting posts",
                self.config.name
            )));
        }

        let removed = lock(&self.live).remove(reference);
        if removed {
            lock(&self.deleted).insert(reference.to_string());
        }
        Ok(removed)
    }
}
