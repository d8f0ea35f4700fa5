//! Platform abstraction and the adapter registry
//!
//! Every delivery target implements [`Platform`]. The orchestrator never talks
//! to a concrete adapter; it resolves one by identifier through a
//! [`PlatformRegistry`] built at startup.
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use libfanout::platforms::{console::ConsolePlatform, Platform, PlatformRegistry};
//! use libfanout::types::PublishPayload;
//!
//! # async fn example() -> Result<(), libfanout::error::PlatformError> {
//! let mut registry = PlatformRegistry::new();
//! registry.register("stdout", || Ok(Arc::new(ConsolePlatform::stdout("stdout"))));
//!
//! // Identifiers are case-insensitive
//! let platform = registry.resolve("STDOUT")?;
//! if platform.is_configured() {
//!     platform.authenticate().await?;
//!     let reference = platform.publish(&PublishPayload {
//!         text: "Hello, world!".to_string(),
//!         ..Default::default()
//!     }).await?;
//!     println!("Published: {}", reference);
//! }
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::config::{Config, PlatformConfig};
use crate::error::PlatformError;
use crate::types::{PlatformStatus, PublishPayload};

pub mod console;
pub mod file;

// Mock platform is available for all builds (not just tests) to support integration tests
pub mod mock;

/// Result of an adapter call
pub type PlatformResult<T> = std::result::Result<T, PlatformError>;

/// Capability contract for a delivery target
///
/// All methods take `&self`: adapters keep their session behind interior
/// mutability so a shared `Arc<dyn Platform>` can serve concurrent publishes
/// without an outer lock held across network calls.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Identifier this adapter was registered under
    fn name(&self) -> &str;

    /// Check if the platform has the settings or credentials it needs
    ///
    /// Pure and synchronous; never fails.
    fn is_configured(&self) -> bool;

    /// Whether a reusable session is currently established
    fn is_authenticated(&self) -> bool;

    /// Establish a reusable session
    ///
    /// Calling this again once authenticated is cheap. On failure the adapter
    /// must be left unauthenticated.
    ///
    /// # Errors
    ///
    /// - `PlatformError::Configuration` if the adapter is not configured
    /// - `PlatformError::Authentication` for any other failure
    async fn authenticate(&self) -> PlatformResult<()>;

    /// Deliver a payload and return the platform's reference for it
    ///
    /// # Errors
    ///
    /// - `PlatformError::Configuration` if the adapter is not configured
    /// - `PlatformError::Authentication` if there is no valid session
    /// - `PlatformError::Delivery` for anything else, with a readable cause
    async fn publish(&self, payload: &PublishPayload) -> PlatformResult<String>;

    /// Look up what the platform knows about a previously returned reference
    async fn get_status(&self, reference: &str) -> PlatformResult<PlatformStatus>;

    /// Remove a delivered post
    ///
    /// Returns `false` if the platform no longer has it. Adapters that cannot
    /// delete keep this default.
    async fn delete_post(&self, _reference: &str) -> PlatformResult<bool> {
        Err(PlatformError::UnsupportedOperation(format!(
            "{} does not support deleting posts",
            self.name()
        )))
    }
}

/// Constructor for a registered adapter
pub type PlatformFactory = Box<dyn Fn() -> PlatformResult<Arc<dyn Platform>> + Send + Sync>;

/// Startup-time table mapping platform identifiers to adapter constructors.
///
/// Lookups are case-insensitive. An adapter is constructed on first
/// resolution and the instance is reused for the life of the registry, so its
/// authenticated session is reused too.
#[derive(Default)]
pub struct PlatformRegistry {
    factories: HashMap<String, PlatformFactory>,
    options: HashMap<String, Map<String, Value>>,
    instances: Mutex<HashMap<String, Arc<dyn Platform>>>,
}

impl PlatformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry containing every platform in the configuration
    pub fn from_config(config: &Config) -> Self {
        let mut registry = Self::new();

        for (name, platform_config) in &config.platforms {
            let adapter_name = normalize(name);
            match platform_config.clone() {
                PlatformConfig::File { directory, .. } => {
                    registry.register(name, move || {
                        Ok(Arc::new(file::FilePlatform::new(&adapter_name, &directory)))
                    });
                }
                PlatformConfig::Console { .. } => {
                    registry.register(name, move || {
                        Ok(Arc::new(console::ConsolePlatform::stdout(&adapter_name)))
                    });
                }
            }
            registry.set_options(name, platform_config.options().clone());
            debug!("Registered {} platform '{}'", platform_config.kind(), name);
        }

        if registry.factories.is_empty() {
            info!("No platforms are configured");
        } else {
            info!("Registered {} platform(s)", registry.factories.len());
        }

        registry
    }

    /// Register a constructor under `name`, replacing any previous one
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn() -> PlatformResult<Arc<dyn Platform>> + Send + Sync + 'static,
    {
        let key = normalize(name);
        self.lock_instances().remove(&key);
        self.factories.insert(key, Box::new(factory));
    }

    /// Register an already-built adapter
    pub fn register_instance(&mut self, name: &str, platform: Arc<dyn Platform>) {
        self.register(name, move || Ok(Arc::clone(&platform)));
    }

    /// Attach payload options for a platform
    pub fn set_options(&mut self, name: &str, options: Map<String, Value>) {
        self.options.insert(normalize(name), options);
    }

    /// Payload options configured for a platform, if any
    pub fn options(&self, name: &str) -> Option<&Map<String, Value>> {
        self.options.get(&normalize(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(&normalize(name))
    }

    /// Registered identifiers, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Resolve the adapter for `name`, constructing it on first use
    ///
    /// # Errors
    ///
    /// Returns `PlatformError::UnknownPlatform` if nothing is registered under
    /// `name`, or whatever the constructor fails with.
    pub fn resolve(&self, name: &str) -> PlatformResult<Arc<dyn Platform>> {
        let key = normalize(name);
        let mut instances = self.lock_instances();

        if let Some(platform) = instances.get(&key) {
            return Ok(Arc::clone(platform));
        }

        let factory = self
            .factories
            .get(&key)
            .ok_or_else(|| PlatformError::UnknownPlatform(name.to_string()))?;
        let platform = factory()?;
        instances.insert(key, Arc::clone(&platform));
        Ok(platform)
    }

    fn lock_instances(&self) -> MutexGuard<'_, HashMap<String, Arc<dyn Platform>>> {
        // The map is never left half-updated, so a poisoned lock is still usable
        self.instances
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}
