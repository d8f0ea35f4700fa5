//! Console platform: one JSON line per post on stdout (or any writer)

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::json;
use uuid::Uuid;

use crate::error::PlatformError;
use crate::platforms::{Platform, PlatformResult};
use crate::types::{DeliveryState, PlatformStatus, PublishPayload};

pub struct ConsolePlatform {
    name: String,
    writer: Mutex<Box<dyn Write + Send>>,
    authenticated: AtomicBool,
}

impl ConsolePlatform {
    pub fn stdout(name: &str) -> Self {
        Self::with_writer(name, Box::new(std::io::stdout()))
    }

    pub fn with_writer(name: &str, writer: Box<dyn Write + Send>) -> Self {
        Self {
            name: name.to_string(),
            writer: Mutex::new(writer),
            authenticated: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Platform for ConsolePlatform {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_configured(&self) -> bool {
        true
    }

    fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::SeqCst)
    }

    async fn authenticate(&self) -> PlatformResult<()> {
        self.authenticated.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn publish(&self, payload: &PublishPayload) -> PlatformResult<String> {
        if !self.is_authenticated() {
            return Err(PlatformError::Authentication(format!(
                "{} is not authenticated",
                self.name
            )));
        }

        let reference = Uuid::new_v4().to_string();
        let line = json!({
            "reference": reference,
            "platform": self.name,
            "payload": payload,
        });

        let mut writer = self
            .writer
            .lock()
            .map_err(|_| PlatformError::Delivery("console writer is poisoned".to_string()))?;
        writeln!(writer, "{}", line)
            .and_then(|_| writer.flush())
            .map_err(|e| PlatformError::Delivery(format!("Cannot write to console: {}", e)))?;

        Ok(reference)
    }

    async fn get_status(&self, reference: &str) -> PlatformResult<PlatformStatus> {
        Ok(PlatformStatus {
            reference: reference.to_string(),
            state: DeliveryState::Unknown,
            detail: Some("console output is not tracked".to_string()),
        })
    }
}
