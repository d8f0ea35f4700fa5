//! Outbox directory platform
//!
//! Delivers each post as a JSON document named `<reference>.json` inside a
//! directory. Another process (a sync job, a static site build, a mail
//! gateway) picks the documents up from there.

use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;
use uuid::Uuid;

use crate::error::PlatformError;
use crate::platforms::{Platform, PlatformResult};
use crate::types::{DeliveryState, PlatformStatus, PublishPayload};

pub struct FilePlatform {
    name: String,
    directory: String,
    authenticated: AtomicBool,
}

impl FilePlatform {
    pub fn new(name: &str, directory: &str) -> Self {
        Self {
            name: name.to_string(),
            directory: directory.to_string(),
            authenticated: AtomicBool::new(false),
        }
    }

    fn outbox(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(self.directory.trim()).to_string())
    }

    /// References are UUIDs we generated; anything else could escape the outbox
    fn document_path(&self, reference: &str) -> PlatformResult<PathBuf> {
        let id = Uuid::parse_str(reference).map_err(|_| {
            PlatformError::Delivery(format!("Invalid {} reference: {}", self.name, reference))
        })?;
        Ok(self.outbox().join(format!("{}.json", id)))
    }

    fn not_configured(&self) -> PlatformError {
        PlatformError::Configuration(format!(
            "{} has no outbox directory configured",
            self.name
        ))
    }

    async fn open_outbox(&self) -> PlatformResult<()> {
        let outbox = self.outbox();
        tokio::fs::create_dir_all(&outbox).await.map_err(|e| {
            PlatformError::Authentication(format!(
                "Cannot create outbox {}: {}",
                outbox.display(),
                e
            ))
        })?;

        let metadata = tokio::fs::metadata(&outbox).await.map_err(|e| {
            PlatformError::Authentication(format!(
                "Cannot inspect outbox {}: {}",
                outbox.display(),
                e
            ))
        })?;
        if !metadata.is_dir() {
            return Err(PlatformError::Authentication(format!(
                "Outbox {} is not a directory",
                outbox.display()
            )));
        }
        if metadata.permissions().readonly() {
            return Err(PlatformError::Authentication(format!(
                "Outbox {} is read-only",
                outbox.display()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Platform for FilePlatform {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_configured(&self) -> bool {
        !self.directory.trim().is_empty()
    }

    fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::SeqCst)
    }

    async fn authenticate(&self) -> PlatformResult<()> {
        if !self.is_configured() {
            self.authenticated.store(false, Ordering::SeqCst);
            return Err(self.not_configured());
        }
        if self.is_authenticated() {
            return Ok(());
        }

        let result = self.open_outbox().await;
        self.authenticated.store(result.is_ok(), Ordering::SeqCst);
        result
    }

    async fn publish(&self, payload: &PublishPayload) -> PlatformResult<String> {
        if !self.is_configured() {
            return Err(self.not_configured());
        }
        if !self.is_authenticated() {
            return Err(PlatformError::Authentication(format!(
                "{} is not authenticated",
                self.name
            )));
        }

        let reference = Uuid::new_v4().to_string();
        let path = self.document_path(&reference)?;
        let document = json!({
            "reference": reference,
            "platform": self.name,
            "delivered_at": chrono::Utc::now().to_rfc3339(),
            "payload": payload,
        });
        let body = serde_json::to_vec_pretty(&document)
            .map_err(|e| PlatformError::Delivery(format!("Cannot encode post: {}", e)))?;

        // Write then rename so readers never see a partial document
        let staging = path.with_extension("json.tmp");
        tokio::fs::write(&staging, body).await.map_err(|e| {
            PlatformError::Delivery(format!("Cannot write {}: {}", staging.display(), e))
        })?;
        tokio::fs::rename(&staging, &path).await.map_err(|e| {
            PlatformError::Delivery(format!("Cannot move {} into place: {}", path.display(), e))
        })?;

        debug!("Wrote {}", path.display());
        Ok(reference)
    }

    async fn get_status(&self, reference: &str) -> PlatformResult<PlatformStatus> {
        let path = self.document_path(reference)?;
        let state = match tokio::fs::try_exists(&path).await {
            Ok(true) => DeliveryState::Published,
            Ok(false) => DeliveryState::Unknown,
            Err(e) => {
                return Err(PlatformError::Delivery(format!(
                    "Cannot check {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        Ok(PlatformStatus {
            reference: reference.to_string(),
            state,
            detail: Some(path.display().to_string()),
        })
    }

    async fn delete_post(&self, reference: &str) -> PlatformResult<bool> {
        let path = self.document_path(reference)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(PlatformError::Delivery(format!(
                "Cannot remove {}: {}",
                path.display(),
                e
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn payload(text: &str) -> PublishPayload {
        PublishPayload {
            text: text.to_string(),
            title: Some("Title".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_is_configured() {
        assert!(FilePlatform::new("archive", "/tmp/outbox").is_configured());
        assert!(!FilePlatform::new("archive", "").is_configured());
        assert!(!FilePlatform::new("archive", "   ").is_configured());
    }

    #[tokio::test]
    async fn test_authenticate_not_configured() {
        let platform = FilePlatform::new("archive", "");
        assert!(matches!(
            platform.authenticate().await,
            Err(PlatformError::Configuration(_))
        ));
        assert!(!platform.is_authenticated());
    }

    #[tokio::test]
    async fn test_authenticate_creates_outbox() {
        let temp_dir = TempDir::new().unwrap();
        let outbox = temp_dir.path().join("outbox");
        let platform = FilePlatform::new("archive", outbox.to_str().unwrap());

        platform.authenticate().await.unwrap();
        assert!(platform.is_authenticated());
        assert!(outbox.is_dir());

        // Second call is a no-op
        platform.authenticate().await.unwrap();
    }

    #[tokio::test]
    async fn test_authenticate_fails_when_outbox_is_a_file() {
        let temp_dir = TempDir::new().unwrap();
        let outbox = temp_dir.path().join("outbox");
        std::fs::write(&outbox, "not a dir").unwrap();

        let platform = FilePlatform::new("archive", outbox.to_str().unwrap());
        assert!(matches!(
            platform.authenticate().await,
            Err(PlatformError::Authentication(_))
        ));
        assert!(!platform.is_authenticated());
    }

    #[tokio::test]
    async fn test_publish_requires_authentication() {
        let temp_dir = TempDir::new().unwrap();
        let platform = FilePlatform::new("archive", temp_dir.path().to_str().unwrap());
        assert!(matches!(
            platform.publish(&payload("hi")).await,
            Err(PlatformError::Authentication(_))
        ));
    }

    #[tokio::test]
    async fn test_publish_writes_document() {
        let temp_dir = TempDir::new().unwrap();
        let platform = FilePlatform::new("archive", temp_dir.path().to_str().unwrap());
        platform.authenticate().await.unwrap();

        let reference = platform.publish(&payload("hello outbox")).await.unwrap();
        let path = temp_dir.path().join(format!("{}.json", reference));
        let document: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();

        assert_eq!(document["reference"], reference.as_str());
        assert_eq!(document["platform"], "archive");
        assert_eq!(document["payload"]["text"], "hello outbox");
        assert_eq!(document["payload"]["title"], "Title");

        // No staging files left behind
        let entries = std::fs::read_dir(temp_dir.path()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[tokio::test]
    async fn test_status_and_delete() {
        let temp_dir = TempDir::new().unwrap();
        let platform = FilePlatform::new("archive", temp_dir.path().to_str().unwrap());
        platform.authenticate().await.unwrap();
        let reference = platform.publish(&payload("bye")).await.unwrap();

        assert_eq!(
            platform.get_status(&reference).await.unwrap().state,
            DeliveryState::Published
        );
        assert!(platform.delete_post(&reference).await.unwrap());
        assert!(!platform.delete_post(&reference).await.unwrap());
        assert_eq!(
            platform.get_status(&reference).await.unwrap().state,
            DeliveryState::Unknown
        );
    }

    #[tokio::test]
    async fn test_rejects_foreign_references() {
        let temp_dir = TempDir::new().unwrap();
        let platform = FilePlatform::new("archive", temp_dir.path().to_str().unwrap());

        assert!(matches!(
            platform.get_status("../../etc/passwd").await,
            Err(PlatformError::Delivery(_))
        ));
        assert!(matches!(
            platform.delete_post("../secret").await,
            Err(PlatformError::Delivery(_))
        ));
    }
}
