use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::backend::{BackendError, ExtractionService};

/// The extracted resume currently held for display.
#[derive(Debug, Clone, Serialize)]
pub struct StoredResume {
    pub username: String,
    /// `extracted_info` exactly as the backend returned it.
    pub extracted_info: Value,
    pub fetched_at: DateTime<Utc>,
}

/// Shared handle to the most recently fetched resume.
///
/// Cloning shares the slot. Every write replaces the previous value, so
/// concurrent fetches end in the state of whichever resolved last.
#[derive(Clone, Default)]
pub struct DataContext {
    slot: Arc<RwLock<Option<StoredResume>>>,
}

impl DataContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self) -> Option<StoredResume> {
        self.slot.read().await.clone()
    }

    pub async fn set(&self, username: &str, extracted_info: Value) {
        debug!("Storing extracted info for '{username}'");
        *self.slot.write().await = Some(StoredResume {
            username: username.to_string(),
            extracted_info,
            fetched_at: Utc::now(),
        });
    }

    pub async fn clear(&self) {
        *self.slot.write().await = None;
    }

    /// Fetches `username`'s resume and stores its `extracted_info`.
    /// Any failure clears the slot; surfacing the error is up to the caller.
    pub async fn fetch(
        &self,
        username: &str,
        service: &dyn ExtractionService,
    ) -> Result<Value, BackendError> {
        let result = service.fetch_resume(username).await.and_then(take_extracted_info);

        match result {
            Ok(info) => {
                self.set(username, info.clone()).await;
                Ok(info)
            }
            Err(e) => {
                warn!("Fetching resume for '{username}' failed: {e}");
                self.clear().await;
                Err(e)
            }
        }
    }
}

/// Pulls `extracted_info` out of a backend response body.
pub fn take_extracted_info(mut body: Value) -> Result<Value, BackendError> {
    match body.get_mut("extracted_info").map(Value::take) {
        Some(info) if !info.is_null() => Ok(info),
        _ => Err(BackendError::MissingField("extracted_info")),
    }
}
