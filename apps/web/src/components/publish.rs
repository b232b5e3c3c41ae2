use serde_json::Value;
use tracing::{info, warn};

use crate::backend::{BackendError, ExtractionService, NETWORK_ERROR_MESSAGE};
use crate::components::OperationState;
use crate::render::PublishView;

pub const MISSING_URL_MESSAGE: &str = "No deployment URL received";
pub const USERNAME_REQUIRED_MESSAGE: &str = "Username is required";

#[derive(Debug, Clone, PartialEq)]
pub struct PublishResult {
    pub url: String,
    pub next_steps: Vec<String>,
}

/// Publish button: asks the backend to deploy a standalone site.
///
/// One request per call, no retry and no deduplication. Clicking twice
/// asks for two deployments.
#[derive(Debug, Default)]
pub struct PublishControl {
    state: OperationState<PublishResult>,
}

impl PublishControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &OperationState<PublishResult> {
        &self.state
    }

    pub async fn publish(
        &mut self,
        service: &dyn ExtractionService,
        username: &str,
        extracted_info: Option<&Value>,
    ) -> &OperationState<PublishResult> {
        let username = username.trim();
        if username.is_empty() {
            self.state = OperationState::Failed(USERNAME_REQUIRED_MESSAGE.to_string());
            return &self.state;
        }

        self.state = OperationState::InProgress { progress: 0 };
        info!("Publishing portfolio for '{username}'");

        self.state = match service.create_project(username, extracted_info).await {
            Ok(body) => match publish_result(&body) {
                Some(result) => {
                    info!("Portfolio for '{username}' published at {}", result.url);
                    OperationState::Done(result)
                }
                None => {
                    warn!("Publish response for '{username}' had no URL: {body}");
                    OperationState::Failed(format!("Deployment failed: {MISSING_URL_MESSAGE}"))
                }
            },
            Err(e) => {
                warn!("Publishing for '{username}' failed: {e}");
                OperationState::Failed(publish_error_message(&e))
            }
        };
        &self.state
    }

    pub fn view(&self) -> PublishView {
        match (self.state.value(), self.state.error()) {
            (Some(result), _) => PublishView {
                url: Some(result.url.clone()),
                next_steps: result.next_steps.clone(),
                error: None,
            },
            (None, Some(message)) => PublishView {
                error: Some(message.to_string()),
                ..PublishView::default()
            },
            (None, None) => PublishView::default(),
        }
    }
}

/// Reads `url` (or `deploymentUrl`) and optional `next_steps`.
pub fn publish_result(body: &Value) -> Option<PublishResult> {
    let url = ["url", "deploymentUrl"]
        .iter()
        .filter_map(|k| body.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .find(|u| !u.is_empty())?
        .to_string();

    let next_steps = match body.get("next_steps") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(String::from)
            .collect(),
        Some(Value::String(step)) if !step.trim().is_empty() => vec![step.clone()],
        _ => Vec::new(),
    };

    Some(PublishResult { url, next_steps })
}

pub fn publish_error_message(error: &BackendError) -> String {
    if error.is_transport() {
        NETWORK_ERROR_MESSAGE.to_string()
    } else {
        format!("Deployment failed: {error}")
    }
}
