use std::sync::Arc;

use crate::backend::{BackendClient, ExtractionService};
use crate::config::Config;
use crate::store::DataContext;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    /// Raw forwarding for the `/api` proxy routes.
    pub backend: BackendClient,
    /// Typed backend calls made by the page components.
    pub service: Arc<dyn ExtractionService>,
    /// Most recently fetched resume.
    pub store: DataContext,
}

impl AppState {
    pub fn new(config: Config, backend: BackendClient) -> Self {
        Self {
            service: Arc::new(backend.clone()),
            config,
            backend,
            store: DataContext::new(),
        }
    }
}
