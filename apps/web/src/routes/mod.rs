pub mod health;
pub mod pages;
pub mod proxy;

use axum::{
    extract::DefaultBodyLimit,
    http::Uri,
    routing::{get, post},
    Router,
};

use crate::errors::AppError;
use crate::state::AppState;

/// Largest request body accepted, uploads included.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Pages
        .route(
            "/",
            get(pages::upload_page).post(pages::handle_upload_form),
        )
        .route("/portfolio", get(pages::current_portfolio))
        .route("/portfolio/:username", get(pages::portfolio))
        .route("/portfolio/:username/publish", post(pages::publish))
        // Proxy to the extraction/deployment backend
        .route("/api/upload", post(proxy::handle_upload))
        .route("/api/resume/:username", get(proxy::handle_get_resume))
        .route(
            "/api/create-vercel-project",
            post(proxy::handle_create_project),
        )
        .route(
            "/api/proxy/*path",
            get(proxy::handle_proxy).post(proxy::handle_proxy),
        )
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

async fn not_found(uri: Uri) -> AppError {
    AppError::NotFound(format!("No route for {}", uri.path()))
}
