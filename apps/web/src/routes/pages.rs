use askama::Template;
use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::Html,
};
use tracing::{debug, info};

use crate::backend::{BackendError, UploadFile};
use crate::components::publish::PublishControl;
use crate::components::upload::{upload_error_message, UploadForm};
use crate::errors::AppError;
use crate::models::resume::Portfolio;
use crate::render::{portfolio_path, render_empty, render_portfolio, PublishView, UploadPage};
use crate::state::AppState;

pub const UPLOAD_SUCCESS_MESSAGE: &str = "Resume uploaded successfully";

type PageResponse = Result<(StatusCode, Html<String>), AppError>;

/// GET /
pub async fn upload_page() -> Result<Html<String>, AppError> {
    Ok(Html(UploadPage::default().render()?))
}

/// POST /
/// Multipart fields: `file`, `username`, optional `filename`.
pub async fn handle_upload_form(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> PageResponse {
    let mut form = UploadForm::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid form data: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Validation(format!("Invalid file: {e}")))?;
                // Browsers send an empty part when no file was picked.
                if !file_name.is_empty() || !data.is_empty() {
                    form.select_file(UploadFile {
                        file_name,
                        content_type,
                        data,
                    });
                }
            }
            "username" => form.username = read_text(field).await?,
            "filename" => form.filename = Some(read_text(field).await?),
            other => debug!("Ignoring unexpected form field '{other}'"),
        }
    }

    let mut page = UploadPage {
        username: form.username.clone(),
        filename: form.filename.clone().unwrap_or_default(),
        redirect_delay_secs: state.config.redirect_delay_secs,
        ..UploadPage::default()
    };

    let status = match form.submit(state.service.as_ref(), &state.store).await {
        Ok(_) => {
            let username = form.username.trim();
            info!("Resume for '{username}' stored, redirecting to portfolio");
            page.message = UPLOAD_SUCCESS_MESSAGE.to_string();
            page.redirect_url = portfolio_path(username);
            StatusCode::OK
        }
        Err(e) => {
            page.error = form
                .state()
                .error()
                .map(String::from)
                .unwrap_or_else(|| upload_error_message(&e));
            match e {
                BackendError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
                _ => StatusCode::BAD_GATEWAY,
            }
        }
    };

    Ok((status, Html(page.render()?)))
}

async fn read_text(field: axum::extract::multipart::Field<'_>) -> Result<String, AppError> {
    field
        .text()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid form field: {e}")))
}

/// GET /portfolio
/// Renders whatever the store currently holds.
pub async fn current_portfolio(State(state): State<AppState>) -> PageResponse {
    match state.store.get().await {
        Some(stored) => {
            let portfolio = Portfolio::from_extracted(&stored.extracted_info);
            let html = render_portfolio(&stored.username, &portfolio, &PublishView::default())?;
            Ok((StatusCode::OK, Html(html)))
        }
        None => Ok((StatusCode::OK, Html(render_empty(None)?))),
    }
}

/// GET /portfolio/:username
/// Fetches the user's resume into the store, then renders it.
pub async fn portfolio(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> PageResponse {
    match state.store.fetch(&username, state.service.as_ref()).await {
        Ok(info) => {
            let portfolio = Portfolio::from_extracted(&info);
            let html = render_portfolio(&username, &portfolio, &PublishView::default())?;
            Ok((StatusCode::OK, Html(html)))
        }
        Err(e) => {
            let html = render_empty(Some(&e.user_message()))?;
            Ok((fetch_error_status(&e), Html(html)))
        }
    }
}

/// POST /portfolio/:username/publish
/// Publishes once and re-renders the portfolio with the outcome.
/// A failed publish answers 502 with the error shown inline.
pub async fn publish(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> PageResponse {
    let extracted_info = match state.store.get().await {
        Some(stored) if stored.username == username => Some(stored.extracted_info),
        _ => state
            .store
            .fetch(&username, state.service.as_ref())
            .await
            .ok(),
    };

    let mut control = PublishControl::new();
    control
        .publish(state.service.as_ref(), &username, extracted_info.as_ref())
        .await;

    let portfolio = extracted_info
        .as_ref()
        .map(Portfolio::from_extracted)
        .unwrap_or_default();
    let status = match control.state().error() {
        Some(_) => StatusCode::BAD_GATEWAY,
        None => StatusCode::OK,
    };
    let html = render_portfolio(&username, &portfolio, &control.view())?;
    Ok((status, Html(html)))
}

fn fetch_error_status(error: &BackendError) -> StatusCode {
    match error {
        BackendError::Upstream { status: 404, .. } | BackendError::MissingField(_) => {
            StatusCode::NOT_FOUND
        }
        BackendError::Validation(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::BAD_GATEWAY,
    }
}
