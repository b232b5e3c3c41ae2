use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use tracing::{info, trace, warn};

use crate::backend::{
    BackendError, ExtractionService, ProgressFn, UploadFile, UploadRequest, NETWORK_ERROR_MESSAGE,
};
use crate::components::OperationState;
use crate::store::{take_extracted_info, DataContext};

pub const MISSING_FILE_MESSAGE: &str = "Please select a file";
pub const MISSING_USERNAME_MESSAGE: &str = "Please enter a username";
pub const NOT_PDF_MESSAGE: &str = "Only PDF files are allowed";
pub const UPLOAD_FALLBACK_MESSAGE: &str = "An error occurred while uploading the file";
pub const NOTHING_EXTRACTED_MESSAGE: &str = "No information could be extracted from this resume";
pub const UPLOAD_IN_PROGRESS_MESSAGE: &str = "An upload is already in progress";

/// Resume upload form: a PDF plus the username it is filed under.
#[derive(Default)]
pub struct UploadForm {
    pub file: Option<UploadFile>,
    pub username: String,
    pub filename: Option<String>,
    state: Arc<Mutex<OperationState<Value>>>,
}

impl UploadForm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Picks a file and resets any previous error.
    pub fn select_file(&mut self, file: UploadFile) {
        self.file = Some(file);
        self.set_state(OperationState::Idle);
    }

    pub fn state(&self) -> OperationState<Value> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_state(&self, state: OperationState<Value>) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Checks everything that can be checked without the network.
    pub fn validate(&self) -> Result<&UploadFile, BackendError> {
        let file = self
            .file
            .as_ref()
            .ok_or_else(|| BackendError::Validation(MISSING_FILE_MESSAGE.to_string()))?;
        if self.username.trim().is_empty() {
            return Err(BackendError::Validation(MISSING_USERNAME_MESSAGE.to_string()));
        }
        if !is_pdf(file) {
            return Err(BackendError::Validation(NOT_PDF_MESSAGE.to_string()));
        }
        Ok(file)
    }

    /// Uploads the resume and, on success, stores its `extracted_info`.
    ///
    /// Validation failures return before any request is made. A response
    /// without `extracted_info` clears the store; other failures leave it as is.
    pub async fn submit(
        &self,
        service: &dyn ExtractionService,
        store: &DataContext,
    ) -> Result<Value, BackendError> {
        if self.state().is_busy() {
            return Err(BackendError::Validation(
                UPLOAD_IN_PROGRESS_MESSAGE.to_string(),
            ));
        }

        let file = match self.validate() {
            Ok(file) => file.clone(),
            Err(e) => {
                self.set_state(OperationState::Failed(e.to_string()));
                return Err(e);
            }
        };

        let username = self.username.trim().to_string();
        self.set_state(OperationState::InProgress { progress: 0 });

        let progress_state = self.state.clone();
        let on_progress: ProgressFn = Arc::new(move |percent| {
            trace!("Upload progress: {percent}%");
            let mut state = progress_state.lock().unwrap_or_else(PoisonError::into_inner);
            if let OperationState::InProgress { progress } = &mut *state {
                *progress = percent;
            }
        });

        info!("Uploading '{}' for '{username}'", file.file_name);
        let result = service
            .upload(UploadRequest {
                file,
                username: username.clone(),
                filename: self
                    .filename
                    .as_deref()
                    .map(str::trim)
                    .filter(|f| !f.is_empty())
                    .map(String::from),
                on_progress: Some(on_progress),
            })
            .await
            .and_then(take_extracted_info);

        match result {
            Ok(info) => {
                store.set(&username, info.clone()).await;
                self.set_state(OperationState::Done(info.clone()));
                Ok(info)
            }
            Err(e) => {
                warn!("Upload for '{username}' failed: {e}");
                if matches!(e, BackendError::MissingField(_)) {
                    store.clear().await;
                }
                self.set_state(OperationState::Failed(upload_error_message(&e)));
                Err(e)
            }
        }
    }
}

/// Server-provided messages are shown verbatim; anything else gets a
/// generic message.
pub fn upload_error_message(error: &BackendError) -> String {
    match error {
        BackendError::Validation(message) | BackendError::Upstream { message, .. } => {
            message.clone()
        }
        BackendError::MissingField(_) => NOTHING_EXTRACTED_MESSAGE.to_string(),
        e if e.is_transport() => NETWORK_ERROR_MESSAGE.to_string(),
        _ => UPLOAD_FALLBACK_MESSAGE.to_string(),
    }
}

fn is_pdf(file: &UploadFile) -> bool {
    file.file_name.to_ascii_lowercase().ends_with(".pdf")
        || file
            .content_type
            .split(';')
            .next()
            .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/pdf"))
}
