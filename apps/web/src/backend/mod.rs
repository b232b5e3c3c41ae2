/// Backend client: the single point of entry for all calls to the external
/// extraction/deployment service.
///
/// Page handlers, components and the proxy routes all go through
/// `BackendClient`. Nothing else builds outbound requests.
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, Url};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::Config;

pub mod forward;
pub mod progress;

use progress::ProgressStream;

/// Shown for transport failures, where the backend never answered.
pub const NETWORK_ERROR_MESSAGE: &str =
    "Network error. Please check your internet connection and try again.";

/// Callback receiving upload progress as a percentage in `0..=100`.
pub type ProgressFn = Arc<dyn Fn(u8) + Send + Sync>;

#[derive(Debug, Error)]
pub enum BackendError {
    /// Client-side check failed; no request was sent.
    #[error("{0}")]
    Validation(String),

    #[error("HTTP error: {0}")]
    Network(#[source] reqwest::Error),

    #[error("Request timed out")]
    Timeout,

    /// Upstream answered with a non-2xx status.
    #[error("{message}")]
    Upstream { status: u16, message: String },

    /// Upstream answered 2xx but without a field we need.
    #[error("Response is missing the '{0}' field")]
    MissingField(&'static str),

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid backend URL: {0}")]
    InvalidUrl(String),
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            BackendError::Timeout
        } else {
            BackendError::Network(e)
        }
    }
}

impl BackendError {
    /// True when the backend never produced a response.
    pub fn is_transport(&self) -> bool {
        matches!(self, BackendError::Network(_) | BackendError::Timeout)
    }

    /// Message suitable for an inline alert.
    pub fn user_message(&self) -> String {
        if self.is_transport() {
            NETWORK_ERROR_MESSAGE.to_string()
        } else {
            self.to_string()
        }
    }
}

/// A resume file picked for upload.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub file_name: String,
    pub content_type: String,
    pub data: Bytes,
}

/// Multipart upload as sent to `POST /upload`.
#[derive(Clone)]
pub struct UploadRequest {
    pub file: UploadFile,
    pub username: String,
    pub filename: Option<String>,
    pub on_progress: Option<ProgressFn>,
}

#[derive(Debug, Serialize)]
struct CreateProjectRequest<'a> {
    username: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    extracted_info: Option<&'a Value>,
}

/// Operations the rest of the app needs from the extraction service.
/// Implemented by `BackendClient`; tests substitute fakes.
#[async_trait]
pub trait ExtractionService: Send + Sync {
    /// POST /upload. Returns the full JSON response body.
    async fn upload(&self, request: UploadRequest) -> Result<Value, BackendError>;

    /// GET /resume/{username}. Returns the full JSON response body.
    async fn fetch_resume(&self, username: &str) -> Result<Value, BackendError>;

    /// POST /create-vercel-project. Returns the full JSON response body.
    async fn create_project(
        &self,
        username: &str,
        extracted_info: Option<&Value>,
    ) -> Result<Value, BackendError>;
}

#[derive(Clone)]
pub struct BackendClient {
    client: Client,
    base_url: String,
    upload_timeout: Duration,
    publish_timeout: Duration,
    request_timeout: Duration,
}

impl BackendClient {
    pub fn new(config: &Config) -> Result<Self, BackendError> {
        Url::parse(&config.backend_base_url)
            .map_err(|e| BackendError::InvalidUrl(format!("{}: {e}", config.backend_base_url)))?;

        Ok(Self {
            client: Client::builder().build()?,
            base_url: config.backend_base_url.clone(),
            upload_timeout: config.upload_timeout,
            publish_timeout: config.publish_timeout,
            request_timeout: config.request_timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Appends percent-encoded path segments to the base URL.
    /// Dot segments are refused so the result stays under the base path.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, BackendError> {
        for segment in segments {
            check_segment(segment)?;
        }
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| BackendError::InvalidUrl(format!("{}: {e}", self.base_url)))?;
        url.path_segments_mut()
            .map_err(|_| BackendError::InvalidUrl(self.base_url.clone()))?
            .pop_if_empty()
            .extend(segments.iter().copied());
        Ok(url)
    }
}

#[async_trait]
impl ExtractionService for BackendClient {
    async fn upload(&self, request: UploadRequest) -> Result<Value, BackendError> {
        let UploadRequest {
            file,
            username,
            filename,
            on_progress,
        } = request;

        let total = file.data.len() as u64;
        let stream = ProgressStream::new(file.data, on_progress);
        let part = Part::stream_with_length(reqwest::Body::wrap_stream(stream), total)
            .file_name(file.file_name)
            .mime_str(&file.content_type)
            .map_err(|_| {
                BackendError::Validation(format!("Invalid content type '{}'", file.content_type))
            })?;

        let mut form = Form::new().part("file", part).text("username", username);
        if let Some(filename) = filename {
            form = form.text("filename", filename);
        }

        let url = self.endpoint(&["upload"])?;
        debug!("Uploading resume to {url} ({total} bytes)");

        let response = self
            .client
            .post(url)
            .multipart(form)
            .timeout(self.upload_timeout)
            .send()
            .await?;

        read_json(response).await
    }

    async fn fetch_resume(&self, username: &str) -> Result<Value, BackendError> {
        let url = self.endpoint(&["resume", username])?;
        debug!("Fetching resume from {url}");

        let response = self
            .client
            .get(url)
            .timeout(self.request_timeout)
            .send()
            .await?;

        read_json(response).await
    }

    async fn create_project(
        &self,
        username: &str,
        extracted_info: Option<&Value>,
    ) -> Result<Value, BackendError> {
        let url = self.endpoint(&["create-vercel-project"])?;
        debug!("Requesting deployment for '{username}' at {url}");

        let response = self
            .client
            .post(url)
            .json(&CreateProjectRequest {
                username,
                extracted_info,
            })
            .timeout(self.publish_timeout)
            .send()
            .await?;

        read_json(response).await
    }
}

/// True for `.` and `..`, percent-encoded spellings included. URL parsing
/// would resolve these against the base path.
pub fn is_dot_segment(segment: &str) -> bool {
    let decoded = segment.to_ascii_lowercase().replace("%2e", ".");
    decoded == "." || decoded == ".."
}

pub(crate) fn check_segment(segment: &str) -> Result<&str, BackendError> {
    if is_dot_segment(segment) {
        Err(BackendError::Validation(format!(
            "Invalid path segment '{segment}'"
        )))
    } else {
        Ok(segment)
    }
}

/// Reads a backend response as JSON.
/// Non-2xx statuses become `Upstream` carrying the body's `error` message.
pub(crate) async fn read_json(response: Response) -> Result<Value, BackendError> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        let message = upstream_error_message(&body)
            .unwrap_or_else(|| format!("HTTP error! status: {}", status.as_u16()));
        warn!("Backend returned {status}: {message}");
        return Err(BackendError::Upstream {
            status: status.as_u16(),
            message,
        });
    }

    Ok(serde_json::from_str(&body)?)
}

fn upstream_error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value
        .get("error")
        .or_else(|| value.get("message"))
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .map(String::from)
}


#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use axum::extract::{Multipart, Path};
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::json;

    use super::testing::{pdf, spawn_upstream};
    use super::*;

    async fn client_for(router: Router) -> BackendClient {
        let base = spawn_upstream(router).await;
        BackendClient::new(&Config::for_backend(&base)).unwrap()
    }

    #[test]
    fn test_upstream_error_message_prefers_error_field() {
        assert_eq!(
            upstream_error_message(r#"{"error": "Invalid file type"}"#).as_deref(),
            Some("Invalid file type")
        );
        assert_eq!(
            upstream_error_message(r#"{"message": "Deployment failed"}"#).as_deref(),
            Some("Deployment failed")
        );
        assert_eq!(upstream_error_message("<html>oops</html>"), None);
        assert_eq!(upstream_error_message(r#"{"error": ""}"#), None);
    }

    #[test]
    fn test_endpoint_encodes_username() {
        let client = BackendClient::new(&Config::for_backend("http://localhost:5000/api/")).unwrap();
        let url = client.endpoint(&["resume", "jane doe/../x"]).unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:5000/api/resume/jane%20doe%2F..%2Fx"
        );
    }

    #[test]
    fn test_endpoint_refuses_dot_segments() {
        let client = BackendClient::new(&Config::for_backend("http://localhost:5000/api")).unwrap();
        for segment in ["..", ".", "%2E%2E", "%2e.", ".%2E"] {
            let err = client.endpoint(&["resume", segment]).unwrap_err();
            assert!(matches!(err, BackendError::Validation(_)), "{segment}");
        }
        assert!(is_dot_segment("%2e%2E"));
        assert!(!is_dot_segment("..."));
        assert!(!is_dot_segment("jane.doe"));
    }

    #[tokio::test]
    async fn test_fetch_dot_username_never_reaches_backend() {
        let hits = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = hits.clone();
        let router = Router::new().fallback(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Json(json!({"extracted_info": {}}))
            }
        });
        let base = spawn_upstream(router).await;
        let client =
            BackendClient::new(&Config::for_backend(&format!("{base}/api"))).unwrap();

        let err = client.fetch_resume("..").await.unwrap_err();
        assert!(matches!(err, BackendError::Validation(_)));
        assert_eq!(hits.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_slow_backend_times_out_with_network_message() {
        let router = Router::new().route(
            "/resume/:username",
            get(|| async {
                tokio::time::sleep(std::time::Duration::from_secs(3)).await;
                Json(json!({"extracted_info": {}}))
            }),
        );
        let base = spawn_upstream(router).await;
        let mut config = Config::for_backend(&base);
        config.request_timeout = Duration::from_secs(1);
        let client = BackendClient::new(&config).unwrap();

        let err = client.fetch_resume("jane").await.unwrap_err();
        assert!(matches!(err, BackendError::Timeout), "{err:?}");
        assert!(err.is_transport());
        assert_eq!(err.user_message(), NETWORK_ERROR_MESSAGE);
    }

    #[test]
    fn test_transport_errors_get_generic_message() {
        assert_eq!(BackendError::Timeout.user_message(), NETWORK_ERROR_MESSAGE);
        let upstream = BackendError::Upstream {
            status: 400,
            message: "Invalid file type".into(),
        };
        assert!(!upstream.is_transport());
        assert_eq!(upstream.user_message(), "Invalid file type");
    }

    #[tokio::test]
    async fn test_upload_sends_multipart_fields_and_reports_progress() {
        let received: Arc<Mutex<Vec<(String, Vec<u8>)>>> = Arc::default();
        let sink = received.clone();
        let router = Router::new().route(
            "/upload",
            post(move |mut multipart: Multipart| {
                let sink = sink.clone();
                async move {
                    while let Some(field) = multipart.next_field().await.unwrap() {
                        let name = field.name().unwrap_or_default().to_string();
                        let data = field.bytes().await.unwrap().to_vec();
                        sink.lock().unwrap().push((name, data));
                    }
                    Json(json!({
                        "message": "File uploaded successfully",
                        "extracted_info": {"Name": "Jane Doe"}
                    }))
                }
            }),
        );
        let client = client_for(router).await;

        let progress: Arc<Mutex<Vec<u8>>> = Arc::default();
        let progress_sink = progress.clone();
        let file = pdf("resume.pdf");
        let expected_bytes = file.data.to_vec();

        let response = client
            .upload(UploadRequest {
                file,
                username: "jane".into(),
                filename: Some("jane-resume".into()),
                on_progress: Some(Arc::new(move |p| progress_sink.lock().unwrap().push(p))),
            })
            .await
            .unwrap();

        assert_eq!(response["extracted_info"]["Name"], "Jane Doe");

        let fields = received.lock().unwrap().clone();
        assert_eq!(fields.len(), 3);
        assert_eq!(fields[0], ("file".to_string(), expected_bytes));
        assert_eq!(fields[1], ("username".to_string(), b"jane".to_vec()));
        assert_eq!(fields[2], ("filename".to_string(), b"jane-resume".to_vec()));

        let progress = progress.lock().unwrap().clone();
        assert_eq!(progress.last(), Some(&100));
        assert!(progress.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn test_upload_error_body_is_surfaced() {
        let router = Router::new().route(
            "/upload",
            post(|| async {
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({"error": "Invalid file type"})),
                )
            }),
        );
        let client = client_for(router).await;

        let err = client
            .upload(UploadRequest {
                file: pdf("resume.pdf"),
                username: "jane".into(),
                filename: None,
                on_progress: None,
            })
            .await
            .unwrap_err();

        match err {
            BackendError::Upstream { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "Invalid file type");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fetch_resume_uses_username_path() {
        let router = Router::new().route(
            "/resume/:username",
            get(|Path(username): Path<String>| async move {
                Json(json!({"extracted_info": {"Name": username}}))
            }),
        );
        let client = client_for(router).await;

        let body = client.fetch_resume("alok").await.unwrap();
        assert_eq!(body["extracted_info"]["Name"], "alok");
    }

    #[tokio::test]
    async fn test_non_json_error_falls_back_to_status() {
        let router = Router::new().route(
            "/resume/:username",
            get(|| async { (StatusCode::BAD_GATEWAY, "upstream down") }),
        );
        let client = client_for(router).await;

        let err = client.fetch_resume("alok").await.unwrap_err();
        assert_eq!(err.to_string(), "HTTP error! status: 502");
    }

    #[tokio::test]
    async fn test_create_project_omits_missing_extracted_info() {
        let router = Router::new().route(
            "/create-vercel-project",
            post(|Json(body): Json<Value>| async move { Json(json!({ "echo": body })) }),
        );
        let client = client_for(router).await;

        let body = client.create_project("alok", None).await.unwrap();
        assert_eq!(body["echo"], json!({"username": "alok"}));

        let info = json!({"Name": "Alok"});
        let body = client.create_project("alok", Some(&info)).await.unwrap();
        assert_eq!(body["echo"]["extracted_info"]["Name"], "Alok");
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_transport_error() {
        // Bind then drop to get a port nobody listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = BackendClient::new(&Config::for_backend(&format!("http://{addr}"))).unwrap();
        let err = client.fetch_resume("alok").await.unwrap_err();
        assert!(err.is_transport(), "expected transport error, got {err:?}");
    }
}
