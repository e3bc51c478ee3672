//! BookFusion Calibre API uploader
//!
//! Implements [`RemoteUploader`] with the three-request upload protocol:
//! `init` hands out a presigned storage form, the file is posted to storage,
//! and `finalize` attaches the book metadata.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bridge_traits::catalog::{BookId, CatalogError, CatalogMarkerWriter};
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, MultipartForm};
use bridge_traits::remote::{self, RemoteError, RemoteId, RemoteUploader, UploadRequest};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

use crate::error::{BookFusionError, Result, UploadStage};
use crate::types::{FinalizeResponse, InitResponse};

/// Production API base
pub const DEFAULT_API_BASE: &str = "https://www.bookfusion.com/calibre-api/v1";

/// Per-request timeout handed to the HTTP client
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// How the API key is presented
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthScheme {
    /// API key as the Basic username with an empty password
    #[default]
    Basic,
    Bearer,
}

/// BookFusion uploader
///
/// Each call performs exactly one attempt per request; retry and timeouts
/// are applied by the sync orchestrator.
///
/// # Example
///
/// ```ignore
/// use provider_bookfusion::BookFusionUploader;
///
/// let uploader = BookFusionUploader::new(http_client, markers, DEFAULT_API_BASE, api_key)?;
/// let remote_id = uploader.upload(&path, &request).await?;
/// ```
pub struct BookFusionUploader {
    http_client: Arc<dyn HttpClient>,
    markers: Arc<dyn CatalogMarkerWriter>,
    api_base: String,
    api_key: String,
    auth_scheme: AuthScheme,
}

impl BookFusionUploader {
    /// Create an uploader
    ///
    /// # Errors
    ///
    /// [`BookFusionError::Configuration`] when the API key or base URL is blank.
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        markers: Arc<dyn CatalogMarkerWriter>,
        api_base: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self> {
        let api_key = api_key.into().trim().to_string();
        if api_key.is_empty() {
            return Err(BookFusionError::Configuration(
                "API key must not be empty".to_string(),
            ));
        }
        let api_base = api_base.into().trim().trim_end_matches('/').to_string();
        if api_base.is_empty() {
            return Err(BookFusionError::Configuration(
                "API base URL must not be empty".to_string(),
            ));
        }

        Ok(Self {
            http_client,
            markers,
            api_base,
            api_key,
            auth_scheme: AuthScheme::default(),
        })
    }

    pub fn with_auth_scheme(mut self, scheme: AuthScheme) -> Self {
        self.auth_scheme = scheme;
        self
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn authorized(&self, request: HttpRequest) -> HttpRequest {
        match self.auth_scheme {
            AuthScheme::Basic => {
                request.basic_credentials(STANDARD.encode(format!("{}:", self.api_key)))
            }
            AuthScheme::Bearer => request.bearer_token(self.api_key.as_str()),
        }
    }

    async fn post(
        &self,
        stage: UploadStage,
        url: &str,
        form: MultipartForm,
        authorize: bool,
    ) -> Result<HttpResponse> {
        let mut request = HttpRequest::new(HttpMethod::Post, url)
            .multipart(form)
            .timeout(REQUEST_TIMEOUT);
        if authorize {
            request = self.authorized(request);
        }

        let response = self.http_client.execute(request).await?;
        debug!(stage = %stage, status = response.status, "BookFusion response");
        Ok(response)
    }

    #[instrument(skip(self, request), fields(book_id = %request.identity))]
    async fn init(&self, request: &UploadRequest) -> Result<InitResponse> {
        let form = MultipartForm::new()
            .text("filename", request.file_name.as_str())
            .text("digest", request.digest.as_str());
        let url = format!("{}/uploads/init", self.api_base);
        let response = self.post(UploadStage::Init, &url, form, true).await?;
        check_status(UploadStage::Init, &response, &[200, 201])?;

        let init: InitResponse =
            serde_json::from_slice(&response.body).map_err(|e| BookFusionError::InvalidResponse {
                stage: UploadStage::Init,
                message: e.to_string(),
            })?;
        if init.key().is_none() {
            return Err(BookFusionError::InvalidResponse {
                stage: UploadStage::Init,
                message: "params.key missing".to_string(),
            });
        }
        Ok(init)
    }

    #[instrument(skip(self, init, request, file_path), fields(book_id = %request.identity))]
    async fn store(
        &self,
        init: &InitResponse,
        file_path: &Path,
        request: &UploadRequest,
    ) -> Result<()> {
        // Storage expects the presigned fields first and the file last
        let form = init
            .form_fields()
            .into_iter()
            .fold(MultipartForm::new(), |form, (name, value)| {
                form.text(name, value)
            })
            .file("file", request.file_name.as_str(), file_path);

        let response = self.post(UploadStage::Storage, &init.url, form, false).await?;
        check_status(UploadStage::Storage, &response, &[200, 201, 204])
    }

    #[instrument(skip(self, request), fields(book_id = %request.identity))]
    async fn finalize(&self, key: &str, request: &UploadRequest) -> Result<RemoteId> {
        let form = finalize_form(key, request);
        let url = format!("{}/uploads/finalize", self.api_base);
        let response = self.post(UploadStage::Finalize, &url, form, true).await?;
        check_status(UploadStage::Finalize, &response, &[200, 201])?;

        // The body is informational; an empty or odd body still means success
        let finalized: FinalizeResponse = serde_json::from_slice(&response.body).unwrap_or_default();
        Ok(RemoteId::new(finalized.id().unwrap_or_else(|| key.to_string())))
    }
}

#[async_trait]
impl RemoteUploader for BookFusionUploader {
    #[instrument(skip(self, file_path, request), fields(book_id = %request.identity))]
    async fn upload(&self, file_path: &Path, request: &UploadRequest) -> remote::Result<RemoteId> {
        info!(file_name = %request.file_name, "Uploading book to BookFusion");

        let init = self.init(request).await?;
        let key = init.key().unwrap_or_default();
        self.store(&init, file_path, request).await?;
        let remote_id = self.finalize(&key, request).await?;

        info!(remote_id = %remote_id, "Upload finalized");
        Ok(remote_id)
    }

    #[instrument(skip(self))]
    async fn remove_marker(&self, identity: BookId, marker_tag: &str) -> remote::Result<()> {
        self.markers
            .remove_marker(identity, marker_tag)
            .await
            .map_err(|e| match e {
                CatalogError::Busy(_) => RemoteError::Network(e.to_string()),
                other => RemoteError::Rejected {
                    status: None,
                    message: other.to_string(),
                },
            })
    }
}

fn finalize_form(key: &str, request: &UploadRequest) -> MultipartForm {
    let metadata = &request.metadata;
    let mut form = MultipartForm::new()
        .text("key", key)
        .text("digest", request.digest.as_str())
        .text("metadata[calibre_metadata_digest]", request.digest.as_str())
        .text("metadata[title]", metadata.title.as_str());

    for author in &metadata.authors {
        form = form.text("metadata[author_list][]", author.as_str());
    }
    for tag in &metadata.tags {
        form = form.text("metadata[tag_list][]", tag.as_str());
    }

    let optional = [
        ("metadata[summary]", &metadata.summary),
        ("metadata[isbn]", &metadata.isbn),
        ("metadata[language]", &metadata.language),
    ];
    for (name, value) in optional {
        if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
            form = form.text(name, value);
        }
    }
    form
}

fn check_status(stage: UploadStage, response: &HttpResponse, accepted: &[u16]) -> Result<()> {
    let status = response.status;
    if accepted.contains(&status) {
        return Ok(());
    }

    let message = String::from_utf8_lossy(&response.body).trim().to_string();
    Err(match status {
        401 | 403 => BookFusionError::AuthenticationFailed { stage, status },
        429 => BookFusionError::RateLimited {
            stage,
            retry_after: response.header("Retry-After").and_then(parse_retry_after),
        },
        408 | 500..=599 => BookFusionError::ServerError {
            stage,
            status,
            message,
        },
        _ => BookFusionError::ApiError {
            stage,
            status,
            message,
        },
    })
}

/// `Retry-After` in delta-seconds form; HTTP dates are ignored
fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}
