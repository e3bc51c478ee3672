//! HTTP Client Abstraction
//!
//! Provides async HTTP operations with multipart form support. Retry is not
//! the client's concern: callers classify failures and decide.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::Result;

/// HTTP method types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
}

/// One field of a `multipart/form-data` body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormPart {
    /// Plain text field
    Text { name: String, value: String },
    /// File field, streamed from disk by the client implementation
    File {
        name: String,
        file_name: String,
        path: PathBuf,
    },
}

impl FormPart {
    pub fn name(&self) -> &str {
        match self {
            FormPart::Text { name, .. } | FormPart::File { name, .. } => name,
        }
    }
}

/// Ordered `multipart/form-data` body.
///
/// Field order is preserved; some upload targets (S3 presigned posts) require
/// the file to be the last part.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultipartForm {
    pub parts: Vec<FormPart>,
}

impl MultipartForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.push(FormPart::Text {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    pub fn file(
        mut self,
        name: impl Into<String>,
        file_name: impl Into<String>,
        path: impl Into<PathBuf>,
    ) -> Self {
        self.parts.push(FormPart::File {
            name: name.into(),
            file_name: file_name.into(),
            path: path.into(),
        });
        self
    }

    /// Values of all text fields with the given name, in order
    pub fn text_values(&self, name: &str) -> Vec<&str> {
        self.parts
            .iter()
            .filter_map(|part| match part {
                FormPart::Text { name: n, value } if n == name => Some(value.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// HTTP request builder
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub multipart: Option<MultipartForm>,
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HashMap::new(),
            multipart: None,
            timeout: None,
        }
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn bearer_token(self, token: impl Into<String>) -> Self {
        self.header("Authorization", format!("Bearer {}", token.into()))
    }

    /// Set a pre-encoded `Basic` credential (base64 of `user:password`)
    pub fn basic_credentials(self, encoded: impl Into<String>) -> Self {
        self.header("Authorization", format!("Basic {}", encoded.into()))
    }

    pub fn multipart(mut self, form: MultipartForm) -> Self {
        self.multipart = Some(form);
        self
    }

    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }
}

/// HTTP response
#[derive(Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

impl HttpResponse {
    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Async HTTP client trait
///
/// Implementations perform exactly one attempt per call and report transport
/// failures as [`BridgeError::Timeout`] / [`BridgeError::Connection`] /
/// [`BridgeError::OperationFailed`]. Non-2xx statuses are returned as
/// ordinary responses.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::http::{HttpClient, HttpRequest, HttpMethod, MultipartForm};
///
/// async fn init(client: &dyn HttpClient) -> Result<u16> {
///     let form = MultipartForm::new().text("filename", "book.epub");
///     let request = HttpRequest::new(HttpMethod::Post, "https://api.example.com/uploads/init")
///         .multipart(form);
///
///     let response = client.execute(request).await?;
///     Ok(response.status)
/// }
/// ```
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Execute an HTTP request
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Network connection fails
    /// - TLS validation fails
    /// - Request times out
    /// - A multipart file part cannot be opened
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_request_builder() {
        let request = HttpRequest::new(HttpMethod::Get, "https://example.com")
            .header("User-Agent", "test")
            .bearer_token("secret")
            .timeout(Duration::from_secs(30));

        assert_eq!(request.url, "https://example.com");
        assert_eq!(request.headers.get("User-Agent"), Some(&"test".to_string()));
        assert_eq!(
            request.headers.get("Authorization"),
            Some(&"Bearer secret".to_string())
        );
        assert!(request.multipart.is_none());
    }

    #[test]
    fn test_multipart_preserves_order() {
        let form = MultipartForm::new()
            .text("key", "uploads/abc")
            .text("metadata[author_list][]", "Ursula K. Le Guin")
            .text("metadata[author_list][]", "Another Author")
            .file("file", "book.epub", "/library/book.epub");

        assert_eq!(form.parts.len(), 4);
        assert_eq!(form.parts[3].name(), "file");
        assert_eq!(
            form.text_values("metadata[author_list][]"),
            vec!["Ursula K. Le Guin", "Another Author"]
        );
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let mut headers = HashMap::new();
        headers.insert("retry-after".to_string(), "12".to_string());
        let response = HttpResponse {
            status: 429,
            headers,
            body: Bytes::new(),
        };

        assert_eq!(response.header("Retry-After"), Some("12"));
        assert_eq!(response.header("Content-Type"), None);
    }
}
