//! Submission of analysis requests
//!
//! Each payload kind has its own endpoint and content type. A successful submission
//! yields the identifier of the job the server created for it.

use crate::client::RelwarcClient;
use crate::error::{ApiError, ProtocolError, RelwarcResult};
use crate::message::JobId;
use bytes::Bytes;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use serde_json::Value;
use std::path::Path;
use tokio::io::AsyncRead;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

/// Header carrying the API token on submission requests
pub const API_TOKEN_HEADER: &str = "X-API-Token";

/// What is being submitted for analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    /// JavaScript source text
    Source,
    /// URL of a page the server fetches itself
    Url,
    /// Tar archive of page resources
    Archive,
}

impl PayloadKind {
    /// Endpoint path, relative to the server root
    pub fn path(&self) -> &'static str {
        match self {
            PayloadKind::Source => "/api/analyze-code",
            PayloadKind::Url => "/api/analyze-url",
            PayloadKind::Archive => "/api/analyze-tar",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            PayloadKind::Source => "text/javascript",
            PayloadKind::Url => "text/plain",
            PayloadKind::Archive => "application/x-tar",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PayloadKind::Source => "source",
            PayloadKind::Url => "url",
            PayloadKind::Archive => "archive",
        }
    }
}

/// Request body of a submission
///
/// In-memory bytes and text convert with `From`; streams and readers are sent
/// chunked unless their length is known up front.
pub struct Payload {
    body: reqwest::Body,
    length: Option<u64>,
}

impl Payload {
    /// Body streamed from a fallible byte stream
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: futures::TryStream + Send + Sync + 'static,
        S::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
        Bytes: From<S::Ok>,
    {
        Self {
            body: reqwest::Body::wrap_stream(stream),
            length: None,
        }
    }

    /// Body streamed from an async reader
    pub fn from_reader<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + Sync + 'static,
    {
        Self::from_stream(ReaderStream::new(reader))
    }

    /// Body streamed from a file, sent with its size as `Content-Length`
    pub async fn from_file(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = tokio::fs::File::open(path.as_ref()).await?;
        let metadata = file.metadata().await?;
        let length = metadata.is_file().then(|| metadata.len());
        Ok(Self {
            body: reqwest::Body::wrap_stream(ReaderStream::new(file)),
            length,
        })
    }

    /// Declare the exact body length of a streamed payload
    pub fn with_length(mut self, length: u64) -> Self {
        self.length = Some(length);
        self
    }

    /// Declared body length, if any
    pub fn length(&self) -> Option<u64> {
        self.length
    }
}

impl std::fmt::Debug for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Payload")
            .field("length", &self.length)
            .finish_non_exhaustive()
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Self { body: bytes.into(), length: None }
    }
}

impl From<Bytes> for Payload {
    fn from(bytes: Bytes) -> Self {
        Self { body: bytes.into(), length: None }
    }
}

impl From<&'static [u8]> for Payload {
    fn from(bytes: &'static [u8]) -> Self {
        Self { body: bytes.into(), length: None }
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Self { body: text.into(), length: None }
    }
}

impl From<&'static str> for Payload {
    fn from(text: &'static str) -> Self {
        Self { body: text.into(), length: None }
    }
}

impl RelwarcClient {
    /// Submit a payload and return the identifier of the created job
    ///
    /// A non-200 response becomes an [`ApiError`]. A 200 response without a usable
    /// `job_id` is a protocol error. Nothing is retried.
    pub async fn submit(&self, kind: PayloadKind, payload: impl Into<Payload>) -> RelwarcResult<JobId> {
        let payload = payload.into();
        let endpoint_url = self.config().endpoint_url(kind.path())?;

        info!(kind = kind.as_str(), endpoint = %endpoint_url, "Submitting analysis request");

        let mut request = self
            .http()
            .post(endpoint_url.clone())
            .header(API_TOKEN_HEADER, self.token_header().clone())
            .header(CONTENT_TYPE, kind.content_type());
        if let Some(length) = payload.length {
            request = request.header(CONTENT_LENGTH, length);
        }

        let response = request.body(payload.body).send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;

        debug!(status, bytes = body.len(), "Submission response received");

        let job_id = parse_submission_response(endpoint_url.as_str(), status, &body)?;
        info!(%job_id, "Job created");
        Ok(job_id)
    }

    /// Submit JavaScript source code
    pub async fn send_source_code_analysis_request(
        &self,
        source_code: impl Into<Payload>,
    ) -> RelwarcResult<JobId> {
        self.submit(PayloadKind::Source, source_code).await
    }

    /// Submit the URL of a page to analyze
    pub async fn send_page_analysis_request(&self, page_url: impl Into<String>) -> RelwarcResult<JobId> {
        self.submit(PayloadKind::Url, page_url.into()).await
    }

    /// Submit a tar archive of page resources
    pub async fn send_tar_analysis_request(
        &self,
        tar_archive: impl Into<Payload>,
    ) -> RelwarcResult<JobId> {
        self.submit(PayloadKind::Archive, tar_archive).await
    }
}

/// Turn a submission response into a job id or the matching error
pub fn parse_submission_response(endpoint_url: &str, status: u16, body: &[u8]) -> RelwarcResult<JobId> {
    let parsed = serde_json::from_slice::<Value>(body);

    if status != 200 {
        let error_message = match parsed.as_ref().ok().and_then(|v| v.get("error")) {
            Some(Value::String(msg)) => msg.clone(),
            _ => String::from_utf8_lossy(body).into_owned(),
        };
        warn!(endpoint = endpoint_url, status, error = %error_message, "Submission rejected");
        return Err(ApiError {
            endpoint_url: endpoint_url.to_string(),
            status,
            error_message,
        }
        .into());
    }

    let value = parsed.map_err(|e| ProtocolError::InvalidSubmitResponse {
        endpoint_url: endpoint_url.to_string(),
        reason: e.to_string(),
    })?;

    match value.get("job_id") {
        None | Some(Value::Null) => Err(ProtocolError::MissingJobId(endpoint_url.to_string()).into()),
        Some(job_id) => serde_json::from_value::<JobId>(job_id.clone()).map_err(|e| {
            ProtocolError::InvalidSubmitResponse {
                endpoint_url: endpoint_url.to_string(),
                reason: format!("job_id is neither a string nor an unsigned integer: {}", e),
            }
            .into()
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorCategory, RelwarcError};

    const ENDPOINT: &str = "http://localhost/api/analyze-code";

    #[test]
    fn test_kind_routing() {
        assert_eq!(PayloadKind::Source.path(), "/api/analyze-code");
        assert_eq!(PayloadKind::Source.content_type(), "text/javascript");
        assert_eq!(PayloadKind::Url.path(), "/api/analyze-url");
        assert_eq!(PayloadKind::Url.content_type(), "text/plain");
        assert_eq!(PayloadKind::Archive.path(), "/api/analyze-tar");
        assert_eq!(PayloadKind::Archive.content_type(), "application/x-tar");
    }

    #[test]
    fn test_success_returns_job_id() {
        let job_id = parse_submission_response(ENDPOINT, 200, br#"{"job_id": "X"}"#).unwrap();
        assert_eq!(job_id, JobId::from("X"));

        let job_id = parse_submission_response(ENDPOINT, 200, br#"{"job_id": 12}"#).unwrap();
        assert_eq!(job_id, JobId::from(12u64));
    }

    #[test]
    fn test_error_field_is_used() {
        let err = parse_submission_response(ENDPOINT, 400, br#"{"error": "bad input"}"#).unwrap_err();
        let api = err.as_api_error().unwrap();
        assert_eq!(api.status, 400);
        assert_eq!(api.error_message, "bad input");
        assert_eq!(api.endpoint_url, ENDPOINT);
    }

    #[test]
    fn test_raw_body_is_used_when_not_json() {
        let err = parse_submission_response(ENDPOINT, 502, b"oops").unwrap_err();
        let api = err.as_api_error().unwrap();
        assert_eq!(api.status, 502);
        assert_eq!(api.error_message, "oops");
    }

    #[test]
    fn test_raw_body_is_used_when_error_field_missing() {
        let err = parse_submission_response(ENDPOINT, 500, br#"{"detail": "nope"}"#).unwrap_err();
        assert_eq!(err.as_api_error().unwrap().error_message, r#"{"detail": "nope"}"#);
    }

    #[test]
    fn test_non_200_success_status_is_still_an_api_error() {
        let err = parse_submission_response(ENDPOINT, 201, br#"{"job_id": "X"}"#).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Api);
    }

    #[test]
    fn test_missing_job_id_is_protocol_error() {
        let err = parse_submission_response(ENDPOINT, 200, br#"{"status": "queued"}"#).unwrap_err();
        assert!(matches!(
            err,
            RelwarcError::Protocol(ProtocolError::MissingJobId(ref url)) if url == ENDPOINT
        ));
    }

    #[test]
    fn test_unparseable_success_body_is_protocol_error() {
        let err = parse_submission_response(ENDPOINT, 200, b"<html>").unwrap_err();
        assert!(matches!(
            err,
            RelwarcError::Protocol(ProtocolError::InvalidSubmitResponse { .. })
        ));

        let err = parse_submission_response(ENDPOINT, 200, br#"{"job_id": [1]}"#).unwrap_err();
        assert!(matches!(
            err,
            RelwarcError::Protocol(ProtocolError::InvalidSubmitResponse { .. })
        ));
    }

    #[test]
    fn test_payload_length() {
        let payload = Payload::from(b"abc".to_vec());
        assert_eq!(payload.length(), None);

        let payload = Payload::from_reader(tokio::io::empty()).with_length(0);
        assert_eq!(payload.length(), Some(0));
    }

    #[tokio::test]
    async fn test_payload_from_file_uses_metadata_length() {
        let path = std::env::temp_dir().join(format!("relwarc-payload-{}.js", std::process::id()));
        tokio::fs::write(&path, b"console.log(1);").await.unwrap();

        let payload = Payload::from_file(&path).await.unwrap();
        assert_eq!(payload.length(), Some(15));

        tokio::fs::remove_file(&path).await.unwrap();
    }
}
