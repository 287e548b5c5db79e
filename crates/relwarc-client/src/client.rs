//! Relwarc API client handle and the analyze operations

use crate::config::ClientConfig;
use crate::error::{ConfigError, RelwarcResult};
use crate::message::AnalysisResult;
use crate::submit::{Payload, PayloadKind};
use reqwest::header::HeaderValue;
use std::sync::Arc;

/// Client for the Relwarc code-analysis API
///
/// Cloning is cheap; clones share the HTTP connection pool and the read-only
/// configuration, so concurrent analyses need no extra locking.
///
/// # Example
///
/// ```ignore
/// use relwarc_client::{ClientConfig, RelwarcClient};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = ClientConfig::for_server("token", "http://localhost:8080")?;
///     let client = RelwarcClient::new(config)?;
///
///     let result = client.analyze_source_code("fetch('/api/items')").await?;
///     println!("{}", result);
///
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct RelwarcClient {
    inner: Arc<RelwarcClientInner>,
}

struct RelwarcClientInner {
    http: reqwest::Client,
    config: ClientConfig,
    token_header: HeaderValue,
}

impl RelwarcClient {
    /// Create a new client with the given configuration
    pub fn new(config: ClientConfig) -> Result<Self, ConfigError> {
        let mut token_header =
            HeaderValue::from_str(config.token()).map_err(|_| ConfigError::InvalidToken)?;
        token_header.set_sensitive(true);

        let mut builder = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(&config.user_agent);
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }

        let http = builder
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(Self {
            inner: Arc::new(RelwarcClientInner {
                http,
                config,
                token_header,
            }),
        })
    }

    /// Create a client for the server at `server_addr`
    pub fn for_server(token: impl Into<String>, server_addr: &str) -> Result<Self, ConfigError> {
        Self::new(ClientConfig::for_server(token, server_addr)?)
    }

    /// Get the configuration
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.inner.http
    }

    pub(crate) fn token_header(&self) -> &HeaderValue {
        &self.inner.token_header
    }

    /// Submit JavaScript source code and wait for its analysis result
    pub async fn analyze_source_code(&self, source_code: impl Into<Payload>) -> RelwarcResult<AnalysisResult> {
        let job_id = self.submit(PayloadKind::Source, source_code).await?;
        self.wait_for_job_result(&job_id).await
    }

    /// Submit a page URL and wait for its analysis result
    pub async fn analyze_page_url(&self, page_url: impl Into<String>) -> RelwarcResult<AnalysisResult> {
        let job_id = self.submit(PayloadKind::Url, page_url.into()).await?;
        self.wait_for_job_result(&job_id).await
    }

    /// Submit a page tar archive and wait for its analysis result
    pub async fn analyze_page_tar(&self, tar_archive: impl Into<Payload>) -> RelwarcResult<AnalysisResult> {
        let job_id = self.submit(PayloadKind::Archive, tar_archive).await?;
        self.wait_for_job_result(&job_id).await
    }
}

impl std::fmt::Debug for RelwarcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelwarcClient")
            .field("server_addr", &self.inner.config.server_addr().as_str())
            .field("stream_url", &self.inner.config.stream_url().as_str())
            .finish()
    }
}
