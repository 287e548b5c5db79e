//! Client configuration

use crate::error::ConfigError;
use std::time::Duration;
use url::Url;

/// Public Relwarc deployment used when no server address is given
pub const DEFAULT_SERVER_ADDR: &str = "https://relwarc.solidpoint.net";

/// Path of the job-watch WebSocket endpoint, relative to the server root
pub const JOB_WATCH_PATH: &str = "/api/job/watch";

/// Configuration for a Relwarc client
///
/// The stream URL and the trusted origin are derived from the server address and
/// cannot be set on their own. Changing the server address goes through
/// [`ClientConfig::with_server_addr`], which recomputes both.
#[derive(Clone)]
pub struct ClientConfig {
    token: String,
    server_addr: Url,
    stream_url: Url,
    trusted_origin: String,

    /// Total timeout of a submission request (`None` lets uploads run unbounded)
    pub timeout: Option<Duration>,

    /// Connection timeout of a submission request
    pub connect_timeout: Duration,

    /// User-Agent header value for submission requests
    pub user_agent: String,
}

impl ClientConfig {
    /// Create a config for the default server
    pub fn new(token: impl Into<String>) -> Result<Self, ConfigError> {
        Self::for_server(token, DEFAULT_SERVER_ADDR)
    }

    /// Create a config for the server at `server_addr` (e.g. "http://localhost:8080")
    pub fn for_server(token: impl Into<String>, server_addr: &str) -> Result<Self, ConfigError> {
        let (server_addr, stream_url, trusted_origin) = derive_addresses(server_addr)?;
        Ok(Self {
            token: token.into(),
            server_addr,
            stream_url,
            trusted_origin,
            timeout: None,
            connect_timeout: Duration::from_secs(10),
            user_agent: format!("relwarc-client/{}", env!("CARGO_PKG_VERSION")),
        })
    }

    /// Point the config at another server, recomputing the derived addresses
    pub fn with_server_addr(mut self, server_addr: &str) -> Result<Self, ConfigError> {
        let (server_addr, stream_url, trusted_origin) = derive_addresses(server_addr)?;
        self.server_addr = server_addr;
        self.stream_url = stream_url;
        self.trusted_origin = trusted_origin;
        Ok(self)
    }

    /// Set the submission timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the submission connection timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the User-Agent header
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// API token sent with every submission and in the watch hello frame
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Base URL of the service
    pub fn server_addr(&self) -> &Url {
        &self.server_addr
    }

    /// `ws://` or `wss://` URL of the job-watch endpoint
    pub fn stream_url(&self) -> &Url {
        &self.stream_url
    }

    /// Value of the `Origin` header the watch endpoint expects
    pub fn trusted_origin(&self) -> &str {
        &self.trusted_origin
    }

    /// Resolve an endpoint path against the server address
    pub fn endpoint_url(&self, path: &str) -> Result<Url, ConfigError> {
        Ok(self.server_addr.join(path)?)
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("token", &"[REDACTED]")
            .field("server_addr", &self.server_addr.as_str())
            .field("stream_url", &self.stream_url.as_str())
            .field("trusted_origin", &self.trusted_origin)
            .field("timeout", &self.timeout)
            .finish()
    }
}

fn derive_addresses(server_addr: &str) -> Result<(Url, Url, String), ConfigError> {
    let server_addr = Url::parse(server_addr)?;

    let stream_scheme = match server_addr.scheme() {
        "http" => "ws",
        "https" => "wss",
        other => return Err(ConfigError::UnsupportedScheme(other.to_string())),
    };
    if server_addr.host_str().is_none() {
        return Err(ConfigError::MissingHost(server_addr.to_string()));
    }

    let mut stream_url = server_addr.join(JOB_WATCH_PATH)?;
    stream_url
        .set_scheme(stream_scheme)
        .map_err(|_| ConfigError::UnsupportedScheme(stream_scheme.to_string()))?;

    // url drops :80 for http and :443 for https while parsing, so the origin
    // serialization never carries a default port.
    let trusted_origin = server_addr.origin().ascii_serialization();

    Ok((server_addr, stream_url, trusted_origin))
}
