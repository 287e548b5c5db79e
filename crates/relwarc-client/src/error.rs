//! Relwarc error types and handling

use crate::message::JobId;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Submission rejected by the server before a job existed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Relwarc API endpoint {endpoint_url} responded with status {status}: {error_message}")]
pub struct ApiError {
    pub endpoint_url: String,
    pub status: u16,
    pub error_message: String,
}

/// The job ran and the server reported that it failed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Relwarc failed to execute job {job_id}, error msg is: {error_message}")]
pub struct JobError {
    pub job_id: JobId,
    pub error_message: String,
}

/// Transport failures and anything the server sent that the protocol does not allow
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Submission request failed below HTTP status level (DNS, TCP, TLS, body)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// WebSocket handshake failed (includes the server refusing the Origin)
    #[error("Failed to open job watch stream: {0}")]
    Connect(#[source] tungstenite::Error),

    /// Sending or receiving on an established WebSocket failed
    #[error("WebSocket error: {0}")]
    WebSocket(#[source] tungstenite::Error),

    /// A header value could not be encoded
    #[error("Invalid header value for {0}")]
    InvalidHeader(&'static str),

    /// 200 response whose body is not the expected JSON document
    #[error("Invalid response from {endpoint_url}: {reason}")]
    InvalidSubmitResponse { endpoint_url: String, reason: String },

    /// 200 response without a job identifier
    #[error("Missing job_id in response from {0}")]
    MissingJobId(String),

    /// Stream frame that is not a JSON message object
    #[error("Invalid stream message: {0}")]
    InvalidFrame(String),

    #[error("Failed to encode job watch hello frame: {0}")]
    EncodeHello(#[source] serde_json::Error),

    #[error("Unexpected binary frame on job watch stream")]
    UnexpectedBinaryFrame,

    /// Message of an unknown type was the last one before the stream closed
    #[error("Unexpected message type: {0}")]
    UnexpectedMessageType(String),

    /// Stream message lacking a field its type requires
    #[error("Stream message of type '{kind}' lacks a '{field}' field")]
    MissingField {
        kind: &'static str,
        field: &'static str,
    },

    /// The server closed the stream without a result or error message
    #[error("Job watch stream for job {0} closed before a terminal message")]
    ClosedBeforeTerminal(JobId),
}

/// Invalid client configuration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid server address: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Bad scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Server address has no host: {0}")]
    MissingHost(String),

    #[error("API token is not a valid header value")]
    InvalidToken,

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),
}

/// Every failure a client operation can report
#[derive(Error, Debug)]
pub enum RelwarcError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Job(#[from] JobError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result type for Relwarc operations
pub type RelwarcResult<T> = Result<T, RelwarcError>;

/// Error category for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Submission rejected with a non-200 status
    Api,
    /// Job reported an execution failure
    Job,
    /// Transport failure or unexpected protocol condition
    Protocol,
    /// Client could not be built
    Config,
}

impl RelwarcError {
    /// Categorize the error for reporting
    pub fn category(&self) -> ErrorCategory {
        match self {
            RelwarcError::Api(_) => ErrorCategory::Api,
            RelwarcError::Job(_) => ErrorCategory::Job,
            RelwarcError::Protocol(_) => ErrorCategory::Protocol,
            RelwarcError::Config(_) => ErrorCategory::Config,
        }
    }

    pub fn as_api_error(&self) -> Option<&ApiError> {
        match self {
            RelwarcError::Api(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_job_error(&self) -> Option<&JobError> {
        match self {
            RelwarcError::Job(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_protocol_error(&self) -> Option<&ProtocolError> {
        match self {
            RelwarcError::Protocol(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for RelwarcError {
    fn from(err: reqwest::Error) -> Self {
        RelwarcError::Protocol(ProtocolError::Http(err))
    }
}
