//! relwarc-client: async client for the Relwarc code-analysis API
//!
//! A submission is turned into a job over HTTP, then the job is followed over a
//! WebSocket until the server reports its result or its failure.
//!
//! # Architecture
//!
//! - `RelwarcClient`: cloneable handle over a pooled HTTP client and the read-only config
//! - `submit`: `POST /api/analyze-{code,url,tar}` returning a `JobId`
//! - `watch`: `JobWatch`, the lazy message sequence of `/api/job/watch`
//! - `RelwarcError`: closed error taxonomy (API, job, protocol, config)
//!
//! ```ignore
//! use relwarc_client::{ClientConfig, RelwarcClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), relwarc_client::RelwarcError> {
//!     let client = RelwarcClient::new(ClientConfig::new("my-token")?)?;
//!     let result = client.analyze_page_url("https://example.com/").await?;
//!     println!("{}", result);
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod message;
pub mod submit;
pub mod watch;

pub use client::RelwarcClient;
pub use config::{ClientConfig, DEFAULT_SERVER_ADDR};
pub use error::{
    ApiError, ConfigError, ErrorCategory, JobError, ProtocolError, RelwarcError, RelwarcResult,
};
pub use message::{AnalysisResult, JobId, StreamMessage};
pub use submit::{Payload, PayloadKind};
pub use watch::JobWatch;
