//! Job watch stream
//!
//! A job is followed over one WebSocket connection to `/api/job/watch`:
//!
//! ```text
//! connect (Origin: trusted origin) → hello {"token", "job_id"}
//!     ↓
//! progress* → result | error → close
//! ```
//!
//! [`JobWatch`] yields the messages lazily. The connection is closed as soon as a
//! terminal message arrives, released on any error, and dropped with the watch if
//! the caller stops early.

use crate::client::RelwarcClient;
use crate::config::ClientConfig;
use crate::error::{JobError, ProtocolError, RelwarcResult};
use crate::message::{AnalysisResult, ClientHello, JobId, StreamMessage};
use futures::{SinkExt, Stream, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, ORIGIN};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

type WatchSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Lazy, finite sequence of the messages of one job
///
/// Not restartable: once it returned a terminal message or an error, `next`
/// returns `None` and the connection is gone.
pub struct JobWatch {
    job_id: JobId,
    socket: Option<WatchSocket>,
    terminated: bool,
    /// Type of the last message received, when it was one this client does not know
    unknown_kind: Option<String>,
}

impl JobWatch {
    /// Connect to the watch endpoint and subscribe to `job_id`
    pub async fn open(config: &ClientConfig, job_id: JobId) -> RelwarcResult<Self> {
        let mut request = config
            .stream_url()
            .as_str()
            .into_client_request()
            .map_err(ProtocolError::Connect)?;
        // The server refuses connections without a trusted Origin
        let origin = HeaderValue::from_str(config.trusted_origin())
            .map_err(|_| ProtocolError::InvalidHeader("Origin"))?;
        request.headers_mut().insert(ORIGIN, origin);

        debug!(
            url = %config.stream_url(),
            origin = config.trusted_origin(),
            %job_id,
            "Opening job watch stream"
        );
        let (mut socket, _) = connect_async(request)
            .await
            .map_err(ProtocolError::Connect)?;

        let hello = serde_json::to_string(&ClientHello {
            token: config.token(),
            job_id: &job_id,
        })
        .map_err(ProtocolError::EncodeHello)?;
        socket
            .send(Message::text(hello))
            .await
            .map_err(ProtocolError::WebSocket)?;

        debug!(%job_id, "Subscribed to job");
        Ok(Self {
            job_id,
            socket: Some(socket),
            terminated: false,
            unknown_kind: None,
        })
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Whether a terminal message has been received
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Receive the next message
    ///
    /// Returns `None` once the sequence is over: after a terminal message or
    /// after an error has been returned.
    pub async fn next(&mut self) -> Option<RelwarcResult<StreamMessage>> {
        let socket = self.socket.as_mut()?;

        loop {
            let frame = match socket.next().await {
                Some(Ok(frame)) => frame,
                Some(Err(e)) => {
                    self.release();
                    return Some(Err(ProtocolError::WebSocket(e).into()));
                }
                None => {
                    self.release();
                    return Some(Err(self.closed_error().into()));
                }
            };

            match frame {
                Message::Text(text) => {
                    let message = match StreamMessage::from_json(text.as_str()) {
                        Ok(message) => message,
                        Err(e) => {
                            self.release();
                            return Some(Err(e.into()));
                        }
                    };
                    debug!(job_id = %self.job_id, kind = message.kind(), "Stream message received");
                    self.unknown_kind = match &message {
                        StreamMessage::Other(_) => Some(message.kind().to_string()),
                        _ => None,
                    };
                    if message.is_terminal() {
                        self.terminated = true;
                        self.finish().await;
                    }
                    return Some(Ok(message));
                }
                Message::Binary(_) => {
                    self.release();
                    return Some(Err(ProtocolError::UnexpectedBinaryFrame.into()));
                }
                Message::Close(frame) => {
                    debug!(job_id = %self.job_id, ?frame, "Server closed job watch stream");
                    self.release();
                    return Some(Err(self.closed_error().into()));
                }
                // Pongs are queued by tungstenite and flushed on the next read
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            }
        }
    }

    /// Adapt the watch to a `Stream`
    pub fn into_stream(mut self) -> impl Stream<Item = RelwarcResult<StreamMessage>> + Send {
        async_stream::stream! {
            while let Some(item) = self.next().await {
                yield item;
            }
        }
    }

    /// Stop watching with a close handshake instead of just dropping the socket
    pub async fn close(mut self) -> RelwarcResult<()> {
        if let Some(mut socket) = self.socket.take() {
            socket.close(None).await.map_err(ProtocolError::WebSocket)?;
        }
        Ok(())
    }

    async fn finish(&mut self) {
        if let Some(mut socket) = self.socket.take() {
            if let Err(e) = socket.close(None).await {
                debug!(job_id = %self.job_id, error = %e, "Close after terminal message failed");
            }
        }
    }

    fn release(&mut self) {
        self.socket = None;
    }

    /// Error for a stream that ended without a terminal message
    ///
    /// An unknown message type right before closure is reported as such.
    fn closed_error(&mut self) -> ProtocolError {
        match self.unknown_kind.take() {
            Some(kind) => ProtocolError::UnexpectedMessageType(kind),
            None => ProtocolError::ClosedBeforeTerminal(self.job_id.clone()),
        }
    }
}

impl Drop for JobWatch {
    fn drop(&mut self) {
        if self.socket.is_some() {
            debug!(job_id = %self.job_id, "Job watch dropped before a terminal message, releasing connection");
        }
    }
}

impl std::fmt::Debug for JobWatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobWatch")
            .field("job_id", &self.job_id)
            .field("open", &self.socket.is_some())
            .field("terminated", &self.terminated)
            .field("unknown_kind", &self.unknown_kind)
            .finish()
    }
}

impl RelwarcClient {
    /// Open the watch stream of a job
    pub async fn watch_job(&self, job_id: &JobId) -> RelwarcResult<JobWatch> {
        JobWatch::open(self.config(), job_id.clone()).await
    }

    /// Follow a job to its terminal message and return that message
    pub async fn wait_for_job(&self, job_id: &JobId) -> RelwarcResult<StreamMessage> {
        self.wait_for_job_with(job_id, |_| {}).await
    }

    /// Follow a job and return its analysis result
    ///
    /// A terminal `error` message becomes a [`JobError`].
    pub async fn wait_for_job_result(&self, job_id: &JobId) -> RelwarcResult<AnalysisResult> {
        self.wait_for_job_result_with(job_id, |_| {}).await
    }

    /// Like [`RelwarcClient::wait_for_job_result`], calling `on_progress` with every
    /// progress frame
    pub async fn wait_for_job_result_with<F>(
        &self,
        job_id: &JobId,
        on_progress: F,
    ) -> RelwarcResult<AnalysisResult>
    where
        F: FnMut(&Value),
    {
        match self.wait_for_job_with(job_id, on_progress).await? {
            StreamMessage::Result(result) => {
                info!(%job_id, "Job finished");
                Ok(result)
            }
            StreamMessage::Error(error_message) => {
                warn!(%job_id, error = %error_message, "Job failed");
                Err(JobError {
                    job_id: job_id.clone(),
                    error_message,
                }
                .into())
            }
            StreamMessage::Progress(_) => {
                Err(ProtocolError::ClosedBeforeTerminal(job_id.clone()).into())
            }
            other => Err(ProtocolError::UnexpectedMessageType(other.kind().to_string()).into()),
        }
    }

    async fn wait_for_job_with<F>(&self, job_id: &JobId, mut on_progress: F) -> RelwarcResult<StreamMessage>
    where
        F: FnMut(&Value),
    {
        let mut watch = self.watch_job(job_id).await?;
        let mut last = None;

        while let Some(message) = watch.next().await {
            let message = message?;
            if let StreamMessage::Progress(frame) = &message {
                on_progress(frame);
            }
            last = Some(message);
        }

        last.ok_or_else(|| ProtocolError::ClosedBeforeTerminal(job_id.clone()).into())
    }
}
