//! In-process mock of the Relwarc service
//!
//! Serves the three submission endpoints and the job-watch WebSocket on a random
//! local port, records what the client sent, and plays a scripted list of frames.

#![allow(dead_code)]

use axum::{
    body::Bytes,
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::State,
    http::{header, HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Notify;

/// Behaviour of the mock server
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Job id returned by the submission endpoints
    pub job_id: Value,
    /// Status of submission responses
    pub submit_status: u16,
    /// Raw submission response body (defaults to `{"job_id": <job_id>}`)
    pub submit_body: Option<String>,
    /// Text frames sent after the hello frame
    pub frames: Vec<String>,
    /// Send a close frame once all frames are out
    pub close_after_frames: bool,
    /// Refuse the upgrade unless Origin equals this value
    pub require_origin: Option<String>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            job_id: json!("job-1"),
            submit_status: 200,
            submit_body: None,
            frames: Vec::new(),
            close_after_frames: false,
            require_origin: None,
        }
    }
}

impl MockConfig {
    pub fn frames(mut self, frames: &[Value]) -> Self {
        self.frames = frames.iter().map(Value::to_string).collect();
        self
    }

    pub fn raw_frame(mut self, frame: &str) -> Self {
        self.frames.push(frame.to_string());
        self
    }
}

/// A submission as the server received it
#[derive(Debug, Clone)]
pub struct RecordedSubmission {
    pub path: String,
    pub token: Option<String>,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

#[derive(Clone)]
struct MockState {
    config: Arc<MockConfig>,
    submissions: Arc<Mutex<Vec<RecordedSubmission>>>,
    origins: Arc<Mutex<Vec<Option<String>>>>,
    hellos: Arc<Mutex<Vec<Value>>>,
    disconnected: Arc<Notify>,
}

/// Handle of a running mock server
pub struct MockRelwarc {
    pub url: String,
    state: MockState,
}

impl MockRelwarc {
    pub async fn start(config: MockConfig) -> Self {
        let state = MockState {
            config: Arc::new(config),
            submissions: Arc::default(),
            origins: Arc::default(),
            hellos: Arc::default(),
            disconnected: Arc::new(Notify::new()),
        };

        let app = Router::new()
            .route("/api/analyze-code", post(handle_submit))
            .route("/api/analyze-url", post(handle_submit))
            .route("/api/analyze-tar", post(handle_submit))
            .route("/api/job/watch", get(handle_watch))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        Self {
            url: format!("http://127.0.0.1:{}", port),
            state,
        }
    }

    pub fn submissions(&self) -> Vec<RecordedSubmission> {
        self.state.submissions.lock().unwrap().clone()
    }

    pub fn origins(&self) -> Vec<Option<String>> {
        self.state.origins.lock().unwrap().clone()
    }

    pub fn hellos(&self) -> Vec<Value> {
        self.state.hellos.lock().unwrap().clone()
    }

    /// Wait until a watch connection has been closed by the client
    pub async fn wait_for_disconnect(&self) {
        tokio::time::timeout(Duration::from_secs(5), self.state.disconnected.notified())
            .await
            .expect("client did not release the watch connection");
    }
}

async fn handle_submit(
    State(state): State<MockState>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let header_value = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };

    state.submissions.lock().unwrap().push(RecordedSubmission {
        path: uri.path().to_string(),
        token: header_value("x-api-token"),
        content_type: header_value("content-type"),
        body: body.to_vec(),
    });

    let status = StatusCode::from_u16(state.config.submit_status).unwrap();
    let body = state
        .config
        .submit_body
        .clone()
        .unwrap_or_else(|| json!({ "job_id": state.config.job_id }).to_string());

    (status, body).into_response()
}

async fn handle_watch(
    State(state): State<MockState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let origin = headers
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    state.origins.lock().unwrap().push(origin.clone());

    if let Some(expected) = &state.config.require_origin {
        if origin.as_deref() != Some(expected.as_str()) {
            return StatusCode::FORBIDDEN.into_response();
        }
    }

    ws.on_upgrade(move |socket| run_watch(socket, state))
}

async fn run_watch(mut socket: WebSocket, state: MockState) {
    let hello = match socket.recv().await {
        Some(Ok(Message::Text(text))) => serde_json::from_str(text.as_str()).unwrap_or(Value::Null),
        _ => return,
    };
    state.hellos.lock().unwrap().push(hello);

    for frame in &state.config.frames {
        if socket.send(Message::Text(frame.clone().into())).await.is_err() {
            return;
        }
    }
    if state.config.close_after_frames {
        let _ = socket.send(Message::Close(None)).await;
    }

    loop {
        match socket.recv().await {
            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
            Some(Ok(_)) => continue,
        }
    }
    state.disconnected.notify_one();
}

pub fn progress(step: u64) -> Value {
    json!({ "type": "progress", "step": step })
}

pub fn result(result: Value) -> Value {
    json!({ "type": "result", "result": result })
}

pub fn error(message: &str) -> Value {
    json!({ "type": "error", "message": message })
}
