//! Wire types shared by the submission and watch endpoints

use crate::error::ProtocolError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Opaque analysis result, passed through without interpretation
pub type AnalysisResult = Value;

/// Identifier of a server-side analysis job
///
/// The server may encode it as a JSON string or an unsigned integer. The original
/// encoding is kept so the hello frame echoes exactly what the server issued.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(JobIdRepr);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
enum JobIdRepr {
    Number(u64),
    Text(String),
}

impl JobId {
    /// Numeric value, when the server issued a numeric id
    pub fn as_u64(&self) -> Option<u64> {
        match &self.0 {
            JobIdRepr::Number(n) => Some(*n),
            JobIdRepr::Text(_) => None,
        }
    }
}

impl From<u64> for JobId {
    fn from(id: u64) -> Self {
        JobId(JobIdRepr::Number(id))
    }
}

impl From<String> for JobId {
    fn from(id: String) -> Self {
        JobId(JobIdRepr::Text(id))
    }
}

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        JobId(JobIdRepr::Text(id.to_string()))
    }
}

/// Parses all-digit input as a numeric id and anything else as a text id
impl FromStr for JobId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.parse::<u64>() {
            Ok(n) => JobId::from(n),
            Err(_) => JobId::from(s),
        })
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            JobIdRepr::Number(n) => write!(f, "{}", n),
            JobIdRepr::Text(s) => f.write_str(s),
        }
    }
}

/// First frame sent on the watch stream
#[derive(Debug, Serialize)]
pub struct ClientHello<'a> {
    pub token: &'a str,
    pub job_id: &'a JobId,
}

/// One message received on the watch stream
#[derive(Debug, Clone, PartialEq)]
pub enum StreamMessage {
    /// Intermediate status; carries the whole frame as sent by the server
    Progress(Value),
    /// Terminal success with the analysis result
    Result(AnalysisResult),
    /// Terminal failure with the server's message
    Error(String),
    /// Non-terminal message of a type this client does not know; carries the whole frame
    Other(Value),
}

impl StreamMessage {
    /// Parse a text frame
    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        let mut value: Value = serde_json::from_str(text)
            .map_err(|e| ProtocolError::InvalidFrame(format!("{}: {}", e, text)))?;

        let kind = match value.get("type").and_then(Value::as_str) {
            Some(kind) => kind.to_string(),
            None => {
                return Err(ProtocolError::InvalidFrame(format!(
                    "missing 'type' field: {}",
                    text
                )))
            }
        };

        match kind.as_str() {
            "progress" => Ok(StreamMessage::Progress(value)),
            "result" => value
                .as_object_mut()
                .and_then(|obj| obj.remove("result"))
                .map(StreamMessage::Result)
                .ok_or(ProtocolError::MissingField {
                    kind: "result",
                    field: "result",
                }),
            "error" => {
                let message = match value.get("message") {
                    Some(Value::String(s)) => s.clone(),
                    Some(Value::Null) | None => String::new(),
                    Some(other) => other.to_string(),
                };
                Ok(StreamMessage::Error(message))
            }
            _ => Ok(StreamMessage::Other(value)),
        }
    }

    /// `result` and `error` end the stream
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamMessage::Result(_) | StreamMessage::Error(_))
    }

    /// Wire name of the message type
    pub fn kind(&self) -> &str {
        match self {
            StreamMessage::Progress(_) => "progress",
            StreamMessage::Result(_) => "result",
            StreamMessage::Error(_) => "error",
            StreamMessage::Other(frame) => frame.get("type").and_then(Value::as_str).unwrap_or_default(),
        }
    }

    /// JSON form of the message, as the server framed it
    pub fn to_json(&self) -> Value {
        match self {
            StreamMessage::Progress(frame) | StreamMessage::Other(frame) => frame.clone(),
            StreamMessage::Result(result) => {
                serde_json::json!({ "type": "result", "result": result })
            }
            StreamMessage::Error(message) => {
                serde_json::json!({ "type": "error", "message": message })
            }
        }
    }
}
