//! Wire envelope shared by every message on the robot connection.
//!
//! ```json
//! { "session_id": "…", "local_timestamp": 1712345678.123,
//!   "payload": { "type": "instruction", "instruction": "fetch_network", "message": {} } }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{Result, RmcsError};

/// One framed message: correlation id, sender clock, and a typed payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub session_id: Option<String>,
    /// Seconds since the Unix epoch on the sending side.
    pub local_timestamp: Option<f64>,
    pub payload: Payload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Payload {
    Instruction { instruction: String, message: Value },
    Response { message: Value },
    Event { event: String, detail: Value },
}

impl Payload {
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Instruction { .. } => "instruction",
            Payload::Response { .. } => "response",
            Payload::Event { .. } => "event",
        }
    }

    /// Handler name for instructions and events.
    pub fn name(&self) -> Option<&str> {
        match self {
            Payload::Instruction { instruction, .. } => Some(instruction),
            Payload::Event { event, .. } => Some(event),
            Payload::Response { .. } => None,
        }
    }

    /// The JSON body: `message` for instructions/responses, `detail` for events.
    pub fn body(&self) -> &Value {
        match self {
            Payload::Instruction { message, .. } | Payload::Response { message } => message,
            Payload::Event { detail, .. } => detail,
        }
    }
}

impl Envelope {
    pub fn instruction(
        session_id: Option<String>,
        instruction: impl Into<String>,
        message: Value,
    ) -> Self {
        Self {
            session_id,
            local_timestamp: None,
            payload: Payload::Instruction {
                instruction: instruction.into(),
                message,
            },
        }
    }

    pub fn response(session_id: impl Into<String>, message: Value) -> Self {
        Self {
            session_id: Some(session_id.into()),
            local_timestamp: None,
            payload: Payload::Response { message },
        }
    }

    pub fn event(session_id: Option<String>, event: impl Into<String>, detail: Value) -> Self {
        Self {
            session_id,
            local_timestamp: None,
            payload: Payload::Event {
                event: event.into(),
                detail,
            },
        }
    }

    /// Parse a text frame.
    pub fn decode(raw: &str) -> Result<Self> {
        let doc: Value =
            serde_json::from_str(raw).map_err(|e| RmcsError::Decode(e.to_string()))?;
        Self::from_value(doc)
    }

    /// Parse a binary frame; the bytes must be UTF-8 JSON.
    pub fn decode_bytes(raw: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(raw)
            .map_err(|e| RmcsError::Decode(format!("frame is not valid UTF-8: {e}")))?;
        Self::decode(text)
    }

    /// Build an envelope from an already-parsed JSON document.
    ///
    /// Lenient where the protocol is lenient: a missing payload is empty, a
    /// missing or unknown `type` is treated as an event, missing bodies are `{}`.
    pub fn from_value(doc: Value) -> Result<Self> {
        let Value::Object(mut root) = doc else {
            return Err(RmcsError::Decode("envelope is not a JSON object".into()));
        };

        let session_id = match root.remove("session_id") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s),
            Some(Value::Number(n)) => Some(n.to_string()),
            Some(other) => {
                return Err(RmcsError::Decode(format!(
                    "session_id must be a string, got {other}"
                )));
            }
        };
        let local_timestamp = root.get("local_timestamp").and_then(Value::as_f64);

        let mut payload = match root.remove("payload") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map,
            Some(_) => return Err(RmcsError::Decode("payload is not a JSON object".into())),
        };

        let kind = payload
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let payload = match kind.as_str() {
            "instruction" => Payload::Instruction {
                instruction: take_name(&mut payload, "instruction"),
                message: take_body(&mut payload, "message"),
            },
            "response" => Payload::Response {
                message: take_body(&mut payload, "message"),
            },
            "event" => Payload::Event {
                event: take_name(&mut payload, "event"),
                detail: take_body(&mut payload, "detail"),
            },
            other => {
                warn!(kind = %other, "unrecognised payload type, treating as event");
                Payload::Event {
                    event: take_name(&mut payload, "event"),
                    detail: take_body(&mut payload, "detail"),
                }
            }
        };

        Ok(Self {
            session_id,
            local_timestamp,
            payload,
        })
    }

    /// Fill in a fresh session id (if absent) and the current timestamp.
    pub fn stamped(mut self) -> Self {
        if self.session_id.is_none() {
            self.session_id = Some(uuid::Uuid::new_v4().to_string());
        }
        self.local_timestamp = Some(now_timestamp());
        self
    }

    /// Serialize for the wire. Always carries a session id and a fresh timestamp.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.clone().stamped())?)
    }
}

fn take_name(payload: &mut Map<String, Value>, key: &str) -> String {
    match payload.remove(key) {
        Some(Value::String(s)) => s,
        _ => String::new(),
    }
}

fn take_body(payload: &mut Map<String, Value>, key: &str) -> Value {
    match payload.remove(key) {
        None | Some(Value::Null) => Value::Object(Map::new()),
        Some(v) => v,
    }
}

/// Current wall-clock time as float seconds since the epoch.
pub fn now_timestamp() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}
