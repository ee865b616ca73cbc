use thiserror::Error;

/// Unified error type for the robot client.
#[derive(Error, Debug)]
pub enum RmcsError {
    // ── Protocol errors ────────────────────────────────────────
    #[error("malformed frame: {0}")]
    Decode(String),

    #[error("handler failed: {name}: {reason}")]
    Handler { name: String, reason: String },

    #[error("no response within {0:?}")]
    RequestTimeout(std::time::Duration),

    // ── Connection errors ──────────────────────────────────────
    #[error("transport error: {0}")]
    Transport(String),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("not connected")]
    NotConnected,

    #[error("identification failed: {0}")]
    Identification(String),

    // ── Worker loop errors ─────────────────────────────────────
    #[error("worker loop not running: {0}")]
    WorkerNotRunning(String),

    #[error("work timed out after {0:?}")]
    WorkTimeout(std::time::Duration),

    #[error("work cancelled")]
    WorkCancelled,

    #[error("work failed: {0}")]
    WorkFailed(String),

    // ── Storage / config errors ────────────────────────────────
    #[error("storage error: {0}")]
    Storage(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("config validation failed: {field}: {reason}")]
    ConfigValidation { field: String, reason: String },

    // ── Generic wrappers ───────────────────────────────────────
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl RmcsError {
    /// True for errors that mean the peer connection is gone.
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, RmcsError::ConnectionClosed | RmcsError::NotConnected)
    }
}

pub type Result<T> = std::result::Result<T, RmcsError>;
