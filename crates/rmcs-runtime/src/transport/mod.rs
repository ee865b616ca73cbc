//! The seam between protocol logic and the byte pipe.
//!
//! A [`Connection`] is a shared, cloneable [`FrameSink`] plus a single-owner
//! [`FrameStream`]. [`ws::WsConnector`] opens real WebSocket connections;
//! [`memory`] provides an in-process pair for tests.

pub mod memory;
pub mod ws;

use async_trait::async_trait;
use std::sync::Arc;

use rmcs_core::{Envelope, Result};

pub use ws::WsConnector;

/// An inbound data frame. Control frames never surface here.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

impl Frame {
    pub fn decode(&self) -> Result<Envelope> {
        match self {
            Frame::Text(text) => Envelope::decode(text),
            Frame::Binary(bytes) => Envelope::decode_bytes(bytes),
        }
    }
}

/// Write half of a connection. Safe to share between tasks and runtimes.
#[async_trait]
pub trait FrameSink: Send + Sync {
    async fn send_text(&self, text: String) -> Result<()>;

    /// Close the connection. Best effort; closing twice is not an error.
    async fn close(&self) -> Result<()>;

    async fn send_envelope(&self, envelope: &Envelope) -> Result<()> {
        self.send_text(envelope.encode()?).await
    }
}

/// Read half of a connection.
#[async_trait]
pub trait FrameStream: Send {
    /// Next data frame; `None` once the peer has closed the connection.
    async fn next_frame(&mut self) -> Option<Result<Frame>>;
}

pub struct Connection {
    pub sink: Arc<dyn FrameSink>,
    pub stream: Box<dyn FrameStream>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").finish_non_exhaustive()
    }
}

/// Opens connections to the control server.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Connection>;
}
