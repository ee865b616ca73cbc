//! In-process connections for deterministic tests.
//!
//! [`pair`] returns the client side as a regular [`Connection`] and a
//! [`Peer`] that plays the server: it injects inbound frames, reads what the
//! client sent, and can close or break the link.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

use rmcs_core::{Envelope, Result, RmcsError};

use super::{Connection, Connector, Frame, FrameSink, FrameStream};

enum Inbound {
    Frame(Frame),
    Fail(String),
    Close,
}

/// Create a connected client/peer pair.
pub fn pair() -> (Connection, Peer) {
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let closed = Arc::new(AtomicBool::new(false));

    let sink = Arc::new(MemorySink {
        tx: out_tx,
        closed: closed.clone(),
    });
    let stream = MemoryStream {
        rx: in_rx,
        closed: closed.clone(),
    };
    let peer = Peer {
        tx: in_tx,
        rx: tokio::sync::Mutex::new(out_rx),
        closed,
    };
    (
        Connection {
            sink,
            stream: Box::new(stream),
        },
        peer,
    )
}

struct MemorySink {
    tx: mpsc::UnboundedSender<String>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl FrameSink for MemorySink {
    async fn send_text(&self, text: String) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(RmcsError::ConnectionClosed);
        }
        self.tx.send(text).map_err(|_| RmcsError::ConnectionClosed)
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct MemoryStream {
    rx: mpsc::UnboundedReceiver<Inbound>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl FrameStream for MemoryStream {
    async fn next_frame(&mut self) -> Option<Result<Frame>> {
        match self.rx.recv().await {
            Some(Inbound::Frame(frame)) => Some(Ok(frame)),
            Some(Inbound::Fail(reason)) => {
                self.closed.store(true, Ordering::SeqCst);
                Some(Err(RmcsError::Transport(reason)))
            }
            Some(Inbound::Close) | None => {
                self.closed.store(true, Ordering::SeqCst);
                None
            }
        }
    }
}

/// The server end of an in-memory connection.
pub struct Peer {
    tx: mpsc::UnboundedSender<Inbound>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<String>>,
    closed: Arc<AtomicBool>,
}

impl Peer {
    pub fn send_text(&self, text: impl Into<String>) {
        let _ = self.tx.send(Inbound::Frame(Frame::Text(text.into())));
    }

    pub fn send_binary(&self, bytes: impl Into<Vec<u8>>) {
        let _ = self.tx.send(Inbound::Frame(Frame::Binary(bytes.into())));
    }

    pub fn send_envelope(&self, envelope: &Envelope) -> Result<()> {
        self.send_text(envelope.encode()?);
        Ok(())
    }

    /// Make the client's next read fail with a transport error.
    pub fn fail(&self, reason: impl Into<String>) {
        let _ = self.tx.send(Inbound::Fail(reason.into()));
    }

    /// Close the connection from the server side.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let _ = self.tx.send(Inbound::Close);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Next text frame the client sent, or `None` after `timeout`.
    pub async fn recv_text(&self, timeout: Duration) -> Option<String> {
        let mut rx = self.rx.lock().await;
        tokio::time::timeout(timeout, rx.recv()).await.ok().flatten()
    }

    /// Next frame the client sent, decoded.
    pub async fn recv_envelope(&self, timeout: Duration) -> Option<Envelope> {
        let text = self.recv_text(timeout).await?;
        Envelope::decode(&text).ok()
    }

    /// Skip frames until one satisfies `pred`.
    pub async fn recv_matching(
        &self,
        timeout: Duration,
        pred: impl Fn(&Envelope) -> bool,
    ) -> Option<Envelope> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let left = deadline.saturating_duration_since(tokio::time::Instant::now());
            if left.is_zero() {
                return None;
            }
            let envelope = self.recv_envelope(left).await?;
            if pred(&envelope) {
                return Some(envelope);
            }
        }
    }
}

/// Hands out pre-built connections in order; refuses once exhausted.
#[derive(Default)]
pub struct MemoryConnector {
    queue: Mutex<VecDeque<Connection>>,
    urls: Mutex<Vec<String>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a fresh connection and return its server end.
    pub fn push_pair(&self) -> Peer {
        let (connection, peer) = pair();
        self.queue.lock().push_back(connection);
        peer
    }

    /// Every URL a connect was attempted against, in order.
    pub fn attempts(&self) -> Vec<String> {
        self.urls.lock().clone()
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, url: &str) -> Result<Connection> {
        self.urls.lock().push(url.to_string());
        self.queue
            .lock()
            .pop_front()
            .ok_or_else(|| RmcsError::Transport(format!("connection refused: {url}")))
    }
}
