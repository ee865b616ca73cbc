use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex as TokioMutex, mpsc};
use tracing::{debug, warn};

use rmcs_core::{Envelope, Payload, Result};

use crate::transport::FrameSink;

/// Messages buffered per session before new deliveries are dropped.
pub const MAILBOX_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Response,
    Event,
}

/// A response or event routed into a session's mailbox.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionMessage {
    pub kind: MessageKind,
    /// Event name; `None` for responses.
    pub name: Option<String>,
    pub body: Value,
    pub local_timestamp: Option<f64>,
}

impl SessionMessage {
    pub fn from_envelope(envelope: &Envelope) -> Self {
        let (kind, name) = match &envelope.payload {
            Payload::Event { event, .. } => (MessageKind::Event, Some(event.clone())),
            _ => (MessageKind::Response, None),
        };
        Self {
            kind,
            name,
            body: envelope.payload.body().clone(),
            local_timestamp: envelope.local_timestamp,
        }
    }
}

/// One correlated multi-turn exchange, keyed by session id.
///
/// Cloning yields another handle to the same mailbox.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    id: String,
    tx: Mutex<Option<mpsc::Sender<SessionMessage>>>,
    rx: TokioMutex<mpsc::Receiver<SessionMessage>>,
    closed: AtomicBool,
    sink: Arc<dyn FrameSink>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Session {
    fn new(id: String, sink: Arc<dyn FrameSink>) -> Self {
        let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
        Self {
            inner: Arc::new(SessionInner {
                id,
                tx: Mutex::new(Some(tx)),
                rx: TokioMutex::new(rx),
                closed: AtomicBool::new(false),
                sink,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// True when both handles point at the same session.
    pub fn same_as(&self, other: &Session) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Wait for the next message. `None` once the session is closed.
    pub async fn recv(&self) -> Option<SessionMessage> {
        if self.is_closed() {
            return None;
        }
        let mut rx = self.inner.rx.lock().await;
        rx.recv().await
    }

    /// Send an instruction that carries this session's id.
    pub async fn send_instruction(&self, instruction: &str, message: Value) -> Result<()> {
        let envelope = Envelope::instruction(Some(self.inner.id.clone()), instruction, message);
        self.inner.sink.send_envelope(&envelope).await
    }

    /// Send an event that carries this session's id.
    pub async fn send_event(&self, event: &str, detail: Value) -> Result<()> {
        let envelope = Envelope::event(Some(self.inner.id.clone()), event, detail);
        self.inner.sink.send_envelope(&envelope).await
    }

    /// Send an intermediate response within this session.
    pub async fn respond(&self, message: Value) -> Result<()> {
        let envelope = Envelope::response(self.inner.id.clone(), message);
        self.inner.sink.send_envelope(&envelope).await
    }

    fn deliver(&self, message: SessionMessage) {
        let tx = self.inner.tx.lock();
        let Some(tx) = tx.as_ref() else {
            debug!(session_id = %self.inner.id, "session closed, message dropped");
            return;
        };
        if let Err(e) = tx.try_send(message) {
            warn!(session_id = %self.inner.id, error = %e, "session mailbox rejected message");
        }
    }

    fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        // Dropping the sender wakes a receiver blocked in `recv`.
        self.inner.tx.lock().take();
    }
}

/// Tracks live sessions for one connection.
pub struct SessionManager {
    sessions: RwLock<HashMap<String, Session>>,
    sink: Arc<dyn FrameSink>,
}

impl SessionManager {
    pub fn new(sink: Arc<dyn FrameSink>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            sink,
        }
    }

    /// Return the open session for `id`, creating it if needed.
    pub fn create_session(&self, id: &str) -> Session {
        if let Some(existing) = self.sessions.read().get(id) {
            return existing.clone();
        }
        let mut sessions = self.sessions.write();
        sessions
            .entry(id.to_string())
            .or_insert_with(|| {
                debug!(session_id = %id, "session opened");
                Session::new(id.to_string(), self.sink.clone())
            })
            .clone()
    }

    /// Open a session under a fresh id, for locally initiated exchanges.
    pub fn open_session(&self) -> Session {
        self.create_session(&uuid::Uuid::new_v4().to_string())
    }

    pub fn get_session(&self, id: &str) -> Option<Session> {
        self.sessions.read().get(id).cloned()
    }

    /// Close and forget a session. Returns false if it was not open.
    pub fn close_session(&self, id: &str) -> bool {
        match self.sessions.write().remove(id) {
            Some(session) => {
                session.close();
                debug!(session_id = %id, "session closed");
                true
            }
            None => false,
        }
    }

    /// Route a message to the session's mailbox. Unknown ids are ignored.
    pub fn deliver(&self, id: &str, message: SessionMessage) {
        match self.get_session(id) {
            Some(session) => session.deliver(message),
            None => debug!(session_id = %id, "no live session, message dropped"),
        }
    }

    pub fn close_all(&self) {
        let drained: Vec<Session> = self.sessions.write().drain().map(|(_, s)| s).collect();
        for session in &drained {
            session.close();
        }
        if !drained.is_empty() {
            debug!(count = drained.len(), "closed remaining sessions");
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}
