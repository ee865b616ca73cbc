//! The receive loop: classifies inbound envelopes and routes them to
//! instruction handlers, event handlers, or waiting sessions.

use futures::FutureExt;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, OnceLock};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use rmcs_core::{Envelope, Payload, Result, RmcsError};

use crate::registry::HandlerRegistry;
use crate::session::{SessionManager, SessionMessage};
use crate::transport::{Connection, FrameSink};
use crate::worker::panic_message;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdaptorState {
    Idle,
    Listening,
    Stopped,
}

pub struct MessageAdaptor {
    registry: Arc<HandlerRegistry>,
    state: Mutex<AdaptorState>,
    cancel: CancellationToken,
    sessions: OnceLock<Arc<SessionManager>>,
    response_waiters: Mutex<HashMap<String, oneshot::Sender<Envelope>>>,
}

impl MessageAdaptor {
    pub fn new(registry: Arc<HandlerRegistry>) -> Self {
        Self {
            registry,
            state: Mutex::new(AdaptorState::Idle),
            cancel: CancellationToken::new(),
            sessions: OnceLock::new(),
            response_waiters: Mutex::new(HashMap::new()),
        }
    }

    pub fn state(&self) -> AdaptorState {
        *self.state.lock()
    }

    /// Session manager bound to the connection; `None` before listening.
    pub fn sessions(&self) -> Option<Arc<SessionManager>> {
        self.sessions.get().cloned()
    }

    /// Get the next response whose session id is `session_id`, once.
    ///
    /// The receiver fails once the adaptor stops, including when it has
    /// already stopped.
    pub fn expect_response(&self, session_id: impl Into<String>) -> oneshot::Receiver<Envelope> {
        let (tx, rx) = oneshot::channel();
        let state = self.state.lock();
        if *state != AdaptorState::Stopped {
            self.response_waiters.lock().insert(session_id.into(), tx);
        }
        rx
    }

    pub fn forget_response(&self, session_id: &str) {
        self.response_waiters.lock().remove(session_id);
    }

    /// Stop reading. Handlers already running are left to finish.
    pub fn stop(&self) {
        self.cancel.cancel();
        self.mark_stopped();
    }

    /// Dropping the waiters fails every pending `expect_response`.
    fn mark_stopped(&self) {
        let mut state = self.state.lock();
        *state = AdaptorState::Stopped;
        self.response_waiters.lock().clear();
    }

    /// Read and dispatch frames until the peer closes, the transport fails,
    /// or [`stop`](Self::stop) is called.
    ///
    /// A clean close or a stop returns `Ok`; a receive failure returns the error.
    pub async fn start_listening(&self, connection: Connection) -> Result<()> {
        {
            let mut state = self.state.lock();
            match *state {
                AdaptorState::Stopped => {
                    debug!("adaptor already stopped, not listening");
                    return Ok(());
                }
                AdaptorState::Listening => {
                    return Err(RmcsError::Transport("adaptor is already listening".into()));
                }
                AdaptorState::Idle => *state = AdaptorState::Listening,
            }
        }

        let Connection { sink, mut stream } = connection;
        let sessions = self
            .sessions
            .get_or_init(|| Arc::new(SessionManager::new(sink.clone())))
            .clone();

        info!("listening for messages");
        let outcome = loop {
            let frame = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break Ok(()),
                frame = stream.next_frame() => frame,
            };

            match frame {
                None => {
                    info!("connection closed by server");
                    break Ok(());
                }
                Some(Err(e)) => {
                    error!(error = %e, "receive failed");
                    break Err(e);
                }
                Some(Ok(frame)) => match frame.decode() {
                    Ok(envelope) => self.dispatch(envelope, &sessions, &sink),
                    Err(e) => warn!(error = %e, "dropping malformed frame"),
                },
            }
        };

        self.mark_stopped();
        outcome
    }

    fn dispatch(&self, envelope: Envelope, sessions: &Arc<SessionManager>, sink: &Arc<dyn FrameSink>) {
        match &envelope.payload {
            Payload::Instruction { .. } => self.dispatch_instruction(envelope, sessions, sink),
            Payload::Event { .. } => self.dispatch_event(envelope, sessions),
            Payload::Response { .. } => self.dispatch_response(envelope, sessions),
        }
    }

    fn dispatch_instruction(
        &self,
        envelope: Envelope,
        sessions: &Arc<SessionManager>,
        sink: &Arc<dyn FrameSink>,
    ) {
        let Envelope {
            session_id,
            payload: Payload::Instruction { instruction, message },
            ..
        } = envelope
        else {
            return;
        };

        if instruction.is_empty() {
            warn!("instruction message without an instruction name");
            return;
        }
        let Some(handler) = self.registry.instruction(&instruction) else {
            warn!(instruction = %instruction, "no handler registered for instruction");
            return;
        };

        // Created here, in arrival order, so replies racing the handler find it.
        let session = session_id.as_deref().map(|id| sessions.create_session(id));
        let sessions = sessions.clone();
        let sink = sink.clone();

        tokio::spawn(async move {
            let outcome = AssertUnwindSafe(handler.handle(message, session))
                .catch_unwind()
                .await;

            match outcome {
                Ok(Ok(Some(reply))) => {
                    send_reply(&*sink, &instruction, session_id.as_deref(), reply).await
                }
                Ok(Ok(None)) => debug!(instruction = %instruction, "handler finished without reply"),
                Ok(Err(e)) => {
                    let err = RmcsError::Handler {
                        name: instruction.clone(),
                        reason: e.to_string(),
                    };
                    error!(error = %err, "instruction handler failed");
                }
                Err(panic) => error!(
                    instruction = %instruction,
                    panic = %panic_message(panic.as_ref()),
                    "instruction handler panicked"
                ),
            }

            if let Some(id) = &session_id {
                sessions.close_session(id);
            }
        });
    }

    fn dispatch_event(&self, envelope: Envelope, sessions: &Arc<SessionManager>) {
        if let Some(id) = &envelope.session_id {
            if sessions.get_session(id).is_some() {
                sessions.deliver(id, SessionMessage::from_envelope(&envelope));
            }
        }

        let Payload::Event { event, detail } = envelope.payload else {
            return;
        };
        if event.is_empty() {
            warn!("event message without an event name");
            return;
        }
        let Some(handler) = self.registry.event(&event) else {
            debug!(event = %event, "no handler registered for event");
            return;
        };

        tokio::spawn(async move {
            match AssertUnwindSafe(handler.handle(detail)).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(event = %event, error = %e, "event handler failed"),
                Err(panic) => error!(
                    event = %event,
                    panic = %panic_message(panic.as_ref()),
                    "event handler panicked"
                ),
            }
        });
    }

    fn dispatch_response(&self, envelope: Envelope, sessions: &Arc<SessionManager>) {
        let Some(id) = envelope.session_id.clone() else {
            debug!("response without a session id, dropped");
            return;
        };

        sessions.deliver(&id, SessionMessage::from_envelope(&envelope));

        if let Some(waiter) = self.response_waiters.lock().remove(&id) {
            if waiter.send(envelope).is_err() {
                debug!(session_id = %id, "response waiter went away");
            }
        }
    }
}

async fn send_reply(sink: &dyn FrameSink, instruction: &str, session_id: Option<&str>, reply: Value) {
    let Some(id) = session_id else {
        warn!(instruction = %instruction, "instruction had no session id, reply dropped");
        return;
    };
    if let Err(e) = sink.send_envelope(&Envelope::response(id, reply)).await {
        warn!(instruction = %instruction, error = %e, "failed to send reply");
    }
}
