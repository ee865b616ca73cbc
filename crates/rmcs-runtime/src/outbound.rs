use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use rmcs_core::{Envelope, Result, RmcsError};

use crate::transport::FrameSink;
use crate::worker::WorkerLoop;

/// Sends client-originated envelopes over the live connection.
///
/// The async methods send directly; the `submit_*` methods are for
/// synchronous callers and route through the outbound worker loop.
#[derive(Clone)]
pub struct Outbound {
    sink: Arc<dyn FrameSink>,
    worker: Arc<WorkerLoop>,
    timeout: Duration,
}

impl Outbound {
    pub fn new(sink: Arc<dyn FrameSink>, worker: Arc<WorkerLoop>, timeout: Duration) -> Self {
        Self {
            sink,
            worker,
            timeout,
        }
    }

    /// Send an event. Returns the session id it went out under.
    pub async fn send_event(&self, event: &str, detail: Value) -> Result<String> {
        send_stamped(&*self.sink, Envelope::event(None, event, detail)).await
    }

    /// Send an instruction. A fresh session id is assigned when none is given.
    pub async fn send_instruction(
        &self,
        instruction: &str,
        message: Value,
        session_id: Option<String>,
    ) -> Result<String> {
        send_stamped(&*self.sink, Envelope::instruction(session_id, instruction, message)).await
    }

    /// Blocking send of an event from a non-async caller.
    pub fn submit_event(&self, event: &str, detail: Value) -> Result<String> {
        self.submit(Envelope::event(None, event, detail))
    }

    /// Blocking send of an instruction from a non-async caller.
    pub fn submit_instruction(
        &self,
        instruction: &str,
        message: Value,
        session_id: Option<String>,
    ) -> Result<String> {
        self.submit(Envelope::instruction(session_id, instruction, message))
    }

    fn submit(&self, envelope: Envelope) -> Result<String> {
        let sink = self.sink.clone();
        let handle = self
            .worker
            .submit(async move { send_stamped(&*sink, envelope).await })?;
        handle.result(self.timeout)
    }
}

async fn send_stamped(sink: &dyn FrameSink, envelope: Envelope) -> Result<String> {
    let envelope = envelope.stamped();
    let session_id = envelope
        .session_id
        .clone()
        .ok_or_else(|| RmcsError::Transport("envelope has no session id".into()))?;
    sink.send_envelope(&envelope).await?;
    debug!(session_id = %session_id, kind = envelope.payload.kind(), "sent");
    Ok(session_id)
}
