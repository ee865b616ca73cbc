use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use rmcs_core::{Envelope, Result, RmcsError};

use crate::client::{ClientState, Link, Shared};
use crate::registry::HandlerRegistry;

/// Cloneable, thread-safe access to a running [`RobotClient`](crate::RobotClient).
///
/// The `submit_*` and `run_instruction` methods block and are meant for
/// synchronous code on threads outside the async runtime.
#[derive(Clone)]
pub struct ClientHandle {
    shared: Arc<Shared>,
}

impl ClientHandle {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    pub fn state(&self) -> ClientState {
        *self.shared.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ClientState> {
        self.shared.state.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.shared.link.read().is_some()
    }

    pub fn robot_id(&self) -> Option<String> {
        self.shared.robot_id.read().clone()
    }

    pub fn registry(&self) -> Arc<HandlerRegistry> {
        self.shared.registry.clone()
    }

    /// Stop the client: ends the current connection and any backoff wait.
    pub fn shutdown(&self) {
        self.shared.shutdown.cancel();
    }

    fn link(&self) -> Result<Link> {
        self.shared.link.read().clone().ok_or(RmcsError::NotConnected)
    }

    /// Send an event and wait until it is on the wire.
    pub fn submit_event(&self, event: &str, detail: Value) -> Result<String> {
        self.link()?.outbound.submit_event(event, detail)
    }

    /// Send an instruction and wait until it is on the wire.
    pub fn submit_instruction(&self, instruction: &str, message: Value) -> Result<String> {
        self.link()?.outbound.submit_instruction(instruction, message, None)
    }

    pub async fn send_event(&self, event: &str, detail: Value) -> Result<String> {
        self.link()?.outbound.send_event(event, detail).await
    }

    pub async fn send_instruction(&self, instruction: &str, message: Value) -> Result<String> {
        self.link()?
            .outbound
            .send_instruction(instruction, message, None)
            .await
    }

    /// Run a registered instruction handler locally on the service loop and
    /// wait for its result.
    pub fn run_instruction(&self, instruction: &str, message: Value) -> Result<Option<Value>> {
        let handler = self
            .shared
            .registry
            .instruction(instruction)
            .ok_or_else(|| RmcsError::Handler {
                name: instruction.to_string(),
                reason: "no handler registered".into(),
            })?;
        let work = self
            .shared
            .service_worker
            .submit(async move { handler.handle(message, None).await })?;
        work.result(self.shared.inbound_timeout)
    }

    /// Send an instruction and await the server's response to it.
    pub async fn request(
        &self,
        instruction: &str,
        message: Value,
        timeout: Duration,
    ) -> Result<Envelope> {
        let link = self.link()?;
        let session_id = uuid::Uuid::new_v4().to_string();
        let reply = link.adaptor.expect_response(session_id.clone());

        if let Err(e) = link
            .outbound
            .send_instruction(instruction, message, Some(session_id.clone()))
            .await
        {
            link.adaptor.forget_response(&session_id);
            return Err(e);
        }

        match tokio::time::timeout(timeout, reply).await {
            Ok(Ok(envelope)) => Ok(envelope),
            Ok(Err(_)) => Err(RmcsError::ConnectionClosed),
            Err(_) => {
                link.adaptor.forget_response(&session_id);
                Err(RmcsError::RequestTimeout(timeout))
            }
        }
    }
}
