use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

use rmcs_core::Result;

use crate::session::Session;

/// Handles one named instruction from the server.
///
/// Returning `Some(body)` sends a response envelope under the instruction's
/// session id. `session` is present when the instruction carried one.
#[async_trait]
pub trait InstructionHandler: Send + Sync {
    async fn handle(&self, message: Value, session: Option<Session>) -> Result<Option<Value>>;
}

/// Handles one named event from the server.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, detail: Value) -> Result<()>;
}

struct FnInstruction<F>(F);

#[async_trait]
impl<F, Fut> InstructionHandler for FnInstruction<F>
where
    F: Fn(Value, Option<Session>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Option<Value>>> + Send + 'static,
{
    async fn handle(&self, message: Value, session: Option<Session>) -> Result<Option<Value>> {
        (self.0)(message, session).await
    }
}

struct FnEvent<F>(F);

#[async_trait]
impl<F, Fut> EventHandler for FnEvent<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn handle(&self, detail: Value) -> Result<()> {
        (self.0)(detail).await
    }
}

/// Wrap an async closure as an instruction handler.
pub fn instruction_fn<F, Fut>(f: F) -> Arc<dyn InstructionHandler>
where
    F: Fn(Value, Option<Session>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<Value>>> + Send + 'static,
{
    Arc::new(FnInstruction(f))
}

/// Wrap an async closure as an event handler.
pub fn event_fn<F, Fut>(f: F) -> Arc<dyn EventHandler>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(FnEvent(f))
}

/// Name → handler tables shared by the orchestrator and the adaptor.
#[derive(Default)]
pub struct HandlerRegistry {
    instructions: RwLock<HashMap<String, Arc<dyn InstructionHandler>>>,
    events: RwLock<HashMap<String, Arc<dyn EventHandler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the handler for `name`.
    pub fn register_instruction(&self, name: impl Into<String>, handler: Arc<dyn InstructionHandler>) {
        let name = name.into();
        debug!(instruction = %name, "registered instruction handler");
        self.instructions.write().insert(name, handler);
    }

    pub fn register_event(&self, name: impl Into<String>, handler: Arc<dyn EventHandler>) {
        let name = name.into();
        debug!(event = %name, "registered event handler");
        self.events.write().insert(name, handler);
    }

    pub fn unregister_instruction(&self, name: &str) -> bool {
        self.instructions.write().remove(name).is_some()
    }

    pub fn unregister_event(&self, name: &str) -> bool {
        self.events.write().remove(name).is_some()
    }

    pub fn instruction(&self, name: &str) -> Option<Arc<dyn InstructionHandler>> {
        self.instructions.read().get(name).cloned()
    }

    pub fn event(&self, name: &str) -> Option<Arc<dyn EventHandler>> {
        self.events.read().get(name).cloned()
    }

    pub fn instruction_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.instructions.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn event_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.events.read().keys().cloned().collect();
        names.sort();
        names
    }
}
