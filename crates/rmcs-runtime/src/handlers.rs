//! Instruction handlers every robot answers.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{error, info, warn};

use rmcs_core::Result;

use crate::identity::IdentityStore;
use crate::network;
use crate::registry::{HandlerRegistry, InstructionHandler};
use crate::session::Session;

pub const FETCH_NETWORK: &str = "fetch_network";
pub const SYNC_ROBOT_ID: &str = "sync_robot_id";

/// Replies with the interface inventory keyed by interface name.
pub struct FetchNetwork;

#[async_trait]
impl InstructionHandler for FetchNetwork {
    async fn handle(&self, _message: Value, _session: Option<Session>) -> Result<Option<Value>> {
        info!("fetching network information");
        let snapshot = tokio::task::spawn_blocking(network::snapshot)
            .await
            .map_err(|e| anyhow::anyhow!("network scan task failed: {e}"))?;

        let reply = match snapshot.and_then(|nics| Ok(serde_json::to_value(nics)?)) {
            Ok(value) => value,
            Err(e) => {
                error!(error = %e, "failed to fetch network info");
                json!({ "error": e.to_string() })
            }
        };
        Ok(Some(reply))
    }
}

/// Replaces the cached robot id. Never replies.
pub struct SyncRobotId {
    store: IdentityStore,
}

impl SyncRobotId {
    pub fn new(store: IdentityStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl InstructionHandler for SyncRobotId {
    async fn handle(&self, message: Value, _session: Option<Session>) -> Result<Option<Value>> {
        let new_id = ["id", "robot_id"]
            .iter()
            .find_map(|key| message.get(key).and_then(Value::as_str))
            .filter(|id| !id.is_empty());

        let Some(new_id) = new_id else {
            warn!("sync_robot_id received without an id");
            return Ok(None);
        };

        info!(robot_id = %new_id, "syncing robot id");
        if let Err(e) = self.store.save(new_id) {
            error!(error = %e, "failed to save new robot id");
        }
        Ok(None)
    }
}

/// Install the built-in handlers, replacing earlier registrations.
pub fn register_builtin(registry: &HandlerRegistry, store: &IdentityStore) {
    registry.register_instruction(FETCH_NETWORK, Arc::new(FetchNetwork));
    registry.register_instruction(SYNC_ROBOT_ID, Arc::new(SyncRobotId::new(store.clone())));
}
