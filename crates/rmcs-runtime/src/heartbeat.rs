use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use rmcs_core::{Envelope, Result};

use crate::transport::FrameSink;

pub const HEARTBEAT_EVENT: &str = "heartbeat";

pub async fn send_heartbeat(sink: &dyn FrameSink) -> Result<()> {
    sink.send_envelope(&Envelope::event(None, HEARTBEAT_EVENT, json!({})))
        .await
}

/// Send a heartbeat every `interval` (first one after one interval) until
/// cancelled or the connection is gone. Other send failures are logged.
pub fn spawn_heartbeat(
    sink: Arc<dyn FrameSink>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("heartbeat cancelled");
                    break;
                }
                _ = ticker.tick() => {
                    // A stalled write must not hold up cancellation.
                    let sent = tokio::select! {
                        _ = cancel.cancelled() => {
                            debug!("heartbeat cancelled mid-send");
                            break;
                        }
                        sent = send_heartbeat(&*sink) => sent,
                    };
                    match sent {
                        Ok(()) => debug!("heartbeat sent"),
                        Err(e) if e.is_connection_lost() => {
                            info!("connection closed, heartbeat stopping");
                            break;
                        }
                        Err(e) => warn!(error = %e, "heartbeat failed"),
                    }
                }
            }
        }
    })
}
