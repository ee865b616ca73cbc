//! Connection lifecycle: identify → connect → heartbeat → listen, and the
//! reconnect-with-backoff loop around it.

use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use rmcs_config::BotConfig;
use rmcs_core::{Result, RmcsError};

use crate::adaptor::MessageAdaptor;
use crate::backoff::Backoff;
use crate::handle::ClientHandle;
use crate::handlers;
use crate::heartbeat;
use crate::identity::{HttpWhoami, IdentityProvider, IdentityStore};
use crate::outbound::Outbound;
use crate::registry::HandlerRegistry;
use crate::transport::{Connector, FrameSink, WsConnector};
use crate::worker::WorkerLoop;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Unidentified,
    Identifying,
    Connecting,
    Connected,
    Disconnecting,
    Backoff,
    Stopped,
}

/// The live connection as seen from outside the read loop.
#[derive(Clone)]
pub(crate) struct Link {
    pub(crate) outbound: Outbound,
    pub(crate) adaptor: Arc<MessageAdaptor>,
}

/// State shared between the orchestrator and its handles.
pub(crate) struct Shared {
    pub(crate) state: watch::Sender<ClientState>,
    pub(crate) shutdown: CancellationToken,
    pub(crate) link: RwLock<Option<Link>>,
    pub(crate) robot_id: RwLock<Option<String>>,
    pub(crate) registry: Arc<HandlerRegistry>,
    pub(crate) outbound_worker: Arc<WorkerLoop>,
    pub(crate) service_worker: Arc<WorkerLoop>,
    pub(crate) inbound_timeout: Duration,
}

struct Active {
    adaptor: Arc<MessageAdaptor>,
    sink: Arc<dyn FrameSink>,
    heartbeat_cancel: CancellationToken,
    heartbeat: Option<JoinHandle<()>>,
}

pub struct RobotClient {
    config: BotConfig,
    connector: Arc<dyn Connector>,
    identity: Arc<dyn IdentityProvider>,
    store: IdentityStore,
    shared: Arc<Shared>,
    active: Mutex<Option<Active>>,
    backoff: Mutex<Backoff>,
}

impl RobotClient {
    /// A client that talks WebSocket and identifies over HTTP, per `config`.
    pub fn new(config: BotConfig) -> Result<Self> {
        let conn = &config.connection;
        let connector = Arc::new(WsConnector::new(conn.ping_interval(), conn.ping_timeout()));
        let identity = Arc::new(HttpWhoami::new(&config.server.http, conn.identify_timeout()));
        let store = IdentityStore::new(&config.storage.directory)?;
        Ok(Self::with_parts(config, connector, identity, store))
    }

    /// Assemble a client from explicit collaborators.
    pub fn with_parts(
        config: BotConfig,
        connector: Arc<dyn Connector>,
        identity: Arc<dyn IdentityProvider>,
        store: IdentityStore,
    ) -> Self {
        let (state, _) = watch::channel(ClientState::Unidentified);
        let shared = Arc::new(Shared {
            state,
            shutdown: CancellationToken::new(),
            link: RwLock::new(None),
            robot_id: RwLock::new(None),
            registry: Arc::new(HandlerRegistry::new()),
            outbound_worker: Arc::new(WorkerLoop::new("outbound")),
            service_worker: Arc::new(WorkerLoop::new("service")),
            inbound_timeout: config.connection.inbound_timeout(),
        });
        let backoff = Backoff::new(
            config.connection.initial_retry_delay(),
            config.connection.max_retry_delay(),
        );
        Self {
            config,
            connector,
            identity,
            store,
            shared,
            active: Mutex::new(None),
            backoff: Mutex::new(backoff),
        }
    }

    pub fn handle(&self) -> ClientHandle {
        ClientHandle::new(self.shared.clone())
    }

    pub fn registry(&self) -> Arc<HandlerRegistry> {
        self.shared.registry.clone()
    }

    pub fn store(&self) -> &IdentityStore {
        &self.store
    }

    pub fn state(&self) -> ClientState {
        *self.shared.state.borrow()
    }

    fn set_state(&self, state: ClientState) {
        self.shared.state.send_replace(state);
    }

    /// Resolve the robot id: cached on disk, else issued by the server.
    pub async fn identify(&self) -> Result<String> {
        match self.store.load() {
            Ok(Some(id)) => {
                debug!(robot_id = %id, "using cached robot id");
                *self.shared.robot_id.write() = Some(id.clone());
                return Ok(id);
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "cannot read cached robot id, asking the server"),
        }

        let id = self.identity.whoami().await.map_err(|e| match e {
            RmcsError::Identification(_) => e,
            other => RmcsError::Identification(other.to_string()),
        })?;
        if let Err(e) = self.store.save(&id) {
            warn!(error = %e, "robot id obtained but not cached");
        }
        *self.shared.robot_id.write() = Some(id.clone());
        Ok(id)
    }

    /// One connection attempt. Returns when the connection ends; always
    /// tears down before returning.
    ///
    /// `Ok` means shutdown was requested; any other end of the connection,
    /// including a clean close by the server, is an error.
    pub async fn connect(&self) -> Result<()> {
        let result = self.connect_inner().await;
        self.disconnect().await;
        result
    }

    async fn connect_inner(&self) -> Result<()> {
        let shutdown = self.shared.shutdown.clone();

        self.set_state(ClientState::Identifying);
        let robot_id = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            id = self.identify() => id?,
        };

        self.set_state(ClientState::Connecting);
        self.shared.outbound_worker.start()?;
        self.shared.service_worker.start()?;

        let url = self.config.server.robot_url(&robot_id);
        let connection = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            conn = self.connector.connect(&url) => conn?,
        };

        handlers::register_builtin(&self.shared.registry, &self.store);

        let sink = connection.sink.clone();
        let adaptor = Arc::new(MessageAdaptor::new(self.shared.registry.clone()));
        let outbound = Outbound::new(
            sink.clone(),
            self.shared.outbound_worker.clone(),
            self.config.connection.outbound_timeout(),
        );
        *self.shared.link.write() = Some(Link {
            outbound,
            adaptor: adaptor.clone(),
        });

        let heartbeat_cancel = shutdown.child_token();
        *self.active.lock() = Some(Active {
            adaptor: adaptor.clone(),
            sink: sink.clone(),
            heartbeat_cancel: heartbeat_cancel.clone(),
            heartbeat: None,
        });

        self.set_state(ClientState::Connected);
        info!(robot_id = %robot_id, url = %url, "connected");
        if self.config.connection.reset_backoff_on_connect {
            self.backoff.lock().reset();
        }

        if let Err(e) = heartbeat::send_heartbeat(&*sink).await {
            warn!(error = %e, "initial heartbeat failed");
        }
        let task = heartbeat::spawn_heartbeat(
            sink,
            self.config.connection.heartbeat_interval(),
            heartbeat_cancel,
        );
        if let Some(active) = self.active.lock().as_mut() {
            active.heartbeat = Some(task);
        }

        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("shutdown requested");
                Ok(())
            }
            outcome = adaptor.start_listening(connection) => match outcome {
                Ok(()) if shutdown.is_cancelled() => Ok(()),
                Ok(()) => Err(RmcsError::ConnectionClosed),
                Err(e) => Err(e),
            },
        }
    }

    /// Tear down the current connection, if any, and stop the worker loops.
    pub async fn disconnect(&self) {
        let active = self.active.lock().take();
        if let Some(active) = active {
            self.set_state(ClientState::Disconnecting);

            active.heartbeat_cancel.cancel();
            if let Some(task) = active.heartbeat {
                if let Err(e) = task.await {
                    warn!(error = %e, "heartbeat task ended abnormally");
                }
            }

            active.adaptor.stop();
            if let Some(sessions) = active.adaptor.sessions() {
                sessions.close_all();
            }
            if let Err(e) = active.sink.close().await {
                debug!(error = %e, "close failed");
            }
            info!("disconnected");
        }

        self.shared.link.write().take();
        self.stop_workers().await;
    }

    async fn stop_workers(&self) {
        let timeout = self.config.connection.worker_stop_timeout();
        for worker in [&self.shared.outbound_worker, &self.shared.service_worker] {
            let worker = worker.clone();
            let name = worker.name().to_string();
            match tokio::task::spawn_blocking(move || worker.stop(timeout)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(worker = %name, error = %e, "worker loop stop failed"),
                Err(e) => warn!(worker = %name, error = %e, "worker loop stop panicked"),
            }
        }
    }

    /// Stay connected until shutdown, reconnecting with exponential backoff.
    pub async fn run(&self) -> Result<()> {
        let shutdown = self.shared.shutdown.clone();
        info!("robot client starting");

        while !shutdown.is_cancelled() {
            if let Err(e) = self.connect().await {
                warn!(error = %e, "connection ended");
            }
            if shutdown.is_cancelled() {
                break;
            }

            let delay = self.backoff.lock().next_delay();
            self.set_state(ClientState::Backoff);
            info!(retry_in = ?delay, "reconnecting");
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.set_state(ClientState::Stopped);
        info!("robot client stopped");
        Ok(())
    }

    /// Ask `run`/`connect` to wind down.
    pub fn shutdown(&self) {
        self.shared.shutdown.cancel();
    }
}
