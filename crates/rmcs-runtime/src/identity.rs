//! Robot identity: the cached id on disk and the server lookup that issues it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use rmcs_core::{Result, RmcsError};

const ROBOT_ID_FILE: &str = "robot_id";

/// Single-value store for the robot id at `<dir>/robot_id`.
#[derive(Debug, Clone)]
pub struct IdentityStore {
    path: PathBuf,
}

impl IdentityStore {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir).map_err(|e| {
            RmcsError::Storage(format!("cannot create {}: {}", dir.display(), e))
        })?;
        Ok(Self {
            path: dir.join(ROBOT_ID_FILE),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The cached id, if one was saved. Blank files count as absent.
    pub fn load(&self) -> Result<Option<String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => {
                let id = raw.trim();
                Ok((!id.is_empty()).then(|| id.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(RmcsError::Storage(format!(
                "cannot read {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    pub fn save(&self, robot_id: &str) -> Result<()> {
        std::fs::write(&self.path, robot_id).map_err(|e| {
            RmcsError::Storage(format!("cannot write {}: {}", self.path.display(), e))
        })?;
        info!(robot_id = %robot_id, "robot id saved");
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(RmcsError::Storage(format!(
                "cannot remove {}: {}",
                self.path.display(),
                e
            ))),
        }
    }
}

/// Asks the server who this robot is.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn whoami(&self) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct WhoamiRequest<'a> {
    username: &'a str,
    mac: &'a str,
}

#[derive(Debug, Deserialize)]
struct WhoamiResponse {
    robot_id: Option<String>,
}

/// `POST <base>/ident/whoami` with `{username, mac}`.
pub struct HttpWhoami {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpWhoami {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: whoami_url(base_url),
            timeout,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl IdentityProvider for HttpWhoami {
    async fn whoami(&self) -> Result<String> {
        let username = current_username();
        let mac = crate::network::primary_mac();
        info!(url = %self.endpoint, "requesting robot id");

        let resp = self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .json(&WhoamiRequest {
                username: &username,
                mac: &mac,
            })
            .send()
            .await
            .map_err(|e| RmcsError::Identification(format!("whoami request failed: {e}")))?;

        let status = resp.status();
        if status != reqwest::StatusCode::OK {
            return Err(RmcsError::Identification(format!(
                "whoami returned status {status}"
            )));
        }

        let body: WhoamiResponse = resp
            .json()
            .await
            .map_err(|e| RmcsError::Identification(format!("invalid whoami response: {e}")))?;

        match body.robot_id {
            Some(id) if !id.trim().is_empty() => Ok(id.trim().to_string()),
            _ => Err(RmcsError::Identification(
                "whoami response has no robot_id".into(),
            )),
        }
    }
}

/// REST calls go over http(s) even when configured with a ws(s) base.
pub fn normalize_base_url(raw: &str) -> String {
    if let Some(rest) = raw.strip_prefix("ws://") {
        format!("http://{rest}")
    } else if let Some(rest) = raw.strip_prefix("wss://") {
        format!("https://{rest}")
    } else {
        raw.to_string()
    }
}

pub fn whoami_url(base: &str) -> String {
    format!("{}/ident/whoami", normalize_base_url(base).trim_end_matches('/'))
}

fn current_username() -> String {
    ["USER", "USERNAME", "LOGNAME"]
        .iter()
        .find_map(|var| std::env::var(var).ok().filter(|v| !v.is_empty()))
        .unwrap_or_else(|| {
            warn!("no username in environment, reporting 'unknown'");
            "unknown".to_string()
        })
}
