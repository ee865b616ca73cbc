use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration, maps to `bot.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
    pub connection: ConnectionConfig,
}

// ── Server ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Base URL of the control server's HTTP API (identification).
    pub http: String,
    /// Base URL of the control server's WebSocket endpoint.
    pub websocket: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http: "http://127.0.0.1:8000".into(),
            websocket: "ws://127.0.0.1:8000".into(),
        }
    }
}

impl ServerConfig {
    /// Full connection URL for a robot: `<websocket>/ws/<robot_id>`.
    pub fn robot_url(&self, robot_id: &str) -> String {
        format!("{}/ws/{}", self.websocket.trim_end_matches('/'), robot_id)
    }
}

// ── Storage ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding persisted client state (the cached robot id).
    pub directory: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            directory: rmcs_home().join("storage"),
        }
    }
}

// ── Logging ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Output format: "pretty", "json", "compact".
    pub format: String,
    /// Directory for `rmcs-bot.log` (None = stderr only).
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "pretty".into(),
            directory: None,
        }
    }
}

// ── Connection ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub heartbeat_interval_secs: u64,
    /// Client-initiated ping cadence on the socket.
    pub ping_interval_secs: u64,
    /// How long to wait for a pong before declaring the link dead.
    pub ping_timeout_secs: u64,
    pub initial_retry_delay_secs: u64,
    pub max_retry_delay_secs: u64,
    /// Start over from the initial delay after every successful connect.
    pub reset_backoff_on_connect: bool,
    /// Blocking submit of outbound events/instructions.
    pub outbound_timeout_secs: u64,
    /// Blocking local run of an instruction handler.
    pub inbound_timeout_secs: u64,
    pub identify_timeout_secs: u64,
    pub worker_stop_timeout_secs: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: 30,
            ping_interval_secs: 20,
            ping_timeout_secs: 10,
            initial_retry_delay_secs: 5,
            max_retry_delay_secs: 60,
            reset_backoff_on_connect: false,
            outbound_timeout_secs: 5,
            inbound_timeout_secs: 30,
            identify_timeout_secs: 10,
            worker_stop_timeout_secs: 5,
        }
    }
}

impl ConnectionConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_secs(self.ping_timeout_secs)
    }

    pub fn initial_retry_delay(&self) -> Duration {
        Duration::from_secs(self.initial_retry_delay_secs)
    }

    pub fn max_retry_delay(&self) -> Duration {
        Duration::from_secs(self.max_retry_delay_secs)
    }

    pub fn outbound_timeout(&self) -> Duration {
        Duration::from_secs(self.outbound_timeout_secs)
    }

    pub fn inbound_timeout(&self) -> Duration {
        Duration::from_secs(self.inbound_timeout_secs)
    }

    pub fn identify_timeout(&self) -> Duration {
        Duration::from_secs(self.identify_timeout_secs)
    }

    pub fn worker_stop_timeout(&self) -> Duration {
        Duration::from_secs(self.worker_stop_timeout_secs)
    }
}

/// `~/.rmcs`, or `./.rmcs` when no home directory is known.
pub fn rmcs_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".rmcs")
}

// ── Validation ─────────────────────────────────────────────────

/// A single config validation issue.
#[derive(Debug)]
pub struct ConfigWarning {
    pub field: String,
    pub message: String,
    pub severity: WarningSeverity,
    pub hint: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningSeverity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self.severity {
            WarningSeverity::Error => "error",
            WarningSeverity::Warning => "warning",
            WarningSeverity::Info => "info",
        };
        write!(f, "[{}] {}: {}", tag, self.field, self.message)?;
        if let Some(ref h) = self.hint {
            write!(f, " ({})", h)?;
        }
        Ok(())
    }
}

impl BotConfig {
    /// Validate the config and return a list of warnings/errors.
    /// Returns `Err` with all messages joined if any severity is Error.
    pub fn validate(&self) -> Result<Vec<ConfigWarning>, String> {
        let mut warnings = Vec::new();

        // ── Server URLs ───
        check_url(
            &mut warnings,
            "server.http",
            &self.server.http,
            &["http://", "https://", "ws://", "wss://"],
        );
        check_url(
            &mut warnings,
            "server.websocket",
            &self.server.websocket,
            &["ws://", "wss://"],
        );
        if self.server.websocket.starts_with("ws://")
            && !is_local(&self.server.websocket)
        {
            warnings.push(ConfigWarning {
                field: "server.websocket".into(),
                message: "connection to a remote host is not encrypted".into(),
                severity: WarningSeverity::Info,
                hint: Some("Use a wss:// URL outside a trusted network".into()),
            });
        }

        // ── Intervals ───
        let c = &self.connection;
        for (field, value) in [
            ("connection.heartbeat_interval_secs", c.heartbeat_interval_secs),
            ("connection.ping_interval_secs", c.ping_interval_secs),
            ("connection.ping_timeout_secs", c.ping_timeout_secs),
            ("connection.initial_retry_delay_secs", c.initial_retry_delay_secs),
            ("connection.outbound_timeout_secs", c.outbound_timeout_secs),
            ("connection.inbound_timeout_secs", c.inbound_timeout_secs),
            ("connection.identify_timeout_secs", c.identify_timeout_secs),
        ] {
            if value == 0 {
                warnings.push(ConfigWarning {
                    field: field.into(),
                    message: "must be greater than zero".into(),
                    severity: WarningSeverity::Error,
                    hint: None,
                });
            }
        }
        if c.initial_retry_delay_secs > c.max_retry_delay_secs {
            warnings.push(ConfigWarning {
                field: "connection.max_retry_delay_secs".into(),
                message: format!(
                    "max delay {}s is below the initial delay {}s",
                    c.max_retry_delay_secs, c.initial_retry_delay_secs
                ),
                severity: WarningSeverity::Error,
                hint: None,
            });
        }
        if c.ping_timeout_secs >= c.ping_interval_secs && c.ping_interval_secs > 0 {
            warnings.push(ConfigWarning {
                field: "connection.ping_timeout_secs".into(),
                message: "ping timeout is not shorter than the ping interval".into(),
                severity: WarningSeverity::Warning,
                hint: None,
            });
        }

        // ── Logging ───
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.level".into(),
                message: format!("unknown log level '{}'", self.logging.level),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Valid values: {}", valid_levels.join(", "))),
            });
        }
        let valid_formats = ["pretty", "json", "compact"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.format".into(),
                message: format!("unknown log format '{}'", self.logging.format),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Valid values: {}", valid_formats.join(", "))),
            });
        }

        let errors: Vec<String> = warnings
            .iter()
            .filter(|w| w.severity == WarningSeverity::Error)
            .map(|w| format!("{}: {}", w.field, w.message))
            .collect();

        if !errors.is_empty() {
            return Err(format!("Configuration errors:\n  • {}", errors.join("\n  • ")));
        }

        Ok(warnings)
    }
}

fn check_url(warnings: &mut Vec<ConfigWarning>, field: &str, value: &str, schemes: &[&str]) {
    if value.trim().is_empty() {
        warnings.push(ConfigWarning {
            field: field.into(),
            message: "URL is empty".into(),
            severity: WarningSeverity::Error,
            hint: None,
        });
    } else if !schemes.iter().any(|s| value.starts_with(s)) {
        warnings.push(ConfigWarning {
            field: field.into(),
            message: format!("'{}' has an unsupported scheme", value),
            severity: WarningSeverity::Error,
            hint: Some(format!("Expected one of: {}", schemes.join(", "))),
        });
    } else if url::Url::parse(value).is_err() {
        warnings.push(ConfigWarning {
            field: field.into(),
            message: format!("'{}' is not a valid URL", value),
            severity: WarningSeverity::Error,
            hint: None,
        });
    }
}

fn is_local(raw: &str) -> bool {
    url::Url::parse(raw)
        .ok()
        .and_then(|u| u.host_str().map(|h| h == "localhost" || h.starts_with("127.")))
        .unwrap_or(false)
}
