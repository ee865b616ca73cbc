use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use rmcs_core::RmcsError;

use crate::schema::{BotConfig, rmcs_home};

/// Loads and holds the bot configuration.
pub struct ConfigLoader {
    config: Arc<RwLock<BotConfig>>,
    config_path: PathBuf,
}

impl ConfigLoader {
    /// Resolve the config path: explicit path > RMCS_CONFIG > CONFIG_PATH > ~/.rmcs/bot.toml
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(p) = explicit {
            return p.to_path_buf();
        }
        for var in ["RMCS_CONFIG", "CONFIG_PATH"] {
            if let Ok(p) = std::env::var(var) {
                if !p.is_empty() {
                    return PathBuf::from(p);
                }
            }
        }
        rmcs_home().join("bot.toml")
    }

    /// Load the config from disk, falling back to defaults.
    pub fn load(path: Option<&Path>) -> rmcs_core::Result<Self> {
        let config_path = Self::resolve_path(path);
        let config = if config_path.exists() {
            info!(?config_path, "loading configuration");
            let raw = std::fs::read_to_string(&config_path)?;
            Self::parse(&raw, &config_path)?
        } else {
            warn!(?config_path, "config file not found, using defaults");
            BotConfig::default()
        };

        let config = Self::apply_env_overrides(config);
        Self::check(&config)?;

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_path,
        })
    }

    /// Parse TOML text into a config. `origin` is only used in error messages.
    pub fn parse(raw: &str, origin: &Path) -> rmcs_core::Result<BotConfig> {
        toml::from_str::<BotConfig>(raw).map_err(|e| {
            RmcsError::Config(format!("failed to parse {}: {}", origin.display(), e))
        })
    }

    /// Get a read snapshot of the current config.
    pub fn get(&self) -> BotConfig {
        self.config.read().clone()
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Validate and log warnings; hard errors become `RmcsError::Config`.
    fn check(config: &BotConfig) -> rmcs_core::Result<()> {
        match config.validate() {
            Ok(warnings) => {
                for w in &warnings {
                    warn!("{}", w);
                }
                Ok(())
            }
            Err(e) => Err(RmcsError::Config(e)),
        }
    }

    /// Apply env var overrides (RMCS_SERVER_HTTP, RMCS_STORAGE_DIR, etc.)
    fn apply_env_overrides(mut config: BotConfig) -> BotConfig {
        if let Ok(v) = std::env::var("RMCS_SERVER_HTTP") {
            config.server.http = v;
        }
        if let Ok(v) = std::env::var("RMCS_SERVER_WEBSOCKET") {
            config.server.websocket = v;
        }
        if let Ok(v) = std::env::var("RMCS_STORAGE_DIR") {
            config.storage.directory = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("RMCS_LOG_LEVEL") {
            config.logging.level = v;
        }
        if let Ok(v) = std::env::var("RMCS_LOG_DIR") {
            config.logging.directory = Some(PathBuf::from(v));
        }
        config
    }

    /// Reload the config from disk.
    pub fn reload(&self) -> rmcs_core::Result<()> {
        if !self.config_path.exists() {
            return Err(RmcsError::Config(format!(
                "config file not found: {}",
                self.config_path.display()
            )));
        }
        let raw = std::fs::read_to_string(&self.config_path)?;
        let new_config = Self::apply_env_overrides(Self::parse(&raw, &self.config_path)?);
        Self::check(&new_config)?;
        *self.config.write() = new_config;
        info!("configuration reloaded");
        Ok(())
    }
}
