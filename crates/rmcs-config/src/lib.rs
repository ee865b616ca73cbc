//! # rmcs-config
//!
//! Configuration for the robot client. Reads `bot.toml`, then applies
//! environment variable overrides.

pub mod loader;
pub mod schema;

pub use loader::ConfigLoader;
pub use schema::{
    BotConfig, ConfigWarning, ConnectionConfig, LoggingConfig, ServerConfig, StorageConfig,
    WarningSeverity, rmcs_home,
};
