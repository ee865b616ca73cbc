//! # rmcs-cli
//!
//! Command-line interface for the robot client.
//!
//! ## Commands
//!
//! - `rmcs-bot run`: Connect and stay connected to the control server
//! - `rmcs-bot identify`: Resolve and print this robot's id
//! - `rmcs-bot forget`: Drop the cached robot id
//! - `rmcs-bot network`: Print the interface inventory reported to the server
//! - `rmcs-bot config`: Show the effective configuration

pub mod commands;
pub mod logging;

pub use commands::Cli;
