//! # rmcs-core
//!
//! Shared vocabulary for the robot client: the error taxonomy and the wire
//! envelope spoken over the persistent connection.

pub mod envelope;
pub mod error;

pub use envelope::{Envelope, Payload, now_timestamp};
pub use error::{Result, RmcsError};
