//! # rmcs-runtime
//!
//! Everything between the socket and the handlers: the receive/dispatch loop,
//! per-exchange sessions, worker loops for synchronous callers, and the
//! connection lifecycle that keeps a robot attached to its control server.

pub mod adaptor;
pub mod backoff;
pub mod client;
pub mod handle;
pub mod handlers;
pub mod heartbeat;
pub mod identity;
pub mod network;
pub mod outbound;
pub mod registry;
pub mod session;
pub mod transport;
pub mod worker;

pub use adaptor::{AdaptorState, MessageAdaptor};
pub use backoff::Backoff;
pub use client::{ClientState, RobotClient};
pub use handle::ClientHandle;
pub use identity::{HttpWhoami, IdentityProvider, IdentityStore};
pub use outbound::Outbound;
pub use registry::{EventHandler, HandlerRegistry, InstructionHandler, event_fn, instruction_fn};
pub use session::{MessageKind, Session, SessionManager, SessionMessage};
pub use transport::{Connection, Connector, Frame, FrameSink, FrameStream, WsConnector};
pub use worker::{WorkHandle, WorkerLoop};
