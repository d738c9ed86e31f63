//! Real-time job updates over WebSocket.
//!
//! Provides the authenticated upgrade handler, the client command
//! protocol, and the heartbeat that keeps idle connections alive.

mod handler;
mod heartbeat;
pub mod protocol;

pub use handler::{connection_stats, ws_handler};
pub use heartbeat::start_heartbeat;
