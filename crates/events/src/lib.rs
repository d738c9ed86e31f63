//! Real-time job update fan-out.
//!
//! Lifecycle and progress events are published as [`update::JobUpdate`]s on
//! a shared broker channel. Every API process runs a listener that drains
//! the channel into its own [`registry::ClientRegistry`]. When the broker is
//! unreachable, [`service::BroadcastService`] delivers to same-process
//! clients directly and reconnects in the background following a
//! [`reconnect::ReconnectPolicy`].

pub mod broker;
pub mod reconnect;
pub mod registry;
pub mod service;
pub mod update;

pub use broker::{Broker, BrokerError, MemoryBroker, PgBroker};
pub use reconnect::ReconnectPolicy;
pub use registry::{
    ActiveJobSummary, ClientRegistry, ConnectionInfo, ConnectionStats, Outbound, ServerMessage,
};
pub use service::{BroadcastConfig, BroadcastService};
pub use update::JobUpdate;
