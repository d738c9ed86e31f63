//! Bigshot API server library.
//!
//! Exposes config, state, error handling, the router and the WebSocket
//! protocol so integration tests and the binary entrypoint share them.

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod router;
pub mod state;
pub mod ws;
