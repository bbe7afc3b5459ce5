//! # lqd-server
//!
//! The client-facing surface of the LQD proxy: the TCP listener, the
//! per-connection session loop with keep-alive, command dispatch, and the
//! server configuration consumed by the `lqdd` daemon.

#![warn(clippy::all)]

pub mod config;
mod listener;
mod session;

pub use config::ServerConfig;
pub use listener::run_listener;
pub use session::{serve_connection, ProxyContext};
