//! # lqd-common
//!
//! Common types, errors and configuration for the LQD proxy.
//!
//! This crate provides the foundational pieces shared by all LQD
//! components:
//!
//! - **Errors**: unified error handling with [`LqdError`] and the wire
//!   status mapping via [`ErrorCode`]
//! - **Config**: engine-level configuration shared by the store, the query
//!   engine and the cluster planner
//! - **Constants**: protocol separators and limits

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod constants;
pub mod error;

pub use config::{AuthLevel, ConnectionConfig, EngineOptions, NodeConfig};
pub use constants::*;
pub use error::{ErrorCode, LqdError, LqdResult};
