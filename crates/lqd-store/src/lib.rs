//! # lqd-store
//!
//! The in-memory column store of the LQD proxy.
//!
//! Each upstream monitoring core is represented by a [`Peer`] owning one
//! [`DataStore`] per table. Rows hold typed parallel arrays, resolve
//! cross-table references through weak primary-key lookups, and compute
//! virtual columns on read. Static string lists are deduplicated through a
//! SHA-256 table; plain strings go through a process-wide interner.

#![warn(clippy::all)]

mod intern;
mod peer;
mod row;
mod store;
pub mod value;
mod virt;

pub use intern::Interner;
pub use peer::{NoUpstream, Peer, PeerState, PeerStatus, PeerView, RowKey, TableSignals, Upstream};
pub use row::DataRow;
pub use store::{DataStore, UpdateSignal};
pub use value::{empty_value, number_to_json, ServiceMember, Value};
pub use virt::resolve_virtual;
