//! # lqd-cluster
//!
//! Distributed query processing. When the proxy runs clustered, a request
//! touching backends owned by partner nodes is decomposed into one
//! sub-request per node, dispatched concurrently with a bounded wait, and
//! re-merged, stats rollup included, before the final local sort and limit
//! pass.

#![warn(clippy::all)]

mod node;
mod planner;

pub use node::{MemoryNodeClient, Node, NodeClient, TcpNodeClient, WrappedResult};
pub use planner::NodeAccessor;
