//! # lqd-query
//!
//! The query half of the LQD proxy: a parser for the line-oriented LQL
//! protocol, typed filters with stats accumulators, the local execution
//! engine (scan, authorization, aggregation, sort, wait conditions) and
//! the response encoders.

#![warn(clippy::all)]

mod auth;
mod encoder;
mod engine;
mod filter;
mod request;
mod response;

pub use encoder::{encode_error, encode_response};
pub use engine::{Engine, Projection};
pub use filter::{create_local_stats_copy, Filter, GroupOperator, Operator, StatsType};
pub use request::{OutputFormat, Request, SortDirection, SortField};
pub use response::{post_process, Response, SortKey};
