//! Error handling for LQD.
//!
//! Provides the unified error type used across all LQD components and the
//! mapping onto the fixed16 wire status codes.

use std::fmt;

use thiserror::Error;

/// Result type alias for LQD operations.
pub type LqdResult<T> = std::result::Result<T, LqdError>;

/// Wire-level status categories.
///
/// These map one to one onto the HTTP-like codes carried in the fixed16
/// response preamble and are stable across versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Request served.
    Ok,
    /// The request could not be parsed or referenced an unknown column.
    BadRequest,
    /// The requested table does not exist.
    TableMissing,
    /// An upstream backend failed while serving the request.
    BackendFailure,
}

impl ErrorCode {
    /// Returns the numeric wire code.
    #[inline]
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        match self {
            Self::Ok => 200,
            Self::BadRequest => 400,
            Self::TableMissing => 404,
            Self::BackendFailure => 502,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u16())
    }
}

/// The main error type for LQD.
///
/// Parse and schema errors surface to the client as a 400/404 response;
/// backend errors are usually collected into the per-response `failed` map
/// instead of failing the request, except for command submission and
/// distributed timeouts.
#[derive(Debug, Error)]
pub enum LqdError {
    /// The request could not be parsed.
    #[error("bad request: {message}")]
    BadRequest {
        /// What was wrong with the request.
        message: String,
    },

    /// The requested table does not exist.
    #[error("bad request: table {table} does not exist")]
    TableNotFound {
        /// The missing table name as requested.
        table: String,
    },

    /// A column referenced by a filter, stats or sort header does not exist,
    /// even after the prefix-strip fallback.
    #[error("bad request: unrecognized column {column} in table {table}")]
    ColumnNotFound {
        /// The missing column.
        column: String,
        /// The table it was looked up in.
        table: String,
    },

    /// An upstream peer failed while serving its part of the request.
    #[error("backend {peer} failed: {message}")]
    BackendError {
        /// Backend id of the failing peer.
        peer: String,
        /// Upstream error text.
        message: String,
    },

    /// A command submission was rejected by the owning peer.
    #[error("{message}")]
    PeerCommand {
        /// Wire code reported by the peer.
        code: u16,
        /// Error text reported by the peer.
        message: String,
    },

    /// The distributed fan-out did not complete within its budget.
    #[error("timeout waiting for partner nodes")]
    DistributedTimeout,

    /// I/O error from the underlying connection.
    #[error("I/O error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Error message.
        message: String,
    },
}

impl LqdError {
    /// Returns the wire status category for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::BadRequest { .. } | Self::ColumnNotFound { .. } => ErrorCode::BadRequest,
            Self::TableNotFound { .. } => ErrorCode::TableMissing,
            Self::BackendError { .. }
            | Self::DistributedTimeout
            | Self::Io { .. }
            | Self::InvalidConfig { .. } => ErrorCode::BackendFailure,
            Self::PeerCommand { .. } => ErrorCode::BadRequest,
        }
    }

    /// Returns the numeric wire code, honoring the code embedded in a
    /// command rejection.
    #[must_use]
    pub const fn response_code(&self) -> u16 {
        match self {
            Self::PeerCommand { code, .. } => *code,
            other => other.code().as_u16(),
        }
    }

    /// Creates a parse error.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    /// Creates a parse error annotated with the offending header line, the
    /// `bad request: <detail> in: <line>` form.
    #[must_use]
    pub fn bad_request_in(message: impl Into<String>, line: &str) -> Self {
        Self::BadRequest {
            message: format!("{} in: {}", message.into(), line),
        }
    }
}
