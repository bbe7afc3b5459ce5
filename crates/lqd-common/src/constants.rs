//! System-wide constants.

/// Program name, used by the `lmd_version` virtual column and log output.
pub const PROGRAM_NAME: &str = "lqd";

/// Separator used when a list value is rendered as a scalar string and when
/// multi-column primary keys are joined. NUL cannot appear in upstream
/// payload strings.
pub const LIST_SEP: &str = "\x00";

/// Separator for stats group keys on the distributed path. Unlike
/// [`LIST_SEP`] this travels inside a JSON string and must be JSON-safe.
pub const STATS_KEY_SEP: &str = ";";

/// Wall-clock budget for a distributed fan-out before the whole request
/// fails.
pub const DISTRIBUTED_TIMEOUT_SECS: u64 = 10;

/// Size of the fixed16 response preamble in bytes.
pub const FIXED16_LEN: usize = 16;
