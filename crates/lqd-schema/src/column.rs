//! Column definitions.

use std::fmt;
use std::sync::Arc;

use crate::table::TableName;

/// The data type of a column value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    /// Plain string.
    String,
    /// List of strings.
    StringList,
    /// 32-bit integer.
    Int,
    /// 64-bit integer.
    Int64,
    /// List of 64-bit integers.
    Int64List,
    /// 64-bit float.
    Float,
    /// Large string payload, shared behind a pointer indirection.
    LargeString,
    /// List of `(host, service)` pairs.
    ServiceMemberList,
    /// List of arbitrary values, stored verbatim.
    InterfaceList,
    /// String-to-string map.
    HashMap,
    /// Custom variables map, filtered by variable name.
    CustomVar,
}

impl DataType {
    /// Number of distinct data types, for sizing per-type arrays.
    pub const COUNT: usize = 11;

    /// Returns a dense index for per-type bookkeeping.
    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self as usize
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Whether the upstream refresh loop re-reads a column periodically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchType {
    /// Fetched once at table initialization.
    Static,
    /// Re-fetched by the periodic refresh.
    Dynamic,
    /// Never fetched; computed on the fly.
    None,
}

/// How a column value is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageType {
    /// The value lives in this row's typed arrays.
    Local,
    /// The value is looked up through a reference into another table's row.
    Ref,
    /// The value is computed on read by a named resolver.
    Virtual,
}

bitflags::bitflags! {
    /// Backend-kind flags gating optional columns.
    ///
    /// A row presents the empty value for a column whose flags are not
    /// satisfied by the owning peer.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct OptionalFlags: u32 {
        /// The remote site is itself an LMD-style proxy.
        const LMD = 1 << 0;
        /// The remote connection returns more than one site.
        const MULTI_BACKEND = 1 << 1;
        /// Sub peer from within a remote proxy connection.
        const LMD_SUB = 1 << 2;
        /// Sub peer from within a remote HTTP connection.
        const HTTP_SUB = 1 << 3;
        /// The remote site is a Shinken installation.
        const SHINKEN = 1 << 4;
        /// The remote site is an Icinga 2 installation.
        const ICINGA2 = 1 << 5;
        /// The remote site is a Naemon installation.
        const NAEMON = 1 << 6;
        /// Naemon 1.0.10 or greater.
        const NAEMON_1_0_10 = 1 << 7;
    }
}

impl OptionalFlags {
    /// Returns true if any of the given flags are present. The empty flag
    /// set is always satisfied.
    #[inline]
    #[must_use]
    pub fn satisfies(self, required: OptionalFlags) -> bool {
        required.is_empty() || self.intersects(required)
    }
}

/// A single column within a table.
///
/// Columns are shared as `Arc<Column>`; a `Ref`-storage column holds the
/// target column of the referenced table directly.
#[derive(Debug)]
pub struct Column {
    /// Column name.
    pub name: String,
    /// Data type of the value.
    pub data_type: DataType,
    /// Refresh behavior.
    pub fetch_type: FetchType,
    /// Storage class.
    pub storage: StorageType,
    /// Backend-kind flags; empty means always available.
    pub optional: OptionalFlags,
    /// Position within the row's per-type parallel array. Only meaningful
    /// for `Local` storage.
    pub index: usize,
    /// Table this column belongs to.
    pub table: TableName,
    /// For `Ref` storage: the table the reference resolves through.
    pub ref_table: Option<TableName>,
    /// For `Ref` storage: the column of the referenced row.
    pub ref_column: Option<Arc<Column>>,
}

impl Column {
    /// Returns true if this column is available for a peer carrying the
    /// given flags.
    #[inline]
    #[must_use]
    pub fn available_for(&self, peer_flags: OptionalFlags) -> bool {
        peer_flags.satisfies(self.optional)
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}
