//! Table definitions.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::column::{Column, DataType, FetchType, OptionalFlags, StorageType};

/// All tables served by the proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TableName {
    /// Monitored hosts.
    Hosts,
    /// Monitored services.
    Services,
    /// Host groups.
    Hostgroups,
    /// Service groups.
    Servicegroups,
    /// Hosts joined with their group memberships.
    HostsByGroup,
    /// Services joined with their group memberships.
    ServicesByGroup,
    /// Services joined with their host's group memberships.
    ServicesByHostgroup,
    /// Comments.
    Comments,
    /// Scheduled downtimes.
    Downtimes,
    /// Contacts.
    Contacts,
    /// Core status of each upstream site.
    Status,
    /// One row per configured backend, reporting proxy-side peer state.
    Sites,
    /// Log entries; not mirrored, queries pass straight through.
    Log,
}

/// Every table, in a fixed order usable for deterministic iteration.
pub const ALL_TABLES: &[TableName] = &[
    TableName::Hosts,
    TableName::Services,
    TableName::Hostgroups,
    TableName::Servicegroups,
    TableName::HostsByGroup,
    TableName::ServicesByGroup,
    TableName::ServicesByHostgroup,
    TableName::Comments,
    TableName::Downtimes,
    TableName::Contacts,
    TableName::Status,
    TableName::Sites,
    TableName::Log,
];

impl TableName {
    /// Returns the wire name of the table.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hosts => "hosts",
            Self::Services => "services",
            Self::Hostgroups => "hostgroups",
            Self::Servicegroups => "servicegroups",
            Self::HostsByGroup => "hostsbygroup",
            Self::ServicesByGroup => "servicesbygroup",
            Self::ServicesByHostgroup => "servicesbyhostgroup",
            Self::Comments => "comments",
            Self::Downtimes => "downtimes",
            Self::Contacts => "contacts",
            Self::Status => "status",
            Self::Sites => "sites",
            Self::Log => "log",
        }
    }

    /// Parses a wire table name.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        ALL_TABLES.iter().copied().find(|t| t.as_str() == name)
    }

    /// The prefix stripped from column names when a literal lookup misses,
    /// to be nice to clients requesting `<table>_<column>`.
    #[must_use]
    pub fn column_prefix(self) -> String {
        match self {
            Self::HostsByGroup => "host_".to_string(),
            Self::ServicesByGroup | Self::ServicesByHostgroup => "service_".to_string(),
            Self::Status => "status_".to_string(),
            other => {
                let mut prefix = other.as_str().trim_end_matches('s').to_string();
                prefix.push('_');
                prefix
            }
        }
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A foreign-key spec: the local columns whose values key the target
/// table's primary index.
#[derive(Debug, Clone)]
pub struct RefTable {
    /// The referenced table.
    pub table: TableName,
    /// One or two source columns of this table.
    pub columns: Vec<Arc<Column>>,
}

/// A named collection of columns.
#[derive(Debug)]
pub struct Table {
    /// Table name.
    pub name: TableName,
    /// Columns in declaration order.
    pub columns: Vec<Arc<Column>>,
    /// Primary key, one or two column names.
    pub primary_key: Vec<String>,
    /// Foreign-key specs resolved at set-data time.
    pub ref_tables: Vec<RefTable>,
    /// Rows are not stored; queries proxy straight to the backend.
    pub passthrough_only: bool,
    column_index: HashMap<String, usize>,
    data_sizes: [usize; DataType::COUNT],
    empty: Arc<Column>,
}

impl Table {
    /// Looks up a column by its literal name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Arc<Column>> {
        self.column_index.get(name).map(|&i| &self.columns[i])
    }

    /// Looks up a column, stripping the table-specific prefix once on a
    /// miss. Returns the column together with the rewritten name when the
    /// fallback hit.
    #[must_use]
    pub fn column_with_fallback(&self, name: &str) -> Option<(&Arc<Column>, Option<String>)> {
        if let Some(col) = self.column(name) {
            return Some((col, None));
        }
        let stripped = name.strip_prefix(&self.name.column_prefix())?;
        self.column(stripped).map(|col| (col, Some(stripped.to_string())))
    }

    /// The sentinel column used for optional-column degradation and for
    /// unknown projection names. Always returns the empty string.
    #[must_use]
    pub fn empty_column(&self) -> &Arc<Column> {
        &self.empty
    }

    /// Number of local-storage slots of the given data type, for sizing a
    /// row's parallel arrays.
    #[inline]
    #[must_use]
    pub fn data_size(&self, data_type: DataType) -> usize {
        self.data_sizes[data_type.as_usize()]
    }
}

/// Incremental table construction used by the catalog.
pub(crate) struct TableBuilder {
    name: TableName,
    columns: Vec<Arc<Column>>,
    column_index: HashMap<String, usize>,
    data_sizes: [usize; DataType::COUNT],
    passthrough_only: bool,
}

impl TableBuilder {
    pub(crate) fn new(name: TableName) -> Self {
        Self {
            name,
            columns: Vec::new(),
            column_index: HashMap::new(),
            data_sizes: [0; DataType::COUNT],
            passthrough_only: false,
        }
    }

    pub(crate) fn passthrough(mut self) -> Self {
        self.passthrough_only = true;
        self
    }

    fn push(&mut self, col: Column) -> Arc<Column> {
        let col = Arc::new(col);
        let prev = self
            .column_index
            .insert(col.name.clone(), self.columns.len());
        assert!(prev.is_none(), "duplicate column {} in {}", col.name, self.name);
        self.columns.push(Arc::clone(&col));
        col
    }

    /// Adds a local-storage column.
    pub(crate) fn col(&mut self, name: &str, data_type: DataType, fetch: FetchType) -> Arc<Column> {
        self.opt_col(name, data_type, fetch, OptionalFlags::empty())
    }

    /// Adds a local-storage column gated by backend flags.
    pub(crate) fn opt_col(
        &mut self,
        name: &str,
        data_type: DataType,
        fetch: FetchType,
        optional: OptionalFlags,
    ) -> Arc<Column> {
        let index = self.data_sizes[data_type.as_usize()];
        self.data_sizes[data_type.as_usize()] += 1;
        self.push(Column {
            name: name.to_string(),
            data_type,
            fetch_type: fetch,
            storage: StorageType::Local,
            optional,
            index,
            table: self.name,
            ref_table: None,
            ref_column: None,
        })
    }

    /// Adds a virtual column computed on read by the resolver registered
    /// under `name`.
    pub(crate) fn virt(&mut self, name: &str, data_type: DataType) -> Arc<Column> {
        self.push(Column {
            name: name.to_string(),
            data_type,
            fetch_type: FetchType::None,
            storage: StorageType::Virtual,
            optional: OptionalFlags::empty(),
            index: 0,
            table: self.name,
            ref_table: None,
            ref_column: None,
        })
    }

    /// Adds a column resolved through a reference into `target`'s table.
    pub(crate) fn ref_col(&mut self, name: &str, target: &Arc<Column>) -> Arc<Column> {
        self.push(Column {
            name: name.to_string(),
            data_type: target.data_type,
            fetch_type: FetchType::None,
            storage: StorageType::Ref,
            optional: target.optional,
            index: 0,
            table: self.name,
            ref_table: Some(target.table),
            ref_column: Some(Arc::clone(target)),
        })
    }

    pub(crate) fn build(self, primary_key: &[&str], ref_tables: Vec<RefTable>) -> Table {
        for key in primary_key {
            assert!(
                self.column_index.contains_key(*key),
                "primary key {} missing in {}",
                key,
                self.name
            );
        }
        // the sentinel is deliberately not part of the column list; it only
        // stands in for unavailable or unknown columns
        let empty = Arc::new(Column {
            name: "empty".to_string(),
            data_type: DataType::String,
            fetch_type: FetchType::None,
            storage: StorageType::Virtual,
            optional: OptionalFlags::empty(),
            index: 0,
            table: self.name,
            ref_table: None,
            ref_column: None,
        });
        Table {
            name: self.name,
            columns: self.columns,
            primary_key: primary_key.iter().map(|s| (*s).to_string()).collect(),
            ref_tables,
            passthrough_only: self.passthrough_only,
            column_index: self.column_index,
            data_sizes: self.data_sizes,
            empty,
        }
    }
}
