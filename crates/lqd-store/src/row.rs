//! A single row of a data store.
//!
//! Rows hold one parallel array per data type, indexed by `Column::index`.
//! Cross-table references are weak row indices resolved through the target
//! store's primary-key index at set-data time; a reader follows them via
//! the [`PeerView`] snapshot.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value as Json;
use tracing::error;

use lqd_common::{LqdError, LqdResult, LIST_SEP};
use lqd_schema::{Column, DataType, FetchType, StorageType, Table, TableName};

use crate::intern::Interner;
use crate::peer::PeerView;
use crate::value::{
    empty_value, json_to_float, json_to_int, json_to_int64, json_to_int64_list,
    json_to_interface_list, json_to_members, json_to_string, json_to_string_list, ServiceMember,
    Value,
};
use crate::virt::resolve_virtual;

/// Mutable store context threaded through row writes.
pub(crate) struct RowWriteCtx<'a> {
    pub table: &'a Table,
    pub interner: &'a Interner,
    pub dedup: &'a mut HashMap<[u8; 32], Arc<Vec<String>>>,
}

/// A single entry in a [`crate::DataStore`].
#[derive(Debug, Default)]
pub struct DataRow {
    /// Timestamp of the last update applied to this row.
    pub last_update: i64,
    pub(crate) idx: usize,
    pub(crate) refs: HashMap<TableName, usize>,
    data_string: Vec<Arc<str>>,
    data_string_large: Vec<Arc<str>>,
    data_string_list: Vec<Arc<Vec<String>>>,
    data_int: Vec<i32>,
    data_int64: Vec<i64>,
    data_int64_list: Vec<Vec<i64>>,
    data_float: Vec<f64>,
    data_members: Vec<Vec<ServiceMember>>,
    data_interface_list: Vec<Vec<Json>>,
}

impl DataRow {
    /// Creates a row with arrays sized for the table; virtual-only tables
    /// get empty arrays.
    pub(crate) fn sized_for(table: &Table) -> Self {
        let empty: Arc<str> = Arc::from("");
        Self {
            data_string: vec![Arc::clone(&empty); table.data_size(DataType::String)],
            data_string_large: vec![empty; table.data_size(DataType::LargeString)],
            data_string_list: vec![
                Arc::new(Vec::new());
                table.data_size(DataType::StringList)
            ],
            data_int: vec![0; table.data_size(DataType::Int)],
            data_int64: vec![0; table.data_size(DataType::Int64)],
            data_int64_list: vec![Vec::new(); table.data_size(DataType::Int64List)],
            data_float: vec![0.0; table.data_size(DataType::Float)],
            data_members: vec![Vec::new(); table.data_size(DataType::ServiceMemberList)],
            data_interface_list: vec![Vec::new(); table.data_size(DataType::InterfaceList)],
            ..Self::default()
        }
    }

    /// Overwrites values at the columns-to-raw positional pairing.
    pub(crate) fn update_values(
        &mut self,
        ctx: &mut RowWriteCtx<'_>,
        offset: usize,
        raw: &[Json],
        columns: &[Arc<Column>],
        timestamp: i64,
    ) -> LqdResult<()> {
        if columns.len() != raw.len().saturating_sub(offset) {
            return Err(LqdError::BackendError {
                peer: String::new(),
                message: format!(
                    "table {} update failed, data size mismatch, expected {} columns and got {}",
                    ctx.table.name,
                    columns.len(),
                    raw.len()
                ),
            });
        }
        for (i, col) in columns.iter().enumerate() {
            let cell = &raw[i + offset];
            match col.data_type {
                DataType::String => {
                    self.data_string[col.index] = ctx.interner.intern(&json_to_string(cell));
                }
                DataType::LargeString => {
                    self.data_string_large[col.index] = Arc::from(json_to_string(cell).as_str());
                }
                DataType::StringList => {
                    let list = json_to_string_list(cell);
                    self.data_string_list[col.index] = if col.fetch_type == FetchType::Static {
                        dedup_string_list(ctx.dedup, list)
                    } else {
                        Arc::new(list)
                    };
                }
                DataType::Int => self.data_int[col.index] = json_to_int(cell),
                DataType::Int64 => self.data_int64[col.index] = json_to_int64(cell),
                DataType::Int64List => {
                    self.data_int64_list[col.index] = json_to_int64_list(cell);
                }
                DataType::Float => self.data_float[col.index] = json_to_float(cell),
                DataType::ServiceMemberList => {
                    self.data_members[col.index] = json_to_members(cell);
                }
                DataType::InterfaceList => {
                    self.data_interface_list[col.index] = json_to_interface_list(cell);
                }
                DataType::HashMap | DataType::CustomVar => {
                    panic!("column {} cannot be stored locally", col.name)
                }
            }
        }
        self.last_update = timestamp;
        Ok(())
    }

    /// Fast-path update touching only numeric and numeric-list fields.
    pub(crate) fn update_values_number_only(
        &mut self,
        ctx: &mut RowWriteCtx<'_>,
        offset: usize,
        raw: &[Json],
        columns: &[Arc<Column>],
        timestamp: i64,
    ) -> LqdResult<()> {
        if columns.len() != raw.len().saturating_sub(offset) {
            return Err(LqdError::BackendError {
                peer: String::new(),
                message: format!(
                    "table {} update failed, data size mismatch, expected {} columns and got {}",
                    ctx.table.name,
                    columns.len(),
                    raw.len()
                ),
            });
        }
        for (i, col) in columns.iter().enumerate() {
            let cell = &raw[i + offset];
            match col.data_type {
                DataType::Int => self.data_int[col.index] = json_to_int(cell),
                DataType::Int64 => self.data_int64[col.index] = json_to_int64(cell),
                DataType::Int64List => {
                    self.data_int64_list[col.index] = json_to_int64_list(cell);
                }
                DataType::Float => self.data_float[col.index] = json_to_float(cell),
                DataType::InterfaceList => {
                    self.data_interface_list[col.index] = json_to_interface_list(cell);
                }
                _ => {}
            }
        }
        self.last_update = timestamp;
        Ok(())
    }

    /// Point comparison used to gate a full update.
    pub(crate) fn check_changed_int_values(&self, raw: &[Json], columns: &[Arc<Column>]) -> bool {
        columns
            .iter()
            .zip(raw)
            .any(|(col, cell)| json_to_int(cell) != self.data_int[col.index])
    }

    pub(crate) fn set_ref(&mut self, table: TableName, idx: usize) {
        self.refs.insert(table, idx);
    }

    /// The primary-key value of this row, multi-column keys joined with the
    /// NUL separator. Empty for tables without a primary key.
    #[must_use]
    pub fn id(&self, table: &Table) -> String {
        if table.primary_key.is_empty() {
            return String::new();
        }
        let mut id = String::new();
        for (i, key) in table.primary_key.iter().enumerate() {
            if i > 0 {
                id.push_str(LIST_SEP);
            }
            let col = table
                .column(key)
                .unwrap_or_else(|| panic!("missing primary key column {}", key));
            id.push_str(&self.local_scalar_string(col));
        }
        if id.is_empty() || id == LIST_SEP {
            error!("id for {} is null", table.name);
        }
        id
    }

    /// The two components of a two-column primary key.
    #[must_use]
    pub fn id2(&self, table: &Table) -> (String, String) {
        let first = table.column(&table.primary_key[0]).expect("primary key");
        let second = table.column(&table.primary_key[1]).expect("primary key");
        (
            self.local_scalar_string(first),
            self.local_scalar_string(second),
        )
    }

    /// Renders a local scalar column without following refs; primary keys
    /// and reference keys are always local.
    pub(crate) fn local_scalar_string(&self, col: &Column) -> String {
        match col.data_type {
            DataType::String => self.data_string[col.index].to_string(),
            DataType::Int => self.data_int[col.index].to_string(),
            DataType::Int64 => self.data_int64[col.index].to_string(),
            _ => panic!("unsupported primary key type {}", col.data_type),
        }
    }

    /// Local string-list access without a view; used while rebuilding
    /// group tables and caches under write locks.
    pub(crate) fn local_string_list(&self, col: &Column) -> &[String] {
        debug_assert_eq!(col.data_type, DataType::StringList);
        &self.data_string_list[col.index]
    }

    pub(crate) fn local_members(&self, col: &Column) -> &[ServiceMember] {
        debug_assert_eq!(col.data_type, DataType::ServiceMemberList);
        &self.data_members[col.index]
    }

    pub(crate) fn local_i64(&self, col: &Column) -> i64 {
        match col.data_type {
            DataType::Int64 => self.data_int64[col.index],
            DataType::Int => i64::from(self.data_int[col.index]),
            _ => panic!("unsupported type {} for {}", col.data_type, col.name),
        }
    }

    fn ref_row<'a>(&self, col: &Column, view: &'a PeerView<'a>) -> Option<&'a DataRow> {
        let table = col.ref_table?;
        let idx = *self.refs.get(&table)?;
        view.store(table).rows().get(idx)
    }

    fn virt_value(&self, col: &Column, view: &PeerView<'_>) -> Value {
        resolve_virtual(self, col, view).cast_to(col.data_type)
    }

    /// Returns the string value for the given column.
    pub fn get_string<'a>(&'a self, col: &Column, view: &'a PeerView<'a>) -> Cow<'a, str> {
        match col.storage {
            StorageType::Local => match col.data_type {
                DataType::String => Cow::Borrowed(self.data_string[col.index].as_ref()),
                DataType::LargeString => {
                    Cow::Borrowed(self.data_string_large[col.index].as_ref())
                }
                DataType::Int => Cow::Owned(self.data_int[col.index].to_string()),
                DataType::Int64 => Cow::Owned(self.data_int64[col.index].to_string()),
                DataType::Float => Cow::Owned(self.data_float[col.index].to_string()),
                DataType::StringList => Cow::Owned(
                    Value::StrList(self.data_string_list[col.index].as_ref().clone())
                        .into_display_string(),
                ),
                DataType::Int64List => Cow::Owned(
                    Value::IntList(self.data_int64_list[col.index].clone())
                        .into_display_string(),
                ),
                DataType::ServiceMemberList => Cow::Owned(
                    Value::Members(self.data_members[col.index].clone()).into_display_string(),
                ),
                DataType::InterfaceList => Cow::Owned(
                    Value::List(self.data_interface_list[col.index].clone())
                        .into_display_string(),
                ),
                DataType::HashMap | DataType::CustomVar => {
                    panic!("unsupported type {} for {}", col.data_type, col.name)
                }
            },
            StorageType::Ref => match self.ref_row(col, view) {
                Some(row) => row.get_string(ref_col(col), view),
                None => Cow::Owned(empty_value(col.data_type).into_display_string()),
            },
            StorageType::Virtual => Cow::Owned(self.virt_value(col, view).into_display_string()),
        }
    }

    /// Returns the float value for the given column. The conversion is
    /// total; non-numeric columns yield 0.
    pub fn get_float(&self, col: &Column, view: &PeerView<'_>) -> f64 {
        match col.storage {
            StorageType::Local => match col.data_type {
                DataType::Float => self.data_float[col.index],
                DataType::Int => f64::from(self.data_int[col.index]),
                DataType::Int64 => self.data_int64[col.index] as f64,
                DataType::String => self.data_string[col.index].parse().unwrap_or(0.0),
                _ => 0.0,
            },
            StorageType::Ref => match self.ref_row(col, view) {
                Some(row) => row.get_float(ref_col(col), view),
                None => empty_value(col.data_type).as_f64(),
            },
            StorageType::Virtual => self.virt_value(col, view).as_f64(),
        }
    }

    /// Returns the integer value for the given column.
    pub fn get_int(&self, col: &Column, view: &PeerView<'_>) -> i64 {
        match col.storage {
            StorageType::Local => match col.data_type {
                DataType::Int => i64::from(self.data_int[col.index]),
                DataType::Int64 => self.data_int64[col.index],
                DataType::Float => self.data_float[col.index] as i64,
                DataType::String => self.data_string[col.index].parse().unwrap_or(0),
                _ => 0,
            },
            StorageType::Ref => match self.ref_row(col, view) {
                Some(row) => row.get_int(ref_col(col), view),
                None => empty_value(col.data_type).as_i64(),
            },
            StorageType::Virtual => self.virt_value(col, view).as_i64(),
        }
    }

    /// Returns the 64-bit integer value for the given column.
    pub fn get_int64(&self, col: &Column, view: &PeerView<'_>) -> i64 {
        self.get_int(col, view)
    }

    /// Returns the string list for the given column.
    pub fn get_string_list<'a>(&'a self, col: &Column, view: &'a PeerView<'a>) -> Cow<'a, [String]> {
        match col.storage {
            StorageType::Local => match col.data_type {
                DataType::StringList => {
                    Cow::Borrowed(self.data_string_list[col.index].as_slice())
                }
                _ => panic!("unsupported type {} for {}", col.data_type, col.name),
            },
            StorageType::Ref => match self.ref_row(col, view) {
                Some(row) => row.get_string_list(ref_col(col), view),
                None => Cow::Owned(Vec::new()),
            },
            StorageType::Virtual => match self.virt_value(col, view) {
                Value::StrList(list) => Cow::Owned(list),
                _ => Cow::Owned(Vec::new()),
            },
        }
    }

    /// Returns the integer list for the given column.
    pub fn get_int64_list<'a>(&'a self, col: &Column, view: &'a PeerView<'a>) -> Cow<'a, [i64]> {
        match col.storage {
            StorageType::Local => match col.data_type {
                DataType::Int64List => Cow::Borrowed(self.data_int64_list[col.index].as_slice()),
                _ => panic!("unsupported type {} for {}", col.data_type, col.name),
            },
            StorageType::Ref => match self.ref_row(col, view) {
                Some(row) => row.get_int64_list(ref_col(col), view),
                None => Cow::Owned(Vec::new()),
            },
            StorageType::Virtual => match self.virt_value(col, view) {
                Value::IntList(list) => Cow::Owned(list),
                _ => Cow::Owned(Vec::new()),
            },
        }
    }

    /// Returns the hash map for the given column.
    pub fn get_hash_map(&self, col: &Column, view: &PeerView<'_>) -> HashMap<String, String> {
        match col.storage {
            StorageType::Local => panic!("unsupported type {} for {}", col.data_type, col.name),
            StorageType::Ref => match self.ref_row(col, view) {
                Some(row) => row.get_hash_map(ref_col(col), view),
                None => HashMap::new(),
            },
            StorageType::Virtual => match self.virt_value(col, view) {
                Value::Hash(map) => map,
                _ => HashMap::new(),
            },
        }
    }

    /// Returns the service member list for the given column.
    pub fn get_service_members<'a>(
        &'a self,
        col: &Column,
        view: &'a PeerView<'a>,
    ) -> Cow<'a, [ServiceMember]> {
        match col.storage {
            StorageType::Local => match col.data_type {
                DataType::ServiceMemberList => {
                    Cow::Borrowed(self.data_members[col.index].as_slice())
                }
                _ => panic!("unsupported type {} for {}", col.data_type, col.name),
            },
            StorageType::Ref => match self.ref_row(col, view) {
                Some(row) => row.get_service_members(ref_col(col), view),
                None => Cow::Owned(Vec::new()),
            },
            StorageType::Virtual => match self.virt_value(col, view) {
                Value::Members(members) => Cow::Owned(members),
                _ => Cow::Owned(Vec::new()),
            },
        }
    }

    /// Returns the verbatim value list for the given column.
    pub fn get_interface_list<'a>(&'a self, col: &Column, view: &'a PeerView<'a>) -> Cow<'a, [Json]> {
        match col.storage {
            StorageType::Local => match col.data_type {
                DataType::InterfaceList => {
                    Cow::Borrowed(self.data_interface_list[col.index].as_slice())
                }
                _ => panic!("unsupported type {} for {}", col.data_type, col.name),
            },
            StorageType::Ref => match self.ref_row(col, view) {
                Some(row) => row.get_interface_list(ref_col(col), view),
                None => Cow::Owned(Vec::new()),
            },
            StorageType::Virtual => match self.virt_value(col, view) {
                Value::List(list) => Cow::Owned(list),
                _ => Cow::Owned(Vec::new()),
            },
        }
    }

    /// Returns the raw typed value, honoring the storage-class dispatch but
    /// not the optional-column degradation.
    pub fn get_raw_value(&self, col: &Column, view: &PeerView<'_>) -> Value {
        match col.storage {
            StorageType::Local => match col.data_type {
                DataType::String => Value::Str(self.data_string[col.index].to_string()),
                DataType::LargeString => {
                    Value::Str(self.data_string_large[col.index].to_string())
                }
                DataType::StringList => {
                    Value::StrList(self.data_string_list[col.index].as_ref().clone())
                }
                DataType::Int => Value::Int(i64::from(self.data_int[col.index])),
                DataType::Int64 => Value::Int(self.data_int64[col.index]),
                DataType::Int64List => Value::IntList(self.data_int64_list[col.index].clone()),
                DataType::Float => Value::Float(self.data_float[col.index]),
                DataType::ServiceMemberList => {
                    Value::Members(self.data_members[col.index].clone())
                }
                DataType::InterfaceList => {
                    Value::List(self.data_interface_list[col.index].clone())
                }
                DataType::HashMap | DataType::CustomVar => {
                    panic!("unsupported type {} for {}", col.data_type, col.name)
                }
            },
            StorageType::Ref => match self.ref_row(col, view) {
                Some(row) => row.get_raw_value(ref_col(col), view),
                None => empty_value(col.data_type),
            },
            StorageType::Virtual => self.virt_value(col, view),
        }
    }

    /// Renders one cell for the response encoder: unsatisfied optional
    /// columns emit the empty value.
    pub fn render_cell(&self, col: &Column, view: &PeerView<'_>) -> Json {
        if !col.available_for(view.flags()) {
            return empty_value(col.data_type).into_json();
        }
        self.get_raw_value(col, view).into_json()
    }
}

fn ref_col(col: &Column) -> &Column {
    col.ref_column
        .as_deref()
        .unwrap_or_else(|| panic!("column {} has ref storage but no ref column", col.name))
}

/// Routes a string list through the SHA-256 dedup table so identical lists
/// share storage.
fn dedup_string_list(
    dedup: &mut HashMap<[u8; 32], Arc<Vec<String>>>,
    list: Vec<String>,
) -> Arc<Vec<String>> {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    for item in &list {
        hasher.update(item.as_bytes());
        hasher.update(LIST_SEP.as_bytes());
    }
    let sum: [u8; 32] = hasher.finalize().into();
    if let Some(shared) = dedup.get(&sum) {
        return Arc::clone(shared);
    }
    let shared = Arc::new(list);
    dedup.insert(sum, Arc::clone(&shared));
    shared
}
