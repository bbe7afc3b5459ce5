//! Per-(peer, table) row containers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use serde_json::Value as Json;

use lqd_common::{LqdResult, LIST_SEP};
use lqd_schema::{Column, Table};

use crate::intern::Interner;
use crate::row::{DataRow, RowWriteCtx};

/// A per-table update trigger: a generation counter with a condition
/// variable, used by `WaitCondition` polling.
#[derive(Debug, Default)]
pub struct UpdateSignal {
    generation: Mutex<u64>,
    cond: Condvar,
}

impl UpdateSignal {
    /// Bumps the generation and wakes all waiters.
    pub fn notify(&self) {
        let mut generation = self.generation.lock();
        *generation += 1;
        self.cond.notify_all();
    }

    /// Returns the current generation.
    #[must_use]
    pub fn current(&self) -> u64 {
        *self.generation.lock()
    }

    /// Blocks until the generation advances past `seen` or the timeout
    /// elapses. Returns true if an update happened.
    pub fn wait_past(&self, seen: u64, timeout: Duration) -> bool {
        let mut generation = self.generation.lock();
        if *generation > seen {
            return true;
        }
        self.cond.wait_for(&mut generation, timeout);
        *generation > seen
    }
}

/// The row set of one table on one peer, with primary-key indexes and the
/// string-list dedup table.
#[derive(Debug)]
pub struct DataStore {
    table: Arc<Table>,
    interner: Arc<Interner>,
    rows: Vec<DataRow>,
    index: HashMap<String, usize>,
    index2: HashMap<String, HashMap<String, usize>>,
    dedup: HashMap<[u8; 32], Arc<Vec<String>>>,
}

impl DataStore {
    /// Creates an empty store for the given table.
    #[must_use]
    pub fn new(table: Arc<Table>, interner: Arc<Interner>) -> Self {
        Self {
            table,
            interner,
            rows: Vec::new(),
            index: HashMap::new(),
            index2: HashMap::new(),
            dedup: HashMap::new(),
        }
    }

    /// The table this store holds rows for.
    #[must_use]
    pub fn table(&self) -> &Arc<Table> {
        &self.table
    }

    /// All rows in insertion order.
    #[must_use]
    pub fn rows(&self) -> &[DataRow] {
        &self.rows
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if the store holds no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Looks up a row index by single-column primary key.
    #[must_use]
    pub fn find(&self, key: &str) -> Option<usize> {
        self.index.get(key).copied()
    }

    /// Looks up a row index by two-column primary key.
    #[must_use]
    pub fn find2(&self, key1: &str, key2: &str) -> Option<usize> {
        self.index2.get(key1)?.get(key2).copied()
    }

    /// Returns the row at the given index.
    #[must_use]
    pub fn row(&self, idx: usize) -> Option<&DataRow> {
        self.rows.get(idx)
    }

    /// Replaces the entire row set from raw upstream payloads, rebuilding
    /// the primary-key indexes. References are resolved by the owning peer
    /// afterwards.
    pub fn set_data(
        &mut self,
        raw_rows: Vec<Vec<Json>>,
        columns: &[Arc<Column>],
        timestamp: i64,
    ) -> LqdResult<()> {
        self.rows = Vec::with_capacity(raw_rows.len());
        self.index = HashMap::with_capacity(raw_rows.len());
        self.index2 = HashMap::new();
        for raw in raw_rows {
            let mut row = DataRow::sized_for(&self.table);
            let mut ctx = RowWriteCtx {
                table: &self.table,
                interner: &self.interner,
                dedup: &mut self.dedup,
            };
            row.update_values(&mut ctx, 0, &raw, columns, timestamp)?;
            self.push_row(row);
        }
        Ok(())
    }

    /// Appends a row without data; used by virtual-only tables where every
    /// column is computed from peer state.
    pub fn add_blank_row(&mut self) {
        let row = DataRow::sized_for(&self.table);
        self.push_row(row);
    }

    fn push_row(&mut self, mut row: DataRow) {
        let idx = self.rows.len();
        row.idx = idx;
        if !self.table.primary_key.is_empty() {
            let id = row.id(&self.table);
            self.index.insert(id, idx);
            if self.table.primary_key.len() == 2 {
                let (id1, id2) = row.id2(&self.table);
                self.index2.entry(id1).or_default().insert(id2, idx);
            }
        }
        self.rows.push(row);
    }

    /// Overwrites one row's values from a raw payload.
    pub fn update_row(
        &mut self,
        idx: usize,
        offset: usize,
        raw: &[Json],
        columns: &[Arc<Column>],
        timestamp: i64,
    ) -> LqdResult<()> {
        let mut ctx = RowWriteCtx {
            table: &self.table,
            interner: &self.interner,
            dedup: &mut self.dedup,
        };
        self.rows[idx].update_values(&mut ctx, offset, raw, columns, timestamp)
    }

    /// Overwrites only numeric fields of one row; the dynamic refresh fast
    /// path.
    pub fn update_row_numbers(
        &mut self,
        idx: usize,
        offset: usize,
        raw: &[Json],
        columns: &[Arc<Column>],
        timestamp: i64,
    ) -> LqdResult<()> {
        let mut ctx = RowWriteCtx {
            table: &self.table,
            interner: &self.interner,
            dedup: &mut self.dedup,
        };
        self.rows[idx].update_values_number_only(&mut ctx, offset, raw, columns, timestamp)
    }

    /// Returns true if the given numeric payload differs from the stored
    /// row, gating a full update.
    #[must_use]
    pub fn check_changed_int_values(
        &self,
        idx: usize,
        raw: &[Json],
        columns: &[Arc<Column>],
    ) -> bool {
        self.rows[idx].check_changed_int_values(raw, columns)
    }

    pub(crate) fn rows_mut(&mut self) -> &mut [DataRow] {
        &mut self.rows
    }

    /// Joins two key parts the way two-column primary keys are stored.
    #[must_use]
    pub fn join_key(key1: &str, key2: &str) -> String {
        format!("{}{}{}", key1, LIST_SEP, key2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_update_signal_wait() {
        let signal = Arc::new(UpdateSignal::default());
        let seen = signal.current();

        let waiter = Arc::clone(&signal);
        let handle = std::thread::spawn(move || waiter.wait_past(seen, Duration::from_secs(5)));
        std::thread::sleep(Duration::from_millis(20));
        signal.notify();
        assert!(handle.join().unwrap());
    }

    #[test]
    fn test_update_signal_timeout() {
        let signal = UpdateSignal::default();
        let seen = signal.current();
        let start = Instant::now();
        assert!(!signal.wait_past(seen, Duration::from_millis(30)));
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_update_signal_already_past() {
        let signal = UpdateSignal::default();
        let seen = signal.current();
        signal.notify();
        assert!(signal.wait_past(seen, Duration::from_millis(1)));
    }
}
