//! Local query execution.
//!
//! The pipeline for one table: bind columns, scan each selected peer's
//! store under its read view, apply authorization and filters, aggregate
//! or project, then sort/offset/limit in [`post_process`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde_json::Value as Json;
use tracing::debug;

use lqd_common::{EngineOptions, LqdError, LqdResult, LIST_SEP};
use lqd_schema::{Catalog, Column, StorageType, Table, TableName};
use lqd_store::{number_to_json, DataRow, Peer, PeerView, TableSignals};

use crate::auth::check_auth;
use crate::filter::{create_local_stats_copy, Filter, StatsType};
use crate::request::Request;
use crate::response::{post_process, Response, SortKey};

/// Default wait budget when a `WaitTrigger` request carries no timeout.
const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(10);

/// The bound projection of a request: output names, the internal column
/// list (with sort-only columns appended past `requested`), and resolved
/// sort keys.
#[derive(Debug)]
pub struct Projection {
    /// Output column names, in request order.
    pub names: Vec<String>,
    /// Internal projection; `columns[i].1` renders cell `i`.
    pub columns: Vec<(String, Arc<Column>)>,
    /// Number of columns the client asked for; everything past this index
    /// is a sort key and is stripped after sorting.
    pub requested: usize,
    /// Resolved sort keys.
    pub sort: Vec<SortKey>,
}

/// The local query engine: catalog, options and the ordered peer set.
pub struct Engine {
    catalog: Arc<Catalog>,
    options: EngineOptions,
    signals: Arc<TableSignals>,
    peers: RwLock<Vec<Arc<Peer>>>,
}

impl Engine {
    /// Creates an engine without peers.
    #[must_use]
    pub fn new(catalog: Arc<Catalog>, options: EngineOptions, signals: Arc<TableSignals>) -> Self {
        Self {
            catalog,
            options,
            signals,
            peers: RwLock::new(Vec::new()),
        }
    }

    /// The schema handle.
    #[must_use]
    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// The shared per-table update triggers.
    #[must_use]
    pub fn signals(&self) -> &Arc<TableSignals> {
        &self.signals
    }

    /// Registers a peer; scan order follows registration order.
    pub fn add_peer(&self, peer: Arc<Peer>) {
        self.peers.write().push(peer);
    }

    /// All registered peers.
    #[must_use]
    pub fn peers(&self) -> Vec<Arc<Peer>> {
        self.peers.read().clone()
    }

    /// Looks up a peer by backend id.
    #[must_use]
    pub fn peer(&self, key: &str) -> Option<Arc<Peer>> {
        self.peers.read().iter().find(|p| p.key == key).cloned()
    }

    /// The peers a request addresses, in scan order.
    pub fn selected_peers(&self, req: &Request) -> LqdResult<Vec<Arc<Peer>>> {
        let peers = self.peers.read();
        if req.backends.is_empty() {
            return Ok(peers.clone());
        }
        let mut selected = Vec::with_capacity(req.backends.len());
        for id in &req.backends {
            match peers.iter().find(|p| p.key == *id) {
                Some(peer) => selected.push(Arc::clone(peer)),
                None => {
                    return Err(LqdError::bad_request(format!(
                        "backend {} does not exist",
                        id
                    )));
                }
            }
        }
        Ok(selected)
    }

    /// Binds the request's column names against the table schema. Unknown
    /// projection names bind to the empty column; sort-only columns are
    /// appended past `requested`.
    pub fn bind(&self, req: &Request) -> LqdResult<Projection> {
        let table_name = req
            .table
            .ok_or_else(|| LqdError::bad_request("not a table query"))?;
        let table = self.catalog.table(table_name);

        let names: Vec<String> = if !req.columns.is_empty() {
            req.columns.clone()
        } else if req.is_stats() {
            Vec::new()
        } else {
            table.columns.iter().map(|c| c.name.clone()).collect()
        };

        let mut columns: Vec<(String, Arc<Column>)> = names
            .iter()
            .map(|name| {
                let col = match table.column_with_fallback(name) {
                    Some((col, _)) => Arc::clone(col),
                    None => Arc::clone(table.empty_column()),
                };
                (name.clone(), col)
            })
            .collect();
        let requested = columns.len();

        let mut sort = Vec::with_capacity(req.sort.len());
        for field in &req.sort {
            let pos = columns
                .iter()
                .position(|(_, col)| col.name == field.column.name);
            let pos = match pos {
                Some(pos) => pos,
                None if req.is_stats() => continue,
                None => {
                    columns.push((field.name.clone(), Arc::clone(&field.column)));
                    columns.len() - 1
                }
            };
            sort.push(SortKey {
                pos,
                direction: field.direction,
                args: field.args.clone(),
            });
        }

        Ok(Projection {
            names,
            columns,
            requested,
            sort,
        })
    }

    /// Executes the request against local data.
    pub fn execute(&self, req: &Request) -> LqdResult<Response> {
        let table_name = req
            .table
            .ok_or_else(|| LqdError::bad_request("not a table query"))?;
        let table = Arc::clone(self.catalog.table(table_name));
        let proj = self.bind(req)?;
        let peers = self.selected_peers(req)?;

        if table.passthrough_only {
            return self.execute_passthrough(req, &table, &proj, &peers);
        }

        if !req.wait_condition.is_empty() {
            self.wait_for_condition(req, table_name, &peers);
        }

        let mut failed = HashMap::new();
        if req.is_stats() {
            let mut groups = StatsGroups::new(&req.stats);
            for peer in &peers {
                if !self.peer_serves(peer, table_name, &mut failed) {
                    continue;
                }
                let view = peer.view();
                self.scan(req, table_name, &view, |row, view| {
                    groups.feed(req, &proj, row, view);
                });
            }
            let rows = groups.finalize(req.send_stats_data, proj.requested == 0);
            let (result, total) = post_process(rows, &proj.sort, usize::MAX, req.limit, req.offset);
            let mut columns = proj.names.clone();
            columns.extend(req.stats.iter().map(Filter::stats_label));
            return Ok(Response {
                code: 200,
                result,
                failed,
                columns,
                total,
            });
        }

        let mut rows = Vec::new();
        for peer in &peers {
            if !self.peer_serves(peer, table_name, &mut failed) {
                continue;
            }
            let view = peer.view();
            self.scan(req, table_name, &view, |row, view| {
                rows.push(
                    proj.columns
                        .iter()
                        .map(|(_, col)| row.render_cell(col, view))
                        .collect(),
                );
            });
        }
        let (result, total) = post_process(rows, &proj.sort, proj.requested, req.limit, req.offset);
        Ok(Response {
            code: 200,
            result,
            failed,
            columns: proj.names,
            total,
        })
    }

    /// Marks down peers in the failed map. The sites table reports peer
    /// state itself and is served regardless.
    fn peer_serves(
        &self,
        peer: &Arc<Peer>,
        table: TableName,
        failed: &mut HashMap<String, String>,
    ) -> bool {
        if table == TableName::Sites || peer.is_up() {
            return true;
        }
        let status = peer.status();
        let message = if status.last_error.is_empty() {
            "peer is down".to_string()
        } else {
            status.last_error
        };
        failed.insert(peer.key.clone(), message);
        false
    }

    fn scan(
        &self,
        req: &Request,
        table: TableName,
        view: &PeerView<'_>,
        mut sink: impl FnMut(&DataRow, &PeerView<'_>),
    ) {
        let store = view.store(table);
        for row in store.rows() {
            if !check_auth(row, table, view, &self.options, &req.auth_user) {
                continue;
            }
            if !req.filter.iter().all(|f| f.matches(row, view)) {
                continue;
            }
            sink(row, view);
        }
    }

    /// Blocks until the wait condition matches the addressed row(s), an
    /// update trigger fires and re-evaluation succeeds, or the timeout
    /// elapses. Timeouts are not an error; the current result is returned.
    fn wait_for_condition(&self, req: &Request, table: TableName, peers: &[Arc<Peer>]) {
        let timeout = if req.wait_timeout > 0 {
            Duration::from_millis(req.wait_timeout)
        } else {
            DEFAULT_WAIT_TIMEOUT
        };
        let deadline = Instant::now() + timeout;
        let signal = self.signals.get(table);
        loop {
            let generation = signal.current();
            if self.wait_condition_met(req, table, peers) {
                return;
            }
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                debug!("wait condition timed out on {}", table);
                return;
            };
            signal.wait_past(generation, remaining);
        }
    }

    fn wait_condition_met(&self, req: &Request, table: TableName, peers: &[Arc<Peer>]) -> bool {
        let mut matched = false;
        'peers: for peer in peers {
            let view = peer.view();
            let store = view.store(table);
            let rows: Vec<&DataRow> = if req.wait_object.is_empty() {
                store.rows().iter().collect()
            } else {
                self.wait_object_row(&view, table, &req.wait_object)
                    .into_iter()
                    .collect()
            };
            for row in rows {
                if req.wait_condition.iter().all(|f| f.matches(row, &view)) {
                    matched = true;
                    break 'peers;
                }
            }
        }
        if req.wait_condition_negate {
            !matched
        } else {
            matched
        }
    }

    /// Resolves a `WaitObject` to a row: the primary key, with two-column
    /// keys in the `host;service` form.
    fn wait_object_row<'a>(
        &self,
        view: &'a PeerView<'a>,
        table: TableName,
        object: &str,
    ) -> Option<&'a DataRow> {
        let store = view.store(table);
        let idx = if store.table().primary_key.len() == 2 {
            match object.split_once(';') {
                Some((first, second)) => store.find2(first, second),
                None => store.find(object),
            }
        } else {
            store.find(object)
        };
        idx.and_then(|idx| store.row(idx))
    }

    /// Passthrough tables are not mirrored: the query is forwarded to each
    /// peer's upstream and virtual columns are filled in proxy-side.
    fn execute_passthrough(
        &self,
        req: &Request,
        table: &Table,
        proj: &Projection,
        peers: &[Arc<Peer>],
    ) -> LqdResult<Response> {
        let mut upstream_req = req.clone();
        upstream_req.columns = proj
            .columns
            .iter()
            .filter(|(_, col)| col.storage != StorageType::Virtual)
            .map(|(_, col)| col.name.clone())
            .collect();
        upstream_req.sort = Vec::new();
        upstream_req.limit = req.limit.map(|l| l + req.offset);
        upstream_req.offset = 0;
        upstream_req.output_format = None;
        upstream_req.response_fixed16 = false;
        upstream_req.backends = Vec::new();
        upstream_req.send_columns_header = false;
        upstream_req.keep_alive = false;
        upstream_req.distributed = false;
        upstream_req.send_stats_data = false;
        upstream_req.wait_trigger = String::new();
        upstream_req.wait_object = String::new();
        upstream_req.wait_timeout = 0;
        upstream_req.wait_condition = Vec::new();
        upstream_req.wait_condition_negate = false;
        let text = upstream_req.to_string();

        let mut rows = Vec::new();
        let mut failed = HashMap::new();
        for peer in peers {
            if !self.peer_serves(peer, table.name, &mut failed) {
                continue;
            }
            match peer.upstream().query(&text) {
                Ok(raw_rows) => {
                    for raw in raw_rows {
                        let mut raw_cells = raw.into_iter();
                        let row: Vec<Json> = proj
                            .columns
                            .iter()
                            .map(|(_, col)| {
                                if col.storage == StorageType::Virtual {
                                    passthrough_cell(peer, col)
                                } else {
                                    raw_cells.next().unwrap_or(Json::Null)
                                }
                            })
                            .collect();
                        rows.push(row);
                    }
                }
                Err(err) => {
                    failed.insert(peer.key.clone(), err.to_string());
                }
            }
        }
        let (result, total) = post_process(rows, &proj.sort, proj.requested, req.limit, req.offset);
        Ok(Response {
            code: 200,
            result,
            failed,
            columns: proj.names.clone(),
            total,
        })
    }
}

/// Virtual cells available on passthrough rows; only peer identity is
/// known without a stored row.
fn passthrough_cell(peer: &Peer, col: &Column) -> Json {
    match col.name.as_str() {
        "peer_key" => Json::from(peer.key.clone()),
        "peer_name" => Json::from(peer.name.clone()),
        _ => lqd_store::empty_value(col.data_type).into_json(),
    }
}

/// Grouped stats accumulation in scan order.
struct StatsGroups<'a> {
    template: &'a [Filter],
    order: Vec<String>,
    groups: HashMap<String, (Vec<String>, Vec<Filter>)>,
}

impl<'a> StatsGroups<'a> {
    fn new(template: &'a [Filter]) -> Self {
        Self {
            template,
            order: Vec::new(),
            groups: HashMap::new(),
        }
    }

    fn feed(&mut self, req: &Request, proj: &Projection, row: &DataRow, view: &PeerView<'_>) {
        let key_values: Vec<String> = proj.columns[..proj.requested]
            .iter()
            .map(|(_, col)| row.get_string(col, view).into_owned())
            .collect();
        let key = key_values.join(LIST_SEP);
        if !self.groups.contains_key(&key) {
            self.order.push(key.clone());
            self.groups.insert(
                key.clone(),
                (key_values, create_local_stats_copy(self.template)),
            );
        }
        let slots = &mut self.groups.get_mut(&key).expect("group just ensured").1;
        for (slot, spec) in slots.iter_mut().zip(req.stats.iter()) {
            match spec.stats_type {
                StatsType::Counter => {
                    if spec.matches(row, view) {
                        slot.apply_value(0.0, 1);
                    }
                }
                _ => {
                    let col = spec.column.as_ref().expect("aggregate without column");
                    slot.apply_value(row.get_float(col, view), 1);
                }
            }
        }
    }

    /// Materializes one row per group in scan order. A stats query without
    /// grouping always yields its single row, even with no observations.
    /// The raw `[value, count]` path is the exception: an empty reply must
    /// stay empty so a no-data node cannot reset the merged accumulators.
    fn finalize(mut self, send_stats_data: bool, ungrouped: bool) -> Vec<Vec<Json>> {
        if ungrouped && !send_stats_data && self.order.is_empty() {
            self.order.push(String::new());
            self.groups.insert(
                String::new(),
                (Vec::new(), create_local_stats_copy(self.template)),
            );
        }
        let mut rows = Vec::with_capacity(self.order.len());
        for key in &self.order {
            let (values, slots) = self.groups.remove(key).expect("group in order");
            let mut row: Vec<Json> = values.into_iter().map(Json::from).collect();
            for slot in slots {
                if send_stats_data {
                    row.push(Json::Array(vec![
                        number_to_json(slot.stats),
                        Json::from(slot.stats_count),
                    ]));
                } else {
                    row.push(number_to_json(slot.result()));
                }
            }
            rows.push(row);
        }
        rows
    }
}
