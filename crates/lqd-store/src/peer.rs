//! The proxy-side representation of one upstream monitoring core.
//!
//! A peer owns one [`DataStore`] per table, its mutable status fields, and
//! the comment/downtime join caches. Readers take a [`PeerView`], a
//! snapshot of read guards over every store of the peer, so cross-table
//! reference and virtual columns can join consistently during one scan.
//!
//! Lock discipline: writers hold at most one table write lock at a time;
//! views acquire read locks in the fixed `ALL_TABLES` order.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde_json::Value as Json;
use tracing::warn;

use lqd_common::{LqdError, LqdResult};
use lqd_schema::{Catalog, Column, OptionalFlags, Table, TableName, ALL_TABLES};

use crate::intern::Interner;
use crate::row::DataRow;
use crate::store::{DataStore, UpdateSignal};

/// Identifies a row for the join-side caches: table plus row position.
pub type RowKey = (TableName, usize);

/// Connection state of a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PeerState {
    /// Connected and serving data.
    #[default]
    Up,
    /// Connected but the last refresh reported problems.
    Warning,
    /// Unreachable.
    Down,
    /// Misbehaving upstream; retried with backoff.
    Broken,
    /// Not contacted yet.
    Pending,
}

impl PeerState {
    /// Numeric representation used by the `status` column.
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        match self {
            Self::Up => 0,
            Self::Warning => 1,
            Self::Down => 2,
            Self::Broken => 3,
            Self::Pending => 4,
        }
    }
}

/// Process-wide mutable status fields of a peer, read by the `sites` table
/// and the status-alias virtual columns.
#[derive(Debug, Clone, Default)]
pub struct PeerStatus {
    /// Connection state.
    pub status: PeerState,
    /// Last error reported by the upstream connection.
    pub last_error: String,
    /// Timestamp of the last successful contact.
    pub last_online: i64,
    /// Timestamp of the last data refresh.
    pub last_update: i64,
    /// Timestamp of the last client query touching this peer.
    pub last_query: i64,
    /// Duration of the last upstream round trip in seconds.
    pub response_time: f64,
    /// Total queries sent upstream.
    pub queries: i64,
    /// Bytes sent upstream.
    pub bytes_send: i64,
    /// Bytes received from upstream.
    pub bytes_received: i64,
    /// True while the refresh loop idles because no client asked recently.
    pub idling: bool,
    /// Program start timestamp of the upstream core.
    pub program_start: i64,
    /// Parent peer id for federated setups.
    pub parent: String,
    /// Config-tool metadata advertised by the upstream.
    pub config_tool: HashMap<String, String>,
    /// Federation metadata.
    pub federation_key: String,
    /// Federation metadata.
    pub federation_name: String,
    /// Federation metadata.
    pub federation_addr: String,
    /// Federation metadata.
    pub federation_type: String,
    /// Nested status map for sub peers behind a remote proxy.
    pub sub_peer_status: Option<HashMap<String, Json>>,
}

/// The upstream channel of a peer: command submission and passthrough
/// queries. The real transports live outside this crate.
pub trait Upstream: Send + Sync {
    /// Forwards a `COMMAND` payload verbatim.
    fn send_command(&self, command: &str) -> LqdResult<()>;

    /// Runs a query upstream and returns raw result rows; used for
    /// passthrough-only tables.
    fn query(&self, request: &str) -> LqdResult<Vec<Vec<Json>>>;
}

/// Default upstream for peers without a live connection: commands succeed
/// silently, passthrough queries return nothing.
#[derive(Debug, Default)]
pub struct NoUpstream;

impl Upstream for NoUpstream {
    fn send_command(&self, _command: &str) -> LqdResult<()> {
        Ok(())
    }

    fn query(&self, _request: &str) -> LqdResult<Vec<Vec<Json>>> {
        Ok(Vec::new())
    }
}

/// Per-table update triggers shared by all peers of one proxy instance.
#[derive(Debug)]
pub struct TableSignals {
    signals: HashMap<TableName, UpdateSignal>,
}

impl TableSignals {
    /// Creates one signal per table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            signals: ALL_TABLES
                .iter()
                .map(|t| (*t, UpdateSignal::default()))
                .collect(),
        }
    }

    /// Returns the signal for a table.
    #[must_use]
    pub fn get(&self, table: TableName) -> &UpdateSignal {
        &self.signals[&table]
    }
}

impl Default for TableSignals {
    fn default() -> Self {
        Self::new()
    }
}

/// The client side of one upstream connection.
pub struct Peer {
    /// Backend id, unique across the proxy.
    pub key: String,
    /// Human-readable name.
    pub name: String,
    /// Upstream address.
    pub addr: String,
    /// Section grouping used by UIs.
    pub section: String,
    catalog: Arc<Catalog>,
    interner: Arc<Interner>,
    flags: RwLock<OptionalFlags>,
    status: RwLock<PeerStatus>,
    tables: HashMap<TableName, RwLock<DataStore>>,
    comments_cache: RwLock<HashMap<RowKey, Vec<i64>>>,
    downtimes_cache: RwLock<HashMap<RowKey, Vec<i64>>>,
    signals: Arc<TableSignals>,
    upstream: Box<dyn Upstream>,
}

impl std::fmt::Debug for Peer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Peer")
            .field("key", &self.key)
            .field("name", &self.name)
            .field("addr", &self.addr)
            .finish()
    }
}

impl Peer {
    /// Creates a peer with empty stores for every table. The `sites` store
    /// gets its single blank row; all of its columns are computed from peer
    /// state.
    #[must_use]
    pub fn new(
        key: impl Into<String>,
        name: impl Into<String>,
        addr: impl Into<String>,
        catalog: Arc<Catalog>,
        interner: Arc<Interner>,
        signals: Arc<TableSignals>,
    ) -> Self {
        let mut tables = HashMap::new();
        for table_name in ALL_TABLES {
            let table = Arc::clone(catalog.table(*table_name));
            let mut store = DataStore::new(table, Arc::clone(&interner));
            if *table_name == TableName::Sites {
                store.add_blank_row();
            }
            tables.insert(*table_name, RwLock::new(store));
        }
        Self {
            key: key.into(),
            name: name.into(),
            addr: addr.into(),
            section: String::new(),
            catalog,
            interner,
            flags: RwLock::new(OptionalFlags::empty()),
            status: RwLock::new(PeerStatus::default()),
            tables,
            comments_cache: RwLock::new(HashMap::new()),
            downtimes_cache: RwLock::new(HashMap::new()),
            signals,
            upstream: Box::new(NoUpstream),
        }
    }

    /// Replaces the upstream channel.
    #[must_use]
    pub fn with_upstream(mut self, upstream: Box<dyn Upstream>) -> Self {
        self.upstream = upstream;
        self
    }

    /// The upstream channel.
    #[must_use]
    pub fn upstream(&self) -> &dyn Upstream {
        self.upstream.as_ref()
    }

    /// Backend-kind flags of this peer.
    #[must_use]
    pub fn flags(&self) -> OptionalFlags {
        *self.flags.read()
    }

    /// Sets a backend-kind flag.
    pub fn set_flag(&self, flag: OptionalFlags) {
        self.flags.write().insert(flag);
    }

    /// Snapshot of the status fields.
    #[must_use]
    pub fn status(&self) -> PeerStatus {
        self.status.read().clone()
    }

    /// Mutates the status fields under the status lock.
    pub fn update_status(&self, f: impl FnOnce(&mut PeerStatus)) {
        f(&mut self.status.write());
    }

    /// Returns true if this peer currently serves data.
    #[must_use]
    pub fn is_up(&self) -> bool {
        matches!(
            self.status.read().status,
            PeerState::Up | PeerState::Warning
        )
    }

    /// The update trigger for a table.
    #[must_use]
    pub fn signal(&self, table: TableName) -> &UpdateSignal {
        self.signals.get(table)
    }

    /// Read access to one store. Prefer [`Peer::view`] for query scans.
    #[must_use]
    pub fn store(&self, table: TableName) -> RwLockReadGuard<'_, DataStore> {
        self.tables[&table].read()
    }

    /// Write access to one store, for the refresh update paths. Callers
    /// fire [`Peer::touch`] after releasing the guard.
    #[must_use]
    pub fn store_mut(&self, table: TableName) -> RwLockWriteGuard<'_, DataStore> {
        self.tables[&table].write()
    }

    /// Wakes wait-condition pollers after an out-of-band store update.
    pub fn touch(&self, table: TableName) {
        self.signals.get(table).notify();
    }

    /// Takes a consistent read snapshot over all stores of this peer.
    #[must_use]
    pub fn view(&self) -> PeerView<'_> {
        let mut stores = HashMap::new();
        for table in ALL_TABLES {
            stores.insert(*table, self.tables[table].read());
        }
        PeerView {
            peer: self,
            flags: self.flags(),
            status: self.status(),
            stores,
            comments: self.comments_cache.read(),
            downtimes: self.downtimes_cache.read(),
        }
    }

    /// Replaces a table's rows from raw upstream payloads and resolves the
    /// cross-table references of the new rows.
    pub fn set_table_data(
        &self,
        table_name: TableName,
        columns: &[Arc<Column>],
        raw_rows: Vec<Vec<Json>>,
        timestamp: i64,
    ) -> LqdResult<()> {
        let table = Arc::clone(self.catalog.table(table_name));
        let mut store = DataStore::new(table, Arc::clone(&self.interner));
        store.set_data(raw_rows, columns, timestamp)?;
        self.resolve_references(&mut store)?;

        *self.tables[&table_name].write() = store;
        if timestamp > 0 {
            self.update_status(|status| status.last_update = timestamp);
        }
        self.signals.get(table_name).notify();

        match table_name {
            TableName::Comments => self.rebuild_comments_cache(),
            TableName::Downtimes => self.rebuild_downtimes_cache(),
            _ => {}
        }
        Ok(())
    }

    /// Resolves the reference map of every row in `store` against this
    /// peer's other tables. The services reference of comments and
    /// downtimes is tolerated-absent; any other miss is an error.
    fn resolve_references(&self, store: &mut DataStore) -> LqdResult<()> {
        let table = Arc::clone(store.table());
        if table.passthrough_only || table.ref_tables.is_empty() {
            return Ok(());
        }
        for ref_spec in &table.ref_tables {
            let target = self.tables[&ref_spec.table].read();
            for row in store.rows_mut() {
                let idx = match ref_spec.columns.len() {
                    1 => {
                        let key = row.local_scalar_string(&ref_spec.columns[0]);
                        target.find(&key)
                    }
                    2 => {
                        let key1 = row.local_scalar_string(&ref_spec.columns[0]);
                        let key2 = row.local_scalar_string(&ref_spec.columns[1]);
                        target.find2(&key1, &key2)
                    }
                    n => panic!("reference spec with {} columns", n),
                };
                match idx {
                    Some(idx) => row.set_ref(ref_spec.table, idx),
                    None => {
                        let tolerated = ref_spec.table == TableName::Services
                            && matches!(
                                table.name,
                                TableName::Comments | TableName::Downtimes
                            );
                        if !tolerated {
                            return Err(LqdError::BackendError {
                                peer: self.key.clone(),
                                message: format!(
                                    "{} reference not found from table {}, index contains {} elements",
                                    ref_spec.table,
                                    table.name,
                                    target.len()
                                ),
                            });
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Rebuilds the host/service to comment-id join cache.
    pub fn rebuild_comments_cache(&self) {
        let cache = self.build_join_cache(TableName::Comments);
        *self.comments_cache.write() = cache;
    }

    /// Rebuilds the host/service to downtime-id join cache.
    pub fn rebuild_downtimes_cache(&self) {
        let cache = self.build_join_cache(TableName::Downtimes);
        *self.downtimes_cache.write() = cache;
    }

    fn build_join_cache(&self, source: TableName) -> HashMap<RowKey, Vec<i64>> {
        let mut cache: HashMap<RowKey, Vec<i64>> = HashMap::new();
        let store = self.tables[&source].read();
        let table = store.table();
        let id_col = table.column("id").expect("id column");
        let host_col = table.column("host_name").expect("host_name column");
        let service_col = table.column("service_description").expect("service column");

        let hosts = self.tables[&TableName::Hosts].read();
        let services = self.tables[&TableName::Services].read();
        for row in store.rows() {
            let id = row.local_i64(id_col);
            let host = row.local_scalar_string(host_col);
            let service = row.local_scalar_string(service_col);
            let key = if service.is_empty() {
                hosts.find(&host).map(|idx| (TableName::Hosts, idx))
            } else {
                services
                    .find2(&host, &service)
                    .map(|idx| (TableName::Services, idx))
            };
            match key {
                Some(key) => cache.entry(key).or_default().push(id),
                None => warn!("[{}] dangling {} entry {}", self.name, source, id),
            }
        }
        cache
    }

    /// Materializes the group-by tables from current host, service and
    /// group membership data. Called after the base tables are set.
    pub fn build_group_tables(&self) -> LqdResult<()> {
        let hostsbygroup = {
            let hostgroups = self.tables[&TableName::Hostgroups].read();
            let table = hostgroups.table();
            let name_col = table.column("name").expect("name column");
            let members_col = table.column("members").expect("members column");
            let mut rows = Vec::new();
            for row in hostgroups.rows() {
                let group = row.local_scalar_string(name_col);
                for member in row.local_string_list(members_col) {
                    rows.push(vec![Json::from(member.clone()), Json::from(group.clone())]);
                }
            }
            rows
        };
        let columns = self.group_columns(TableName::HostsByGroup, &["name", "hostgroup_name"]);
        self.set_table_data(TableName::HostsByGroup, &columns, hostsbygroup, 0)?;

        let servicesbygroup = {
            let servicegroups = self.tables[&TableName::Servicegroups].read();
            let table = servicegroups.table();
            let name_col = table.column("name").expect("name column");
            let members_col = table.column("members").expect("members column");
            let mut rows = Vec::new();
            for row in servicegroups.rows() {
                let group = row.local_scalar_string(name_col);
                for member in row.local_members(members_col) {
                    rows.push(vec![
                        Json::from(member.host.clone()),
                        Json::from(member.service.clone()),
                        Json::from(group.clone()),
                    ]);
                }
            }
            rows
        };
        let columns = self.group_columns(
            TableName::ServicesByGroup,
            &["host_name", "description", "servicegroup_name"],
        );
        self.set_table_data(TableName::ServicesByGroup, &columns, servicesbygroup, 0)?;

        let servicesbyhostgroup = {
            let hostgroups = self.tables[&TableName::Hostgroups].read();
            let hosts = self.tables[&TableName::Hosts].read();
            let hosts_table = hosts.table();
            let services_col = hosts_table.column("services").expect("services column");
            let group_table = hostgroups.table();
            let name_col = group_table.column("name").expect("name column");
            let members_col = group_table.column("members").expect("members column");
            let mut rows = Vec::new();
            for row in hostgroups.rows() {
                let group = row.local_scalar_string(name_col);
                for member in row.local_string_list(members_col) {
                    let Some(host_idx) = hosts.find(member) else {
                        continue;
                    };
                    let host_row = hosts.row(host_idx).expect("indexed row");
                    for service in host_row.local_string_list(services_col) {
                        rows.push(vec![
                            Json::from(member.clone()),
                            Json::from(service.clone()),
                            Json::from(group.clone()),
                        ]);
                    }
                }
            }
            rows
        };
        let columns = self.group_columns(
            TableName::ServicesByHostgroup,
            &["host_name", "description", "hostgroup_name"],
        );
        self.set_table_data(TableName::ServicesByHostgroup, &columns, servicesbyhostgroup, 0)
    }

    fn group_columns(&self, table: TableName, names: &[&str]) -> Vec<Arc<Column>> {
        let table = self.catalog.table(table);
        names
            .iter()
            .map(|name| Arc::clone(table.column(name).expect("group key column")))
            .collect()
    }

    /// The catalog handle this peer was built with.
    #[must_use]
    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }
}

/// A consistent read snapshot over all stores of one peer.
pub struct PeerView<'a> {
    peer: &'a Peer,
    flags: OptionalFlags,
    status: PeerStatus,
    stores: HashMap<TableName, RwLockReadGuard<'a, DataStore>>,
    comments: RwLockReadGuard<'a, HashMap<RowKey, Vec<i64>>>,
    downtimes: RwLockReadGuard<'a, HashMap<RowKey, Vec<i64>>>,
}

impl<'a> PeerView<'a> {
    /// The peer this view snapshots.
    #[must_use]
    pub fn peer(&self) -> &'a Peer {
        self.peer
    }

    /// Peer flags at snapshot time.
    #[must_use]
    pub fn flags(&self) -> OptionalFlags {
        self.flags
    }

    /// Peer status at snapshot time.
    #[must_use]
    pub fn status(&self) -> &PeerStatus {
        &self.status
    }

    /// The store of a table.
    #[must_use]
    pub fn store(&self, table: TableName) -> &DataStore {
        &self.stores[&table]
    }

    /// A row of a table by position.
    #[must_use]
    pub fn row(&self, table: TableName, idx: usize) -> Option<&DataRow> {
        self.stores[&table].row(idx)
    }

    /// Comment ids attached to a host or service row.
    #[must_use]
    pub fn comments_for(&self, key: RowKey) -> Option<&[i64]> {
        self.comments.get(&key).map(Vec::as_slice)
    }

    /// Downtime ids attached to a host or service row.
    #[must_use]
    pub fn downtimes_for(&self, key: RowKey) -> Option<&[i64]> {
        self.downtimes.get(&key).map(Vec::as_slice)
    }

    /// The table definition for a name, from the peer's catalog.
    #[must_use]
    pub fn table(&self, name: TableName) -> &Arc<Table> {
        self.peer.catalog.table(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_peer() -> Peer {
        let catalog = Arc::new(Catalog::new());
        let interner = Arc::new(Interner::new());
        let signals = Arc::new(TableSignals::new());
        Peer::new("mockid0", "mock", "mock.sock", catalog, interner, signals)
    }

    fn columns(peer: &Peer, table: TableName, names: &[&str]) -> Vec<Arc<Column>> {
        let table = peer.catalog().table(table);
        names
            .iter()
            .map(|n| Arc::clone(table.column(n).expect("column")))
            .collect()
    }

    fn seed(peer: &Peer) {
        let host_cols = columns(
            peer,
            TableName::Hosts,
            &[
                "name",
                "alias",
                "state",
                "latency",
                "services",
                "contacts",
                "custom_variable_names",
                "custom_variable_values",
            ],
        );
        let hosts = vec![
            vec![
                json!("testhost_1"),
                json!("localhost"),
                json!(0),
                json!(0.25),
                json!(["testsvc_1"]),
                json!(["testUser"]),
                json!(["TAGS"]),
                json!(["prod"]),
            ],
            vec![
                json!("testhost_2"),
                json!("authhost"),
                json!(2),
                json!(0.5),
                json!([]),
                json!(["otherUser"]),
                json!([]),
                json!([]),
            ],
        ];
        peer.set_table_data(TableName::Hosts, &host_cols, hosts, 100)
            .unwrap();

        let svc_cols = columns(
            peer,
            TableName::Services,
            &["host_name", "description", "state", "has_been_checked"],
        );
        let services = vec![vec![json!("testhost_1"), json!("testsvc_1"), json!(1), json!(1)]];
        peer.set_table_data(TableName::Services, &svc_cols, services, 100)
            .unwrap();
    }

    #[test]
    fn test_set_data_and_local_accessors() {
        let peer = test_peer();
        seed(&peer);
        let view = peer.view();
        let hosts = view.store(TableName::Hosts);
        let table = hosts.table();
        let row = hosts.row(hosts.find("testhost_1").unwrap()).unwrap();

        assert_eq!(row.get_string(table.column("name").unwrap(), &view), "testhost_1");
        assert_eq!(row.get_float(table.column("latency").unwrap(), &view), 0.25);
        assert_eq!(row.get_int(table.column("state").unwrap(), &view), 0);
    }

    #[test]
    fn test_ref_column_follows_host() {
        let peer = test_peer();
        seed(&peer);
        let view = peer.view();
        let services = view.store(TableName::Services);
        let table = services.table();
        let row = services.row(0).unwrap();

        let alias = row.get_string(table.column("host_alias").unwrap(), &view);
        assert_eq!(alias, "localhost");
        let latency = row.get_float(table.column("host_latency").unwrap(), &view);
        assert_eq!(latency, 0.25);
    }

    #[test]
    fn test_state_order_remaps_critical() {
        let peer = test_peer();
        seed(&peer);
        let view = peer.view();
        let hosts = view.store(TableName::Hosts);
        let table = hosts.table();
        let order_col = table.column("state_order").unwrap();

        let ok_row = hosts.row(hosts.find("testhost_1").unwrap()).unwrap();
        assert_eq!(ok_row.get_int(order_col, &view), 0);
        let critical_row = hosts.row(hosts.find("testhost_2").unwrap()).unwrap();
        assert_eq!(critical_row.get_int(order_col, &view), 4);
    }

    #[test]
    fn test_custom_variables_zip() {
        let peer = test_peer();
        seed(&peer);
        let view = peer.view();
        let hosts = view.store(TableName::Hosts);
        let table = hosts.table();
        let row = hosts.row(hosts.find("testhost_1").unwrap()).unwrap();

        let vars = row.get_hash_map(table.column("custom_variables").unwrap(), &view);
        assert_eq!(vars.get("TAGS").map(String::as_str), Some("prod"));
    }

    #[test]
    fn test_services_with_state() {
        let peer = test_peer();
        seed(&peer);
        let view = peer.view();
        let hosts = view.store(TableName::Hosts);
        let table = hosts.table();
        let row = hosts.row(hosts.find("testhost_1").unwrap()).unwrap();

        let list = row.get_interface_list(table.column("services_with_state").unwrap(), &view);
        assert_eq!(list.len(), 1);
        assert_eq!(list[0], json!(["testsvc_1", 1, 1]));
    }

    #[test]
    fn test_comments_cache_and_virtual() {
        let peer = test_peer();
        seed(&peer);
        let comment_cols = columns(
            &peer,
            TableName::Comments,
            &["id", "host_name", "service_description", "author", "comment"],
        );
        let comments = vec![
            vec![json!(12), json!("testhost_1"), json!(""), json!("admin"), json!("broken")],
            // dangling service reference is tolerated
            vec![json!(13), json!("testhost_1"), json!("gone"), json!("admin"), json!("stale")],
        ];
        peer.set_table_data(TableName::Comments, &comment_cols, comments, 100)
            .unwrap();

        let view = peer.view();
        let hosts = view.store(TableName::Hosts);
        let table = hosts.table();
        let row = hosts.row(hosts.find("testhost_1").unwrap()).unwrap();

        let ids = row.get_int64_list(table.column("comments").unwrap(), &view);
        assert_eq!(ids.as_ref(), &[12]);
        let with_info = row.get_interface_list(table.column("comments_with_info").unwrap(), &view);
        assert_eq!(with_info[0], json!([12, "admin", "broken"]));
    }

    #[test]
    fn test_unresolved_host_reference_fails() {
        let peer = test_peer();
        seed(&peer);
        let svc_cols = columns(&peer, TableName::Services, &["host_name", "description"]);
        let err = peer
            .set_table_data(
                TableName::Services,
                &svc_cols,
                vec![vec![json!("missing_host"), json!("svc")]],
                100,
            )
            .unwrap_err();
        assert!(err.to_string().contains("reference not found"));
    }

    #[test]
    fn test_optional_column_renders_empty_without_flag() {
        let peer = test_peer();
        seed(&peer);
        let view = peer.view();
        let hosts = view.store(TableName::Hosts);
        let table = hosts.table();
        let row = hosts.row(0).unwrap();
        let col = table.column("is_impact").unwrap().clone();

        assert_eq!(row.render_cell(&col, &view), json!(-1));
        drop(view);

        peer.set_flag(OptionalFlags::SHINKEN);
        let view = peer.view();
        let hosts = view.store(TableName::Hosts);
        let row = hosts.row(0).unwrap();
        assert_eq!(row.render_cell(&col, &view), json!(0));
    }

    #[test]
    fn test_sites_row_reads_peer_status() {
        let peer = test_peer();
        peer.update_status(|status| {
            status.status = PeerState::Down;
            status.last_error = "connect: no such file or directory".into();
        });
        let view = peer.view();
        let sites = view.store(TableName::Sites);
        let table = sites.table();
        let row = sites.row(0).unwrap();

        assert_eq!(row.get_string(table.column("name").unwrap(), &view), "mock");
        assert_eq!(row.get_int(table.column("status").unwrap(), &view), 2);
        assert_eq!(
            row.get_string(table.column("last_error").unwrap(), &view),
            "connect: no such file or directory"
        );
    }

    #[test]
    fn test_static_string_lists_share_storage() {
        let peer = test_peer();
        let cols = columns(&peer, TableName::Hosts, &["name", "contacts"]);
        let rows = vec![
            vec![json!("a"), json!(["one", "two"])],
            vec![json!("b"), json!(["one", "two"])],
        ];
        peer.set_table_data(TableName::Hosts, &cols, rows, 1).unwrap();

        let view = peer.view();
        let hosts = view.store(TableName::Hosts);
        let contacts_col = hosts.table().column("contacts").unwrap();
        let first = hosts.row(0).unwrap().get_string_list(contacts_col, &view);
        let second = hosts.row(1).unwrap().get_string_list(contacts_col, &view);
        assert_eq!(first.as_ref(), second.as_ref());
        assert_eq!(first.as_ptr(), second.as_ptr());
    }

    #[test]
    fn test_numeric_update_fast_path() {
        let peer = test_peer();
        seed(&peer);
        let state_col = columns(&peer, TableName::Hosts, &["state"]);
        {
            let mut store = peer.store_mut(TableName::Hosts);
            let idx = store.find("testhost_1").unwrap();
            assert!(store.check_changed_int_values(idx, &[json!(2)], &state_col));
            assert!(!store.check_changed_int_values(idx, &[json!(0)], &state_col));
            store
                .update_row_numbers(idx, 0, &[json!(2)], &state_col, 200)
                .unwrap();
        }
        peer.touch(TableName::Hosts);

        let view = peer.view();
        let hosts = view.store(TableName::Hosts);
        let row = hosts.row(hosts.find("testhost_1").unwrap()).unwrap();
        assert_eq!(row.get_int(hosts.table().column("state").unwrap(), &view), 2);
        assert_eq!(row.last_update, 200);
    }

    #[test]
    fn test_update_size_mismatch_is_rejected() {
        let peer = test_peer();
        seed(&peer);
        let cols = columns(&peer, TableName::Hosts, &["state", "latency"]);
        let mut store = peer.store_mut(TableName::Hosts);
        let err = store.update_row(0, 0, &[json!(1)], &cols, 1).unwrap_err();
        assert!(err.to_string().contains("data size mismatch"));
    }

    #[test]
    fn test_sub_peer_status_takes_worst_state() {
        let peer = test_peer();
        peer.set_flag(OptionalFlags::LMD_SUB);
        peer.update_status(|status| {
            status.sub_peer_status = Some(
                [
                    ("status".to_string(), json!(1)),
                    ("last_error".to_string(), json!("")),
                ]
                .into_iter()
                .collect(),
            );
            status.last_error = "parent broken".to_string();
        });

        let view = peer.view();
        let sites = view.store(TableName::Sites);
        let table = sites.table();
        let row = sites.row(0).unwrap();
        // parent is up, the nested state wins
        assert_eq!(row.get_int(table.column("status").unwrap(), &view), 1);
        // nested error is empty, the parent error shows through
        assert_eq!(
            row.get_string(table.column("last_error").unwrap(), &view),
            "parent broken"
        );

        drop(view);
        peer.update_status(|status| status.status = PeerState::Down);
        let view = peer.view();
        let sites = view.store(TableName::Sites);
        let table = sites.table();
        let row = sites.row(0).unwrap();
        // a broken parent overrides the nested state
        assert_eq!(row.get_int(table.column("status").unwrap(), &view), 2);
    }

    #[test]
    fn test_group_tables_materialize() {
        let peer = test_peer();
        seed(&peer);
        let group_cols = columns(&peer, TableName::Hostgroups, &["name", "alias", "members"]);
        let groups = vec![vec![
            json!("Everything"),
            json!("All"),
            json!(["testhost_1", "testhost_2"]),
        ]];
        peer.set_table_data(TableName::Hostgroups, &group_cols, groups, 100)
            .unwrap();
        peer.build_group_tables().unwrap();

        let view = peer.view();
        let by_group = view.store(TableName::HostsByGroup);
        assert_eq!(by_group.len(), 2);
        let table = by_group.table();
        let row = by_group.row(0).unwrap();
        assert_eq!(row.get_string(table.column("name").unwrap(), &view), "testhost_1");
        assert_eq!(
            row.get_string(table.column("alias").unwrap(), &view),
            "localhost"
        );
        assert_eq!(
            row.get_string(table.column("hostgroup_alias").unwrap(), &view),
            "All"
        );

        let by_hostgroup = view.store(TableName::ServicesByHostgroup);
        assert_eq!(by_hostgroup.len(), 1);
        let table = by_hostgroup.table();
        let row = by_hostgroup.row(0).unwrap();
        assert_eq!(
            row.get_string(table.column("description").unwrap(), &view),
            "testsvc_1"
        );
    }
}
