//! Shared test fixtures for the LQD workspace.
//!
//! [`TestScenario`] builds an engine with a configurable number of peers,
//! hosts and services, seeded with the same deterministic values across
//! the whole test suite.

use std::sync::Arc;

use serde_json::{json, Value as Json};

use lqd_common::{EngineOptions, LqdResult};
use lqd_query::{Engine, Request, Response};
use lqd_schema::{Catalog, Column, TableName};
use lqd_store::{Interner, Peer, TableSignals};

/// Latency seeded on every host unless overridden.
pub const DEFAULT_LATENCY: f64 = 0.083658002317;

/// Execution time seeded on every host.
pub const DEFAULT_EXECUTION_TIME: f64 = 0.005645;

/// A fully seeded engine plus the handles tests need.
pub struct TestScenario {
    /// The schema handle.
    pub catalog: Arc<Catalog>,
    /// Shared per-table update triggers.
    pub signals: Arc<TableSignals>,
    /// The engine under test.
    pub engine: Arc<Engine>,
}

impl TestScenario {
    /// Builds `peer_count` peers, each holding `hosts` hosts named
    /// `testhost_<n>` and `services / hosts` services per host named
    /// `testsvc_<j>`, all with the default latency.
    #[must_use]
    pub fn start(peer_count: usize, hosts: usize, services: usize) -> Self {
        Self::with_latency(peer_count, hosts, services, |_, _| DEFAULT_LATENCY)
    }

    /// Like [`TestScenario::start`] with per-host latencies supplied by
    /// `latency(peer_idx, host_idx)`.
    #[must_use]
    pub fn with_latency(
        peer_count: usize,
        hosts: usize,
        services: usize,
        latency: impl Fn(usize, usize) -> f64,
    ) -> Self {
        let catalog = Arc::new(Catalog::new());
        let interner = Arc::new(Interner::new());
        let signals = Arc::new(TableSignals::new());
        let engine = Arc::new(Engine::new(
            Arc::clone(&catalog),
            EngineOptions::default(),
            Arc::clone(&signals),
        ));

        for peer_idx in 0..peer_count {
            let peer = Arc::new(Peer::new(
                format!("mockid{}", peer_idx),
                format!("mock{}", peer_idx),
                format!("mock{}.sock", peer_idx),
                Arc::clone(&catalog),
                Arc::clone(&interner),
                Arc::clone(&signals),
            ));
            seed_peer(&peer, &catalog, peer_idx, hosts, services, &latency);
            engine.add_peer(peer);
        }

        Self {
            catalog,
            signals,
            engine,
        }
    }

    /// Parses and runs one query.
    pub fn query(&self, text: &str) -> LqdResult<Response> {
        let req = Request::parse(text, &self.catalog)?;
        self.engine.execute(&req)
    }

    /// Parses and runs one query, returning the result rows.
    pub fn query_rows(&self, text: &str) -> LqdResult<Vec<Vec<Json>>> {
        self.query(text).map(|response| response.result)
    }
}

fn columns(catalog: &Catalog, table: TableName, names: &[&str]) -> Vec<Arc<Column>> {
    let table = catalog.table(table);
    names
        .iter()
        .map(|name| Arc::clone(table.column(name).expect("fixture column")))
        .collect()
}

fn seed_peer(
    peer: &Peer,
    catalog: &Catalog,
    peer_idx: usize,
    hosts: usize,
    services: usize,
    latency: &impl Fn(usize, usize) -> f64,
) {
    let services_per_host = if hosts > 0 { services / hosts } else { 0 };
    let service_names: Vec<String> = (1..=services_per_host)
        .map(|j| format!("testsvc_{}", j))
        .collect();

    let host_cols = columns(
        catalog,
        TableName::Hosts,
        &[
            "name",
            "alias",
            "address",
            "check_command",
            "contacts",
            "contact_groups",
            "groups",
            "services",
            "custom_variable_names",
            "custom_variable_values",
            "state",
            "has_been_checked",
            "check_type",
            "num_services",
            "last_check",
            "last_state_change",
            "latency",
            "execution_time",
            "percent_state_change",
            "plugin_output",
        ],
    );
    let host_rows: Vec<Vec<Json>> = (1..=hosts)
        .map(|n| {
            vec![
                json!(format!("testhost_{}", n)),
                json!(if n == 2 { "authhost" } else { "localhost" }),
                json!("127.0.0.1"),
                json!("check-host-alive"),
                json!(["testUser"]),
                json!(["example"]),
                json!(["Everything", format!("host_{}", n)]),
                json!(service_names),
                json!(["TEST"]),
                json!([format!("{}", n)]),
                json!(0),
                json!(1),
                json!(0),
                json!(services_per_host),
                json!(1473760400 + n),
                json!(0),
                json!(latency(peer_idx, n)),
                json!(DEFAULT_EXECUTION_TIME),
                json!(1.5),
                json!("OK - alive"),
            ]
        })
        .collect();
    peer.set_table_data(TableName::Hosts, &host_cols, host_rows, 1473760500)
        .expect("seed hosts");

    let service_cols = columns(
        catalog,
        TableName::Services,
        &[
            "host_name",
            "description",
            "display_name",
            "check_command",
            "contacts",
            "contact_groups",
            "groups",
            "state",
            "has_been_checked",
            "check_type",
            "last_check",
            "latency",
            "execution_time",
            "plugin_output",
        ],
    );
    let mut service_rows = Vec::new();
    for n in 1..=hosts {
        for name in &service_names {
            service_rows.push(vec![
                json!(format!("testhost_{}", n)),
                json!(name),
                json!(name),
                json!("check-service"),
                json!(["testUser"]),
                json!(["example"]),
                json!(["Services"]),
                json!(0),
                json!(1),
                json!(0),
                json!(1473760400 + n),
                json!(latency(peer_idx, n)),
                json!(DEFAULT_EXECUTION_TIME),
                json!("OK - fine"),
            ]);
        }
    }
    peer.set_table_data(TableName::Services, &service_cols, service_rows, 1473760500)
        .expect("seed services");

    let group_cols = columns(
        catalog,
        TableName::Hostgroups,
        &["name", "alias", "members", "num_hosts"],
    );
    let all_hosts: Vec<String> = (1..=hosts).map(|n| format!("testhost_{}", n)).collect();
    let mut group_rows = vec![vec![
        json!("Everything"),
        json!("All hosts"),
        json!(all_hosts),
        json!(hosts),
    ]];
    for n in 1..=hosts {
        group_rows.push(vec![
            json!(format!("host_{}", n)),
            json!(format!("Group of testhost_{}", n)),
            json!([format!("testhost_{}", n)]),
            json!(1),
        ]);
    }
    peer.set_table_data(TableName::Hostgroups, &group_cols, group_rows, 1473760500)
        .expect("seed hostgroups");

    let sg_cols = columns(
        catalog,
        TableName::Servicegroups,
        &["name", "alias", "members", "num_services"],
    );
    let members: Vec<Json> = (1..=hosts)
        .flat_map(|n| {
            service_names
                .iter()
                .map(move |name| json!([format!("testhost_{}", n), name]))
        })
        .collect();
    let sg_rows = vec![vec![
        json!("Services"),
        json!("All services"),
        Json::Array(members.clone()),
        json!(members.len()),
    ]];
    peer.set_table_data(TableName::Servicegroups, &sg_cols, sg_rows, 1473760500)
        .expect("seed servicegroups");

    peer.build_group_tables().expect("group tables");

    if hosts > 0 {
        let comment_cols = columns(
            catalog,
            TableName::Comments,
            &[
                "id",
                "host_name",
                "service_description",
                "author",
                "comment",
                "entry_time",
            ],
        );
        let comment_rows = vec![vec![
            json!(1),
            json!("testhost_1"),
            json!(""),
            json!("admin"),
            json!("flapping"),
            json!(1473760400),
        ]];
        peer.set_table_data(TableName::Comments, &comment_cols, comment_rows, 1473760500)
            .expect("seed comments");
    }

    let status_cols = columns(
        catalog,
        TableName::Status,
        &["program_start", "program_version", "livestatus_version"],
    );
    let status_rows = vec![vec![
        json!(1473760000),
        json!("4.4.1"),
        json!("1.3.0"),
    ]];
    peer.set_table_data(TableName::Status, &status_cols, status_rows, 1473760500)
        .expect("seed status");

    peer.update_status(|status| {
        status.program_start = 1473760000;
        status.last_online = 1473760500;
        status.last_update = 1473760500;
        status.response_time = 0.001;
    });
}
