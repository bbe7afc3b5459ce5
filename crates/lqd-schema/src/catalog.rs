//! The static table catalog.
//!
//! Builds every table served by the proxy. Tables are constructed in
//! dependency order so that `Ref`-storage columns can hold their target
//! column directly.

use std::collections::HashMap;
use std::sync::Arc;

use crate::column::{DataType, FetchType, OptionalFlags};
use crate::table::{RefTable, Table, TableBuilder, TableName};

use DataType::{
    CustomVar, Float, HashMap as HashMapCol, Int, Int64, Int64List, InterfaceList, LargeString,
    ServiceMemberList, String as StringCol, StringList,
};
use FetchType::{Dynamic, Static};

/// The catalog of all tables.
///
/// Built once at startup and threaded through parser, engine and peers as
/// an explicit handle.
#[derive(Debug)]
pub struct Catalog {
    tables: HashMap<TableName, Arc<Table>>,
}

impl Catalog {
    /// Builds the full schema.
    #[must_use]
    pub fn new() -> Self {
        let mut tables = HashMap::new();

        let hosts = Arc::new(build_hosts());
        let hostgroups = Arc::new(build_hostgroups());
        let servicegroups = Arc::new(build_servicegroups());
        let services = Arc::new(build_services(&hosts));
        let comments = Arc::new(build_comments(&hosts, &services));
        let downtimes = Arc::new(build_downtimes(&hosts, &services));
        let contacts = Arc::new(build_contacts());
        let hostsbygroup = Arc::new(build_hostsbygroup(&hosts, &hostgroups));
        let servicesbygroup = Arc::new(build_servicesbygroup(&services, &servicegroups, &hosts));
        let servicesbyhostgroup =
            Arc::new(build_servicesbyhostgroup(&services, &hosts, &hostgroups));
        let status = Arc::new(build_status());
        let sites = Arc::new(build_sites());
        let log = Arc::new(build_log());

        tables.insert(TableName::Hosts, hosts);
        tables.insert(TableName::Hostgroups, hostgroups);
        tables.insert(TableName::Servicegroups, servicegroups);
        tables.insert(TableName::Services, services);
        tables.insert(TableName::Comments, comments);
        tables.insert(TableName::Downtimes, downtimes);
        tables.insert(TableName::Contacts, contacts);
        tables.insert(TableName::HostsByGroup, hostsbygroup);
        tables.insert(TableName::ServicesByGroup, servicesbygroup);
        tables.insert(TableName::ServicesByHostgroup, servicesbyhostgroup);
        tables.insert(TableName::Status, status);
        tables.insert(TableName::Sites, sites);
        tables.insert(TableName::Log, log);

        Self { tables }
    }

    /// Returns the table definition.
    #[must_use]
    pub fn table(&self, name: TableName) -> &Arc<Table> {
        &self.tables[&name]
    }

    /// Looks up a table by its wire name.
    #[must_use]
    pub fn table_by_name(&self, name: &str) -> Option<&Arc<Table>> {
        TableName::parse(name).map(|t| self.table(t))
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

/// Virtual columns present on every data table.
fn add_peer_columns(b: &mut TableBuilder) {
    b.virt("peer_key", StringCol);
    b.virt("peer_name", StringCol);
    b.virt("peer_section", StringCol);
    b.virt("lmd_last_cache_update", Int64);
    b.virt("lmd_version", StringCol);
}

fn build_hosts() -> Table {
    let mut b = TableBuilder::new(TableName::Hosts);
    b.col("name", StringCol, Static);
    b.col("alias", StringCol, Static);
    b.col("address", StringCol, Static);
    b.col("check_command", StringCol, Static);
    b.col("notes", StringCol, Static);
    b.col("icon_image", StringCol, Static);
    b.col("contacts", StringList, Static);
    b.col("contact_groups", StringList, Static);
    b.col("groups", StringList, Static);
    b.col("parents", StringList, Static);
    b.col("services", StringList, Static);
    b.col("custom_variable_names", StringList, Static);
    b.col("custom_variable_values", StringList, Dynamic);
    b.col("modified_attributes_list", StringList, Dynamic);
    b.col("state", Int, Dynamic);
    b.col("has_been_checked", Int, Dynamic);
    b.col("check_type", Int, Dynamic);
    b.col("is_executing", Int, Dynamic);
    b.col("acknowledged", Int, Dynamic);
    b.col("scheduled_downtime_depth", Int, Dynamic);
    b.col("num_services", Int, Static);
    b.col("last_check", Int64, Dynamic);
    b.col("last_state_change", Int64, Dynamic);
    b.col("next_check", Int64, Dynamic);
    b.col("latency", Float, Dynamic);
    b.col("execution_time", Float, Dynamic);
    b.col("percent_state_change", Float, Dynamic);
    b.col("plugin_output", StringCol, Dynamic);
    b.col("perf_data", StringCol, Dynamic);
    b.col("long_plugin_output", LargeString, Dynamic);
    b.opt_col("is_impact", Int, Dynamic, OptionalFlags::SHINKEN);

    b.virt("state_order", Int);
    b.virt("last_state_change_order", Int64);
    b.virt("has_long_plugin_output", Int);
    b.virt("services_with_state", InterfaceList);
    b.virt("services_with_info", InterfaceList);
    b.virt("comments", Int64List);
    b.virt("comments_with_info", InterfaceList);
    b.virt("downtimes", Int64List);
    b.virt("downtimes_with_info", InterfaceList);
    b.virt("custom_variables", CustomVar);
    add_peer_columns(&mut b);

    b.build(&["name"], Vec::new())
}

fn build_services(hosts: &Arc<Table>) -> Table {
    let mut b = TableBuilder::new(TableName::Services);
    let host_name = b.col("host_name", StringCol, Static);
    b.col("description", StringCol, Static);
    b.col("display_name", StringCol, Static);
    b.col("check_command", StringCol, Static);
    b.col("contacts", StringList, Static);
    b.col("contact_groups", StringList, Static);
    b.col("groups", StringList, Static);
    b.col("custom_variable_names", StringList, Static);
    b.col("custom_variable_values", StringList, Dynamic);
    b.col("state", Int, Dynamic);
    b.col("has_been_checked", Int, Dynamic);
    b.col("check_type", Int, Dynamic);
    b.col("is_executing", Int, Dynamic);
    b.col("acknowledged", Int, Dynamic);
    b.col("scheduled_downtime_depth", Int, Dynamic);
    b.col("last_check", Int64, Dynamic);
    b.col("last_state_change", Int64, Dynamic);
    b.col("next_check", Int64, Dynamic);
    b.col("latency", Float, Dynamic);
    b.col("execution_time", Float, Dynamic);
    b.col("percent_state_change", Float, Dynamic);
    b.col("plugin_output", StringCol, Dynamic);
    b.col("perf_data", StringCol, Dynamic);
    b.col("long_plugin_output", LargeString, Dynamic);

    b.ref_col("host_alias", hosts.column("alias").unwrap());
    b.ref_col("host_address", hosts.column("address").unwrap());
    b.ref_col("host_check_command", hosts.column("check_command").unwrap());
    b.ref_col("host_latency", hosts.column("latency").unwrap());
    b.ref_col("host_groups", hosts.column("groups").unwrap());
    b.ref_col("host_contacts", hosts.column("contacts").unwrap());
    b.ref_col("host_state", hosts.column("state").unwrap());
    b.ref_col(
        "host_has_been_checked",
        hosts.column("has_been_checked").unwrap(),
    );
    b.ref_col("host_is_impact", hosts.column("is_impact").unwrap());
    b.ref_col(
        "host_custom_variables",
        hosts.column("custom_variables").unwrap(),
    );

    b.virt("state_order", Int);
    b.virt("last_state_change_order", Int64);
    b.virt("has_long_plugin_output", Int);
    b.virt("comments", Int64List);
    b.virt("comments_with_info", InterfaceList);
    b.virt("downtimes", Int64List);
    b.virt("downtimes_with_info", InterfaceList);
    b.virt("custom_variables", CustomVar);
    add_peer_columns(&mut b);

    b.build(
        &["host_name", "description"],
        vec![RefTable {
            table: TableName::Hosts,
            columns: vec![host_name],
        }],
    )
}

fn build_hostgroups() -> Table {
    let mut b = TableBuilder::new(TableName::Hostgroups);
    b.col("name", StringCol, Static);
    b.col("alias", StringCol, Static);
    b.col("notes", StringCol, Static);
    b.col("action_url", StringCol, Static);
    b.col("members", StringList, Static);
    b.col("num_hosts", Int, Static);
    b.virt("members_with_state", InterfaceList);
    add_peer_columns(&mut b);
    b.build(&["name"], Vec::new())
}

fn build_servicegroups() -> Table {
    let mut b = TableBuilder::new(TableName::Servicegroups);
    b.col("name", StringCol, Static);
    b.col("alias", StringCol, Static);
    b.col("notes", StringCol, Static);
    b.col("members", ServiceMemberList, Static);
    b.col("num_services", Int, Static);
    b.virt("members_with_state", InterfaceList);
    add_peer_columns(&mut b);
    b.build(&["name"], Vec::new())
}

fn build_comments(hosts: &Arc<Table>, services: &Arc<Table>) -> Table {
    let mut b = TableBuilder::new(TableName::Comments);
    b.col("id", Int64, Static);
    let host_name = b.col("host_name", StringCol, Static);
    let service_description = b.col("service_description", StringCol, Static);
    b.col("author", StringCol, Static);
    b.col("comment", StringCol, Static);
    b.col("entry_time", Int64, Static);
    b.col("entry_type", Int, Static);
    b.col("expires", Int, Static);
    b.col("persistent", Int, Static);
    b.ref_col("host_alias", hosts.column("alias").unwrap());
    b.ref_col("host_contacts", hosts.column("contacts").unwrap());
    b.ref_col("service_state", services.column("state").unwrap());
    add_peer_columns(&mut b);
    b.build(
        &["id"],
        vec![
            RefTable {
                table: TableName::Hosts,
                columns: vec![Arc::clone(&host_name)],
            },
            RefTable {
                table: TableName::Services,
                columns: vec![host_name, service_description],
            },
        ],
    )
}

fn build_downtimes(hosts: &Arc<Table>, services: &Arc<Table>) -> Table {
    let mut b = TableBuilder::new(TableName::Downtimes);
    b.col("id", Int64, Static);
    let host_name = b.col("host_name", StringCol, Static);
    let service_description = b.col("service_description", StringCol, Static);
    b.col("author", StringCol, Static);
    b.col("comment", StringCol, Static);
    b.col("entry_time", Int64, Static);
    b.col("start_time", Int64, Static);
    b.col("end_time", Int64, Static);
    b.col("fixed", Int, Static);
    b.col("duration", Int64, Static);
    b.ref_col("host_alias", hosts.column("alias").unwrap());
    b.ref_col("service_state", services.column("state").unwrap());
    add_peer_columns(&mut b);
    b.build(
        &["id"],
        vec![
            RefTable {
                table: TableName::Hosts,
                columns: vec![Arc::clone(&host_name)],
            },
            RefTable {
                table: TableName::Services,
                columns: vec![host_name, service_description],
            },
        ],
    )
}

fn build_contacts() -> Table {
    let mut b = TableBuilder::new(TableName::Contacts);
    b.col("name", StringCol, Static);
    b.col("alias", StringCol, Static);
    b.col("email", StringCol, Static);
    b.col("pager", StringCol, Static);
    add_peer_columns(&mut b);
    b.build(&["name"], Vec::new())
}

fn build_hostsbygroup(hosts: &Arc<Table>, hostgroups: &Arc<Table>) -> Table {
    let mut b = TableBuilder::new(TableName::HostsByGroup);
    let name = b.col("name", StringCol, Static);
    let hostgroup_name = b.col("hostgroup_name", StringCol, Static);

    b.ref_col("alias", hosts.column("alias").unwrap());
    b.ref_col("address", hosts.column("address").unwrap());
    b.ref_col("state", hosts.column("state").unwrap());
    b.ref_col("has_been_checked", hosts.column("has_been_checked").unwrap());
    b.ref_col("latency", hosts.column("latency").unwrap());
    b.ref_col("contacts", hosts.column("contacts").unwrap());
    b.ref_col("groups", hosts.column("groups").unwrap());
    b.ref_col("custom_variables", hosts.column("custom_variables").unwrap());
    b.ref_col("hostgroup_alias", hostgroups.column("alias").unwrap());
    b.ref_col("hostgroup_num_hosts", hostgroups.column("num_hosts").unwrap());
    add_peer_columns(&mut b);

    b.build(
        &[],
        vec![
            RefTable {
                table: TableName::Hosts,
                columns: vec![name],
            },
            RefTable {
                table: TableName::Hostgroups,
                columns: vec![hostgroup_name],
            },
        ],
    )
}

fn build_servicesbygroup(
    services: &Arc<Table>,
    servicegroups: &Arc<Table>,
    hosts: &Arc<Table>,
) -> Table {
    let mut b = TableBuilder::new(TableName::ServicesByGroup);
    let host_name = b.col("host_name", StringCol, Static);
    let description = b.col("description", StringCol, Static);
    let servicegroup_name = b.col("servicegroup_name", StringCol, Static);

    b.ref_col("state", services.column("state").unwrap());
    b.ref_col("has_been_checked", services.column("has_been_checked").unwrap());
    b.ref_col("latency", services.column("latency").unwrap());
    b.ref_col("contacts", services.column("contacts").unwrap());
    b.ref_col("groups", services.column("groups").unwrap());
    b.ref_col("host_alias", hosts.column("alias").unwrap());
    b.ref_col("host_address", hosts.column("address").unwrap());
    b.ref_col("host_groups", hosts.column("groups").unwrap());
    b.ref_col("servicegroup_alias", servicegroups.column("alias").unwrap());
    add_peer_columns(&mut b);

    b.build(
        &[],
        vec![
            RefTable {
                table: TableName::Services,
                columns: vec![Arc::clone(&host_name), description],
            },
            RefTable {
                table: TableName::Hosts,
                columns: vec![host_name],
            },
            RefTable {
                table: TableName::Servicegroups,
                columns: vec![servicegroup_name],
            },
        ],
    )
}

fn build_servicesbyhostgroup(
    services: &Arc<Table>,
    hosts: &Arc<Table>,
    hostgroups: &Arc<Table>,
) -> Table {
    let mut b = TableBuilder::new(TableName::ServicesByHostgroup);
    let host_name = b.col("host_name", StringCol, Static);
    let description = b.col("description", StringCol, Static);
    let hostgroup_name = b.col("hostgroup_name", StringCol, Static);

    b.ref_col("state", services.column("state").unwrap());
    b.ref_col("has_been_checked", services.column("has_been_checked").unwrap());
    b.ref_col("latency", services.column("latency").unwrap());
    b.ref_col("groups", services.column("groups").unwrap());
    b.ref_col("host_alias", hosts.column("alias").unwrap());
    b.ref_col("host_address", hosts.column("address").unwrap());
    b.ref_col("host_groups", hosts.column("groups").unwrap());
    b.ref_col("hostgroup_alias", hostgroups.column("alias").unwrap());
    add_peer_columns(&mut b);

    b.build(
        &[],
        vec![
            RefTable {
                table: TableName::Services,
                columns: vec![Arc::clone(&host_name), description],
            },
            RefTable {
                table: TableName::Hosts,
                columns: vec![host_name],
            },
            RefTable {
                table: TableName::Hostgroups,
                columns: vec![hostgroup_name],
            },
        ],
    )
}

fn build_status() -> Table {
    let mut b = TableBuilder::new(TableName::Status);
    b.col("program_start", Int64, Static);
    b.col("program_version", StringCol, Static);
    b.col("livestatus_version", StringCol, Static);
    b.col("nagios_pid", Int, Static);
    b.col("interval_length", Int, Static);
    b.col("last_command_check", Int64, Dynamic);
    b.col("last_log_rotation", Int64, Dynamic);
    b.col("accept_passive_host_checks", Int, Dynamic);
    b.col("accept_passive_service_checks", Int, Dynamic);
    b.col("check_external_commands", Int, Dynamic);
    b.col("check_host_freshness", Int, Dynamic);
    b.col("check_service_freshness", Int, Dynamic);
    b.col("enable_event_handlers", Int, Dynamic);
    b.col("enable_flap_detection", Int, Dynamic);
    b.col("enable_notifications", Int, Dynamic);
    b.col("execute_host_checks", Int, Dynamic);
    b.col("execute_service_checks", Int, Dynamic);
    b.col("obsess_over_hosts", Int, Dynamic);
    b.col("obsess_over_services", Int, Dynamic);
    b.col("process_performance_data", Int, Dynamic);
    b.virt("peer_key", StringCol);
    b.virt("peer_name", StringCol);
    b.build(&[], Vec::new())
}

fn build_sites() -> Table {
    let mut b = TableBuilder::new(TableName::Sites);
    b.virt("peer_key", StringCol);
    b.virt("key", StringCol);
    b.virt("name", StringCol);
    b.virt("addr", StringCol);
    b.virt("status", Int);
    b.virt("bytes_send", Int64);
    b.virt("bytes_received", Int64);
    b.virt("queries", Int64);
    b.virt("last_error", StringCol);
    b.virt("last_online", Int64);
    b.virt("last_update", Int64);
    b.virt("response_time", Float);
    b.virt("idling", Int);
    b.virt("last_query", Int64);
    b.virt("section", StringCol);
    b.virt("parent", StringCol);
    b.virt("configtool", HashMapCol);
    b.virt("federation_key", StringCol);
    b.virt("federation_name", StringCol);
    b.virt("federation_addr", StringCol);
    b.virt("federation_type", StringCol);
    b.virt("lmd_version", StringCol);
    b.build(&[], Vec::new())
}

fn build_log() -> Table {
    let mut b = TableBuilder::new(TableName::Log).passthrough();
    b.col("time", Int64, Static);
    b.col("class", Int, Static);
    b.col("type", StringCol, Static);
    b.col("message", StringCol, Static);
    b.col("host_name", StringCol, Static);
    b.col("service_description", StringCol, Static);
    b.col("state", Int, Static);
    b.col("plugin_output", StringCol, Static);
    b.virt("peer_key", StringCol);
    b.build(&[], Vec::new())
}
