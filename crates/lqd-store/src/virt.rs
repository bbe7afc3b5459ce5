//! Virtual column resolvers.
//!
//! A virtual column is either a status alias reading a field of the owning
//! peer, or a computed value from the small catalog below. Resolver output
//! is coerced to the column's declared data type by the caller.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde_json::Value as Json;
use tracing::warn;

use lqd_common::PROGRAM_NAME;
use lqd_schema::{Column, OptionalFlags, TableName};

use crate::peer::PeerView;
use crate::row::DataRow;
use crate::value::Value;

/// Typed field of the peer status map backing a status alias.
#[derive(Debug, Clone, Copy)]
enum StatusKey {
    PeerKey,
    PeerName,
    PeerAddr,
    PeerStatus,
    BytesSend,
    BytesReceived,
    Queries,
    LastError,
    LastOnline,
    LastUpdate,
    ResponseTime,
    Idling,
    LastQuery,
    Section,
    Parent,
    ConfigTool,
    FederationKey,
    FederationName,
    FederationAddr,
    FederationType,
}

type Resolver = fn(&DataRow, &Column, &PeerView<'_>) -> Value;

enum VirtEntry {
    Status(StatusKey),
    Func(Resolver),
}

static VIRT_COLUMNS: Lazy<HashMap<&'static str, VirtEntry>> = Lazy::new(|| {
    use StatusKey::*;
    use VirtEntry::{Func, Status};

    let mut map: HashMap<&'static str, VirtEntry> = HashMap::new();
    map.insert("key", Status(PeerKey));
    map.insert("peer_key", Status(PeerKey));
    map.insert("name", Status(PeerName));
    map.insert("peer_name", Status(PeerName));
    map.insert("addr", Status(PeerAddr));
    map.insert("status", Status(PeerStatus));
    map.insert("bytes_send", Status(BytesSend));
    map.insert("bytes_received", Status(BytesReceived));
    map.insert("queries", Status(Queries));
    map.insert("last_error", Status(LastError));
    map.insert("last_online", Status(LastOnline));
    map.insert("last_update", Status(LastUpdate));
    map.insert("response_time", Status(ResponseTime));
    map.insert("idling", Status(Idling));
    map.insert("last_query", Status(LastQuery));
    map.insert("section", Status(Section));
    map.insert("peer_section", Status(Section));
    map.insert("parent", Status(Parent));
    map.insert("configtool", Status(ConfigTool));
    map.insert("federation_key", Status(FederationKey));
    map.insert("federation_name", Status(FederationName));
    map.insert("federation_addr", Status(FederationAddr));
    map.insert("federation_type", Status(FederationType));

    map.insert("lmd_last_cache_update", Func(virt_last_cache_update));
    map.insert("lmd_version", Func(virt_version));
    map.insert("state_order", Func(virt_state_order));
    map.insert("last_state_change_order", Func(virt_last_state_change_order));
    map.insert("has_long_plugin_output", Func(virt_has_long_plugin_output));
    map.insert("services_with_state", Func(virt_services_with_info));
    map.insert("services_with_info", Func(virt_services_with_info));
    map.insert("members_with_state", Func(virt_members_with_state));
    map.insert("comments", Func(virt_comments));
    map.insert("comments_with_info", Func(virt_comments));
    map.insert("downtimes", Func(virt_downtimes));
    map.insert("downtimes_with_info", Func(virt_downtimes));
    map.insert("custom_variables", Func(virt_custom_variables));
    map.insert("empty", Func(|_, _, _| Value::Str(String::new())));
    map
});

/// Computes the value of a virtual column, before coercion to the declared
/// data type.
#[must_use]
pub fn resolve_virtual(row: &DataRow, col: &Column, view: &PeerView<'_>) -> Value {
    match VIRT_COLUMNS.get(col.name.as_str()) {
        Some(VirtEntry::Status(key)) => status_value(*key, col, view),
        Some(VirtEntry::Func(resolver)) => resolver(row, col, view),
        None => {
            warn!("no resolver for virtual column {}", col.name);
            Value::Str(String::new())
        }
    }
}

fn status_value(key: StatusKey, col: &Column, view: &PeerView<'_>) -> Value {
    // Sub peers relayed through a remote proxy report their own nested
    // status map.
    if view.flags().contains(OptionalFlags::LMD_SUB) {
        if let Some(value) = sub_status_value(col, view) {
            return value;
        }
    }
    let peer = view.peer();
    let status = view.status();
    match key {
        StatusKey::PeerKey => Value::Str(peer.key.clone()),
        StatusKey::PeerName => Value::Str(peer.name.clone()),
        StatusKey::PeerAddr => Value::Str(peer.addr.clone()),
        StatusKey::PeerStatus => Value::Int(status.status.as_i64()),
        StatusKey::BytesSend => Value::Int(status.bytes_send),
        StatusKey::BytesReceived => Value::Int(status.bytes_received),
        StatusKey::Queries => Value::Int(status.queries),
        StatusKey::LastError => Value::Str(status.last_error.clone()),
        StatusKey::LastOnline => Value::Int(status.last_online),
        StatusKey::LastUpdate => Value::Int(status.last_update),
        StatusKey::ResponseTime => Value::Float(status.response_time),
        StatusKey::Idling => Value::Int(i64::from(status.idling)),
        StatusKey::LastQuery => Value::Int(status.last_query),
        StatusKey::Section => Value::Str(peer.section.clone()),
        StatusKey::Parent => Value::Str(status.parent.clone()),
        StatusKey::ConfigTool => Value::Hash(status.config_tool.clone()),
        StatusKey::FederationKey => Value::Str(status.federation_key.clone()),
        StatusKey::FederationName => Value::Str(status.federation_name.clone()),
        StatusKey::FederationAddr => Value::Str(status.federation_addr.clone()),
        StatusKey::FederationType => Value::Str(status.federation_type.clone()),
    }
}

/// Nested status lookup for sub peers. `status` reports the worst of the
/// parent and nested state; `last_error` prefers the nested error and falls
/// back to the parent's.
fn sub_status_value(col: &Column, view: &PeerView<'_>) -> Option<Value> {
    let status = view.status();
    let sub = status.sub_peer_status.as_ref()?;
    match col.name.as_str() {
        "status" => {
            let parent = status.status.as_i64();
            if parent != 0 {
                Some(Value::Int(parent))
            } else {
                sub.get("status").map(Value::from_json)
            }
        }
        "last_error" => {
            let nested = sub
                .get("last_error")
                .map(Value::from_json)
                .map(Value::into_display_string)
                .unwrap_or_default();
            if nested.is_empty() && !status.last_error.is_empty() {
                Some(Value::Str(status.last_error.clone()))
            } else {
                Some(Value::Str(nested))
            }
        }
        name => sub.get(name).map(Value::from_json),
    }
}

fn virt_last_cache_update(row: &DataRow, _col: &Column, _view: &PeerView<'_>) -> Value {
    Value::Int(row.last_update)
}

fn virt_version(_row: &DataRow, _col: &Column, _view: &PeerView<'_>) -> Value {
    Value::Str(format!("{}-{}", PROGRAM_NAME, env!("CARGO_PKG_VERSION")))
}

/// Sortable state: critical (2) is remapped to 4 so it sorts past unknown.
fn virt_state_order(row: &DataRow, col: &Column, view: &PeerView<'_>) -> Value {
    let state_col = view.table(col.table).column("state").expect("state column");
    let state = row.get_int(state_col, view);
    Value::Int(if state == 2 { 4 } else { state })
}

fn virt_last_state_change_order(row: &DataRow, col: &Column, view: &PeerView<'_>) -> Value {
    let change_col = view
        .table(col.table)
        .column("last_state_change")
        .expect("last_state_change column");
    let last_state_change = row.get_int(change_col, view);
    if last_state_change == 0 {
        Value::Int(view.status().program_start)
    } else {
        Value::Int(last_state_change)
    }
}

fn virt_has_long_plugin_output(row: &DataRow, col: &Column, view: &PeerView<'_>) -> Value {
    let output_col = view
        .table(col.table)
        .column("long_plugin_output")
        .expect("long_plugin_output column");
    Value::Int(i64::from(!row.get_string(output_col, view).is_empty()))
}

/// `[service, state, has_been_checked]` per service of a host row; the
/// `_info` variant appends the plugin output.
fn virt_services_with_info(row: &DataRow, col: &Column, view: &PeerView<'_>) -> Value {
    let hosts = view.table(TableName::Hosts);
    let services_col = hosts.column("services").expect("services column");
    let name_col = hosts.column("name").expect("name column");
    let host_name = row.get_string(name_col, view).into_owned();
    let with_output = col.name == "services_with_info";

    let services_store = view.store(TableName::Services);
    let services_table = services_store.table();
    let state_col = services_table.column("state").expect("state column");
    let checked_col = services_table
        .column("has_been_checked")
        .expect("has_been_checked column");
    let output_col = services_table
        .column("plugin_output")
        .expect("plugin_output column");

    let mut result = Vec::new();
    for service in row.get_string_list(services_col, view).iter() {
        let Some(idx) = services_store.find2(&host_name, service) else {
            warn!("could not find service: {} - {}", host_name, service);
            continue;
        };
        let service_row = services_store.row(idx).expect("indexed row");
        let mut entry = vec![
            Json::from(service.clone()),
            Json::from(service_row.get_int(state_col, view)),
            Json::from(service_row.get_int(checked_col, view)),
        ];
        if with_output {
            entry.push(Json::from(
                service_row.get_string(output_col, view).into_owned(),
            ));
        }
        result.push(Json::Array(entry));
    }
    Value::List(result)
}

/// Group members with their states: `[host, state, has_been_checked]` for
/// hostgroups, `[host, service, state, has_been_checked]` for
/// servicegroups.
fn virt_members_with_state(row: &DataRow, col: &Column, view: &PeerView<'_>) -> Value {
    let mut result = Vec::new();
    match col.table {
        TableName::Hostgroups => {
            let members_col = view
                .table(TableName::Hostgroups)
                .column("members")
                .expect("members column");
            let hosts_store = view.store(TableName::Hosts);
            let hosts_table = hosts_store.table();
            let state_col = hosts_table.column("state").expect("state column");
            let checked_col = hosts_table
                .column("has_been_checked")
                .expect("has_been_checked column");
            for host in row.get_string_list(members_col, view).iter() {
                let Some(idx) = hosts_store.find(host) else {
                    warn!("could not find host: {}", host);
                    continue;
                };
                let host_row = hosts_store.row(idx).expect("indexed row");
                result.push(Json::Array(vec![
                    Json::from(host.clone()),
                    Json::from(host_row.get_int(state_col, view)),
                    Json::from(host_row.get_int(checked_col, view)),
                ]));
            }
        }
        TableName::Servicegroups => {
            let members_col = view
                .table(TableName::Servicegroups)
                .column("members")
                .expect("members column");
            let services_store = view.store(TableName::Services);
            let services_table = services_store.table();
            let state_col = services_table.column("state").expect("state column");
            let checked_col = services_table
                .column("has_been_checked")
                .expect("has_been_checked column");
            for member in row.get_service_members(members_col, view).iter() {
                let Some(idx) = services_store.find2(&member.host, &member.service) else {
                    warn!("could not find service: {} - {}", member.host, member.service);
                    continue;
                };
                let service_row = services_store.row(idx).expect("indexed row");
                result.push(Json::Array(vec![
                    Json::from(member.host.clone()),
                    Json::from(member.service.clone()),
                    Json::from(service_row.get_int(state_col, view)),
                    Json::from(service_row.get_int(checked_col, view)),
                ]));
            }
        }
        other => warn!("members_with_state on unsupported table {}", other),
    }
    Value::List(result)
}

fn virt_comments(row: &DataRow, col: &Column, view: &PeerView<'_>) -> Value {
    virt_join_ids(row, col, view, TableName::Comments, "comment")
}

fn virt_downtimes(row: &DataRow, col: &Column, view: &PeerView<'_>) -> Value {
    virt_join_ids(row, col, view, TableName::Downtimes, "comment")
}

/// Resolves comment/downtime ids through the peer cache; `_with_info`
/// variants join author and text through the source table's index.
fn virt_join_ids(
    row: &DataRow,
    col: &Column,
    view: &PeerView<'_>,
    source: TableName,
    text_column: &str,
) -> Value {
    let key = (col.table, row.idx);
    let ids = match source {
        TableName::Comments => view.comments_for(key),
        _ => view.downtimes_for(key),
    };
    let Some(ids) = ids else {
        return if col.name.ends_with("_with_info") {
            Value::List(Vec::new())
        } else {
            Value::IntList(Vec::new())
        };
    };
    if !col.name.ends_with("_with_info") {
        return Value::IntList(ids.to_vec());
    }

    let store = view.store(source);
    let table = store.table();
    let author_col = table.column("author").expect("author column");
    let text_col = table.column(text_column).expect("text column");
    let mut result = Vec::new();
    for id in ids {
        let Some(idx) = store.find(&id.to_string()) else {
            warn!("could not find {} entry: {}", source, id);
            continue;
        };
        let entry_row = store.row(idx).expect("indexed row");
        result.push(Json::Array(vec![
            Json::from(*id),
            Json::from(entry_row.get_string(author_col, view).into_owned()),
            Json::from(entry_row.get_string(text_col, view).into_owned()),
        ]));
    }
    Value::List(result)
}

/// Zips `custom_variable_names` with `custom_variable_values`.
fn virt_custom_variables(row: &DataRow, col: &Column, view: &PeerView<'_>) -> Value {
    let table = view.table(col.table);
    let names_col = table
        .column("custom_variable_names")
        .expect("custom_variable_names column");
    let values_col = table
        .column("custom_variable_values")
        .expect("custom_variable_values column");
    let names = row.get_string_list(names_col, view);
    let values = row.get_string_list(values_col, view);
    let map = names
        .iter()
        .zip(values.iter())
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    Value::Hash(map)
}
