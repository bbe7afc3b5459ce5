//! AuthUser row-level authorization.
//!
//! Visibility follows the monitoring core's contact model: a host or
//! service is visible to its contacts; group visibility depends on the
//! configured strictness.

use lqd_common::{AuthLevel, EngineOptions};
use lqd_schema::TableName;
use lqd_store::{DataRow, PeerView};

/// Returns true if `user` may see the host, or the service when
/// `service` is non-empty. With loose service authorization a host contact
/// sees all of the host's services.
fn is_authorized_for(
    view: &PeerView<'_>,
    options: &EngineOptions,
    user: &str,
    host: &str,
    service: &str,
) -> bool {
    if service.is_empty() || options.service_authorization == AuthLevel::Loose {
        let hosts = view.store(TableName::Hosts);
        let contacts_col = hosts.table().column("contacts").expect("contacts column");
        match hosts.find(host) {
            Some(idx) => {
                let row = hosts.row(idx).expect("indexed row");
                if row
                    .get_string_list(contacts_col, view)
                    .iter()
                    .any(|contact| contact == user)
                {
                    return true;
                }
            }
            None => return false,
        }
    }

    if !service.is_empty() {
        let services = view.store(TableName::Services);
        let contacts_col = services.table().column("contacts").expect("contacts column");
        match services.find2(host, service) {
            Some(idx) => {
                let row = services.row(idx).expect("indexed row");
                if row
                    .get_string_list(contacts_col, view)
                    .iter()
                    .any(|contact| contact == user)
                {
                    return true;
                }
            }
            None => return false,
        }
    }

    false
}

/// Group visibility: loose needs one authorized member, strict needs all.
fn is_authorized_for_hostgroup(
    view: &PeerView<'_>,
    options: &EngineOptions,
    user: &str,
    hostgroup: &str,
) -> bool {
    let groups = view.store(TableName::Hostgroups);
    let members_col = groups.table().column("members").expect("members column");
    let Some(idx) = groups.find(hostgroup) else {
        return false;
    };
    let row = groups.row(idx).expect("indexed row");
    let members = row.get_string_list(members_col, view);
    if members.is_empty() {
        return false;
    }
    match options.group_authorization {
        AuthLevel::Loose => members
            .iter()
            .any(|host| is_authorized_for(view, options, user, host, "")),
        AuthLevel::Strict => members
            .iter()
            .all(|host| is_authorized_for(view, options, user, host, "")),
    }
}

fn is_authorized_for_servicegroup(
    view: &PeerView<'_>,
    options: &EngineOptions,
    user: &str,
    servicegroup: &str,
) -> bool {
    let groups = view.store(TableName::Servicegroups);
    let members_col = groups.table().column("members").expect("members column");
    let Some(idx) = groups.find(servicegroup) else {
        return false;
    };
    let row = groups.row(idx).expect("indexed row");
    let members = row.get_service_members(members_col, view);
    if members.is_empty() {
        return false;
    }
    match options.group_authorization {
        AuthLevel::Loose => members
            .iter()
            .any(|m| is_authorized_for(view, options, user, &m.host, &m.service)),
        AuthLevel::Strict => members
            .iter()
            .all(|m| is_authorized_for(view, options, user, &m.host, &m.service)),
    }
}

/// Returns true if `user` may see this row. Tables outside the contact
/// model are always visible.
pub(crate) fn check_auth(
    row: &DataRow,
    table: TableName,
    view: &PeerView<'_>,
    options: &EngineOptions,
    user: &str,
) -> bool {
    if user.is_empty() {
        return true;
    }
    let get = |name: &str| {
        let col = view.table(table).column(name).expect("auth column");
        row.get_string(col, view).into_owned()
    };
    match table {
        TableName::Hosts => is_authorized_for(view, options, user, &get("name"), ""),
        TableName::Services => {
            is_authorized_for(view, options, user, &get("host_name"), &get("description"))
        }
        TableName::Hostgroups => is_authorized_for_hostgroup(view, options, user, &get("name")),
        TableName::Servicegroups => {
            is_authorized_for_servicegroup(view, options, user, &get("name"))
        }
        TableName::HostsByGroup => {
            is_authorized_for(view, options, user, &get("name"), "")
                && is_authorized_for_hostgroup(view, options, user, &get("hostgroup_name"))
        }
        TableName::ServicesByGroup => {
            is_authorized_for(view, options, user, &get("host_name"), &get("description"))
                && is_authorized_for_servicegroup(view, options, user, &get("servicegroup_name"))
        }
        TableName::ServicesByHostgroup => {
            is_authorized_for(view, options, user, &get("host_name"), &get("description"))
                && is_authorized_for_hostgroup(view, options, user, &get("hostgroup_name"))
        }
        TableName::Comments | TableName::Downtimes => is_authorized_for(
            view,
            options,
            user,
            &get("host_name"),
            &get("service_description"),
        ),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lqd_schema::{Catalog, Column};
    use lqd_store::{Interner, Peer, TableSignals};
    use serde_json::json;
    use std::sync::Arc;

    fn seeded_peer() -> Peer {
        let catalog = Arc::new(Catalog::new());
        let peer = Peer::new(
            "mockid0",
            "mock",
            "mock.sock",
            Arc::clone(&catalog),
            Arc::new(Interner::new()),
            Arc::new(TableSignals::new()),
        );
        let cols = |table: TableName, names: &[&str]| -> Vec<Arc<Column>> {
            let t = catalog.table(table);
            names
                .iter()
                .map(|n| Arc::clone(t.column(n).unwrap()))
                .collect()
        };
        peer.set_table_data(
            TableName::Hosts,
            &cols(TableName::Hosts, &["name", "contacts", "services"]),
            vec![
                vec![json!("host_a"), json!(["alice"]), json!(["svc"])],
                vec![json!("host_b"), json!(["bob"]), json!([])],
            ],
            1,
        )
        .unwrap();
        peer.set_table_data(
            TableName::Services,
            &cols(TableName::Services, &["host_name", "description", "contacts"]),
            vec![vec![json!("host_a"), json!("svc"), json!(["carol"])]],
            1,
        )
        .unwrap();
        peer.set_table_data(
            TableName::Hostgroups,
            &cols(TableName::Hostgroups, &["name", "members"]),
            vec![vec![json!("all"), json!(["host_a", "host_b"])]],
            1,
        )
        .unwrap();
        peer
    }

    #[test]
    fn test_host_contact_sees_host() {
        let peer = seeded_peer();
        let view = peer.view();
        let options = EngineOptions::default();
        let hosts = view.store(TableName::Hosts);
        let row_a = hosts.row(hosts.find("host_a").unwrap()).unwrap();
        assert!(check_auth(row_a, TableName::Hosts, &view, &options, "alice"));
        assert!(!check_auth(row_a, TableName::Hosts, &view, &options, "bob"));
        assert!(check_auth(row_a, TableName::Hosts, &view, &options, ""));
    }

    #[test]
    fn test_service_authorization_modes() {
        let peer = seeded_peer();
        let view = peer.view();
        let services = view.store(TableName::Services);
        let row = services.row(0).unwrap();

        // loose: the host contact sees the service too
        let loose = EngineOptions::default();
        assert!(check_auth(row, TableName::Services, &view, &loose, "alice"));
        assert!(check_auth(row, TableName::Services, &view, &loose, "carol"));

        // strict: only direct service contacts
        let strict = EngineOptions {
            service_authorization: AuthLevel::Strict,
            ..EngineOptions::default()
        };
        assert!(!check_auth(row, TableName::Services, &view, &strict, "alice"));
        assert!(check_auth(row, TableName::Services, &view, &strict, "carol"));
    }

    #[test]
    fn test_group_authorization_monotonicity() {
        let peer = seeded_peer();
        let view = peer.view();
        let groups = view.store(TableName::Hostgroups);
        let row = groups.row(0).unwrap();

        let loose = EngineOptions::default();
        let strict = EngineOptions {
            group_authorization: AuthLevel::Strict,
            ..EngineOptions::default()
        };
        for user in ["alice", "bob", "carol"] {
            let loose_ok = check_auth(row, TableName::Hostgroups, &view, &loose, user);
            let strict_ok = check_auth(row, TableName::Hostgroups, &view, &strict, user);
            // strict may only remove visibility, never add it
            assert!(!strict_ok || loose_ok, "user {}", user);
        }
        assert!(check_auth(row, TableName::Hostgroups, &view, &loose, "alice"));
        assert!(!check_auth(row, TableName::Hostgroups, &view, &strict, "alice"));
    }
}
