//! The distributed planner: sub-request construction, concurrent dispatch
//! with a bounded wait, and the merge of rows and stats accumulators.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value as Json;
use tokio::task::JoinHandle;
use tracing::debug;

use lqd_common::{LqdError, LqdResult, DISTRIBUTED_TIMEOUT_SECS, STATS_KEY_SEP};
use lqd_query::{
    create_local_stats_copy, post_process, Engine, Filter, OutputFormat, Request, Response,
};
use lqd_store::number_to_json;

use crate::node::{Node, NodeClient, WrappedResult};

/// Access to the cluster: the node table plus the transport.
pub struct NodeAccessor {
    nodes: Vec<Node>,
    client: Arc<dyn NodeClient>,
}

impl NodeAccessor {
    /// Creates an accessor over the given node table.
    #[must_use]
    pub fn new(nodes: Vec<Node>, client: Arc<dyn NodeClient>) -> Self {
        Self { nodes, client }
    }

    /// Returns true when partner nodes exist.
    #[must_use]
    pub fn is_clustered(&self) -> bool {
        self.nodes.iter().any(|n| !n.is_me)
    }

    fn me(&self) -> Option<&Node> {
        self.nodes.iter().find(|n| n.is_me)
    }

    /// Returns true if the local node owns this backend.
    #[must_use]
    pub fn is_our_backend(&self, backend: &str) -> bool {
        self.me()
            .map(|me| me.backends.iter().any(|b| b == backend))
            .unwrap_or(false)
    }

    /// Returns true when the request needs no fan-out: not clustered, a
    /// sub-request from a partner node, or every requested backend is ours.
    #[must_use]
    pub fn handles_locally(&self, req: &Request) -> bool {
        if req.distributed || !self.is_clustered() {
            return true;
        }
        if req.backends.is_empty() {
            return false;
        }
        req.backends.iter().all(|b| self.is_our_backend(b))
    }

    /// Splits the request by node, dispatches the sub-requests in parallel
    /// and merges the replies. A node missing the 10 s budget fails the
    /// whole request.
    pub async fn process(&self, req: &Request, engine: &Arc<Engine>) -> LqdResult<Response> {
        let proj = engine.bind(req)?;
        let sub_columns: Vec<String> = if req.is_stats() {
            req.columns.clone()
        } else {
            proj.columns.iter().map(|(name, _)| name.clone()).collect()
        };
        let all_requested = req.backends.is_empty();

        let mut handles: Vec<JoinHandle<LqdResult<WrappedResult>>> = Vec::new();
        for node in &self.nodes {
            let sub_backends: Vec<String> = node
                .backends
                .iter()
                .filter(|b| all_requested || req.backends.contains(b))
                .cloned()
                .collect();
            // nodes without relevant backends answer with an empty
            // placeholder so the merge arity stays intact
            if sub_backends.is_empty() {
                handles.push(tokio::spawn(async { Ok(WrappedResult::empty()) }));
                continue;
            }

            let sub_request = build_sub_request(req, &sub_columns, sub_backends);
            if node.is_me {
                let engine = Arc::clone(engine);
                handles.push(tokio::task::spawn_blocking(move || {
                    engine.execute(&sub_request).map(|response| WrappedResult {
                        data: response.result,
                        failed: response.failed,
                    })
                }));
            } else {
                let client = Arc::clone(&self.client);
                let node = node.clone();
                let text = sub_request.to_string();
                handles.push(tokio::spawn(async move {
                    client.query(&node, text).await
                }));
            }
        }

        let deadline = Instant::now() + Duration::from_secs(DISTRIBUTED_TIMEOUT_SECS);
        let mut replies = Vec::with_capacity(handles.len());
        for handle in handles {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match tokio::time::timeout(remaining, handle).await {
                Err(_) => return Err(LqdError::DistributedTimeout),
                Ok(joined) => {
                    let reply = joined.map_err(|err| LqdError::BackendError {
                        peer: "cluster".to_string(),
                        message: err.to_string(),
                    })??;
                    replies.push(reply);
                }
            }
        }
        debug!("merging {} node replies", replies.len());

        let (rows, failed) = if req.is_stats() {
            merge_stats(req, replies)
        } else {
            merge_rows(replies)
        };

        let (result, total) = post_process(
            rows,
            &proj.sort,
            if req.is_stats() {
                usize::MAX
            } else {
                proj.requested
            },
            req.limit,
            req.offset,
        );
        let mut columns = proj.names.clone();
        if req.is_stats() {
            columns.extend(req.stats.iter().map(Filter::stats_label));
        }
        Ok(Response {
            code: 200,
            result,
            failed,
            columns,
            total,
        })
    }
}

/// The per-node sub-request: identical to the original, restricted to the
/// node's backends, with the limit raised by the offset so the final local
/// sort stays correct, and results shipped as wrapped_json.
fn build_sub_request(req: &Request, columns: &[String], backends: Vec<String>) -> Request {
    let mut sub = req.clone();
    sub.distributed = true;
    sub.send_stats_data = req.is_stats();
    sub.backends = backends;
    sub.columns = columns.to_vec();
    sub.limit = req.limit.map(|limit| limit + req.offset);
    sub.offset = 0;
    sub.output_format = Some(OutputFormat::WrappedJson);
    sub.response_fixed16 = true;
    sub.send_columns_header = false;
    sub.keep_alive = false;
    sub.wait_trigger = String::new();
    sub.wait_object = String::new();
    sub.wait_timeout = 0;
    sub.wait_condition = Vec::new();
    sub.wait_condition_negate = false;
    sub
}

fn merge_rows(replies: Vec<WrappedResult>) -> (Vec<Vec<Json>>, HashMap<String, String>) {
    let mut rows = Vec::new();
    let mut failed = HashMap::new();
    for reply in replies {
        rows.extend(reply.data);
        failed.extend(reply.failed);
    }
    (rows, failed)
}

/// Re-aggregates raw `[value, count]` stats slots across node replies,
/// keyed by the leading group columns.
fn merge_stats(
    req: &Request,
    replies: Vec<WrappedResult>,
) -> (Vec<Vec<Json>>, HashMap<String, String>) {
    let group_width = req.columns.len();
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, (Vec<String>, Vec<Filter>)> = HashMap::new();
    let mut failed = HashMap::new();

    for reply in replies {
        failed.extend(reply.failed);
        for row in reply.data {
            let key_parts: Vec<String> =
                row[..group_width.min(row.len())].iter().map(cell_string).collect();
            let key = key_parts.join(STATS_KEY_SEP);
            if !groups.contains_key(&key) {
                order.push(key.clone());
                groups.insert(
                    key.clone(),
                    (key_parts, create_local_stats_copy(&req.stats)),
                );
            }
            let slots = &mut groups.get_mut(&key).expect("group just ensured").1;
            for (slot, cell) in slots.iter_mut().zip(row[group_width.min(row.len())..].iter()) {
                let (value, count) = stats_pair(cell);
                slot.apply_value(value, count);
            }
        }
    }

    if group_width == 0 && order.is_empty() {
        order.push(String::new());
        groups.insert(
            String::new(),
            (Vec::new(), create_local_stats_copy(&req.stats)),
        );
    }

    let mut rows = Vec::with_capacity(order.len());
    for key in &order {
        let (values, slots) = groups.remove(key).expect("group in order");
        let mut row: Vec<Json> = values.into_iter().map(Json::from).collect();
        for slot in slots {
            row.push(number_to_json(slot.result()));
        }
        rows.push(row);
    }
    (rows, failed)
}

fn cell_string(cell: &Json) -> String {
    match cell {
        Json::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn stats_pair(cell: &Json) -> (f64, i64) {
    match cell.as_array() {
        Some(pair) if pair.len() == 2 => (
            pair[0].as_f64().unwrap_or(0.0),
            pair[1].as_f64().unwrap_or(0.0) as i64,
        ),
        _ => (cell.as_f64().unwrap_or(0.0), 1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lqd_common::EngineOptions;
    use lqd_schema::{Catalog, Column, TableName};
    use lqd_store::{Interner, Peer, TableSignals};
    use crate::node::MemoryNodeClient;
    use serde_json::json;

    fn node_engine(node_idx: usize, latencies: &[f64]) -> Arc<Engine> {
        let catalog = Arc::new(Catalog::new());
        let signals = Arc::new(TableSignals::new());
        let engine = Engine::new(
            Arc::clone(&catalog),
            EngineOptions::default(),
            Arc::clone(&signals),
        );
        let key = format!("mockid{}", node_idx);
        let peer = Arc::new(Peer::new(
            key,
            format!("mock{}", node_idx),
            "mock.sock",
            Arc::clone(&catalog),
            Arc::new(Interner::new()),
            signals,
        ));
        let table = catalog.table(TableName::Hosts);
        let columns: Vec<Arc<Column>> = ["name", "latency", "state"]
            .iter()
            .map(|n| Arc::clone(table.column(n).unwrap()))
            .collect();
        let rows = latencies
            .iter()
            .enumerate()
            .map(|(i, latency)| {
                vec![
                    json!(format!("host_{}_{}", node_idx, i + 1)),
                    json!(latency),
                    json!(0),
                ]
            })
            .collect();
        peer.set_table_data(TableName::Hosts, &columns, rows, 1).unwrap();
        engine.add_peer(peer);
        Arc::new(engine)
    }

    fn cluster(
        latencies_per_node: &[Vec<f64>],
    ) -> (NodeAccessor, Arc<Engine>) {
        let mut nodes = Vec::new();
        let mut client = MemoryNodeClient::new();
        let mut local_engine = None;
        for (i, latencies) in latencies_per_node.iter().enumerate() {
            let engine = node_engine(i, latencies);
            nodes.push(Node {
                id: format!("node{}", i),
                addr: format!("127.0.0.1:{}", 6560 + i),
                backends: vec![format!("mockid{}", i)],
                is_me: i == 0,
            });
            if i == 0 {
                local_engine = Some(Arc::clone(&engine));
            } else {
                client.add_node(format!("node{}", i), engine);
            }
        }
        (
            NodeAccessor::new(nodes, Arc::new(client)),
            local_engine.expect("local node"),
        )
    }

    #[tokio::test]
    async fn test_distributed_sort_limit() {
        // 4 nodes, latencies interleaved so no single node holds the head
        let latencies: Vec<Vec<f64>> = (0..4)
            .map(|n| (0..10).map(|i| ((i * 4 + n) as f64) / 100.0).collect())
            .collect();
        let (accessor, engine) = cluster(&latencies);
        assert!(accessor.is_clustered());

        let req = Request::parse(
            "GET hosts\nColumns: name latency\nSort: latency asc\nLimit: 5\n\n",
            engine.catalog(),
        )
        .unwrap();
        let response = accessor.process(&req, &engine).await.unwrap();
        assert_eq!(response.result.len(), 5);
        let values: Vec<f64> = response
            .result
            .iter()
            .map(|row| row[1].as_f64().unwrap())
            .collect();
        assert_eq!(values, vec![0.0, 0.01, 0.02, 0.03, 0.04]);
        // rows carry exactly the requested columns
        assert_eq!(response.result[0].len(), 2);
        assert_eq!(response.total, 40);
    }

    #[tokio::test]
    async fn test_distributed_stats_rollup() {
        let latencies: Vec<Vec<f64>> = (0..2).map(|_| vec![0.25, 0.75]).collect();
        let (accessor, engine) = cluster(&latencies);

        let req = Request::parse(
            "GET hosts\nStats: sum latency\nStats: avg latency\nStats: min latency\nStats: max latency\n\n",
            engine.catalog(),
        )
        .unwrap();
        let response = accessor.process(&req, &engine).await.unwrap();
        assert_eq!(response.result.len(), 1);
        assert_eq!(response.result[0][0], json!(2));
        assert_eq!(response.result[0][1], json!(0.5));
        assert_eq!(response.result[0][2], json!(0.25));
        assert_eq!(response.result[0][3], json!(0.75));
    }

    #[tokio::test]
    async fn test_distributed_stats_empty_keeps_min_initial() {
        let latencies: Vec<Vec<f64>> = (0..2).map(|_| vec![0.25]).collect();
        let (accessor, engine) = cluster(&latencies);

        let req = Request::parse(
            "GET hosts\nFilter: state = 15\nStats: sum latency\nStats: min latency\n\n",
            engine.catalog(),
        )
        .unwrap();
        let response = accessor.process(&req, &engine).await.unwrap();
        assert_eq!(response.result, vec![vec![json!(0), json!(-1)]]);
    }

    #[tokio::test]
    async fn test_backends_subset_skips_other_nodes() {
        let latencies: Vec<Vec<f64>> = (0..3).map(|_| vec![0.1]).collect();
        let (accessor, engine) = cluster(&latencies);

        let req = Request::parse(
            "GET hosts\nColumns: name\nBackends: mockid2\n\n",
            engine.catalog(),
        )
        .unwrap();
        assert!(!accessor.handles_locally(&req));
        let response = accessor.process(&req, &engine).await.unwrap();
        assert_eq!(response.result, vec![vec![json!("host_2_1")]]);
    }

    #[test]
    fn test_handles_locally() {
        let nodes = vec![
            Node {
                id: "node0".into(),
                addr: String::new(),
                backends: vec!["a".into()],
                is_me: true,
            },
            Node {
                id: "node1".into(),
                addr: String::new(),
                backends: vec!["b".into()],
                is_me: false,
            },
        ];
        let accessor = NodeAccessor::new(nodes, Arc::new(MemoryNodeClient::new()));
        let catalog = Catalog::new();

        let ours = Request::parse("GET hosts\nBackends: a\n\n", &catalog).unwrap();
        assert!(accessor.handles_locally(&ours));
        let theirs = Request::parse("GET hosts\nBackends: b\n\n", &catalog).unwrap();
        assert!(!accessor.handles_locally(&theirs));
        let all = Request::parse("GET hosts\n\n", &catalog).unwrap();
        assert!(!accessor.handles_locally(&all));
        let relayed = Request::parse("GET hosts\nDistributed: on\n\n", &catalog).unwrap();
        assert!(accessor.handles_locally(&relayed));
    }
}
