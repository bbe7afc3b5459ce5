//! Per-connection request handling.
//!
//! Each client connection reads header blocks terminated by a blank line,
//! answers them, and loops while `KeepAlive: on` is set. `COMMAND`
//! requests keep the connection open so batched commands can share it.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::debug;

use lqd_cluster::NodeAccessor;
use lqd_common::{LqdError, LqdResult};
use lqd_query::{encode_error, encode_response, Engine, Request, Response};

/// Everything a session needs to answer queries.
pub struct ProxyContext {
    /// The local query engine.
    pub engine: Arc<Engine>,
    /// The cluster accessor, when running clustered.
    pub cluster: Option<Arc<NodeAccessor>>,
}

/// Serves one client connection until it closes or keep-alive runs out.
pub async fn serve_connection(stream: TcpStream, ctx: Arc<ProxyContext>) -> LqdResult<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    loop {
        let Some(block) = read_request_block(&mut reader).await? else {
            break;
        };
        if !handle_request(&block, &ctx, &mut write_half).await? {
            break;
        }
    }
    Ok(())
}

/// Reads one request block: lines up to a blank line. Returns `None` when
/// the connection closed without further data.
async fn read_request_block(
    reader: &mut BufReader<OwnedReadHalf>,
) -> LqdResult<Option<String>> {
    let mut block = String::new();
    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line).await?;
        if n == 0 {
            return Ok(if block.is_empty() { None } else { Some(block) });
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            if block.is_empty() {
                // idle keep-alive connection closing without a request
                return Ok(None);
            }
            block.push('\n');
            return Ok(Some(block));
        }
        block.push_str(trimmed);
        block.push('\n');
    }
}

/// Parses and answers one request block; returns whether the connection
/// should stay open.
async fn handle_request(
    block: &str,
    ctx: &Arc<ProxyContext>,
    writer: &mut OwnedWriteHalf,
) -> LqdResult<bool> {
    let req = match Request::parse(block, ctx.engine.catalog()) {
        Ok(req) => req,
        Err(err) => {
            debug!("request rejected: {}", err);
            writer
                .write_all(&encode_error(wants_fixed16(block), &err))
                .await?;
            return Ok(false);
        }
    };

    if req.is_command() {
        return dispatch_command(&req, ctx, writer).await;
    }

    match run_query(&req, ctx).await {
        Ok(response) => {
            writer.write_all(&encode_response(&req, &response)).await?;
        }
        Err(err) => {
            writer
                .write_all(&encode_error(req.response_fixed16, &err))
                .await?;
            return Ok(false);
        }
    }
    Ok(req.keep_alive)
}

/// Runs a read query, fanning out across the cluster when the request
/// touches backends this node does not own.
async fn run_query(req: &Request, ctx: &Arc<ProxyContext>) -> LqdResult<Response> {
    if let Some(cluster) = &ctx.cluster {
        if !cluster.handles_locally(req) {
            return cluster.process(req, &ctx.engine).await;
        }
    }
    let engine = Arc::clone(&ctx.engine);
    let req = req.clone();
    tokio::task::spawn_blocking(move || engine.execute(&req))
        .await
        .map_err(|err| LqdError::BackendError {
            peer: "local".to_string(),
            message: err.to_string(),
        })?
}

/// Forwards a `COMMAND` verbatim to the owning peers. Success produces no
/// body; a rejection surfaces with the peer's error code.
async fn dispatch_command(
    req: &Request,
    ctx: &Arc<ProxyContext>,
    writer: &mut (impl AsyncWrite + Unpin),
) -> LqdResult<bool> {
    let peers = match ctx.engine.selected_peers(req) {
        Ok(peers) => peers,
        Err(err) => {
            writer
                .write_all(&encode_error(req.response_fixed16, &err))
                .await?;
            return Ok(false);
        }
    };
    for peer in peers {
        let peer = Arc::clone(&peer);
        let command = req.command.clone();
        let result =
            tokio::task::spawn_blocking(move || peer.upstream().send_command(&command))
                .await
                .map_err(|err| LqdError::BackendError {
                    peer: "local".to_string(),
                    message: err.to_string(),
                })?;
        if let Err(err) = result {
            writer
                .write_all(&encode_error(req.response_fixed16, &err))
                .await?;
            return Ok(false);
        }
    }
    // commands may be batched on one connection
    Ok(true)
}

/// A parse error arrives before we know the requested response framing;
/// honor a fixed16 header if the raw block asked for one.
fn wants_fixed16(block: &str) -> bool {
    block
        .lines()
        .any(|line| line.trim().to_lowercase() == "responseheader: fixed16")
}

#[cfg(test)]
mod tests {
    use super::*;
    use lqd_common::EngineOptions;
    use lqd_schema::{Catalog, TableName};
    use lqd_store::{Interner, Peer, TableSignals, Upstream};
    use serde_json::{json, Value as Json};
    use std::sync::Arc;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[derive(Debug, Default)]
    struct MockUpstream;

    impl Upstream for MockUpstream {
        fn send_command(&self, command: &str) -> LqdResult<()> {
            if command.contains("test_broken") {
                return Err(LqdError::PeerCommand {
                    code: 400,
                    message: "command broken".to_string(),
                });
            }
            Ok(())
        }

        fn query(&self, _request: &str) -> LqdResult<Vec<Vec<Json>>> {
            Ok(vec![
                vec![json!(1558468664), json!("HOST ALERT"), json!("x")],
                vec![json!(1558468665), json!("SERVICE ALERT"), json!("y")],
            ])
        }
    }

    fn test_context() -> Arc<ProxyContext> {
        let catalog = Arc::new(Catalog::new());
        let signals = Arc::new(TableSignals::new());
        let engine = Engine::new(
            Arc::clone(&catalog),
            EngineOptions::default(),
            Arc::clone(&signals),
        );
        let peer = Peer::new(
            "mockid0",
            "mock",
            "mock.sock",
            Arc::clone(&catalog),
            Arc::new(Interner::new()),
            signals,
        )
        .with_upstream(Box::new(MockUpstream));
        let table = catalog.table(TableName::Hosts);
        let columns = ["name", "state"]
            .iter()
            .map(|n| Arc::clone(table.column(n).unwrap()))
            .collect::<Vec<_>>();
        peer.set_table_data(
            TableName::Hosts,
            &columns,
            vec![
                vec![json!("testhost_1"), json!(0)],
                vec![json!("testhost_2"), json!(1)],
            ],
            1,
        )
        .unwrap();
        engine.add_peer(Arc::new(peer));
        Arc::new(ProxyContext {
            engine: Arc::new(engine),
            cluster: None,
        })
    }

    async fn roundtrip(queries: &str) -> String {
        let ctx = test_context();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            serve_connection(stream, ctx).await.unwrap();
        });

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(queries.as_bytes()).await.unwrap();
        client.shutdown().await.unwrap();
        let mut reply = String::new();
        client.read_to_string(&mut reply).await.unwrap();
        server.await.unwrap();
        reply
    }

    #[tokio::test]
    async fn test_query_round_trip() {
        let reply = roundtrip("GET hosts\nColumns: name state\n\n").await;
        let parsed: Json = serde_json::from_str(&reply).unwrap();
        assert_eq!(parsed, json!([["testhost_1", 0], ["testhost_2", 1]]));
    }

    #[tokio::test]
    async fn test_fixed16_error_reply() {
        let reply = roundtrip("GET none\nResponseHeader: fixed16\n\n").await;
        assert!(reply.starts_with("404 "));
        assert!(reply.contains("table none does not exist"));
    }

    #[tokio::test]
    async fn test_keep_alive_serves_second_request() {
        let reply = roundtrip(
            "GET hosts\nColumns: name\nKeepAlive: on\nLimit: 1\n\nGET hosts\nColumns: name\nLimit: 1\n\n",
        )
        .await;
        assert_eq!(reply.matches("testhost_1").count(), 2);
    }

    #[tokio::test]
    async fn test_command_success_has_no_body() {
        let reply = roundtrip("COMMAND [0] test_ok\n\n").await;
        assert!(reply.is_empty());
    }

    #[tokio::test]
    async fn test_command_failure_reports_code() {
        let reply = roundtrip("COMMAND [0] test_broken\n\n").await;
        assert_eq!(reply, "command broken\n");

        let reply = roundtrip("COMMAND [123.456] test_broken\n\n").await;
        assert_eq!(reply, "bad request: COMMAND [123.456] test_broken\n");
    }

    #[tokio::test]
    async fn test_passthrough_with_virtual_columns() {
        let reply = roundtrip("GET log\nColumns: time peer_key type message\nLimit: 3\n\n").await;
        let parsed: Json = serde_json::from_str(&reply).unwrap();
        assert_eq!(parsed[0], json!([1558468664, "mockid0", "HOST ALERT", "x"]));
    }
}
