//! Wire-level tests: full requests over a real socket.

use std::sync::Arc;

use serde_json::Value as Json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use lqd_server::{serve_connection, ProxyContext};
use lqd_test::TestScenario;

async fn query_wire(scenario: TestScenario, request: &str) -> String {
    let ctx = Arc::new(ProxyContext {
        engine: scenario.engine,
        cluster: None,
    });
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        serve_connection(stream, ctx).await.unwrap();
    });

    let mut client = TcpStream::connect(addr).await.unwrap();
    client.write_all(request.as_bytes()).await.unwrap();
    client.shutdown().await.unwrap();
    let mut reply = String::new();
    client.read_to_string(&mut reply).await.unwrap();
    server.await.unwrap();
    reply
}

#[tokio::test]
async fn test_fixed16_wrapped_json_reply() {
    let scenario = TestScenario::start(1, 10, 10);
    let reply = query_wire(
        scenario,
        "GET hosts\nColumns: name state alias\nOutputFormat: wrapped_json\nColumnHeaders: on\nLimit: 5\nResponseHeader: fixed16\n\n",
    )
    .await;

    let (header, body) = reply.split_at(16);
    assert!(header.starts_with("200 "));
    let length: usize = header[4..15].trim().parse().unwrap();
    assert_eq!(length, body.len());

    let parsed: Json = serde_json::from_str(body).unwrap();
    assert_eq!(parsed["total"], Json::from(10));
    assert_eq!(parsed["columns"][0], Json::from("name"));
    assert_eq!(parsed["data"].as_array().unwrap().len(), 5);
    assert_eq!(parsed["data"][0][0], Json::from("testhost_1"));
}

#[tokio::test]
async fn test_bad_request_over_wire() {
    let scenario = TestScenario::start(1, 1, 1);
    let reply = query_wire(scenario, "GET hosts\nNone: blah\n\n").await;
    assert_eq!(reply, "bad request: unrecognized header in: None: blah\n");
}

#[tokio::test]
async fn test_keep_alive_round_trips() {
    let scenario = TestScenario::start(1, 2, 2);
    let reply = query_wire(
        scenario,
        "GET hosts\nColumns: name\nKeepAlive: on\nLimit: 1\n\nGET hosts\nColumns: name\nOffset: 1\nLimit: 1\n\n",
    )
    .await;
    assert!(reply.contains("testhost_1"));
    assert!(reply.contains("testhost_2"));
}
