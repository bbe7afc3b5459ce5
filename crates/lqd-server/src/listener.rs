//! The client-facing TCP listener.

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{debug, error, warn};

use lqd_common::LqdResult;

use crate::session::{serve_connection, ProxyContext};

/// Accepts client connections forever, serving each on its own task.
pub async fn run_listener(listener: TcpListener, ctx: Arc<ProxyContext>) -> LqdResult<()> {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                debug!("accepted connection from {}", addr);
                let ctx = Arc::clone(&ctx);
                tokio::spawn(async move {
                    if let Err(err) = serve_connection(stream, ctx).await {
                        warn!("connection from {} failed: {}", addr, err);
                    }
                });
            }
            Err(err) => {
                error!("accept error: {}", err);
            }
        }
    }
}
