//! TCP listener and accept loop

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{debug, error, info};

use parley_utils::Result;

use crate::connection;
use crate::registry::Registry;

/// Bind the relay's listening socket
///
/// A bind failure is the one process-fatal error path; everything after
/// this is contained to individual connections.
pub async fn bind(addr: &str) -> Result<TcpListener> {
    let listener = TcpListener::bind(addr).await?;
    Ok(listener)
}

/// Run the accept loop
///
/// Spawns one connection task per client and never blocks on them.
/// Accept errors are logged and the loop keeps serving.
pub async fn run(listener: TcpListener, registry: Arc<Registry>) {
    info!("accepting connections");

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                debug!("new connection from {}", addr);
                let registry = Arc::clone(&registry);
                tokio::spawn(async move {
                    connection::handle_connection(stream, addr, registry).await;
                });
            }
            Err(e) => error!("accept error: {}", e),
        }
    }
}
