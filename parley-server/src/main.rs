//! parley server - chat relay daemon
//!
//! Accepts TCP connections, authenticates each client with a unique
//! display name, and relays private and group messages between them.
//! All shared state lives in a single [`registry::Registry`] handed to
//! every connection task.

use std::sync::Arc;

use tracing::info;

use parley_utils::Result;

mod config;
mod connection;
mod fanout;
mod registry;
mod session;
mod tcp;

use config::ServerConfig;
use registry::Registry;

#[tokio::main]
async fn main() -> Result<()> {
    parley_utils::init_logging()?;

    let config = ServerConfig::load();
    let registry = Arc::new(Registry::new());

    let listener = tcp::bind(&config.listen_addr).await?;
    info!("listening on {}", listener.local_addr()?);

    tcp::run(listener, registry).await;
    Ok(())
}
