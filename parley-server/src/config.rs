//! Server configuration

/// Default listen endpoint
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:12345";

/// Relay server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// TCP endpoint the relay listens on
    pub listen_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
        }
    }
}

impl ServerConfig {
    /// Resolve configuration: CLI argument, then `PARLEY_ADDR`, then default
    pub fn load() -> Self {
        Self::from_sources(std::env::args().nth(1), std::env::var("PARLEY_ADDR").ok())
    }

    fn from_sources(cli_addr: Option<String>, env_addr: Option<String>) -> Self {
        let listen_addr = cli_addr
            .or(env_addr)
            .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string());
        Self { listen_addr }
    }
}
