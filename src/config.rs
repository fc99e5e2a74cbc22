use std::path::PathBuf;
use std::time::Duration;

/// Startup settings for the server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub address: String,
    pub port: u16,
    /// Pending connections the OS may queue before `accept`.
    pub backlog: i32,
    /// Longest wait for a new connection before the accept loop checks
    /// whether it should stop.
    pub poll_interval: Duration,
    /// Per-read limit on connection sockets. `None` waits forever.
    pub read_timeout: Option<Duration>,
    pub root: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            address: "0.0.0.0".to_string(),
            port: 8080,
            backlog: 5,
            poll_interval: Duration::from_millis(500),
            read_timeout: None,
            root: PathBuf::from("."),
        }
    }
}

impl ServerConfig {
    pub fn new<P: Into<PathBuf>>(root: P) -> ServerConfig {
        ServerConfig { root: root.into(), ..ServerConfig::default() }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}
