//! A small threaded HTTP/1.1 server for static files.
//!
//! One thread accepts connections, each connection is served on its own
//! thread, and GET/HEAD requests are answered from a directory on disk.
//! There is no limit on the number of worker threads, and stopping the
//! server does not wait for workers that are still running.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{error, info};

pub mod config;
pub mod error;
pub mod server;

pub use config::ServerConfig;
pub use error::{HandlerError, ProtocolError, ServerError};
use server::file_system::FileSystemAdapter;
use server::registry::HandlerRegistry;
use server::static_files::StaticFiles;
use server::{Endpoint, ServerContext};

pub struct ServerHandle {
    pub ip: String,
    pub port: u16,
    pub handle: JoinHandle<Result<(), ServerError>>,
    stop: Arc<AtomicBool>,
}

impl ServerHandle {
    /// Stops accepting connections and waits for the accept loop to return.
    pub fn shutdown(self) -> Result<(), ServerError> {
        self.stop.store(true, Ordering::SeqCst);
        match self.handle.join() {
            Ok(result) => result,
            Err(_) => {
                error!("server thread panicked");
                Ok(())
            }
        }
    }
}

/// Binds and serves on a background thread.
pub fn start_server(config: &ServerConfig) -> Result<ServerHandle, ServerError> {
    let (endpoint, context) = prepare(config)?;
    let addr = endpoint.local_addr();
    let stop = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stop);

    let handle = thread::Builder::new()
        .name("http-accept".to_string())
        .spawn(move || endpoint.serve(context, &flag))
        .map_err(ServerError::Spawn)?;

    Ok(ServerHandle { ip: addr.ip().to_string(), port: addr.port(), handle, stop })
}

/// Binds and serves on the calling thread.
pub fn run(config: &ServerConfig) -> Result<(), ServerError> {
    let (endpoint, context) = prepare(config)?;
    let never = AtomicBool::new(false);
    endpoint.serve(context, &never)
}

fn prepare(config: &ServerConfig) -> Result<(Endpoint, Arc<ServerContext>), ServerError> {
    if !config.root.exists() {
        return Err(ServerError::RootMissing(config.root.clone()));
    }
    info!(address = %config.bind_address(), root = %config.root.display(), "binding");

    let endpoint = server::bind(&config.address, config.port, config.backlog, config.poll_interval)?;
    let files = StaticFiles::new(&config.root, FileSystemAdapter);
    let context = ServerContext::new(HandlerRegistry::with_static_files(files), config.read_timeout);
    Ok((endpoint, Arc::new(context)))
}
