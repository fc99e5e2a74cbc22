use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use polling::{Event, Poller};
use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, error, info, warn};
use crate::error::ServerError;
use self::handlers::handle_client;
use self::registry::HandlerRegistry;
use self::status::StatusRegistry;

/// Version written in every status line.
pub const PROTOCOL_VERSION: &str = "HTTP/1.1";

const LISTENER_KEY: usize = 0;

/// Read-only state shared by every connection worker.
pub struct ServerContext {
    pub statuses: StatusRegistry,
    pub handlers: HandlerRegistry,
    pub protocol_version: &'static str,
    pub server_version: String,
    pub read_timeout: Option<Duration>,
}

impl ServerContext {
    pub fn new(handlers: HandlerRegistry, read_timeout: Option<Duration>) -> ServerContext {
        ServerContext {
            statuses: StatusRegistry::rfc2616(),
            handlers,
            protocol_version: PROTOCOL_VERSION,
            server_version: format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
            read_timeout,
        }
    }
}

/// A bound, listening socket plus the poller that watches it.
pub struct Endpoint {
    listener: TcpListener,
    poller: Poller,
    poll_interval: Duration,
    local_addr: SocketAddr,
}

/// Binds `address:port` with the given backlog.
pub fn bind(address: &str, port: u16, backlog: i32, poll_interval: Duration) -> Result<Endpoint, ServerError> {
    let display = format!("{}:{}", address, port);
    let bind_error = |source: io::Error| ServerError::Bind { addr: display.clone(), source };

    let addr = (address, port).to_socket_addrs()
        .map_err(bind_error)?
        .next()
        .ok_or_else(|| bind_error(io::Error::new(io::ErrorKind::AddrNotAvailable, "address resolved to nothing")))?;

    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP)).map_err(bind_error)?;
    socket.bind(&addr.into()).map_err(bind_error)?;
    socket.listen(backlog).map_err(bind_error)?;

    let listener: TcpListener = socket.into();
    listener.set_nonblocking(true).map_err(bind_error)?;
    let local_addr = listener.local_addr().map_err(bind_error)?;

    let poller = Poller::new().map_err(ServerError::Poll)?;
    poller.add(&listener, Event::readable(LISTENER_KEY)).map_err(ServerError::Poll)?;

    Ok(Endpoint { listener, poller, poll_interval, local_addr })
}

impl Endpoint {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts connections until `stop` is set, handing each one to its own
    /// thread. Workers still running when this returns are not waited for.
    pub fn serve(self, context: Arc<ServerContext>, stop: &AtomicBool) -> Result<(), ServerError> {
        info!(address = %self.local_addr, poll_interval = ?self.poll_interval, "accepting connections");
        let mut events = Vec::new();

        while !stop.load(Ordering::SeqCst) {
            events.clear();
            match self.poller.wait(&mut events, Some(self.poll_interval)) {
                Ok(_) => {}
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(ServerError::Poll(e)),
            }
            if events.iter().any(|event| event.key == LISTENER_KEY) {
                self.accept_one(&context);
                self.poller.modify(&self.listener, Event::readable(LISTENER_KEY)).map_err(ServerError::Poll)?;
            }
        }

        info!(address = %self.local_addr, "stopped accepting connections");
        self.poller.delete(&self.listener).map_err(ServerError::Poll)
    }

    fn accept_one(&self, context: &Arc<ServerContext>) {
        match self.listener.accept() {
            Ok((stream, peer)) => spawn_worker(stream, peer, Arc::clone(context)),
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(e) => warn!("Error accepting connection: {}", e),
        }
    }
}

/// One thread per connection, with no upper bound on their number.
fn spawn_worker(stream: TcpStream, peer: SocketAddr, context: Arc<ServerContext>) {
    let prepared = stream.set_nonblocking(false)
        .and_then(|_| stream.set_read_timeout(context.read_timeout));
    if let Err(e) = prepared {
        warn!(peer = %peer, "Error preparing connection: {}", e);
        return;
    }

    let spawned = thread::Builder::new()
        .name(format!("conn-{}", peer))
        .spawn(move || {
            let served = panic::catch_unwind(AssertUnwindSafe(|| handle_client(stream, peer, &context)));
            if served.is_err() {
                error!(peer = %peer, "worker panicked, connection dropped");
            }
        });
    match spawned {
        Ok(_) => debug!(peer = %peer, "worker started"),
        Err(e) => error!(peer = %peer, "Error starting worker: {}", e),
    }
}

pub mod content_manager;
pub mod file_system;
pub mod handlers;
pub mod http;
pub mod registry;
pub mod response;
pub mod static_files;
pub mod status;
pub mod stream;
