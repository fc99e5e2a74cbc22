use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failures that stop the server itself. Everything that happens inside a
/// connection worker stays inside that worker.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Root path does not exist: {}", .0.display())]
    RootMissing(PathBuf),

    #[error("Error on bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("Error waiting for connections: {0}")]
    Poll(#[source] io::Error),

    #[error("Error starting server thread: {0}")]
    Spawn(#[source] io::Error),
}

/// Failures of a single request cycle. Protocol-level variants map to a status
/// code; transport-level ones never produce a response.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Bad request syntax ({0:?})")]
    MalformedRequestLine(String),

    #[error("Request line too long")]
    RequestLineTooLong,

    #[error("Invalid HTTP version ({0})")]
    UnsupportedVersion(String),

    #[error("Bad header block: {0}")]
    MalformedHeaders(String),

    #[error("Peer closed the connection")]
    PeerClosed,

    #[error("Timed out waiting for the peer")]
    Timeout,

    #[error("I/O error: {0}")]
    Io(#[source] io::Error),
}

impl ProtocolError {
    /// Status to answer with, or `None` when the peer cannot be answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            ProtocolError::MalformedRequestLine(_) => Some(400),
            ProtocolError::RequestLineTooLong => Some(414),
            ProtocolError::UnsupportedVersion(_) => Some(505),
            ProtocolError::MalformedHeaders(_) => Some(400),
            ProtocolError::PeerClosed | ProtocolError::Timeout | ProtocolError::Io(_) => None,
        }
    }
}

impl From<io::Error> for ProtocolError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => ProtocolError::Timeout,
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe => ProtocolError::PeerClosed,
            _ => ProtocolError::Io(e),
        }
    }
}

/// Outcome of a handler that could not finish its response.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("I/O error while responding: {0}")]
    Io(#[from] io::Error),

    #[error("Unknown status code {0}")]
    UnknownStatus(u16),

    #[error("Response API misuse: {0}")]
    InvalidState(&'static str),
}
