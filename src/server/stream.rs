use std::io::{self, BufRead, Read, Write};
use std::net::{Shutdown, TcpStream};
use bufstream::BufStream;
use tracing::debug;

/// Longest line accepted from a peer, CRLF included.
pub const MAX_LINE: usize = 65536;

/// The raw connection underneath a `ByteStream`.
pub trait Transport: Read + Write {
    /// Releases both directions of the connection.
    fn close(&mut self) -> io::Result<()>;
}

impl Transport for TcpStream {
    fn close(&mut self) -> io::Result<()> {
        match self.shutdown(Shutdown::Both) {
            Err(ref e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }
}

/// Result of a single bounded line read.
#[derive(Debug, PartialEq, Eq)]
pub enum Line {
    /// Bytes up to and including the trailing `\n`, or everything that was
    /// left before the peer closed.
    Data(Vec<u8>),
    /// Orderly close with nothing read.
    Eof,
    /// `MAX_LINE` bytes arrived without a line terminator.
    TooLong,
}

/// Buffered line reads and immediate writes over one connection.
pub struct ByteStream<S: Transport> {
    inner: BufStream<S>,
}

impl<S: Transport> ByteStream<S> {
    pub fn new(stream: S) -> ByteStream<S> {
        ByteStream { inner: BufStream::new(stream) }
    }

    pub fn read_line(&mut self) -> io::Result<Line> {
        let mut line = Vec::new();
        let n = loop {
            match Read::take(&mut self.inner, MAX_LINE as u64).read_until(b'\n', &mut line) {
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                other => break other?,
            }
        };
        if n == 0 {
            Ok(Line::Eof)
        } else if n == MAX_LINE && line.last() != Some(&b'\n') {
            Ok(Line::TooLong)
        } else {
            Ok(Line::Data(line))
        }
    }

    /// Writes every byte and pushes it to the peer before returning.
    pub fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.inner.write_all(bytes)?;
        self.inner.flush()
    }

    /// Flushes pending output and releases both directions. The first failure
    /// is returned; a later one is only logged.
    pub fn close_both(mut self) -> io::Result<()> {
        let flushed = self.inner.flush();
        let closed = self.inner.get_mut().close();
        match (flushed, closed) {
            (Err(first), Err(second)) => {
                debug!("secondary error while closing connection: {}", second);
                Err(first)
            }
            (Err(e), Ok(())) | (Ok(()), Err(e)) => Err(e),
            (Ok(()), Ok(())) => Ok(()),
        }
    }
}

impl<S: Transport> Write for ByteStream<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.inner.flush()?;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
