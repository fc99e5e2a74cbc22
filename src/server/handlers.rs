use std::net::SocketAddr;
use tracing::{debug, error, warn};
use crate::error::{HandlerError, ProtocolError};
use super::http::{parse_headers, parse_request_line, read_request_line, Request, RequestLine, Version};
use super::response::Response;
use super::stream::{ByteStream, Transport};
use super::ServerContext;

/// How a request cycle ended, and therefore what the worker does next.
#[derive(Debug)]
pub enum Outcome {
    /// A response was sent and another request may follow.
    KeepAlive,
    /// A response was sent, or the peer finished cleanly; close now.
    Close,
    /// The peer went away or timed out. Nothing was sent.
    Dropped(ProtocolError),
    /// A handler failed while producing its response.
    Failed(HandlerError),
}

/// Serves every request on one connection, then releases it.
pub fn handle_client<S: Transport>(stream: S, peer: SocketAddr, context: &ServerContext) {
    debug!(peer = %peer, "connection opened");
    let mut buffed = ByteStream::new(stream);

    loop {
        match handle_one_request(&mut buffed, peer, context) {
            Outcome::KeepAlive => continue,
            Outcome::Close => break,
            Outcome::Dropped(ProtocolError::PeerClosed) => {
                debug!(peer = %peer, "peer closed the connection mid-request");
                break;
            }
            Outcome::Dropped(e) => {
                warn!(peer = %peer, "{}", e);
                break;
            }
            Outcome::Failed(e) => {
                error!(peer = %peer, "Error processing request: {}", e);
                break;
            }
        }
    }

    if let Err(e) = buffed.close_both() {
        debug!(peer = %peer, "Error closing connection: {}", e);
    }
    debug!(peer = %peer, "connection closed");
}

/// One request cycle: request line, version, headers, dispatch, response.
pub fn handle_one_request<S: Transport>(buffed: &mut ByteStream<S>, peer: SocketAddr, context: &ServerContext) -> Outcome {
    let request_line = match read_request_line(buffed) {
        Ok(RequestLine::Line(line)) => line,
        Ok(RequestLine::End) => {
            debug!(peer = %peer, "no further requests");
            return Outcome::Close;
        }
        Err(e) => return reject(buffed, peer, context, "-", e),
    };

    let (method, path, version) = match parse_request_line(&request_line) {
        Ok(parts) => parts,
        Err(e) => return reject(buffed, peer, context, &request_line, e),
    };
    let version = match Version::parse(&version) {
        Ok(version) => version,
        Err(e) => return reject(buffed, peer, context, &request_line, e),
    };
    let headers = match parse_headers(buffed) {
        Ok(headers) => headers,
        Err(e) => return reject(buffed, peer, context, &request_line, e),
    };

    let close = headers.connection_close().unwrap_or_else(|| version.closes_by_default());
    let request = Request { method, path, version, headers, request_line };
    dispatch(buffed, peer, context, &request, close)
}

fn dispatch<S: Transport>(buffed: &mut ByteStream<S>,
                          peer: SocketAddr,
                          context: &ServerContext,
                          request: &Request,
                          close: bool) -> Outcome {
    let head_only = request.method == "HEAD";
    let mut response = Response::new(buffed, context, peer, &request.request_line, head_only, close);
    if request.version == Version::Http10 && !close {
        response.announce_keep_alive();
    }

    let result = match context.handlers.get(&request.method) {
        Some(handler) => handler.handle(request, &mut response),
        None => {
            let explain = format!("Unsupported method ('{}')", request.method);
            response.send_error(501, Some(&explain))
        }
    };
    if let Err(e) = result {
        return Outcome::Failed(e);
    }
    if !response.headers_ended() {
        return Outcome::Failed(HandlerError::InvalidState("handler did not finish its response"));
    }

    if response.close_requested() {
        Outcome::Close
    } else {
        Outcome::KeepAlive
    }
}

/// Answers a request that could not be parsed, when the peer can still be
/// answered. The connection is closed either way.
fn reject<S: Transport>(buffed: &mut ByteStream<S>,
                        peer: SocketAddr,
                        context: &ServerContext,
                        request_line: &str,
                        e: ProtocolError) -> Outcome {
    let code = match e.status() {
        Some(code) => code,
        None => return Outcome::Dropped(e),
    };
    let explain = e.to_string();
    let mut response = Response::new(buffed, context, peer, request_line, false, true);
    match response.send_error(code, Some(&explain)) {
        Ok(()) => Outcome::Close,
        Err(HandlerError::Io(io)) => Outcome::Dropped(io.into()),
        Err(other) => Outcome::Failed(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use crate::server::registry::{HandlerRegistry, MethodHandler};
    use crate::server::static_files::tests::MemoryFs;
    use crate::server::static_files::StaticFiles;
    use crate::server::status::parse_status_line;
    use crate::server::stream::tests::MockStream;
    use std::path::Path;

    fn context() -> ServerContext {
        let fs = MemoryFs::default()
            .dir("/srv")
            .file("/srv/a.txt", "alpha")
            .dir("/srv/b");
        ServerContext::new(HandlerRegistry::with_static_files(StaticFiles::new(Path::new("/srv"), fs)), None)
    }

    fn peer() -> SocketAddr {
        "10.0.0.1:1234".parse().unwrap()
    }

    /// Runs a whole connection and returns (output, closed).
    fn converse(context: &ServerContext, input: &str) -> (String, bool) {
        let mock = MockStream::new(input.as_bytes());
        let output = mock.output.clone();
        let closed = mock.closed.clone();
        handle_client(mock, peer(), context);
        let text = String::from_utf8_lossy(&output.lock().unwrap()).to_string();
        let closed = *closed.lock().unwrap();
        (text, closed)
    }

    fn status_lines(output: &str) -> Vec<(u16, String)> {
        output.match_indices("HTTP/1.1 ")
            .filter_map(|(index, _)| output[index..].split("\r\n").next())
            .filter_map(parse_status_line)
            .map(|(_, code, reason)| (code, reason.to_string()))
            .collect()
    }

    #[test]
    fn missing_file_with_connection_close() {
        let (output, closed) = converse(&context(), "GET /missing.txt HTTP/1.1\r\nConnection: close\r\n\r\nGET /a.txt HTTP/1.1\r\n\r\n");
        assert!(output.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert_eq!(1, status_lines(&output).len());
        assert!(closed);
    }

    #[test]
    fn default_persistence_follows_the_version() {
        let pipeline = "GET /a.txt HTTP/1.1\r\n\r\nGET /a.txt HTTP/1.1\r\n\r\n";
        assert_eq!(2, status_lines(&converse(&context(), pipeline).0).len());

        let pipeline = "GET /a.txt HTTP/1.0\r\n\r\nGET /a.txt HTTP/1.0\r\n\r\n";
        assert_eq!(1, status_lines(&converse(&context(), pipeline).0).len());

        let pipeline = "GET /a.txt HTTP/1.0\r\nConnection: keep-alive\r\n\r\nGET /a.txt HTTP/1.0\r\n\r\n";
        assert_eq!(2, status_lines(&converse(&context(), pipeline).0).len());
    }

    #[test]
    fn http_1_0_keep_alive_is_echoed() {
        let (output, _) = converse(&context(), "GET /a.txt HTTP/1.0\r\nConnection: keep-alive\r\n\r\nGET /a.txt HTTP/1.0\r\n\r\n");
        assert_eq!(2, status_lines(&output).len());
        assert_eq!(1, output.matches("Connection: keep-alive\r\n").count());

        let (output, _) = converse(&context(), "GET /a.txt HTTP/1.1\r\n\r\n");
        assert!(!output.contains("Connection:"));
    }

    #[test]
    fn unknown_method_is_501_and_keeps_the_connection() {
        let (output, _) = converse(&context(), "BADMETHOD /x HTTP/1.1\r\n\r\nGET /a.txt HTTP/1.1\r\nConnection: close\r\n\r\n");
        assert!(output.starts_with("HTTP/1.1 501 Not Implemented\r\n"));
        assert_eq!(vec![(501, "Not Implemented".to_string()), (200, "OK".to_string())], status_lines(&output));
        assert!(output.ends_with("alpha"));
    }

    #[test]
    fn single_token_request_line_is_400() {
        let (output, closed) = converse(&context(), "GET\r\n\r\nGET /a.txt HTTP/1.1\r\n\r\n");
        assert!(output.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(output.contains("Connection: close\r\n"));
        assert_eq!(1, status_lines(&output).len());
        assert!(closed);
    }

    #[test]
    fn unsupported_version_is_505() {
        let (output, _) = converse(&context(), "GET / HTTP/2.0\r\n\r\n");
        assert!(output.starts_with("HTTP/1.1 505 HTTP Version Not Supported\r\n"));
        assert_eq!(1, status_lines(&output).len());
    }

    #[test]
    fn malformed_header_is_400() {
        let (output, _) = converse(&context(), "GET /a.txt HTTP/1.1\r\nno colon here\r\n\r\n");
        assert!(output.starts_with("HTTP/1.1 400 Bad Request\r\n"));
    }

    #[test]
    fn overlong_request_line_is_414() {
        let input = format!("GET /{} HTTP/1.1\r\n\r\n", "a".repeat(70000));
        let (output, _) = converse(&context(), &input);
        assert!(output.starts_with("HTTP/1.1 414 Request-URI Too Long\r\n"));
    }

    #[test]
    fn silent_close_sends_nothing() {
        let (output, closed) = converse(&context(), "");
        assert_eq!("", output);
        assert!(closed);

        let (output, _) = converse(&context(), "\r\n");
        assert_eq!("", output);

        let (output, closed) = converse(&context(), "GET /a.txt HTTP/1.1\r\nHost: x\r\n");
        assert_eq!("", output);
        assert!(closed);
    }

    #[test]
    fn listing_of_root() {
        let (output, _) = converse(&context(), "GET / HTTP/1.0\r\n\r\n");
        assert!(output.starts_with("HTTP/1.1 200 OK\r\n"));
        assert_eq!(2, output.matches("<li>").count());
        assert!(output.contains(">b/</a>"));
    }

    struct Broken;

    impl MethodHandler for Broken {
        fn handle(&self, _: &Request, response: &mut Response) -> Result<(), HandlerError> {
            response.send_response(200)?;
            response.send_response(200)
        }
    }

    struct Silent;

    impl MethodHandler for Silent {
        fn handle(&self, _: &Request, _: &mut Response) -> Result<(), HandlerError> {
            Ok(())
        }
    }

    #[test]
    fn handler_failures_close_the_connection() {
        let mut handlers = HandlerRegistry::new();
        handlers.register("BROKEN", Broken);
        handlers.register("SILENT", Silent);
        let context = ServerContext::new(handlers, None);

        let (output, closed) = converse(&context, "BROKEN / HTTP/1.1\r\n\r\nBROKEN / HTTP/1.1\r\n\r\n");
        assert_eq!("", output);
        assert!(closed);

        let mock = MockStream::new(b"SILENT / HTTP/1.1\r\n\r\n");
        let mut buffed = ByteStream::new(mock);
        assert!(matches!(handle_one_request(&mut buffed, peer(), &context), Outcome::Failed(_)));
    }

    struct Recording(Arc<Mutex<Vec<String>>>);

    impl MethodHandler for Recording {
        fn handle(&self, request: &Request, response: &mut Response) -> Result<(), HandlerError> {
            self.0.lock().unwrap().push(request.path.clone());
            response.send_empty(204, &[])
        }
    }

    #[test]
    fn registered_methods_are_dispatched() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut handlers = HandlerRegistry::new();
        handlers.register("PURGE", Recording(seen.clone()));
        let context = ServerContext::new(handlers, None);

        let (output, _) = converse(&context, "PURGE /cache HTTP/1.1\r\nConnection: close\r\n\r\n");
        assert!(output.starts_with("HTTP/1.1 204 No Content\r\n"));
        assert_eq!(vec!["/cache".to_string()], *seen.lock().unwrap());
    }
}
