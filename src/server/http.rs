use std::collections::HashMap;
use std::fmt;
use chrono::{DateTime, FixedOffset};
use tracing::debug;
use crate::error::ProtocolError;
use super::stream::{ByteStream, Line, Transport};

/// Maximum number of header lines accepted in one request.
pub const MAX_HEADERS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    Http10,
    Http11,
}

impl Version {
    pub fn parse(token: &str) -> Result<Version, ProtocolError> {
        match token {
            "HTTP/1.0" => Ok(Version::Http10),
            "HTTP/1.1" => Ok(Version::Http11),
            other => Err(ProtocolError::UnsupportedVersion(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Version::Http10 => "HTTP/1.0",
            Version::Http11 => "HTTP/1.1",
        }
    }

    /// Whether the connection is closed after a response when neither side
    /// says otherwise.
    pub fn closes_by_default(&self) -> bool {
        *self == Version::Http10
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Header mapping with case-insensitive names; a repeated name replaces the
/// earlier value.
#[derive(Debug, Default, Clone)]
pub struct Headers {
    headers: HashMap<String, String>,
}

impl Headers {
    pub fn new() -> Headers {
        Headers::default()
    }

    pub fn insert(&mut self, name: &str, value: &str) {
        self.headers.insert(name.to_ascii_lowercase(), value.to_string());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(|v| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// `Some(true)` for `Connection: close`, `Some(false)` for
    /// `Connection: keep-alive`, `None` when the header says neither.
    pub fn connection_close(&self) -> Option<bool> {
        self.get("Connection").and_then(connection_token)
    }

    pub fn if_modified_since(&self) -> Option<DateTime<FixedOffset>> {
        self.get("If-Modified-Since").and_then(parse_http_date)
    }

    fn append(&mut self, name: &str, continuation: &str) {
        if let Some(value) = self.headers.get_mut(&name.to_ascii_lowercase()) {
            value.push(' ');
            value.push_str(continuation);
        }
    }
}

/// Interprets a `Connection` header value.
pub fn connection_token(value: &str) -> Option<bool> {
    let mut verdict = None;
    for token in value.split(',').map(str::trim) {
        if token.eq_ignore_ascii_case("close") {
            return Some(true);
        } else if token.eq_ignore_ascii_case("keep-alive") {
            verdict = Some(false);
        }
    }
    verdict
}

#[derive(Debug)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub version: Version,
    pub headers: Headers,
    /// The request line as received, without CRLF. Used in log records.
    pub request_line: String,
}

/// Splits a request target into its path and the `?query` suffix, dropping
/// any fragment.
pub fn split_target(target: &str) -> (&str, &str) {
    let target = target.split('#').next().unwrap_or("");
    match target.find('?') {
        Some(index) => target.split_at(index),
        None => (target, ""),
    }
}

/// Result of reading the first line of a request cycle.
#[derive(Debug)]
pub enum RequestLine {
    /// Peer closed the connection or sent a blank line.
    End,
    Line(String),
}

pub fn read_request_line<S: Transport>(stream: &mut ByteStream<S>) -> Result<RequestLine, ProtocolError> {
    match stream.read_line()? {
        Line::Eof => Ok(RequestLine::End),
        Line::TooLong => Err(ProtocolError::RequestLineTooLong),
        Line::Data(bytes) => {
            let line = trim_line(&bytes);
            if line.is_empty() {
                Ok(RequestLine::End)
            } else {
                Ok(RequestLine::Line(line))
            }
        }
    }
}

/// Splits a request line into (method, target, version) tokens.
pub fn parse_request_line(line: &str) -> Result<(String, String, String), ProtocolError> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    match parts[..] {
        [method, target, version] => Ok((method.to_string(), target.to_string(), version.to_string())),
        _ => {
            debug!("request line has {} tokens: {:?}", parts.len(), line);
            Err(ProtocolError::MalformedRequestLine(line.to_string()))
        }
    }
}

/// Reads header lines up to and including the blank line that ends the block.
pub fn parse_headers<S: Transport>(stream: &mut ByteStream<S>) -> Result<Headers, ProtocolError> {
    let mut headers = Headers::new();
    let mut last_name: Option<String> = None;
    let mut count = 0;
    loop {
        let bytes = match stream.read_line()? {
            Line::Data(bytes) => bytes,
            Line::Eof => return Err(ProtocolError::PeerClosed),
            Line::TooLong => return Err(ProtocolError::MalformedHeaders("header line too long".to_string())),
        };
        let line = trim_line(&bytes);
        if line.is_empty() {
            return Ok(headers);
        }
        count += 1;
        if count > MAX_HEADERS {
            return Err(ProtocolError::MalformedHeaders(format!("more than {} headers", MAX_HEADERS)));
        }

        if line.starts_with(' ') || line.starts_with('\t') {
            match last_name {
                Some(ref name) => headers.append(name, line.trim()),
                None => return Err(ProtocolError::MalformedHeaders(format!("continuation without header: {:?}", line))),
            }
            continue;
        }

        match line.split_once(':') {
            Some((name, value)) if !name.trim().is_empty() => {
                let name = name.trim();
                headers.insert(name, value.trim());
                last_name = Some(name.to_string());
            }
            _ => return Err(ProtocolError::MalformedHeaders(format!("not a header: {:?}", line))),
        }
    }
}

/// RFC 1123 date as used in `Date` and `Last-Modified`.
pub fn format_http_date<Tz: chrono::TimeZone>(date: &DateTime<Tz>) -> String {
    date.with_timezone(&chrono::Utc).format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

fn parse_http_date(date_str: &str) -> Option<DateTime<FixedOffset>> {
    match DateTime::parse_from_rfc2822(date_str) {
        Ok(dt) => Some(dt),
        Err(e) => {
            debug!("Error parsing {}:{}", date_str, e);
            None
        }
    }
}

fn trim_line(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    text.trim_end_matches(['\r', '\n']).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::stream::tests::MockStream;

    fn stream(input: &str) -> ByteStream<MockStream> {
        ByteStream::new(MockStream::new(input.as_bytes()))
    }

    #[test]
    fn it_works() {
        let (method, url, version) = parse_request_line("GET / HTTP/1.1").unwrap();
        assert_eq!(method, "GET");
        assert_eq!(url, "/");
        assert_eq!(version, "HTTP/1.1");
    }

    #[test]
    fn request_line_needs_three_tokens() {
        assert!(matches!(parse_request_line("GET"), Err(ProtocolError::MalformedRequestLine(_))));
        assert!(matches!(parse_request_line("GET /"), Err(ProtocolError::MalformedRequestLine(_))));
        assert!(matches!(parse_request_line("GET / HTTP/1.1 extra"), Err(ProtocolError::MalformedRequestLine(_))));
    }

    #[test]
    fn only_http_1_x_is_accepted() {
        assert_eq!(Version::Http10, Version::parse("HTTP/1.0").unwrap());
        assert_eq!(Version::Http11, Version::parse("HTTP/1.1").unwrap());
        assert!(matches!(Version::parse("HTTP/2.0"), Err(ProtocolError::UnsupportedVersion(_))));
        assert!(matches!(Version::parse("FOO"), Err(ProtocolError::UnsupportedVersion(_))));
    }

    #[test]
    fn parse_headers_handles_empty_header() {
        let output = parse_headers(&mut stream("\r\n")).unwrap();
        assert_eq!(0, output.len());
    }

    #[test]
    fn parse_headers_handles_2_headers() {
        let output = parse_headers(&mut stream("Dummy: test\r\nDummy2: test2\r\n\r\n")).unwrap();

        assert_eq!(2, output.len());
        assert_eq!(Some("test"), output.get("Dummy"));
        assert_eq!(Some("test2"), output.get("dummy2"));
    }

    #[test]
    fn header_names_ignore_case_and_last_value_wins() {
        let output = parse_headers(&mut stream("Host: a\r\nHOST: b\r\n\r\n")).unwrap();
        assert_eq!(1, output.len());
        assert_eq!(Some("b"), output.get("host"));
    }

    #[test]
    fn folded_header_lines_are_joined() {
        let output = parse_headers(&mut stream("X-Long: one\r\n  two\r\n\r\n")).unwrap();
        assert_eq!(Some("one two"), output.get("x-long"));
    }

    #[test]
    fn header_without_colon_is_malformed() {
        let result = parse_headers(&mut stream("nonsense\r\n\r\n"));
        assert!(matches!(result, Err(ProtocolError::MalformedHeaders(_))));
    }

    #[test]
    fn stream_ending_inside_headers_is_a_close() {
        let result = parse_headers(&mut stream("Host: x\r\n"));
        assert!(matches!(result, Err(ProtocolError::PeerClosed)));
    }

    #[test]
    fn connection_header_tokens() {
        assert_eq!(Some(true), connection_token("close"));
        assert_eq!(Some(true), connection_token("Keep-Alive, Close"));
        assert_eq!(Some(false), connection_token("keep-alive"));
        assert_eq!(None, connection_token("upgrade"));
    }

    #[test]
    fn request_line_then_headers() {
        let mut input = stream("HEAD /a?b=c HTTP/1.0\r\nConnection: keep-alive\r\n\r\n");
        let line = match read_request_line(&mut input).unwrap() {
            RequestLine::Line(line) => line,
            RequestLine::End => panic!("request line missing"),
        };
        assert_eq!("HEAD /a?b=c HTTP/1.0", line);

        let (method, target, version) = parse_request_line(&line).unwrap();
        assert_eq!("HEAD", method);
        assert_eq!("/a?b=c", target);
        assert_eq!(Version::Http10, Version::parse(&version).unwrap());
        assert_eq!(Some(false), parse_headers(&mut input).unwrap().connection_close());
    }

    #[test]
    fn blank_first_line_ends_the_connection() {
        assert!(matches!(read_request_line(&mut stream("\r\n")), Ok(RequestLine::End)));
        assert!(matches!(read_request_line(&mut stream("")), Ok(RequestLine::End)));
    }

    #[test]
    fn overlong_request_line_is_414() {
        let input = format!("GET /{} HTTP/1.1\r\n", "a".repeat(70000));
        assert!(matches!(read_request_line(&mut stream(&input)), Err(ProtocolError::RequestLineTooLong)));
    }

    #[test]
    fn http_dates_round_trip() {
        let date = DateTime::parse_from_rfc2822("Sun, 06 Nov 1994 08:49:37 GMT").unwrap();
        assert_eq!("Sun, 06 Nov 1994 08:49:37 GMT", format_http_date(&date));
        let mut headers = Headers::new();
        headers.insert("If-Modified-Since", "Sun, 06 Nov 1994 08:49:37 GMT");
        assert_eq!(Some(date), headers.if_modified_since());
    }

    #[test]
    fn split_target_drops_query_and_fragment() {
        assert_eq!(("/a/b", "?x=1"), split_target("/a/b?x=1#top"));
        assert_eq!(("/a", ""), split_target("/a#frag"));
    }
}
