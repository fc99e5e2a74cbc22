use std::io::{self, Read, Write};
use std::net::SocketAddr;
use chrono::Utc;
use tracing::info;
use crate::error::HandlerError;
use super::http::{connection_token, format_http_date};
use super::ServerContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Idle,
    Headers,
    Body,
}

/// Everything a handler needs to answer one request.
pub struct Response<'a> {
    out: &'a mut dyn Write,
    context: &'a ServerContext,
    peer: SocketAddr,
    request_line: &'a str,
    head_only: bool,
    stage: Stage,
    code: Option<u16>,
    headers: Vec<(String, String)>,
    close: bool,
    /// HTTP/1.0 peers only reuse a connection the response says is kept.
    announce_keep_alive: bool,
}

impl<'a> Response<'a> {
    pub fn new(out: &'a mut dyn Write,
               context: &'a ServerContext,
               peer: SocketAddr,
               request_line: &'a str,
               head_only: bool,
               close: bool) -> Response<'a> {
        Response {
            out,
            context,
            peer,
            request_line,
            head_only,
            stage: Stage::Idle,
            code: None,
            headers: Vec::new(),
            close,
            announce_keep_alive: false,
        }
    }

    /// Adds `Connection: keep-alive` at `end_headers` when the connection
    /// stays open and no handler set `Connection` itself.
    pub fn announce_keep_alive(&mut self) {
        self.announce_keep_alive = true;
    }

    /// Starts the response. Logs the request and queues `Server` and `Date`.
    pub fn send_response(&mut self, code: u16) -> Result<(), HandlerError> {
        if self.stage != Stage::Idle {
            return Err(HandlerError::InvalidState("send_response called twice"));
        }
        let reason = self.context.statuses.reason(code).ok_or(HandlerError::UnknownStatus(code))?;
        info!(peer = %self.peer, request = %self.request_line, code, reason, "response");

        self.code = Some(code);
        self.stage = Stage::Headers;
        let context = self.context;
        self.send_header("Server", &context.server_version)?;
        self.send_header("Date", &format_http_date(&Utc::now()))
    }

    pub fn send_header(&mut self, name: &str, value: &str) -> Result<(), HandlerError> {
        match self.stage {
            Stage::Idle => return Err(HandlerError::InvalidState("header sent before send_response")),
            Stage::Body => return Err(HandlerError::InvalidState("header sent after end_headers")),
            Stage::Headers => {}
        }
        if name.eq_ignore_ascii_case("Connection") {
            if let Some(close) = connection_token(value) {
                self.close = close;
            }
        }
        self.headers.push((name.to_string(), value.to_string()));
        Ok(())
    }

    /// Writes the status line, the queued headers and the blank line.
    pub fn end_headers(&mut self) -> Result<(), HandlerError> {
        let code = match (self.stage, self.code) {
            (Stage::Headers, Some(code)) => code,
            _ => return Err(HandlerError::InvalidState("end_headers without an open header block")),
        };
        if self.announce_keep_alive && !self.close
            && !self.headers.iter().any(|(name, _)| name.eq_ignore_ascii_case("Connection")) {
            self.headers.push(("Connection".to_string(), "keep-alive".to_string()));
        }
        let mut block = self.context.statuses
            .status_line(self.context.protocol_version, code)
            .ok_or(HandlerError::UnknownStatus(code))?;
        for (name, value) in self.headers.drain(..) {
            block.push_str(&name);
            block.push_str(": ");
            block.push_str(&value);
            block.push_str("\r\n");
        }
        block.push_str("\r\n");
        self.stage = Stage::Body;
        self.out.write_all(block.as_bytes())?;
        Ok(())
    }

    pub fn write_body(&mut self, bytes: &[u8]) -> Result<(), HandlerError> {
        self.body_ready()?;
        self.out.write_all(bytes)?;
        Ok(())
    }

    /// Streams `content` as the body.
    pub fn copy_body(&mut self, content: &mut dyn Read) -> Result<u64, HandlerError> {
        self.body_ready()?;
        Ok(io::copy(content, &mut self.out)?)
    }

    /// Answers with `code` and a short HTML page built from the status
    /// table. The page is left out for HEAD and for codes that carry no body.
    pub fn send_error(&mut self, code: u16, explain: Option<&str>) -> Result<(), HandlerError> {
        let entry = *self.context.statuses.lookup(code).ok_or(HandlerError::UnknownStatus(code))?;
        let body = format!(
            "<html>\n<head>\n<title>Error response</title>\n</head>\n<body>\n\
             <h1>Error response</h1>\n<p>Error code {}.\n<p>Message: {}.\n\
             <p>Error code explanation: {} = {}.\n</body>\n</html>\n",
            entry.code, escape_html(explain.unwrap_or(entry.reason)), entry.code, entry.description);
        let has_body = code >= 200 && code != 204 && code != 304;

        self.send_response(code)?;
        if self.close {
            self.send_header("Connection", "close")?;
        }
        if has_body {
            self.send_header("Content-Type", "text/html")?;
            self.send_header("Content-Length", &body.len().to_string())?;
        }
        self.end_headers()?;
        if has_body && !self.head_only {
            self.write_body(body.as_bytes())?;
        }
        Ok(())
    }

    /// Status plus headers with an empty body.
    pub fn send_empty(&mut self, code: u16, headers: &[(&str, &str)]) -> Result<(), HandlerError> {
        self.send_response(code)?;
        for &(name, value) in headers {
            self.send_header(name, value)?;
        }
        self.send_header("Content-Length", "0")?;
        self.end_headers()
    }

    pub fn close_requested(&self) -> bool {
        self.close
    }

    pub fn headers_ended(&self) -> bool {
        self.stage == Stage::Body
    }

    fn body_ready(&self) -> Result<(), HandlerError> {
        if self.stage != Stage::Body {
            return Err(HandlerError::InvalidState("body written before end_headers"));
        }
        Ok(())
    }
}

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            c => escaped.push(c),
        }
    }
    escaped
}
