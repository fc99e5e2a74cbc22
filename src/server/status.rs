use std::collections::HashMap;

/// One row of the status table: code, reason phrase and a longer
/// human-readable explanation used by error pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusEntry {
    pub code: u16,
    pub reason: &'static str,
    pub description: &'static str,
}

const RFC2616: &[(u16, &str, &str)] = &[
    (100, "Continue", "Request received, please continue"),
    (101, "Switching Protocols", "Switching to new protocol; obey Upgrade header"),

    (200, "OK", "Request fulfilled, document follows"),
    (201, "Created", "Document created, URL follows"),
    (202, "Accepted", "Request accepted, processing continues off-line"),
    (203, "Non-Authoritative Information", "Request fulfilled from cache"),
    (204, "No Content", "Request fulfilled, nothing follows"),
    (205, "Reset Content", "Clear input form for further input"),
    (206, "Partial Content", "Partial content follows"),

    (300, "Multiple Choices", "Object has several resources, see URI list"),
    (301, "Moved Permanently", "Object moved permanently, see URI list"),
    (302, "Found", "Object moved temporarily, see URI list"),
    (303, "See Other", "Object moved, see Method and URL list"),
    (304, "Not Modified", "Document has not changed since given time"),
    (305, "Use Proxy", "You must use the proxy specified in Location to access this resource"),
    (306, "(Unused)", "Reserved status code"),
    (307, "Temporary Redirect", "Object moved temporarily, see URI list"),

    (400, "Bad Request", "Bad request syntax or unsupported method"),
    (401, "Unauthorized", "No permission, see authorization schemes"),
    (402, "Payment Required", "No payment, see charging schemes"),
    (403, "Forbidden", "Request forbidden, authorization will not help"),
    (404, "Not Found", "Nothing matches the given URI"),
    (405, "Method Not Allowed", "Specified method is invalid for this resource"),
    (406, "Not Acceptable", "URI not available in preferred format"),
    (407, "Proxy Authentication Required", "You must authenticate with this proxy before proceeding"),
    (408, "Request Timeout", "Request timed out; try again later"),
    (409, "Conflict", "Request conflict"),
    (410, "Gone", "URI no longer exists and has been permanently removed"),
    (411, "Length Required", "Client must specify Content-Length"),
    (412, "Precondition Failed", "Precondition in headers is false"),
    (413, "Request Entity Too Large", "Entity is too large"),
    (414, "Request-URI Too Long", "URI is too long"),
    (415, "Unsupported Media Type", "Entity body in unsupported format"),
    (416, "Requested Range Not Satisfiable", "Cannot satisfy request range"),
    (417, "Expectation Failed", "Expect condition could not be satisfied"),

    (500, "Internal Server Error", "Server got itself in trouble"),
    (501, "Not Implemented", "Server does not support this operation"),
    (502, "Bad Gateway", "Invalid responses from another server/proxy"),
    (503, "Service Unavailable", "The server cannot process the request due to a high load"),
    (504, "Gateway Timeout", "The gateway server did not receive a timely response"),
    (505, "HTTP Version Not Supported", "Cannot fulfill request"),
];

/// Read-only table built once at startup and shared by reference with every
/// worker.
#[derive(Debug)]
pub struct StatusRegistry {
    entries: HashMap<u16, StatusEntry>,
}

impl StatusRegistry {
    pub fn rfc2616() -> StatusRegistry {
        let entries = RFC2616.iter()
            .map(|&(code, reason, description)| (code, StatusEntry { code, reason, description }))
            .collect();
        StatusRegistry { entries }
    }

    pub fn lookup(&self, code: u16) -> Option<&StatusEntry> {
        self.entries.get(&code)
    }

    pub fn reason(&self, code: u16) -> Option<&'static str> {
        self.lookup(code).map(|e| e.reason)
    }

    pub fn codes(&self) -> impl Iterator<Item = u16> + '_ {
        self.entries.keys().copied()
    }

    /// `"<version> <code> <reason>\r\n"`
    pub fn status_line(&self, version: &str, code: u16) -> Option<String> {
        self.reason(code).map(|reason| format!("{} {} {}\r\n", version, code, reason))
    }
}

/// Splits a status line back into (version, code, reason).
pub fn parse_status_line(line: &str) -> Option<(&str, u16, &str)> {
    let line = line.trim_end_matches(['\r', '\n']);
    let mut parts = line.splitn(3, ' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(version), Some(code), Some(reason)) => {
            code.parse().ok().map(|code| (version, code, reason))
        }
        _ => None,
    }
}
