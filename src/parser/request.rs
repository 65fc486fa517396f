//! HTTP request parsing and representation.

use std::collections::HashMap;
use std::str::FromStr;
use serde::de::DeserializeOwned;

use crate::parser::error::Error;
use crate::parser::method::Method;
use crate::parser::version::HttpVersion;

/// Represents an HTTP request as it came off the wire.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// The HTTP method (GET, POST, etc.)
    pub method: Method,
    /// The request path, without the query string
    pub path: String,
    /// The raw query string (everything after the first `?`), possibly empty
    pub query_string: String,
    /// The HTTP version
    pub version: HttpVersion,
    /// The HTTP headers, keyed by their original spelling. A header repeated
    /// under any spelling keeps its first value, so names are unique ignoring case.
    pub headers: HashMap<String, String>,
    /// The request body
    pub body: Vec<u8>,
    /// Query parameters decoded from the query string
    pub query_params: HashMap<String, String>,
}

impl HttpRequest {
    /// Create a new HTTP request.
    ///
    /// `target` is the request target from the request line; anything after the
    /// first `?` becomes the query string.
    pub fn new(method: Method, target: String, version: HttpVersion, headers: HashMap<String, String>) -> Self {
        let (path, query_string) = match target.split_once('?') {
            Some((path, query)) => (path.to_string(), query.to_string()),
            None => (target, String::new()),
        };
        let query_params = decode_query(&query_string);

        Self {
            method,
            path,
            query_string,
            version,
            headers,
            body: Vec::new(),
            query_params,
        }
    }

    /// Create a new HTTP request with a body.
    pub fn with_body(method: Method, target: String, version: HttpVersion, headers: HashMap<String, String>, body: Vec<u8>) -> Self {
        let mut request = Self::new(method, target, version, headers);
        request.body = body;
        request
    }

    /// Get a header value (case-insensitive).
    pub fn get_header(&self, name: &str) -> Option<&String> {
        self.headers.iter().find_map(|(k, v)| {
            if k.eq_ignore_ascii_case(name) {
                Some(v)
            } else {
                None
            }
        })
    }

    /// Check if a header exists (case-insensitive).
    pub fn has_header(&self, name: &str) -> bool {
        self.get_header(name).is_some()
    }

    /// The declared `Content-Type`, if any.
    pub fn content_type(&self) -> Option<&str> {
        self.get_header("Content-Type").map(String::as_str)
    }

    /// Parse the request body as JSON.
    ///
    /// Fails with [`Error::UnexpectedContentType`] unless the request declares
    /// a JSON content type.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        if !self.is_json() {
            return Err(Error::UnexpectedContentType {
                expected: "application/json",
                found: self.content_type().unwrap_or("none").to_string(),
            });
        }

        let json = serde_json::from_slice(&self.body)?;
        Ok(json)
    }

    /// Check if the request declares a JSON body.
    pub fn is_json(&self) -> bool {
        self.content_type()
            .map(|ct| ct.contains("application/json"))
            .unwrap_or(false)
    }

    /// Check if the request declares a URL-encoded form body.
    pub fn is_form(&self) -> bool {
        self.content_type()
            .map(|ct| ct.contains("application/x-www-form-urlencoded"))
            .unwrap_or(false)
    }

    /// Decode the body as URL-encoded form fields.
    ///
    /// Later occurrences of a key overwrite earlier ones. An undecodable body
    /// yields an empty map.
    pub fn form_fields(&self) -> HashMap<String, String> {
        decode_form(&self.body)
    }

    /// Get a query parameter value.
    pub fn get_query_param(&self, name: &str) -> Option<&String> {
        self.query_params.get(name)
    }

    /// Check if a query parameter exists.
    pub fn has_query_param(&self, name: &str) -> bool {
        self.query_params.contains_key(name)
    }
}

/// Decode `application/x-www-form-urlencoded` bytes into a map.
pub(crate) fn decode_form(bytes: &[u8]) -> HashMap<String, String> {
    serde_urlencoded::from_bytes::<Vec<(String, String)>>(bytes)
        .map(|pairs| pairs.into_iter().collect())
        .unwrap_or_default()
}

fn decode_query(query: &str) -> HashMap<String, String> {
    decode_form(query.as_bytes())
}

/// Locate the end of the header block.
///
/// Returns the offset of the first body byte, accepting both `\r\n\r\n` and
/// bare `\n\n` separators.
fn header_end(input: &[u8]) -> Option<usize> {
    let crlf = input.windows(4).position(|w| w == b"\r\n\r\n").map(|i| i + 4);
    let lf = input.windows(2).position(|w| w == b"\n\n").map(|i| i + 2);
    match (crlf, lf) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

/// The declared `Content-Length`. A value too large for `usize` saturates to
/// `usize::MAX`.
fn declared_length(head: &str) -> Option<usize> {
    head.lines().skip(1).find_map(|line| {
        let (name, value) = line.split_once(':')?;
        if !name.trim().eq_ignore_ascii_case("Content-Length") {
            return None;
        }
        let value = value.trim();
        match value.parse() {
            Ok(len) => Some(len),
            Err(_) if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) => Some(usize::MAX),
            Err(_) => None,
        }
    })
}

/// Report how many bytes a complete request occupies.
///
/// Returns `None` while the header block is still incomplete. Once the headers
/// are in, returns the header length plus the declared `Content-Length` (zero
/// when absent), saturating at `usize::MAX`.
pub fn expected_length(input: &[u8]) -> Option<usize> {
    let end = header_end(input)?;
    let head = std::str::from_utf8(&input[..end]).ok()?;
    Some(end.saturating_add(declared_length(head).unwrap_or(0)))
}

/// Parse an HTTP request from a byte slice.
///
/// The body is whatever follows the header block, truncated to the declared
/// `Content-Length`.
pub fn parse_request(input: &[u8]) -> Result<HttpRequest, Error> {
    let (head, body) = match header_end(input) {
        Some(end) => (&input[..end], &input[end..]),
        None => (input, &input[input.len()..]),
    };

    let head = match std::str::from_utf8(head) {
        Ok(s) => s,
        Err(_) => return Err(Error::MalformedRequestLine("Invalid UTF-8".to_string())),
    };

    let mut lines = head.lines();

    let request_line = match lines.next() {
        Some(line) if !line.trim().is_empty() => line,
        _ => return Err(Error::EmptyRequest),
    };

    // Split the request line into method, target, and version
    let parts: Vec<&str> = request_line.split_whitespace().collect();
    if parts.len() != 3 {
        return Err(Error::MalformedRequestLine(request_line.to_string()));
    }

    let method = Method::from_str(parts[0])?;

    let target = parts[1].to_string();
    if !target.starts_with('/') && target != "*" {
        return Err(Error::InvalidPath);
    }

    let version = HttpVersion::from_str(parts[2])?;

    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            break;
        }

        let (name, value) = line.split_once(':').ok_or(Error::InvalidHeaderFormat)?;
        let name = name.trim();
        // First occurrence wins, whatever the spelling
        if !headers.keys().any(|k: &String| k.eq_ignore_ascii_case(name)) {
            headers.insert(name.to_string(), value.trim().to_string());
        }
    }

    if version.requires_host() && !headers.keys().any(|k| k.eq_ignore_ascii_case("Host")) {
        return Err(Error::MissingHeader("Host".to_string()));
    }

    let body = match declared_length(head) {
        Some(len) if len < body.len() => &body[..len],
        _ => body,
    };

    Ok(HttpRequest::with_body(method, target, version, headers, body.to_vec()))
}
