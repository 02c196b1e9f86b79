//! HTTP/1.1 request parsing using the [`httparse`] crate.

use bytes::Bytes;
use thiserror::Error;

use super::{Headers, Method};

/// Errors that can occur while parsing an HTTP/1.1 request.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request is incomplete, more data needed")]
    Incomplete,

    #[error("HTTP parse error: {0}")]
    Parse(#[from] httparse::Error),

    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("invalid Content-Length header")]
    InvalidContentLength,

    #[error("header {name} is not valid UTF-8")]
    InvalidHeaderValue { name: String },
}

/// A parsed HTTP/1.1 request as handed to the dispatcher.
///
/// The request target is kept verbatim (path and query together) because the
/// router does its own splitting; [`path`](Self::path) and
/// [`query_string`](Self::query_string) are views for logging and tests.
///
/// # Examples
///
/// ```
/// use agentrest::http::request::Request;
///
/// let raw = b"GET /cfg/items/42?x=1 HTTP/1.1\r\nHost: localhost\r\n\r\n";
/// let (request, _offset) = Request::parse(raw).unwrap();
///
/// assert_eq!(request.method().as_str(), "GET");
/// assert_eq!(request.target(), "/cfg/items/42?x=1");
/// assert_eq!(request.path(), "/cfg/items/42");
/// assert_eq!(request.query_string(), Some("x=1"));
/// ```
#[derive(Debug)]
pub struct Request {
    method: Method,
    target: String,
    /// HTTP minor version: 0 for HTTP/1.0, 1 for HTTP/1.1.
    version: u8,
    headers: Headers,
    body: Bytes,
}

impl Request {
    /// Maximum number of headers we support per request.
    const MAX_HEADERS: usize = 64;

    /// Parse a raw HTTP/1.1 request from a byte slice.
    ///
    /// Returns the parsed `Request` and the byte offset at which the body
    /// begins. The body holds at most `Content-Length` bytes of whatever
    /// follows the headers in `buf`; callers wait for the full body before
    /// parsing when they need it.
    ///
    /// # Errors
    ///
    /// - [`RequestError::Incomplete`]: the header block is not complete yet.
    /// - [`RequestError::Parse`]: the data is malformed.
    /// - [`RequestError::MissingField`]: method, path, or version is absent.
    /// - [`RequestError::InvalidContentLength`]: `Content-Length` is not a number.
    /// - [`RequestError::InvalidHeaderValue`]: a header value is not UTF-8.
    pub fn parse(buf: &[u8]) -> Result<(Self, usize), RequestError> {
        let mut headers = [httparse::EMPTY_HEADER; Self::MAX_HEADERS];
        let mut raw_req = httparse::Request::new(&mut headers);

        let body_offset = match raw_req.parse(buf)? {
            httparse::Status::Complete(offset) => offset,
            httparse::Status::Partial => return Err(RequestError::Incomplete),
        };

        let method = match raw_req
            .method
            .ok_or(RequestError::MissingField { field: "method" })?
            .parse::<Method>()
        {
            Ok(method) => method,
            Err(never) => match never {},
        };

        let target = raw_req
            .path
            .ok_or(RequestError::MissingField { field: "path" })?
            .to_owned();

        let version = raw_req
            .version
            .ok_or(RequestError::MissingField { field: "version" })?;

        let mut header_map = Headers::with_capacity(raw_req.headers.len());
        for header in raw_req.headers.iter() {
            let value = std::str::from_utf8(header.value).map_err(|_| {
                RequestError::InvalidHeaderValue {
                    name: header.name.to_owned(),
                }
            })?;
            header_map.insert(header.name, value);
        }

        let content_length = match header_map.get("content-length") {
            Some(raw) => raw
                .trim()
                .parse::<usize>()
                .map_err(|_| RequestError::InvalidContentLength)?,
            None => 0,
        };
        let available = &buf[body_offset..];
        let body = Bytes::copy_from_slice(&available[..content_length.min(available.len())]);

        Ok((
            Self {
                method,
                target,
                version,
                headers: header_map,
                body,
            },
            body_offset,
        ))
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The request target exactly as received, query string included.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// The request path (target without the query string).
    pub fn path(&self) -> &str {
        match self.target.find('?') {
            Some(pos) => &self.target[..pos],
            None => &self.target,
        }
    }

    /// The raw query string (without the leading `?`), if any.
    pub fn query_string(&self) -> Option<&str> {
        self.target.find('?').map(|pos| &self.target[pos + 1..])
    }

    /// HTTP minor version number (0 = HTTP/1.0, 1 = HTTP/1.1).
    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Returns `true` if the connection should be kept alive after this request.
    ///
    /// HTTP/1.1 defaults to keep-alive. HTTP/1.0 defaults to close unless
    /// `Connection: keep-alive` is explicitly set.
    pub fn is_keep_alive(&self) -> bool {
        match self.headers.get("connection") {
            Some(conn) => conn.eq_ignore_ascii_case("keep-alive"),
            None => self.version == 1,
        }
    }

    /// Value of the `Content-Length` header, if present and numeric.
    pub fn content_length(&self) -> Option<usize> {
        self.headers.get("content-length")?.trim().parse().ok()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type")
    }

    /// Value of the `Authorization` header, forwarded to handlers as the API token.
    pub fn authorization(&self) -> Option<&str> {
        self.headers.get("authorization")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_get() {
        let raw = b"GET /cfg HTTP/1.1\r\nHost: localhost\r\n\r\n";
        let (req, offset) = Request::parse(raw).unwrap();
        assert_eq!(req.method(), &Method::Get);
        assert_eq!(req.target(), "/cfg");
        assert_eq!(req.path(), "/cfg");
        assert_eq!(req.query_string(), None);
        assert_eq!(req.version(), 1);
        assert_eq!(offset, raw.len());
        assert!(req.body().is_empty());
    }

    #[test]
    fn target_keeps_query() {
        let raw = b"GET /cfg/items?a=1&b=2 HTTP/1.1\r\nHost: x\r\n\r\n";
        let (req, _) = Request::parse(raw).unwrap();
        assert_eq!(req.target(), "/cfg/items?a=1&b=2");
        assert_eq!(req.path(), "/cfg/items");
        assert_eq!(req.query_string(), Some("a=1&b=2"));
    }

    #[test]
    fn incomplete_request() {
        let raw = b"GET / HTTP/1.1\r\nHost:";
        assert!(matches!(Request::parse(raw), Err(RequestError::Incomplete)));
    }

    #[test]
    fn body_is_bounded_by_content_length() {
        let raw = b"PUT /cfg HTTP/1.1\r\nContent-Length: 5\r\n\r\nhelloGET / HTTP/1.1\r\n";
        let (req, offset) = Request::parse(raw).unwrap();
        assert_eq!(req.content_length(), Some(5));
        assert_eq!(req.body().as_ref(), b"hello");
        assert_eq!(&raw[offset..offset + 5], b"hello");
    }

    #[test]
    fn bad_content_length_is_rejected() {
        let raw = b"POST / HTTP/1.1\r\nContent-Length: abc\r\n\r\n";
        assert!(matches!(
            Request::parse(raw),
            Err(RequestError::InvalidContentLength)
        ));
    }

    #[test]
    fn non_utf8_header_value_is_rejected() {
        let raw = b"POST / HTTP/1.1\r\nContent-Length: \xff5\r\n\r\nhello";
        match Request::parse(raw) {
            Err(RequestError::InvalidHeaderValue { name }) => assert_eq!(name, "Content-Length"),
            other => panic!("expected InvalidHeaderValue, got {other:?}"),
        }
    }

    #[test]
    fn connection_close_and_auth() {
        let raw = b"GET / HTTP/1.1\r\nConnection: close\r\nAuthorization: Bearer t0k\r\n\r\n";
        let (req, _) = Request::parse(raw).unwrap();
        assert!(!req.is_keep_alive());
        assert_eq!(req.authorization(), Some("Bearer t0k"));
    }

    #[test]
    fn unknown_method_parses_as_other() {
        let raw = b"OPTIONS /cfg HTTP/1.1\r\n\r\n";
        let (req, _) = Request::parse(raw).unwrap();
        assert_eq!(req.method(), &Method::Other("OPTIONS".to_owned()));
    }
}
