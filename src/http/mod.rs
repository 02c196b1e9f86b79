//! HTTP/1.1 protocol types shared by the dispatcher and the transport.
//!
//! This module provides the core HTTP primitives:
//! [`Method`], [`StatusCode`], [`Headers`], [`Request`], and [`Response`].

use std::fmt;

pub mod headers;
pub mod request;
pub mod response;

pub use headers::Headers;
pub use request::Request;
pub use response::Response;

/// An HTTP response status code.
///
/// Handlers return one of these; the dispatcher reports it unchanged to the
/// transport.
///
/// # Examples
///
/// ```
/// use agentrest::http::StatusCode;
///
/// let status = StatusCode::Ok;
/// assert_eq!(status.as_u16(), 200);
/// assert_eq!(status.canonical_reason(), "OK");
/// assert!(status.is_success());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum StatusCode {
    // 2xx Success
    Ok = 200,
    Created = 201,
    Accepted = 202,
    NoContent = 204,

    // 3xx Redirection
    NotModified = 304,

    // 4xx Client Error
    BadRequest = 400,
    Unauthorized = 401,
    Forbidden = 403,
    NotFound = 404,
    MethodNotAllowed = 405,
    Conflict = 409,
    PayloadTooLarge = 413,
    UnsupportedMediaType = 415,
    UnprocessableEntity = 422,

    // 5xx Server Error
    InternalServerError = 500,
    NotImplemented = 501,
    ServiceUnavailable = 503,
}

impl StatusCode {
    /// Returns the numeric status code as a `u16`.
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Returns `true` for 2xx codes.
    pub fn is_success(self) -> bool {
        (200..300).contains(&self.as_u16())
    }

    /// Returns the canonical reason phrase for this status code.
    pub fn canonical_reason(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Created => "Created",
            Self::Accepted => "Accepted",
            Self::NoContent => "No Content",
            Self::NotModified => "Not Modified",
            Self::BadRequest => "Bad Request",
            Self::Unauthorized => "Unauthorized",
            Self::Forbidden => "Forbidden",
            Self::NotFound => "Not Found",
            Self::MethodNotAllowed => "Method Not Allowed",
            Self::Conflict => "Conflict",
            Self::PayloadTooLarge => "Payload Too Large",
            Self::UnsupportedMediaType => "Unsupported Media Type",
            Self::UnprocessableEntity => "Unprocessable Entity",
            Self::InternalServerError => "Internal Server Error",
            Self::NotImplemented => "Not Implemented",
            Self::ServiceUnavailable => "Service Unavailable",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.as_u16(), self.canonical_reason())
    }
}

impl From<StatusCode> for u16 {
    fn from(code: StatusCode) -> u16 {
        code.as_u16()
    }
}

/// An HTTP request method.
///
/// Only GET, POST, PUT, PATCH, and DELETE can carry a registered handler;
/// anything else parses into [`Method::Other`] and never matches a route.
///
/// # Examples
///
/// ```
/// use agentrest::http::Method;
///
/// let method: Method = "PATCH".parse().unwrap();
/// assert_eq!(method, Method::Patch);
/// assert!(method.is_routable());
///
/// let other: Method = "OPTIONS".parse().unwrap();
/// assert!(!other.is_routable());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    /// Any method the dispatcher has no handler slot for.
    Other(String),
}

impl Method {
    /// The five methods a handler can be registered for, in slot order.
    pub const ROUTABLE: [Method; 5] = [
        Method::Get,
        Method::Post,
        Method::Put,
        Method::Patch,
        Method::Delete,
    ];

    /// Returns the method as a string slice.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Other(s) => s.as_str(),
        }
    }

    /// Returns `true` if a handler can be registered for this method.
    pub fn is_routable(&self) -> bool {
        !matches!(self, Self::Other(_))
    }

    /// Index of this method's handler slot, `None` for [`Method::Other`].
    pub(crate) fn slot(&self) -> Option<usize> {
        match self {
            Self::Get => Some(0),
            Self::Post => Some(1),
            Self::Put => Some(2),
            Self::Patch => Some(3),
            Self::Delete => Some(4),
            Self::Other(_) => None,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Method {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "GET" => Self::Get,
            "POST" => Self::Post,
            "PUT" => Self::Put,
            "PATCH" => Self::Patch,
            "DELETE" => Self::Delete,
            other => Self::Other(other.to_owned()),
        })
    }
}

impl AsRef<str> for Method {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_parse_is_case_sensitive() {
        assert_eq!("GET".parse::<Method>().unwrap(), Method::Get);
        assert_eq!(
            "get".parse::<Method>().unwrap(),
            Method::Other("get".to_owned())
        );
    }

    #[test]
    fn slots_are_distinct() {
        let slots: Vec<_> = Method::ROUTABLE.iter().filter_map(Method::slot).collect();
        assert_eq!(slots, vec![0, 1, 2, 3, 4]);
        assert_eq!(Method::Other("HEAD".into()).slot(), None);
    }

    #[test]
    fn status_display() {
        assert_eq!(StatusCode::NotFound.to_string(), "404 Not Found");
        assert!(!StatusCode::NotFound.is_success());
        assert!(StatusCode::NoContent.is_success());
    }
}
