//! Per-dispatch context handed to handlers.
//!
//! A [`DispatchContext`] is built fresh for every dispatch and dropped when
//! the handler returns, so query string, path segments, and output buffer
//! never leak between requests and handlers may run concurrently.

mod accumulator;

use bytes::Bytes;

pub use accumulator::{Accumulator, ContentKind};

use crate::error::{RestError, RestResult};
use crate::router::pattern::{SplitUri, split_uri};

/// State available to a handler while it runs.
///
/// # Examples
///
/// ```
/// use agentrest::context::DispatchContext;
///
/// let ctx = DispatchContext::from_uri("/cfg/items/42?x=1&y=2", Default::default()).unwrap();
/// assert_eq!(ctx.segment(0).unwrap(), "cfg");
/// assert_eq!(ctx.segment(2).unwrap(), "42");
/// assert_eq!(ctx.find_query_value("y").unwrap(), "2");
/// ```
#[derive(Debug)]
pub struct DispatchContext {
    uri: String,
    body: Bytes,
    query: Option<String>,
    segments: Vec<String>,
    api_token: Option<String>,
    output: Accumulator,
}

impl DispatchContext {
    pub(crate) fn new(uri: String, body: Bytes, split: SplitUri) -> Self {
        Self {
            uri,
            body,
            query: split.query,
            segments: split.segments,
            api_token: None,
            output: Accumulator::new(),
        }
    }

    /// Builds a context for `uri` the way the dispatcher would.
    ///
    /// # Errors
    ///
    /// [`RestError::InvalidArgument`] when the path exceeds the segment limits.
    pub fn from_uri(uri: &str, body: Bytes) -> RestResult<Self> {
        let split = split_uri(uri)?;
        Ok(Self::new(uri.to_owned(), body, split))
    }

    pub(crate) fn set_api_token(&mut self, token: Option<String>) {
        self.api_token = token;
    }

    /// The request URI as received, query string included.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Deserializes the request body as JSON.
    pub fn json<T>(&self) -> Result<T, serde_json::Error>
    where
        T: serde::de::DeserializeOwned,
    {
        serde_json::from_slice(&self.body)
    }

    /// Token from the request's `Authorization` header, when the transport supplied one.
    pub fn api_token(&self) -> Option<&str> {
        self.api_token.as_deref()
    }

    /// The raw query string, without the leading `?`.
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Path segments; index 0 is the module prefix.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// The `index`-th path segment, counting the module prefix as 0.
    ///
    /// # Errors
    ///
    /// [`RestError::NotFound`] when the path has fewer segments.
    pub fn segment(&self, index: usize) -> RestResult<&str> {
        self.segments
            .get(index)
            .map(String::as_str)
            .ok_or_else(|| RestError::not_found(format!("path segment {index}")))
    }

    /// Iterates `key=value` pairs of the query string in order.
    ///
    /// A pair without `=` yields an empty value.
    pub fn query_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.query
            .as_deref()
            .into_iter()
            .flat_map(|q| q.split('&'))
            .filter(|pair| !pair.is_empty())
            .map(|pair| pair.split_once('=').unwrap_or((pair, "")))
    }

    /// First value whose key equals `name` exactly.
    ///
    /// The query string is re-scanned on every call.
    ///
    /// # Errors
    ///
    /// - [`RestError::InvalidArgument`] for an empty `name`.
    /// - [`RestError::NotFound`] if there is no query string or no such key.
    pub fn find_query_value(&self, name: &str) -> RestResult<&str> {
        if name.is_empty() {
            return Err(RestError::invalid("empty query key"));
        }
        self.query_pairs()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value)
            .ok_or_else(|| RestError::not_found(format!("query key {name}")))
    }

    /// Appends JSON output. See [`Accumulator::write`].
    pub fn write(&mut self, data: impl AsRef<[u8]>) -> RestResult<()> {
        self.output.write(data.as_ref())
    }

    /// Appends file output. See [`Accumulator::write_file`].
    pub fn write_file(&mut self, name: &str, data: impl AsRef<[u8]>) -> RestResult<()> {
        self.output.write_file(name, data.as_ref())
    }

    /// Serializes `value` and appends it as JSON output.
    pub fn write_json<T: serde::Serialize>(&mut self, value: &T) -> RestResult<()> {
        let encoded =
            serde_json::to_vec(value).map_err(|e| RestError::OperationFailed(e.to_string()))?;
        self.output.write(&encoded)
    }

    pub fn output(&self) -> &Accumulator {
        &self.output
    }

    pub(crate) fn into_output(self) -> Accumulator {
        self.output
    }
}
