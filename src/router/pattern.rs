//! URI pattern compilation and request-path splitting.
//!
//! A pattern is split on `/` once at registration time. Each component is
//! classified as:
//!
//! | Component | Segment                      | Matches                         |
//! |-----------|------------------------------|---------------------------------|
//! | `items`   | [`Segment::Literal`]         | exactly `items`                 |
//! | `+`       | [`Segment::SingleWildcard`]  | any one component               |
//! | `#`       | [`Segment::CatchAll`]        | everything from here to the end |
//!
//! The same limits apply to request paths, so a path that could never have
//! been registered is rejected before matching.

use crate::error::{RestError, RestResult};
use crate::http::Method;

use super::Handler;

/// Maximum number of `/`-separated components in a request path, module
/// prefix included.
pub const MAX_URI_LEVEL: usize = 10;

/// Maximum byte length of one path component.
pub const MAX_SEGMENT_LEN: usize = 200;

/// One compiled component of a registered pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    SingleWildcard,
    CatchAll,
}

impl Segment {
    fn parse(component: &str) -> Self {
        match component {
            "+" => Segment::SingleWildcard,
            "#" => Segment::CatchAll,
            literal => Segment::Literal(literal.to_owned()),
        }
    }
}

/// A request URI split into path components and raw query string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitUri {
    pub segments: Vec<String>,
    pub query: Option<String>,
}

// Empty components are skipped, so `//a///b` has the components `a` and `b`.
fn components(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

fn check_component(component: &str) -> RestResult<()> {
    if component.len() > MAX_SEGMENT_LEN {
        return Err(RestError::invalid(format!(
            "path component longer than {MAX_SEGMENT_LEN} bytes"
        )));
    }
    Ok(())
}

/// Splits a request URI at the first `?` and the path on `/`.
///
/// # Errors
///
/// [`RestError::InvalidArgument`] if the path has more than
/// [`MAX_URI_LEVEL`] components or a component is longer than
/// [`MAX_SEGMENT_LEN`].
pub fn split_uri(uri: &str) -> RestResult<SplitUri> {
    let (path, query) = match uri.split_once('?') {
        Some((path, query)) => (path, Some(query.to_owned())),
        None => (uri, None),
    };

    let mut segments = Vec::new();
    for component in components(path) {
        check_component(component)?;
        if segments.len() == MAX_URI_LEVEL {
            return Err(RestError::invalid(format!(
                "path deeper than {MAX_URI_LEVEL} components"
            )));
        }
        segments.push(component.to_owned());
    }

    Ok(SplitUri { segments, query })
}

/// A registered URI template and its per-method handlers.
pub struct Pattern {
    raw_uri: String,
    segments: Vec<Segment>,
    handlers: [Option<Handler>; 5],
}

impl std::fmt::Debug for Pattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let methods: Vec<String> = Method::ROUTABLE
            .into_iter()
            .filter(|m| self.handler(m).is_some())
            .map(|m| m.to_string())
            .collect();
        f.debug_struct("Pattern")
            .field("raw_uri", &self.raw_uri)
            .field("segments", &self.segments)
            .field("methods", &methods)
            .finish()
    }
}

impl Pattern {
    /// Compiles `raw_uri` for the module whose prefix is `prefix`.
    ///
    /// The pattern may be written relative to the module (`/items/+`) or
    /// starting with the prefix itself (`/cfg/items/+` for module `cfg`).
    ///
    /// # Errors
    ///
    /// [`RestError::InvalidArgument`] if the pattern is empty, contains a
    /// query string, has a component after `#`, or exceeds the limits.
    pub fn compile(prefix: &str, raw_uri: &str) -> RestResult<Self> {
        if raw_uri.contains('?') {
            return Err(RestError::invalid("pattern must not contain a query string"));
        }

        let mut parts = components(raw_uri).peekable();
        if parts.peek() == Some(&prefix) {
            parts.next();
        }

        let mut segments = Vec::new();
        for component in parts {
            check_component(component)?;
            if segments.last() == Some(&Segment::CatchAll) {
                return Err(RestError::invalid("`#` must be the last pattern component"));
            }
            segments.push(Segment::parse(component));
        }

        if segments.is_empty() {
            return Err(RestError::invalid(format!(
                "pattern {raw_uri:?} has no components below the module prefix"
            )));
        }
        // One level is taken by the module prefix in every request path.
        if segments.len() >= MAX_URI_LEVEL {
            return Err(RestError::invalid(format!(
                "pattern deeper than {} components",
                MAX_URI_LEVEL - 1
            )));
        }

        Ok(Self {
            raw_uri: raw_uri.to_owned(),
            segments,
            handlers: Default::default(),
        })
    }

    pub fn raw_uri(&self) -> &str {
        &self.raw_uri
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Number of request components needed before a `#`, or all of them.
    pub(crate) fn required_depth(&self) -> usize {
        self.segments
            .iter()
            .take_while(|s| **s != Segment::CatchAll)
            .count()
    }

    pub fn handler(&self, method: &Method) -> Option<&Handler> {
        method.slot().and_then(|slot| self.handlers[slot].as_ref())
    }

    /// Installs `handler` for `method`, returning the one it replaced.
    pub(crate) fn set_handler(&mut self, method: &Method, handler: Handler) -> RestResult<Option<Handler>> {
        let slot = method
            .slot()
            .ok_or_else(|| RestError::invalid(format!("unsupported method {method}")))?;
        Ok(self.handlers[slot].replace(handler))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_separates_query_and_skips_empty_components() {
        let split = split_uri("//cfg///items/42?x=1&y").unwrap();
        assert_eq!(split.segments, vec!["cfg", "items", "42"]);
        assert_eq!(split.query.as_deref(), Some("x=1&y"));
    }

    #[test]
    fn split_without_query() {
        let split = split_uri("/cfg").unwrap();
        assert_eq!(split.segments, vec!["cfg"]);
        assert_eq!(split.query, None);
    }

    #[test]
    fn split_only_splits_on_first_question_mark() {
        let split = split_uri("/cfg?a=1?b=2").unwrap();
        assert_eq!(split.query.as_deref(), Some("a=1?b=2"));
    }

    #[test]
    fn split_enforces_depth_limit() {
        let ok = format!("/{}", vec!["a"; MAX_URI_LEVEL].join("/"));
        assert_eq!(split_uri(&ok).unwrap().segments.len(), MAX_URI_LEVEL);
        let too_deep = format!("/{}", vec!["a"; MAX_URI_LEVEL + 1].join("/"));
        assert!(matches!(split_uri(&too_deep), Err(RestError::InvalidArgument(_))));
    }

    #[test]
    fn split_enforces_component_length() {
        let ok = format!("/cfg/{}", "x".repeat(MAX_SEGMENT_LEN));
        assert!(split_uri(&ok).is_ok());
        let long = format!("/cfg/{}", "x".repeat(MAX_SEGMENT_LEN + 1));
        assert!(matches!(split_uri(&long), Err(RestError::InvalidArgument(_))));
    }

    #[test]
    fn compile_classifies_components() {
        let p = Pattern::compile("cfg", "/items/+/detail/#").unwrap();
        assert_eq!(
            p.segments(),
            &[
                Segment::Literal("items".into()),
                Segment::SingleWildcard,
                Segment::Literal("detail".into()),
                Segment::CatchAll,
            ]
        );
        assert_eq!(p.required_depth(), 3);
        assert_eq!(p.raw_uri(), "/items/+/detail/#");
    }

    #[test]
    fn compile_strips_leading_module_prefix() {
        let with = Pattern::compile("cfg", "/cfg/items/+").unwrap();
        let without = Pattern::compile("cfg", "/items/+").unwrap();
        assert_eq!(with.segments(), without.segments());
    }

    #[test]
    fn wildcard_characters_only_count_alone() {
        let p = Pattern::compile("m", "/#tag/a+b").unwrap();
        assert_eq!(
            p.segments(),
            &[Segment::Literal("#tag".into()), Segment::Literal("a+b".into())]
        );
    }

    #[test]
    fn compile_rejects_bad_patterns() {
        for bad in ["", "/", "/cfg", "/a?x=1", "/a/#/b"] {
            assert!(
                matches!(Pattern::compile("cfg", bad), Err(RestError::InvalidArgument(_))),
                "{bad:?} should be rejected"
            );
        }
        let long = format!("/{}", "x".repeat(MAX_SEGMENT_LEN + 1));
        assert!(Pattern::compile("cfg", &long).is_err());
        let deep = format!("/{}", vec!["a"; MAX_URI_LEVEL].join("/"));
        assert!(Pattern::compile("cfg", &deep).is_err());
        let deepest_ok = format!("/{}", vec!["a"; MAX_URI_LEVEL - 1].join("/"));
        assert!(Pattern::compile("cfg", &deepest_ok).is_ok());
    }
}
