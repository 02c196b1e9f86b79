//! Ordered HTTP header list with case-insensitive lookup.

/// A case-insensitive, order-preserving header list.
///
/// # Examples
///
/// ```
/// use agentrest::http::Headers;
///
/// let mut headers = Headers::new();
/// headers.insert("Content-Type", "text/plain");
/// headers.set("content-type", "application/json");
///
/// assert_eq!(headers.get("Content-Type"), Some("application/json"));
/// assert_eq!(headers.len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Headers {
    inner: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Vec::with_capacity(capacity),
        }
    }

    /// Appends a header entry; earlier entries with the same name are kept.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.inner.push((name.into(), value.into()));
    }

    /// Replaces every entry named `name` with a single new entry.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.inner.retain(|(k, _)| !k.eq_ignore_ascii_case(&name));
        self.inner.push((name, value.into()));
    }

    /// First value for `name`, compared case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// All `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_insensitive_get() {
        let mut h = Headers::new();
        h.insert("Authorization", "Bearer abc");
        assert_eq!(h.get("authorization"), Some("Bearer abc"));
        assert_eq!(h.get("AUTHORIZATION"), Some("Bearer abc"));
        assert!(h.contains("authorization"));
        assert!(!h.contains("x-missing"));
    }

    #[test]
    fn set_replaces_all_prior_values() {
        let mut h = Headers::new();
        h.insert("Content-Disposition", "attachment;");
        h.insert("content-disposition", "inline");
        h.set("Content-Disposition", "attachment; filename=\"a.json\"");
        assert_eq!(h.len(), 1);
        assert_eq!(
            h.get("content-disposition"),
            Some("attachment; filename=\"a.json\"")
        );
    }

    #[test]
    fn iter_preserves_order() {
        let mut h = Headers::new();
        h.insert("A", "1");
        h.insert("B", "2");
        let pairs: Vec<_> = h.iter().collect();
        assert_eq!(pairs, vec![("A", "1"), ("B", "2")]);
    }
}
