//! Ordered, case-insensitive header table.
//!
//! The table is a thin layer over [`http::HeaderMap`]: names are stored as
//! lowercase [`HeaderName`]s so lookups ignore case, distinct names keep the
//! order in which they were first seen, and several values may share a name.

use http::header::{AsHeaderName, GetAll, IntoHeaderName, Iter};
use http::{HeaderMap, HeaderName, HeaderValue};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderTable {
    map: HeaderMap,
}

impl HeaderTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { map: HeaderMap::with_capacity(capacity) }
    }

    /// Returns the first value for `name` as a string.
    ///
    /// Values that are not visible ASCII are reported as absent, use [`HeaderTable::get`]
    /// to access their raw bytes.
    pub fn header<K: AsHeaderName>(&self, name: K) -> Option<&str> {
        self.map.get(name).and_then(|value| value.to_str().ok())
    }

    pub fn get<K: AsHeaderName>(&self, name: K) -> Option<&HeaderValue> {
        self.map.get(name)
    }

    pub fn get_all<K: AsHeaderName>(&self, name: K) -> GetAll<'_, HeaderValue> {
        self.map.get_all(name)
    }

    pub fn contains<K: AsHeaderName>(&self, name: K) -> bool {
        self.map.contains_key(name)
    }

    /// Number of distinct header names.
    pub fn size(&self) -> usize {
        self.map.keys_len()
    }

    /// Number of values, counting every value of a repeated name.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> Iter<'_, HeaderValue> {
        self.map.iter()
    }

    /// Adds a value, keeping any values already stored under `name`.
    pub fn append<K: IntoHeaderName>(&mut self, name: K, value: HeaderValue) {
        self.map.append(name, value);
    }

    /// Replaces every value stored under `name`.
    pub fn insert<K: IntoHeaderName>(&mut self, name: K, value: HeaderValue) {
        self.map.insert(name, value);
    }

    pub fn remove<K: AsHeaderName>(&mut self, name: K) -> Option<HeaderValue> {
        self.map.remove(name)
    }

    /// Checks whether any value of `name`, read as a comma separated list,
    /// contains `token` (compared ignoring ASCII case).
    pub fn has_token<K: AsHeaderName>(&self, name: K, token: &str) -> bool {
        self.map
            .get_all(name)
            .iter()
            .flat_map(|value| value.as_bytes().split(|b| *b == b','))
            .any(|item| item.trim_ascii().eq_ignore_ascii_case(token.as_bytes()))
    }

    pub fn as_map(&self) -> &HeaderMap {
        &self.map
    }

    pub fn into_map(self) -> HeaderMap {
        self.map
    }
}

impl From<HeaderMap> for HeaderTable {
    fn from(map: HeaderMap) -> Self {
        Self { map }
    }
}

impl<'a> IntoIterator for &'a HeaderTable {
    type Item = (&'a HeaderName, &'a HeaderValue);
    type IntoIter = Iter<'a, HeaderValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.map.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header;

    #[test]
    fn lookup_ignores_case() {
        let mut table = HeaderTable::new();
        table.append("host", HeaderValue::from_static("Foo.com"));

        assert_eq!(table.header("Host"), Some("Foo.com"));
        assert_eq!(table.header("HOST"), Some("Foo.com"));
        assert_eq!(table.header(header::HOST), Some("Foo.com"));
        assert_eq!(table.header("h2"), None);
    }

    #[test]
    fn size_counts_distinct_names() {
        let mut table = HeaderTable::new();
        table.append("accept", HeaderValue::from_static("text/html"));
        table.append("accept", HeaderValue::from_static("*/*"));
        table.append("host", HeaderValue::from_static("localhost"));

        assert_eq!(table.size(), 2);
        assert_eq!(table.len(), 3);
        assert_eq!(table.header("accept"), Some("text/html"));
        assert_eq!(table.get_all("accept").iter().count(), 2);
    }

    #[test]
    fn iterates_in_insertion_order() {
        let mut table = HeaderTable::new();
        table.append("h3", HeaderValue::from_static("c"));
        table.append("h1", HeaderValue::from_static("a"));
        table.append("h2", HeaderValue::from_static("b"));

        let names: Vec<_> = table.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, ["h3", "h1", "h2"]);
    }

    #[test]
    fn finds_tokens_in_lists() {
        let mut table = HeaderTable::new();
        table.append("connection", HeaderValue::from_static("Upgrade, Close"));

        assert!(table.has_token("Connection", "close"));
        assert!(table.has_token("Connection", "upgrade"));
        assert!(!table.has_token("Connection", "keep-alive"));
        assert!(!table.has_token("Transfer-Encoding", "chunked"));
    }

    #[test]
    fn insert_replaces_values() {
        let mut table = HeaderTable::new();
        table.append("content-length", HeaderValue::from_static("1"));
        table.append("content-length", HeaderValue::from_static("2"));
        table.insert(header::CONTENT_LENGTH, HeaderValue::from(9u64));

        assert_eq!(table.len(), 1);
        assert_eq!(table.header("Content-Length"), Some("9"));
    }
}
