use indexmap::IndexMap;

use url::form_urlencoded;

/// Protocol-specific query separator, normalized to `&` before parsing.
pub const QUERY_SEPARATOR: char = ';';

/// A parsed `key=value&key=value` query.
///
/// Repeated keys accumulate their values. Two queries are equal when they
/// contain the same keys with the same values, regardless of key order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query(IndexMap<String, Vec<String>>);

impl Query {
    /// Creates an empty [`Query`].
    #[must_use]
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a query string.
    #[must_use]
    pub fn parse(query: &str) -> Self {
        let normalized = query.trim_start_matches('?').replace(QUERY_SEPARATOR, "&");

        let mut parameters = IndexMap::<String, Vec<String>>::new();
        for (key, value) in form_urlencoded::parse(normalized.as_bytes()) {
            if key.is_empty() {
                continue;
            }
            parameters
                .entry(key.into_owned())
                .or_default()
                .push(value.into_owned());
        }

        Self(parameters)
    }

    /// Adds a parameter, returning the [`Query`].
    #[must_use]
    #[inline]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Adds a parameter value.
    #[inline]
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.entry(key.into()).or_default().push(value.into());
    }

    /// Returns the first value of a parameter.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Returns all values of a parameter.
    #[must_use]
    pub fn get_all(&self, key: &str) -> &[String] {
        self.0.get(key).map_or(&[], Vec::as_slice)
    }

    /// Checks whether the query has no parameters.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns an iterator over the parameters.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().flat_map(|(key, values)| {
            values
                .iter()
                .map(move |value| (key.as_str(), value.as_str()))
        })
    }

    /// Serializes the query.
    #[must_use]
    pub fn to_query_string(&self) -> String {
        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.iter())
            .finish()
    }
}

impl std::fmt::Display for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.to_query_string().fmt(f)
    }
}
