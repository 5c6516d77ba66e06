//! Cache key definitions.
//!
//! `QueryKey` names a read, `StoreSlot` names the store location the read's
//! result lives in, and `QueryFilter` selects queries for invalidation.

use std::fmt;
use std::sync::Arc;

/// Identifies a query: a name followed by its parameters.
///
/// `["cases"]` is the case list, `["case", "case-1"]` the detail of one case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey(Vec<String>);

impl QueryKey {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// True when every segment of `prefix` matches the leading segments of `self`.
    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.join(", "))
    }
}

/// Store location a query result is read from and written to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StoreSlot<K> {
    /// A single cached entity.
    Entity(K),
    /// A named, ordered collection of summaries.
    Collection(String),
}

impl<K: fmt::Display> fmt::Display for StoreSlot<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entity(key) => write!(f, "entity:{key}"),
            Self::Collection(name) => write!(f, "collection:{name}"),
        }
    }
}

/// Selects queries for invalidation.
#[derive(Clone)]
pub enum QueryFilter {
    /// Every query.
    All,
    /// Exactly one query.
    Exact(QueryKey),
    /// Every query whose key starts with the given segments.
    Prefix(QueryKey),
    /// Caller-supplied predicate.
    Predicate(Arc<dyn Fn(&QueryKey) -> bool + Send + Sync>),
}

impl QueryFilter {
    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&QueryKey) -> bool + Send + Sync + 'static,
    {
        Self::Predicate(Arc::new(f))
    }

    pub fn matches(&self, key: &QueryKey) -> bool {
        match self {
            Self::All => true,
            Self::Exact(exact) => exact == key,
            Self::Prefix(prefix) => key.starts_with(prefix),
            Self::Predicate(predicate) => predicate(key),
        }
    }
}

impl fmt::Debug for QueryFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("All"),
            Self::Exact(key) => f.debug_tuple("Exact").field(key).finish(),
            Self::Prefix(key) => f.debug_tuple("Prefix").field(key).finish(),
            Self::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

impl From<QueryKey> for QueryFilter {
    fn from(key: QueryKey) -> Self {
        Self::Exact(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_key_equality() {
        let key1 = QueryKey::new(["case", "case-1"]);
        let key2 = QueryKey::new(vec!["case".to_string(), "case-1".to_string()]);
        assert_eq!(key1, key2);
        assert_ne!(key1, QueryKey::new(["case", "case-2"]));
    }

    #[test]
    fn prefix_matching_is_segment_wise() {
        let detail = QueryKey::new(["case", "case-1"]);
        assert!(QueryFilter::Prefix(QueryKey::new(["case"])).matches(&detail));
        assert!(!QueryFilter::Prefix(QueryKey::new(["cases"])).matches(&detail));
        // "cas" is a string prefix of "case" but not a segment prefix
        assert!(!QueryFilter::Prefix(QueryKey::new(["cas"])).matches(&detail));
    }

    #[test]
    fn exact_and_predicate_filters() {
        let list = QueryKey::new(["cases"]);
        assert!(QueryFilter::from(list.clone()).matches(&list));
        assert!(!QueryFilter::Exact(list.clone()).matches(&QueryKey::new(["cases", "x"])));

        let long_keys = QueryFilter::predicate(|key| key.segments().len() > 1);
        assert!(!long_keys.matches(&list));
        assert!(long_keys.matches(&QueryKey::new(["case", "case-3"])));
        assert!(QueryFilter::All.matches(&list));
    }

    #[test]
    fn display_formats() {
        assert_eq!(QueryKey::new(["case", "case-1"]).to_string(), "[case, case-1]");
        let slot: StoreSlot<String> = StoreSlot::Collection("cases".to_string());
        assert_eq!(slot.to_string(), "collection:cases");
        assert_eq!(
            StoreSlot::Entity("case-1".to_string()).to_string(),
            "entity:case-1"
        );
    }
}
