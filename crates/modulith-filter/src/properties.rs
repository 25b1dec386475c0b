//! Ordered, case-insensitive property maps.
//!
//! A [`Properties`] map stores `(key, value)` pairs in insertion order and
//! looks keys up case-insensitively by default.  Filter evaluation with
//! `match_case = true` uses the case-sensitive lookup instead.  Inserting a
//! key that already exists (under either case rule) replaces the value in
//! place, keeping the original key spelling and position.

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// An ordered string-keyed map of [`Value`]s with case-insensitive lookup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Properties {
    entries: Vec<(String, Value)>,
}

impl Properties {
    /// Create an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Look up a value, ignoring key case.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    }

    /// Look up a value with an exact, case-sensitive key match.
    pub fn get_case_sensitive(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Insert or replace a value.
    ///
    /// If a key already exists case-insensitively, its value is replaced in
    /// place and the previously stored key spelling is kept.  Returns the
    /// replaced value, if any.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        let value = value.into();
        if let Some((_, slot)) = self
            .entries
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(&key))
        {
            return Some(std::mem::replace(slot, value));
        }
        self.entries.push((key, value));
        None
    }

    /// Remove a key (case-insensitively), returning its value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let idx = self
            .entries
            .iter()
            .position(|(k, _)| k.eq_ignore_ascii_case(key))?;
        Some(self.entries.remove(idx).1)
    }

    /// Whether the key is present (case-insensitively).
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// `(key, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Properties {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut props = Properties::new();
        for (k, v) in iter {
            props.insert(k, v);
        }
        props
    }
}

impl<'a> IntoIterator for &'a Properties {
    type Item = (&'a str, &'a Value);
    type IntoIter = Box<dyn Iterator<Item = (&'a str, &'a Value)> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        let mut props = Properties::new();
        props.insert("ObjectClass", "Foo");

        assert_eq!(props.get("objectclass").and_then(Value::as_str), Some("Foo"));
        assert_eq!(props.get("OBJECTCLASS").and_then(Value::as_str), Some("Foo"));
        assert!(props.get_case_sensitive("objectclass").is_none());
        assert!(props.get_case_sensitive("ObjectClass").is_some());
    }

    #[test]
    fn insert_replaces_in_place() {
        let mut props = Properties::new();
        props.insert("a", 1);
        props.insert("b", 2);

        let old = props.insert("A", 10);
        assert_eq!(old, Some(Value::Int(1)));

        // Original spelling and position survive the replacement.
        let keys: Vec<&str> = props.keys().collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(props.get("a").and_then(Value::as_int), Some(10));
    }

    #[test]
    fn enumeration_preserves_insertion_order() {
        let props: Properties = [("z", 1), ("a", 2), ("m", 3)].into_iter().collect();
        let keys: Vec<&str> = props.keys().collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
    }

    #[test]
    fn remove_by_any_case() {
        let mut props = Properties::new();
        props.insert("Service.Ranking", 5);
        assert_eq!(props.remove("service.ranking"), Some(Value::Int(5)));
        assert!(props.is_empty());
    }
}
