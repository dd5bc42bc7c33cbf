//! Identity map: one in-memory record per stored row.
//!
//! Entries are namespaced by data source and root entity, so every entity
//! in an inheritance tree shares one map, and keyed by the record's identity
//! key. Looking a key up twice yields the same record handle.
//!
//! ```ignore
//! let a = session.get("User", &[1.into()])?.unwrap();
//! let b = session.find("User")?.filter(id.eq(1)).first()?.unwrap();
//! assert_eq!(a, b);
//! ```

use crate::store::RecordId;
use std::collections::HashMap;
use std::sync::Arc;
use tusk_core::{Property, Value};

/// The identity key of a record: each key property's field name and
/// length-prefixed value.
///
/// Two key tuples that differ only in integer width produce the same key.
pub fn identity_key(keys: &[Arc<Property>], values: &[Value]) -> String {
    keys.iter()
        .zip(values)
        .map(|(key, value)| format!("{}={}", key.field_name, value.key_token()))
        .collect::<Vec<_>>()
        .join("&")
}

/// Data source name and root entity name.
pub type Namespace = (String, String);

#[derive(Debug, Default)]
pub struct IdentityMap {
    entries: HashMap<Namespace, HashMap<String, RecordId>>,
}

impl IdentityMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, namespace: &Namespace, key: &str) -> Option<RecordId> {
        self.entries.get(namespace)?.get(key).copied()
    }

    /// Register `record` under `key`, returning the record it displaced.
    pub fn insert(&mut self, namespace: Namespace, key: String, record: RecordId) -> Option<RecordId> {
        self.entries.entry(namespace).or_default().insert(key, record)
    }

    /// Unregister `key`, but only while it still maps to `record`.
    pub fn remove(&mut self, namespace: &Namespace, key: &str, record: RecordId) -> bool {
        match self.entries.get_mut(namespace) {
            Some(map) if map.get(key) == Some(&record) => {
                map.remove(key);
                true
            }
            _ => false,
        }
    }

    /// Number of registered records across all namespaces.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.values().map(HashMap::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn namespace(root: &str) -> Namespace {
        ("default".to_string(), root.to_string())
    }

    #[test]
    fn keys_ignore_integer_width() {
        let id = Arc::new(tusk_core::Property::serial("id"));
        assert_eq!(
            identity_key(&[Arc::clone(&id)], &[Value::Int(7)]),
            identity_key(&[id], &[Value::BigInt(7)])
        );
    }

    #[test]
    fn composite_keys_name_each_field() {
        let a = Arc::new(tusk_core::Property::integer("a").key());
        let b = Arc::new(tusk_core::Property::string("b").key());
        assert_eq!(
            identity_key(&[a, b], &[Value::BigInt(1), Value::from("x")]),
            "a=1:1&b=1:x"
        );
    }

    #[test]
    fn separators_inside_values_stay_distinct() {
        let a = Arc::new(tusk_core::Property::string("a").key());
        let b = Arc::new(tusk_core::Property::string("b").key());
        let keys = [a, b];
        assert_ne!(
            identity_key(&keys, &[Value::from("1&b=2"), Value::from("")]),
            identity_key(&keys, &[Value::from("1"), Value::from("2&b=")])
        );
        assert_ne!(
            identity_key(&keys, &[Value::from("x"), Value::Null]),
            identity_key(&keys, &[Value::from("x"), Value::from("")])
        );
    }

    #[test]
    fn namespaces_are_separate() {
        let mut map = IdentityMap::new();
        assert!(map.insert(namespace("User"), "id=1".into(), RecordId(0)).is_none());
        map.insert(namespace("Group"), "id=1".into(), RecordId(1));
        assert_eq!(map.get(&namespace("User"), "id=1"), Some(RecordId(0)));
        assert_eq!(map.get(&namespace("Group"), "id=1"), Some(RecordId(1)));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn remove_only_matching_record() {
        let mut map = IdentityMap::new();
        map.insert(namespace("User"), "id=1".into(), RecordId(3));
        assert!(!map.remove(&namespace("User"), "id=1", RecordId(4)));
        assert_eq!(map.get(&namespace("User"), "id=1"), Some(RecordId(3)));
        assert!(map.remove(&namespace("User"), "id=1", RecordId(3)));
        assert!(map.is_empty());
    }
}
