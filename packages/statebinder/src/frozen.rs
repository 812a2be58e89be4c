//! Sealed, deeply immutable state values.
//!
//! Values read out of a freezing store are returned as [`Frozen`]: a shared,
//! reference-counted tree with read accessors only. There is no way to write
//! through a `Frozen`, at any depth, so nested references handed to callers
//! cannot be used to bypass the store's write gate.
//!
//! Sealing happens once per slot. A slot that is already sealed is returned as
//! is, so repeated reads share the same tree (see [`Frozen::ptr_eq`]).

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use serde_json::{Map, Number, Value};

use crate::error::StoreError;

/// Maximum nesting depth accepted for state values.
///
/// Matches the recursion limit `serde_json` applies when parsing.
pub const MAX_STATE_DEPTH: usize = 128;

/// A deeply immutable view of a state value.
///
/// Cheap to clone. Containers hand out their children as `Frozen` too, so the
/// whole tree is read-only.
#[derive(Clone)]
pub struct Frozen(Arc<Sealed>);

enum Sealed {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Array(Vec<Frozen>),
    Object(BTreeMap<String, Frozen>),
}

impl Frozen {
    /// Seal a value, children first.
    ///
    /// Callers must have validated the depth with [`check_depth`].
    pub(crate) fn seal(value: &Value) -> Self {
        let sealed = match value {
            Value::Null => Sealed::Null,
            Value::Bool(b) => Sealed::Bool(*b),
            Value::Number(n) => Sealed::Number(n.clone()),
            Value::String(s) => Sealed::String(s.clone()),
            Value::Array(items) => Sealed::Array(items.iter().map(Frozen::seal).collect()),
            Value::Object(map) => Sealed::Object(
                map.iter()
                    .map(|(key, value)| (key.clone(), Frozen::seal(value)))
                    .collect(),
            ),
        };
        Frozen(Arc::new(sealed))
    }

    /// Returns true if both handles point at the same sealed tree.
    pub fn ptr_eq(&self, other: &Frozen) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Look up a key of an object value.
    pub fn get(&self, key: &str) -> Option<Frozen> {
        match &*self.0 {
            Sealed::Object(map) => map.get(key).cloned(),
            _ => None,
        }
    }

    /// Look up an element of an array value.
    pub fn index(&self, index: usize) -> Option<Frozen> {
        match &*self.0 {
            Sealed::Array(items) => items.get(index).cloned(),
            _ => None,
        }
    }

    /// Number of elements (arrays) or keys (objects); zero for scalars.
    pub fn len(&self) -> usize {
        match &*self.0 {
            Sealed::Array(items) => items.len(),
            Sealed::Object(map) => map.len(),
            _ => 0,
        }
    }

    /// Returns true for empty containers and for scalars.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Object keys in order; empty for non-objects.
    pub fn keys(&self) -> Vec<&str> {
        match &*self.0 {
            Sealed::Object(map) => map.keys().map(String::as_str).collect(),
            _ => Vec::new(),
        }
    }

    /// Array elements; empty for non-arrays.
    pub fn items(&self) -> &[Frozen] {
        match &*self.0 {
            Sealed::Array(items) => items,
            _ => &[],
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(&*self.0, Sealed::Null)
    }

    pub fn is_array(&self) -> bool {
        matches!(&*self.0, Sealed::Array(_))
    }

    pub fn is_object(&self) -> bool {
        matches!(&*self.0, Sealed::Object(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match &*self.0 {
            Sealed::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match &*self.0 {
            Sealed::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match &*self.0 {
            Sealed::Number(n) => n.as_u64(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match &*self.0 {
            Sealed::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &*self.0 {
            Sealed::String(s) => Some(s),
            _ => None,
        }
    }

    /// Copy the tree out into a detached, mutable `Value`.
    ///
    /// Mutations use this to derive a new value from the current one before
    /// writing it back through the state accessor.
    pub fn to_value(&self) -> Value {
        match &*self.0 {
            Sealed::Null => Value::Null,
            Sealed::Bool(b) => Value::Bool(*b),
            Sealed::Number(n) => Value::Number(n.clone()),
            Sealed::String(s) => Value::String(s.clone()),
            Sealed::Array(items) => Value::Array(items.iter().map(Frozen::to_value).collect()),
            Sealed::Object(map) => Value::Object(
                map.iter()
                    .map(|(key, value)| (key.clone(), value.to_value()))
                    .collect::<Map<String, Value>>(),
            ),
        }
    }
}

/// Reject values nested deeper than [`MAX_STATE_DEPTH`].
///
/// Top-level slot values sit at depth 1.
pub(crate) fn check_depth(value: &Value) -> Result<(), StoreError> {
    fn within(value: &Value, depth: usize) -> bool {
        if depth > MAX_STATE_DEPTH {
            return false;
        }
        match value {
            Value::Array(items) => items.iter().all(|item| within(item, depth + 1)),
            Value::Object(map) => map.values().all(|item| within(item, depth + 1)),
            _ => true,
        }
    }

    if within(value, 1) {
        Ok(())
    } else {
        Err(StoreError::StateTooDeep {
            max: MAX_STATE_DEPTH,
        })
    }
}

impl PartialEq for Frozen {
    fn eq(&self, other: &Frozen) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        match (&*self.0, &*other.0) {
            (Sealed::Null, Sealed::Null) => true,
            (Sealed::Bool(a), Sealed::Bool(b)) => a == b,
            (Sealed::Number(a), Sealed::Number(b)) => a == b,
            (Sealed::String(a), Sealed::String(b)) => a == b,
            (Sealed::Array(a), Sealed::Array(b)) => a == b,
            (Sealed::Object(a), Sealed::Object(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialEq<Value> for Frozen {
    fn eq(&self, other: &Value) -> bool {
        match (&*self.0, other) {
            (Sealed::Null, Value::Null) => true,
            (Sealed::Bool(a), Value::Bool(b)) => a == b,
            (Sealed::Number(a), Value::Number(b)) => a == b,
            (Sealed::String(a), Value::String(b)) => a == b,
            (Sealed::Array(a), Value::Array(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x == y)
            }
            (Sealed::Object(a), Value::Object(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .all(|(key, x)| b.get(key).is_some_and(|y| x == y))
            }
            _ => false,
        }
    }
}

impl From<&Frozen> for Value {
    fn from(frozen: &Frozen) -> Self {
        frozen.to_value()
    }
}

impl Serialize for Frozen {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match &*self.0 {
            Sealed::Null => serializer.serialize_unit(),
            Sealed::Bool(b) => serializer.serialize_bool(*b),
            Sealed::Number(n) => n.serialize(serializer),
            Sealed::String(s) => serializer.serialize_str(s),
            Sealed::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Sealed::Object(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (key, value) in map {
                    out.serialize_entry(key, value)?;
                }
                out.end()
            }
        }
    }
}

impl fmt::Debug for Frozen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frozen({})", self)
    }
}

impl fmt::Display for Frozen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_seal_nested_objects_are_reachable_read_only() {
        let frozen = Frozen::seal(&json!({ "a": { "b": { "c": { "d": null }, "d": null } } }));

        let leaf = frozen
            .get("a")
            .and_then(|a| a.get("b"))
            .and_then(|b| b.get("c"))
            .and_then(|c| c.get("d"))
            .unwrap();
        assert!(leaf.is_null());
        assert!(frozen.get("a").unwrap().get("b").unwrap().is_object());
    }

    #[test]
    fn test_round_trips_to_value() {
        let value = json!({ "b": [1, 2], "c": { "a": "x" }, "f": 1.5, "t": true });
        assert_eq!(Frozen::seal(&value).to_value(), value);
    }

    #[test]
    fn test_compares_against_plain_values() {
        let frozen = Frozen::seal(&json!([1, { "a": 2 }]));
        assert_eq!(frozen, json!([1, { "a": 2 }]));
        assert_ne!(frozen, json!([1, { "a": 3 }]));
        assert_ne!(frozen, json!([1]));
        assert_eq!(frozen.index(1).unwrap().get("a").unwrap().as_i64(), Some(2));
    }

    #[test]
    fn test_clones_share_the_same_tree() {
        let frozen = Frozen::seal(&json!({ "a": 1 }));
        let clone = frozen.clone();
        assert!(frozen.ptr_eq(&clone));
        assert!(!frozen.ptr_eq(&Frozen::seal(&json!({ "a": 1 }))));
    }

    #[test]
    fn test_display_is_json() {
        let frozen = Frozen::seal(&json!({ "a": [1, "two"] }));
        assert_eq!(frozen.to_string(), r#"{"a":[1,"two"]}"#);
    }

    #[test]
    fn test_check_depth_bounds_nesting() {
        let mut value = json!(0);
        for _ in 0..MAX_STATE_DEPTH - 1 {
            value = json!([value]);
        }
        assert!(check_depth(&value).is_ok());

        let too_deep = json!([value]);
        assert!(matches!(
            check_depth(&too_deep),
            Err(StoreError::StateTooDeep { max: MAX_STATE_DEPTH })
        ));
    }
}
