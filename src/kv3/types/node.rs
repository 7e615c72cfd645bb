//! The decoded document tree.
//!
//! Every value is a [`Node`]: a [`Value`] plus the resource flag that was
//! attached to it on the wire. The tree is plain owned data and is never
//! mutated by the decoder after a node has been attached to its parent.

use std::collections::HashMap;

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use super::models::{KvFlag, Revision};

/// A decoded value together with its resource flag.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub value: Value,
    pub flag: KvFlag,
}

/// The payload of a [`Node`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    UInt64(u64),
    Double(f64),
    /// `None` when the string index on the wire was `-1`.
    String(Option<String>),
    Blob(Vec<u8>),
    Array(Vec<Node>),
    Object(Object),
    Vector2([f64; 2]),
    Vector3([f64; 3]),
    Vector4([f64; 4]),
}

impl Node {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            flag: KvFlag::Nothing,
        }
    }

    pub fn with_flag(value: Value, flag: KvFlag) -> Self {
        Self { value, flag }
    }

    /// Looks up a member when this node is an object.
    pub fn get(&self, name: &str) -> Option<&Node> {
        match &self.value {
            Value::Object(object) => object.get(name),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match &self.value {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Node]> {
        match &self.value {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.value {
            Value::String(Some(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self.value {
            Value::Double(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self.value {
            Value::Int32(i) => Some(i as i64),
            Value::Int64(i) => Some(i),
            _ => None,
        }
    }
}

impl From<Value> for Node {
    fn from(value: Value) -> Self {
        Node::new(value)
    }
}

/// Ordered name → node mapping.
///
/// Insertion order is preserved. Inserting a name that already exists
/// replaces the earlier value in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Object {
    entries: Vec<(String, Node)>,
    /// Name -> position in `entries`.
    index: HashMap<String, usize>,
}

impl Object {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
        }
    }

    /// Inserts `node` under `name`, returning the value it replaced.
    pub fn insert(&mut self, name: impl Into<String>, node: Node) -> Option<Node> {
        let name = name.into();
        if let Some(&pos) = self.index.get(&name) {
            return Some(std::mem::replace(&mut self.entries[pos].1, node));
        }
        self.index.insert(name.clone(), self.entries.len());
        self.entries.push((name, node));
        None
    }

    pub fn get(&self, name: &str) -> Option<&Node> {
        self.index.get(name).map(|&pos| &self.entries[pos].1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Node)> {
        self.entries.iter().map(|(key, node)| (key.as_str(), node))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }
}

/// A fully decoded KV3 block.
#[derive(Debug, Clone, PartialEq)]
pub struct Kv3Document {
    pub revision: Revision,
    /// The block's string table, in wire order.
    pub strings: Vec<String>,
    pub root: Node,
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.value.serialize(serializer)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::Null | Value::String(None) => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int32(i) => serializer.serialize_i32(*i),
            Value::Int64(i) => serializer.serialize_i64(*i),
            Value::UInt64(u) => serializer.serialize_u64(*u),
            Value::Double(d) => serializer.serialize_f64(*d),
            Value::String(Some(s)) => serializer.serialize_str(s),
            Value::Blob(bytes) => bytes.serialize(serializer),
            Value::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Object(object) => object.serialize(serializer),
            Value::Vector2(v) => v.serialize(serializer),
            Value::Vector3(v) => v.serialize(serializer),
            Value::Vector4(v) => v.serialize(serializer),
        }
    }
}

impl Serialize for Object {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (key, node) in self.iter() {
            map.serialize_entry(key, node)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_insert_wins_and_keeps_position() {
        let mut object = Object::new();
        object.insert("a", Value::Int32(1).into());
        object.insert("b", Value::Int32(2).into());
        let replaced = object.insert("a", Value::Int32(3).into());

        assert_eq!(replaced, Some(Value::Int32(1).into()));
        assert_eq!(object.len(), 2);
        assert_eq!(object.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(object.get("a").and_then(Node::as_i64), Some(3));
    }

    #[test]
    fn many_repeated_names_stay_in_first_position() {
        let mut object = Object::new();
        for round in 0..3 {
            for i in 0..50_000 {
                object.insert(format!("k{}", i), Value::Int32(round).into());
            }
        }

        assert_eq!(object.len(), 50_000);
        assert_eq!(object.keys().next(), Some("k0"));
        assert_eq!(object.keys().last(), Some("k49999"));
        assert_eq!(object.get("k123").and_then(Node::as_i64), Some(2));
        assert!(object.get("k50000").is_none());
    }

    #[test]
    fn serializes_as_plain_json() {
        let mut inner = Object::new();
        inner.insert("origin", Value::Vector3([1.0, 2.0, 3.0]).into());
        inner.insert("name", Value::String(None).into());
        inner.insert(
            "model",
            Node::with_flag(Value::String(Some("a.vmdl".into())), KvFlag::Resource),
        );
        let root = Node::new(Value::Object(inner));

        let json = serde_json::to_string(&root).unwrap();
        assert_eq!(json, r#"{"origin":[1.0,2.0,3.0],"name":null,"model":"a.vmdl"}"#);
    }
}
