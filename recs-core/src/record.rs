//! Record wrapper with KeySpec access

use crate::error::{KeySpecError, RecordError};
use crate::keyspec::KeySpec;
use crate::resolve;
use ahash::AHashSet;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// One JSON object flowing through the pipeline.
///
/// The wrapped value is always an object; every constructor enforces it and
/// no operation can replace the root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    #[serde(deserialize_with = "deserialize_object")]
    data: Value,
}

fn deserialize_object<'de, D>(deserializer: D) -> Result<Value, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let map = Map::<String, Value>::deserialize(deserializer)?;
    Ok(Value::Object(map))
}

impl Record {
    /// Wrap an object
    pub fn new(fields: Map<String, Value>) -> Self {
        Self {
            data: Value::Object(fields),
        }
    }

    /// Empty record
    pub fn empty() -> Self {
        Self::new(Map::new())
    }

    fn fields(&self) -> &Map<String, Value> {
        match &self.data {
            Value::Object(map) => map,
            _ => unreachable!("record data is always an object"),
        }
    }

    fn fields_mut(&mut self) -> &mut Map<String, Value> {
        match &mut self.data {
            Value::Object(map) => map,
            _ => unreachable!("record data is always an object"),
        }
    }

    /// Read a value by KeySpec. Missing paths yield `Ok(None)`.
    pub fn get(&self, spec: &str) -> Result<Option<&Value>, KeySpecError> {
        resolve::get(&self.data, &KeySpec::parse(spec))
    }

    /// Write a value by KeySpec, creating intermediate containers.
    pub fn set(&mut self, spec: &str, value: Value) -> Result<(), KeySpecError> {
        resolve::set(&mut self.data, &KeySpec::parse(spec), value)
    }

    /// Check whether a KeySpec resolves in this record.
    pub fn has(&self, spec: &str) -> Result<bool, KeySpecError> {
        resolve::has(&self.data, &KeySpec::parse(spec))
    }

    /// Concrete keys a KeySpec resolves to (see [`resolve::key_chain`]).
    pub fn key_chain(&self, spec: &str) -> Result<Vec<String>, KeySpecError> {
        resolve::key_chain(&self.data, &KeySpec::parse(spec))
    }

    /// Remove top-level fields, returning their previous values (`null` for
    /// fields that were absent) in argument order.
    pub fn remove<I, S>(&mut self, names: I) -> Vec<Value>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let fields = self.fields_mut();
        names
            .into_iter()
            .map(|name| fields.shift_remove(name.as_ref()).unwrap_or(Value::Null))
            .collect()
    }

    /// Rename a top-level field.
    ///
    /// `new` is always written (with `null` when `old` is absent) and `old` is
    /// always removed afterwards, so renaming a field onto itself drops it.
    pub fn rename(&mut self, old: &str, new: &str) {
        let fields = self.fields_mut();
        let value = fields.get(old).cloned().unwrap_or(Value::Null);
        fields.insert(new.to_string(), value);
        fields.shift_remove(old);
    }

    /// Drop every top-level field not named in `allowed`.
    pub fn prune_to<I, S>(&mut self, allowed: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keep: AHashSet<String> = allowed
            .into_iter()
            .map(|name| name.as_ref().to_string())
            .collect();
        self.fields_mut().retain(|name, _| keep.contains(name));
    }

    /// Merge entries into the record, overwriting existing fields.
    pub fn merge(&mut self, entries: Map<String, Value>) {
        let fields = self.fields_mut();
        for (name, value) in entries {
            fields.insert(name, value);
        }
    }

    /// Top-level field lookup (no KeySpec parsing)
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields().get(name)
    }

    /// Mutable top-level field lookup
    pub fn field_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.fields_mut().get_mut(name)
    }

    /// Insert a top-level field, returning the previous value
    pub fn insert(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.fields_mut().insert(name.into(), value)
    }

    /// Whether a top-level field exists
    pub fn contains_key(&self, name: &str) -> bool {
        self.fields().contains_key(name)
    }

    /// Top-level field names in insertion order
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.fields().keys()
    }

    /// Top-level entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields().iter()
    }

    /// Number of top-level fields
    pub fn len(&self) -> usize {
        self.fields().len()
    }

    /// True when the record has no fields
    pub fn is_empty(&self) -> bool {
        self.fields().is_empty()
    }

    /// Borrow the underlying object
    pub fn as_map(&self) -> &Map<String, Value> {
        self.fields()
    }

    /// Mutably borrow the underlying object. The root stays an object.
    pub fn as_map_mut(&mut self) -> &mut Map<String, Value> {
        self.fields_mut()
    }

    /// Borrow the record as a JSON value
    pub fn as_value(&self) -> &Value {
        &self.data
    }

    /// Copy of the underlying object, for transmission
    pub fn to_map(&self) -> Map<String, Value> {
        self.fields().clone()
    }

    /// Consume the record, yielding its object
    pub fn into_map(self) -> Map<String, Value> {
        match self.data {
            Value::Object(map) => map,
            _ => unreachable!("record data is always an object"),
        }
    }

    /// Consume the record, yielding a JSON value
    pub fn into_value(self) -> Value {
        self.data
    }
}

impl Default for Record {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<Map<String, Value>> for Record {
    fn from(fields: Map<String, Value>) -> Self {
        Self::new(fields)
    }
}

impl TryFrom<Value> for Record {
    type Error = RecordError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self::new(map)),
            other => Err(RecordError::NotAnObject {
                found_type: crate::type_name(&other),
            }),
        }
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.data)
    }
}
