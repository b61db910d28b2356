//! KeySpec resolution against JSON trees
//!
//! Reads never create structure and report a missing path as `None`.
//! Existence checks resolve the same way but treat a missing path as
//! [`KeySpecError::NoSuchKey`] internally. Writes create missing intermediate
//! containers: an array when the segment looked up inside it is an index
//! (`#N`), an object otherwise.

use crate::error::KeySpecError;
use crate::keyspec::KeySpec;
use crate::limits::MAX_ARRAY_INDEX;
use regex::RegexBuilder;
use serde_json::{Map, Value};

/// A concrete key selected for one segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Key {
    /// Array position
    Index(usize),
    /// Object field name
    Field(String),
}

impl Key {
    /// Render the key the way it would appear in a KeySpec
    pub fn to_segment(&self) -> String {
        match self {
            Key::Index(index) => format!("#{index}"),
            Key::Field(name) => name.clone(),
        }
    }
}

/// Decide which key `segment` selects inside `container`.
///
/// Arrays only accept `#N` segments. Objects use the segment verbatim unless
/// `fuzzy` is set, in which case the lookup falls back from an exact match to
/// a case-insensitive prefix match and then a case-insensitive regex search.
pub fn guess_key(container: &Value, segment: &str, fuzzy: bool) -> Result<Key, KeySpecError> {
    match container {
        Value::Array(_) => parse_index(segment).map(Key::Index),
        Value::Object(map) if fuzzy => Ok(Key::Field(fuzzy_field(map, segment))),
        _ => Ok(Key::Field(segment.to_string())),
    }
}

/// Parse a `#N` array index segment
fn parse_index(segment: &str) -> Result<usize, KeySpecError> {
    let digits = segment
        .strip_prefix('#')
        .filter(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()))
        .ok_or_else(|| KeySpecError::NotAnIndex {
            segment: segment.to_string(),
        })?;

    digits
        .parse::<usize>()
        .map_err(|_| KeySpecError::IndexOutOfRange {
            segment: segment.to_string(),
        })
}

/// Fuzzy field lookup. When several keys match at the same tier, the last one
/// in sorted order wins; other runners rely on this ordering.
fn fuzzy_field(map: &Map<String, Value>, segment: &str) -> String {
    if map.contains_key(segment) {
        return segment.to_string();
    }

    let mut sorted: Vec<&String> = map.keys().collect();
    sorted.sort();

    let lowered = segment.to_lowercase();
    if let Some(found) = sorted
        .iter()
        .rev()
        .find(|key| key.to_lowercase().starts_with(&lowered))
    {
        return (*found).clone();
    }

    // Invalid patterns simply don't match.
    if let Ok(pattern) = RegexBuilder::new(segment).case_insensitive(true).build() {
        if let Some(found) = sorted.iter().rev().find(|key| pattern.is_match(key)) {
            return (*found).clone();
        }
    }

    segment.to_string()
}

fn scalar_error(segment: &str, scalar: &Value) -> KeySpecError {
    KeySpecError::ScalarTraversal {
        segment: segment.to_string(),
        scalar: scalar.to_string(),
    }
}

/// Shared read-side walk.
///
/// With `throw_on_missing` a missing path is an error; otherwise it is
/// `Ok(None)`. When `chain` is given, the concrete keys visited are recorded.
fn walk<'a>(
    tree: &'a Value,
    spec: &KeySpec,
    throw_on_missing: bool,
    mut chain: Option<&mut Vec<String>>,
) -> Result<Option<&'a Value>, KeySpecError> {
    let segments = spec.segments();
    let mut current = tree;

    for (idx, segment) in segments.iter().enumerate() {
        let missing = || {
            if throw_on_missing {
                Err(KeySpecError::NoSuchKey {
                    segment: segment.clone(),
                })
            } else {
                Ok(None)
            }
        };

        match current {
            Value::Null => return missing(),
            Value::Array(_) | Value::Object(_) => {}
            scalar => return Err(scalar_error(segment, scalar)),
        }

        let key = guess_key(current, segment, spec.is_fuzzy())?;
        let child = match (&key, current) {
            (Key::Index(index), Value::Array(items)) => items.get(*index),
            (Key::Field(name), Value::Object(map)) => map.get(name),
            _ => None,
        };

        let Some(child) = child else {
            return missing();
        };

        let is_last = idx + 1 == segments.len();
        if !is_last && child.is_null() {
            return missing();
        }

        if let Some(chain) = chain.as_deref_mut() {
            chain.push(key.to_segment());
        }
        current = child;
    }

    Ok(Some(current))
}

/// Read the value at `spec`. Missing paths yield `Ok(None)`; a key that is
/// present with a `null` value yields `Ok(Some(Value::Null))`.
pub fn get<'a>(tree: &'a Value, spec: &KeySpec) -> Result<Option<&'a Value>, KeySpecError> {
    walk(tree, spec, false, None)
}

/// Check whether `spec` resolves in `tree`.
///
/// Usage faults (non-index segment against an array, descending into a
/// scalar) are still reported as errors.
pub fn has(tree: &Value, spec: &KeySpec) -> Result<bool, KeySpecError> {
    match walk(tree, spec, true, None) {
        Ok(_) => Ok(true),
        Err(err) if err.is_missing() => Ok(false),
        Err(err) => Err(err),
    }
}

/// Concrete keys `spec` resolves to, with array positions as `#N`.
/// Returns an empty list when the path does not resolve.
pub fn key_chain(tree: &Value, spec: &KeySpec) -> Result<Vec<String>, KeySpecError> {
    let mut chain = Vec::with_capacity(spec.len());
    match walk(tree, spec, false, Some(&mut chain))? {
        Some(_) => Ok(chain),
        None => Ok(Vec::new()),
    }
}

/// Write `value` at `spec`, creating intermediate containers as needed.
///
/// Array writes past the end pad with `null`.
pub fn set(tree: &mut Value, spec: &KeySpec, value: Value) -> Result<(), KeySpecError> {
    if spec.is_empty() {
        return Err(KeySpecError::EmptyPath);
    }

    let mut current = tree;
    for segment in spec.segments() {
        current = slot_mut(current, segment, spec.is_fuzzy())?;
    }
    *current = value;
    Ok(())
}

/// Mutable slot for `segment` inside `container`, vivifying as it goes.
///
/// A `null` container is replaced with an empty array (for `#N` segments) or
/// object before the lookup. Missing slots are created as `null`.
fn slot_mut<'a>(
    container: &'a mut Value,
    segment: &str,
    fuzzy: bool,
) -> Result<&'a mut Value, KeySpecError> {
    if container.is_null() {
        *container = if segment.starts_with('#') {
            Value::Array(Vec::new())
        } else {
            Value::Object(Map::new())
        };
    }

    match container {
        Value::Array(items) => {
            let index = parse_index(segment)?;
            if items.len() <= index {
                let len = index
                    .checked_add(1)
                    .filter(|&len| len <= MAX_ARRAY_INDEX)
                    .ok_or_else(|| KeySpecError::IndexOutOfRange {
                        segment: segment.to_string(),
                    })?;
                items.resize(len, Value::Null);
            }
            Ok(&mut items[index])
        }
        Value::Object(map) => {
            let field = if fuzzy {
                fuzzy_field(map, segment)
            } else {
                segment.to_string()
            };
            Ok(map.entry(field).or_insert(Value::Null))
        }
        scalar => Err(scalar_error(segment, scalar)),
    }
}
