//! RecordStream Core - KeySpec paths and records
//!
//! This crate provides the data-side primitives shared by every snippet
//! runner, with no I/O dependencies:
//!
//! - KeySpec parsing (`a/b`, `#N` indices, `@` fuzzy matching, `\/` escapes)
//! - Path resolution: read, existence check, and write with vivification
//! - The `Record` wrapper around one JSON object
//! - Resource limits shared with the snippet interpreter
//! - Error types

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod keyspec;
pub mod limits;
pub mod record;
pub mod resolve;

// Re-export commonly used types
pub use error::{KeySpecError, RecordError};
pub use keyspec::KeySpec;
pub use record::Record;
pub use resolve::Key;

use serde_json::Value;

/// Get a human-readable type name for a JSON value
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
