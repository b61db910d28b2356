//! Error types for KeySpec resolution and record access

use thiserror::Error;

/// Errors raised while resolving a KeySpec against a JSON tree
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeySpecError {
    /// The path does not exist. Only produced by existence checks; plain
    /// reads report absence as `None` instead.
    #[error("No such key: '{segment}'")]
    NoSuchKey {
        /// Segment that could not be resolved
        segment: String,
    },
    /// A non-index segment was used against an array.
    #[error(
        "Cannot select non-numeric index: {segment} (did you forget to prefix with a '#'?) for array"
    )]
    NotAnIndex {
        /// Offending segment
        segment: String,
    },
    /// The path tried to descend into a string, number or boolean.
    #[error("Cannot look for '{segment}' in scalar: {scalar}")]
    ScalarTraversal {
        /// Segment being looked up
        segment: String,
        /// Compact JSON rendering of the scalar
        scalar: String,
    },
    /// An array index does not fit the platform's address space, or a write
    /// would pad an array past [`crate::limits::MAX_ARRAY_INDEX`].
    #[error("Array index out of range: {segment}")]
    IndexOutOfRange {
        /// Offending segment
        segment: String,
    },
    /// A write was attempted with a KeySpec that has no segments.
    #[error("Cannot assign to an empty key spec")]
    EmptyPath,
}

impl KeySpecError {
    /// Whether this error only signals that the path is missing.
    pub fn is_missing(&self) -> bool {
        matches!(self, KeySpecError::NoSuchKey { .. })
    }
}

/// Errors raised when building a [`crate::Record`]
#[derive(Debug, Error)]
pub enum RecordError {
    /// Records must wrap a JSON object.
    #[error("Record data must be a JSON object, got {found_type}")]
    NotAnObject {
        /// Type of the rejected value
        found_type: &'static str,
    },
}
