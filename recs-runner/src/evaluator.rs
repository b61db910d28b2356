//! The pluggable snippet evaluator seam
//!
//! A session compiles the snippet once after init and then runs the compiled
//! form once per record. Everything the snippet may touch is passed in
//! explicitly through [`Bindings`]; emitted records go into an [`EmitBuffer`]
//! owned by the session and drained after each run.

use crate::protocol::Mode;
use recs_core::Record;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Ordered output buffer for `emit` calls during one run.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct EmitBuffer {
    records: Vec<Record>,
}

impl EmitBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one output record
    pub fn push(&mut self, record: Record) {
        self.records.push(record);
    }

    /// Number of buffered records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when nothing has been emitted
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Take all buffered records in emission order, leaving the buffer empty
    pub fn drain(&mut self) -> std::vec::Drain<'_, Record> {
        self.records.drain(..)
    }

    /// Consume the buffer
    pub fn into_vec(self) -> Vec<Record> {
        self.records
    }
}

/// Names visible to the snippet for one record.
pub struct Bindings<'a> {
    /// Current record, readable and writable
    pub record: &'a mut Record,
    /// 1-based record counter
    pub line_num: u64,
    /// Configured source name
    pub filename: &'a str,
    /// Output buffer for `emit`
    pub emits: &'a mut EmitBuffer,
}

/// What a single run produced besides side effects on the bindings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvalOutcome {
    /// Value of the snippet's final expression, if it ended with one
    pub value: Option<Value>,
}

impl EvalOutcome {
    /// Outcome carrying a final value
    pub fn value(value: Value) -> Self {
        Self { value: Some(value) }
    }

    /// Outcome with no final value
    pub fn none() -> Self {
        Self::default()
    }

    /// Truthiness of the final value; a missing value is false
    pub fn is_truthy(&self) -> bool {
        self.value.as_ref().is_some_and(is_truthy)
    }
}

/// Truthiness shared by grep filtering and snippet conditionals.
///
/// False for `null`, `false`, zero, the empty string, and empty containers.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i != 0
            } else if let Some(u) = n.as_u64() {
                u != 0
            } else {
                n.as_f64().is_some_and(|f| f != 0.0)
            }
        }
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Snippet failed to compile. Fatal to the session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{diagnostic}")]
pub struct CompileFault {
    /// Human-readable diagnostic
    pub diagnostic: String,
}

impl CompileFault {
    /// Create a compile fault
    pub fn new(diagnostic: impl Into<String>) -> Self {
        Self {
            diagnostic: diagnostic.into(),
        }
    }
}

/// Snippet raised during execution. Scoped to one record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct RuntimeFault {
    /// Fault class, e.g. `KeyError`
    pub kind: String,
    /// Fault message
    pub message: String,
    /// Full traceback text, ending in the `kind: message` line
    pub traceback: Option<String>,
}

impl RuntimeFault {
    /// Create a fault without traceback
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            traceback: None,
        }
    }

    /// Attach a rendered traceback
    pub fn with_traceback(mut self, traceback: impl Into<String>) -> Self {
        self.traceback = Some(traceback.into());
        self
    }

    /// Text reported on the wire after "Error processing record N: "
    pub fn render(&self) -> String {
        match &self.traceback {
            Some(traceback) => traceback.clone(),
            None => self.to_string(),
        }
    }
}

/// A snippet engine: compile once, run per record.
pub trait Evaluator {
    /// Compiled form of a snippet, reused for every record in the session
    type Compiled;

    /// Compile `source` for `mode`.
    fn compile(&self, source: &str, mode: Mode) -> Result<Self::Compiled, CompileFault>;

    /// Run a compiled snippet against one record.
    fn run(
        &self,
        compiled: &Self::Compiled,
        mode: Mode,
        bindings: Bindings<'_>,
    ) -> Result<EvalOutcome, RuntimeFault>;
}

impl<E: Evaluator + ?Sized> Evaluator for &E {
    type Compiled = E::Compiled;

    fn compile(&self, source: &str, mode: Mode) -> Result<Self::Compiled, CompileFault> {
        (**self).compile(source, mode)
    }

    fn run(
        &self,
        compiled: &Self::Compiled,
        mode: Mode,
        bindings: Bindings<'_>,
    ) -> Result<EvalOutcome, RuntimeFault> {
        (**self).run(compiled, mode, bindings)
    }
}

impl fmt::Debug for Bindings<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bindings")
            .field("record", &self.record)
            .field("line_num", &self.line_num)
            .field("filename", &self.filename)
            .field("emits", &self.emits.len())
            .finish()
    }
}
