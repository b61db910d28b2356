//! RecordStream Snippets - the per-record expression language
//!
//! Snippets are compiled once per session and run against every record:
//!
//! - `lexer` and `parser` turn source into a [`Program`]
//! - `interp` walks the program with the record, counters and emit buffer
//! - [`SnippetEvaluator`] plugs the language into `recs_runner`'s session
//!
//! ```text
//! r.total = r.price * r.qty
//! if {{name}} =~ '^a' { emit({"name": {{name}}}) }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod ast;
pub mod builtins;
pub mod error;
pub mod evaluator;
pub mod interp;
pub mod lexer;
pub mod parser;
pub mod value;

// Re-export commonly used types
pub use ast::{Program, Span};
pub use error::{Fault, FaultKind, SyntaxError};
pub use evaluator::{compile, Snippet, SnippetEvaluator};
pub use parser::parse;
pub use value::Val;
