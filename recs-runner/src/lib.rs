//! RecordStream Runner - protocol and session for per-record snippets
//!
//! This crate implements the runner side of the line-delimited JSON protocol
//! spoken with the pipeline orchestrator:
//!
//! - Wire messages and their codec
//! - Line-framed reader and writer with peer-gone detection
//! - The session state machine (init, validate, compile, process records)
//! - The `Evaluator` seam that snippet engines implement

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod channel;
pub mod error;
pub mod evaluator;
pub mod protocol;
pub mod session;

// Re-export commonly used types
pub use channel::{LineReader, LineWriter};
pub use error::{InvalidMode, ProtocolFault, RunnerError};
pub use evaluator::{is_truthy, Bindings, CompileFault, EmitBuffer, EvalOutcome, Evaluator, RuntimeFault};
pub use protocol::{Inbound, Mode, Outbound};
pub use recs_core::{KeySpec, Record};
pub use session::{Session, SessionOptions, SessionOutcome, SessionState, SessionSummary};

use std::io::{BufRead, Write};

/// Run one complete session over `input` and `output`.
pub fn run_session<E, R, W>(
    evaluator: E,
    input: R,
    output: W,
    options: SessionOptions,
) -> SessionSummary
where
    E: Evaluator,
    R: BufRead,
    W: Write,
{
    Session::new(evaluator, input, output, options).run()
}
