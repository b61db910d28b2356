//! Error types for the runner protocol and session

use crate::evaluator::CompileFault;
use crate::protocol::Mode;
use thiserror::Error;

/// Framing and handshake errors. Always fatal to the session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolFault {
    /// Input ended before any message arrived.
    #[error("No init message received")]
    MissingInit,
    /// The first message was not `init`.
    #[error("Expected init message, got: {found}")]
    UnexpectedMessage {
        /// Type discriminator of the message that arrived instead
        found: String,
    },
    /// A line could not be decoded into a message.
    #[error("Malformed message on line {line}: {reason}")]
    Malformed {
        /// 1-based line number in the inbound stream
        line: usize,
        /// Decoder diagnostic
        reason: String,
    },
}

/// The declared mode is not one of the supported modes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid mode: {mode:?}. Must be one of [{}]", Mode::names().join(", "))]
pub struct InvalidMode {
    /// Mode string as received
    pub mode: String,
}

/// Fatal session errors, reported once on the wire before shutdown
#[derive(Debug, Clone, Error)]
pub enum RunnerError {
    /// Missing or invalid init message, or unreadable framing.
    #[error(transparent)]
    Protocol(#[from] ProtocolFault),
    /// Mode outside the supported set.
    #[error(transparent)]
    Mode(#[from] InvalidMode),
    /// Snippet failed to compile.
    #[error("SyntaxError in snippet: {0}")]
    Compile(#[from] CompileFault),
}
