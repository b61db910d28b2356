//! Wire messages for the line-delimited JSON protocol
//!
//! Every message is one compact JSON object on its own line, discriminated by
//! a `type` field.
//!
//! Inbound (orchestrator → runner): `init`, `record`, `done`.
//! Outbound (runner → orchestrator): `result`, `filter`, `emit`,
//! `record_done`, `error`.

use crate::error::InvalidMode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Snippet execution mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Mutate or return one record per input record
    Eval,
    /// Boolean filter
    Grep,
    /// Map each record to zero or more records
    Xform,
    /// Produce records not tied 1:1 to the input
    Generate,
}

impl Mode {
    /// All supported modes
    pub const ALL: [Mode; 4] = [Mode::Eval, Mode::Grep, Mode::Xform, Mode::Generate];

    /// Wire name of the mode
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Eval => "eval",
            Mode::Grep => "grep",
            Mode::Xform => "xform",
            Mode::Generate => "generate",
        }
    }

    /// Wire names of all modes, sorted
    pub fn names() -> [&'static str; 4] {
        let mut names = Self::ALL.map(|mode| mode.as_str());
        names.sort_unstable();
        names
    }

    /// Whether the snippet produces output through `emit`
    pub fn emits(&self) -> bool {
        matches!(self, Mode::Xform | Mode::Generate)
    }
}

impl FromStr for Mode {
    type Err = InvalidMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| InvalidMode {
                mode: s.to_string(),
            })
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message received from the orchestrator
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Starts the session. `mode` is validated by the session, not here.
    Init {
        /// Snippet source
        code: String,
        /// Declared mode, unvalidated
        mode: String,
    },
    /// One record to process
    Record {
        /// Record payload
        data: Map<String, Value>,
    },
    /// Graceful end of stream
    Done,
    /// Any other message type; carried so the session can ignore it
    Other {
        /// Type discriminator as received
        kind: String,
    },
}

impl Inbound {
    /// Type discriminator of this message
    pub fn kind(&self) -> &str {
        match self {
            Inbound::Init { .. } => "init",
            Inbound::Record { .. } => "record",
            Inbound::Done => "done",
            Inbound::Other { kind } => kind,
        }
    }
}

/// Message sent to the orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outbound {
    /// Eval-mode outcome: the (possibly mutated) record
    Result {
        /// Record payload
        data: Map<String, Value>,
    },
    /// Grep-mode outcome
    Filter {
        /// Whether the record passed the filter
        passed: bool,
    },
    /// One xform/generate output record
    Emit {
        /// Record payload
        data: Map<String, Value>,
    },
    /// Terminal marker for the current record
    RecordDone,
    /// Fatal or per-record diagnostic
    Error {
        /// Human-readable diagnostic
        message: String,
    },
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(flatten)]
    body: Map<String, Value>,
}

#[derive(Deserialize)]
struct InitBody {
    code: String,
    mode: String,
}

#[derive(Deserialize)]
struct RecordBody {
    #[serde(default)]
    data: Map<String, Value>,
}

/// Decode one protocol line.
///
/// The line must be a JSON object with a string `type`. Unknown types decode
/// as [`Inbound::Other`]; a `record` without `data` carries an empty object.
pub fn decode_line(line: &str) -> Result<Inbound, String> {
    let value: Value = serde_json::from_str(line).map_err(|e| format!("invalid JSON: {e}"))?;
    if !value.is_object() {
        return Err(format!(
            "expected a JSON object, got {}",
            recs_core::type_name(&value)
        ));
    }

    let Envelope { kind, body } = serde_json::from_value(value)
        .map_err(|e| format!("missing or invalid 'type' field: {e}"))?;

    match kind.as_str() {
        "init" => {
            let InitBody { code, mode } = serde_json::from_value(Value::Object(body))
                .map_err(|e| format!("invalid init message: {e}"))?;
            Ok(Inbound::Init { code, mode })
        }
        "record" => {
            let RecordBody { data } = serde_json::from_value(Value::Object(body))
                .map_err(|e| format!("invalid record message: {e}"))?;
            Ok(Inbound::Record { data })
        }
        "done" => Ok(Inbound::Done),
        _ => Ok(Inbound::Other { kind }),
    }
}

/// Encode an outbound message as compact JSON, without the trailing newline.
pub fn encode_message(message: &Outbound) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn mode_parses_wire_names() {
        for mode in Mode::ALL {
            assert_eq!(mode.as_str().parse::<Mode>().unwrap(), mode);
        }
        assert!("EVAL".parse::<Mode>().is_err());
        assert!("bad_mode".parse::<Mode>().is_err());
    }

    #[test]
    fn mode_names_are_sorted() {
        assert_eq!(Mode::names(), ["eval", "generate", "grep", "xform"]);
    }

    #[test]
    fn decodes_init() {
        let msg = decode_line(r#"{"type":"init","code":"r.age > 20","mode":"grep"}"#).unwrap();
        assert_eq!(
            msg,
            Inbound::Init {
                code: "r.age > 20".to_string(),
                mode: "grep".to_string()
            }
        );
    }

    #[test]
    fn decodes_record_with_and_without_data() {
        let msg = decode_line(r#"{"type":"record","data":{"age":30}}"#).unwrap();
        assert_eq!(
            msg,
            Inbound::Record {
                data: json!({"age": 30}).as_object().unwrap().clone()
            }
        );

        let msg = decode_line(r#"{"type":"record"}"#).unwrap();
        assert_eq!(msg, Inbound::Record { data: Map::new() });
    }

    #[test]
    fn decodes_done_and_unknown() {
        assert_eq!(decode_line(r#"{"type":"done"}"#).unwrap(), Inbound::Done);
        assert_eq!(
            decode_line(r#"{"type":"ping","n":1}"#).unwrap(),
            Inbound::Other {
                kind: "ping".to_string()
            }
        );
    }

    #[test]
    fn rejects_malformed_lines() {
        assert!(decode_line("not json").is_err());
        assert!(decode_line("[1,2]").is_err());
        assert!(decode_line(r#"{"data":{}}"#).is_err());
        assert!(decode_line(r#"{"type":5}"#).is_err());
        assert!(decode_line(r#"{"type":"init","mode":"eval"}"#).is_err());
        assert!(decode_line(r#"{"type":"record","data":[1]}"#).is_err());
    }

    #[test]
    fn encodes_compact_tagged_messages() {
        let cases = [
            (
                Outbound::Result {
                    data: json!({"age": 30, "computed": 60})
                        .as_object()
                        .unwrap()
                        .clone(),
                },
                r#"{"type":"result","data":{"age":30,"computed":60}}"#,
            ),
            (Outbound::Filter { passed: true }, r#"{"type":"filter","passed":true}"#),
            (Outbound::RecordDone, r#"{"type":"record_done"}"#),
            (
                Outbound::Error {
                    message: "boom".to_string(),
                },
                r#"{"type":"error","message":"boom"}"#,
            ),
        ];

        for (message, expected) in cases {
            let encoded = encode_message(&message).unwrap();
            assert_eq!(String::from_utf8(encoded).unwrap(), expected);
        }
    }
}
