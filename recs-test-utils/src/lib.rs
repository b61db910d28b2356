//! RecordStream Test Utilities
//!
//! Shared helpers for driving runner sessions from tests: protocol line
//! builders, transcript runners, response grouping, a scripted evaluator
//! and a writer that simulates the orchestrator hanging up.

use recs_runner::{
    Bindings, CompileFault, EvalOutcome, Evaluator, Mode, Record, RuntimeFault, SessionOptions,
    SessionSummary,
};
use serde_json::{json, Map, Value};
use std::io::{self, Cursor, ErrorKind, Write};

/// `init` message line
pub fn init(code: &str, mode: &str) -> String {
    json!({"type": "init", "code": code, "mode": mode}).to_string()
}

/// `record` message line
pub fn record(data: Value) -> String {
    json!({"type": "record", "data": data}).to_string()
}

/// `done` message line
pub fn done() -> String {
    json!({"type": "done"}).to_string()
}

/// Join message lines into one newline-terminated input stream
pub fn transcript<S: AsRef<str>>(lines: &[S]) -> String {
    let mut out = String::new();
    for line in lines {
        out.push_str(line.as_ref());
        out.push('\n');
    }
    out
}

/// Parse runner output into one JSON value per line
pub fn parse_responses(output: &[u8]) -> Vec<Value> {
    String::from_utf8_lossy(output)
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            serde_json::from_str(line)
                .unwrap_or_else(|e| panic!("runner wrote invalid JSON {line:?}: {e}"))
        })
        .collect()
}

/// Messages produced for one record, up to and including `record_done`
#[derive(Debug, Clone, PartialEq)]
pub struct RecordOutcome {
    /// Messages before the terminating `record_done`
    pub messages: Vec<Value>,
}

impl RecordOutcome {
    /// Type discriminators of the messages, in order
    pub fn kinds(&self) -> Vec<&str> {
        self.messages
            .iter()
            .map(|m| m["type"].as_str().unwrap_or(""))
            .collect()
    }

    /// `data` payloads of `emit` messages, in order
    pub fn emitted(&self) -> Vec<&Value> {
        self.messages
            .iter()
            .filter(|m| m["type"] == "emit")
            .map(|m| &m["data"])
            .collect()
    }

    /// Error message text, if the record failed
    pub fn error(&self) -> Option<&str> {
        self.messages
            .iter()
            .find(|m| m["type"] == "error")
            .and_then(|m| m["message"].as_str())
    }
}

/// Split responses at each `record_done`.
///
/// Returns the per-record groups and any trailing messages that were not
/// terminated by `record_done`.
pub fn group_responses(responses: Vec<Value>) -> (Vec<RecordOutcome>, Vec<Value>) {
    let mut groups = Vec::new();
    let mut current = Vec::new();
    for message in responses {
        if message["type"] == "record_done" {
            groups.push(RecordOutcome {
                messages: std::mem::take(&mut current),
            });
        } else {
            current.push(message);
        }
    }
    (groups, current)
}

/// Run a session over the given input lines with default options
pub fn run_transcript<E: Evaluator, S: AsRef<str>>(
    evaluator: E,
    lines: &[S],
) -> (SessionSummary, Vec<Value>) {
    run_transcript_with(evaluator, lines, SessionOptions::default())
}

/// Run a session over the given input lines
pub fn run_transcript_with<E: Evaluator, S: AsRef<str>>(
    evaluator: E,
    lines: &[S],
    options: SessionOptions,
) -> (SessionSummary, Vec<Value>) {
    let input = Cursor::new(transcript(lines));
    let mut output = Vec::new();
    let summary = recs_runner::run_session(evaluator, input, &mut output, options);
    (summary, parse_responses(&output))
}

/// Writer that accepts a fixed number of writes, then fails with
/// `BrokenPipe` forever.
#[derive(Debug, Default)]
pub struct BrokenPipeWriter {
    remaining: usize,
    /// Bytes accepted before the pipe broke
    pub accepted: Vec<u8>,
}

impl BrokenPipeWriter {
    /// Break after `writes` successful write calls
    pub fn after(writes: usize) -> Self {
        Self {
            remaining: writes,
            accepted: Vec::new(),
        }
    }
}

impl Write for BrokenPipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.remaining == 0 {
            return Err(io::Error::new(ErrorKind::BrokenPipe, "reader hung up"));
        }
        self.remaining -= 1;
        self.accepted.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Evaluator driven by a JSON script instead of real code.
///
/// The snippet source is a JSON object with these optional keys, applied in
/// this order for each record:
///
/// - `fail_if`: KeySpec; when present in the record, raise `ValueError`
/// - `set`: object of KeySpec → value, written into the record
/// - `copy`: object of source KeySpec → target KeySpec
/// - `bind`: object of binding name (`line_num` or `filename`) → KeySpec
///   the binding's value is stored under
/// - `emit`: array of objects to emit
/// - `emit_record`: when true, emit the (mutated) record itself
/// - `return`: final value
/// - `return_field`: KeySpec whose value becomes the final value
#[derive(Debug, Default, Clone, Copy)]
pub struct ScriptedEvaluator;

impl Evaluator for ScriptedEvaluator {
    type Compiled = Map<String, Value>;

    fn compile(&self, source: &str, _mode: Mode) -> Result<Self::Compiled, CompileFault> {
        match serde_json::from_str(source) {
            Ok(Value::Object(script)) => Ok(script),
            Ok(_) => Err(CompileFault::new("script must be a JSON object")),
            Err(e) => Err(CompileFault::new(e.to_string())),
        }
    }

    fn run(
        &self,
        script: &Self::Compiled,
        _mode: Mode,
        bindings: Bindings<'_>,
    ) -> Result<EvalOutcome, RuntimeFault> {
        let Bindings {
            record,
            line_num,
            filename,
            emits,
        } = bindings;

        if let Some(spec) = script.get("fail_if").and_then(Value::as_str) {
            if record.has(spec).map_err(key_fault)? {
                return Err(RuntimeFault::new("ValueError", format!("{spec} is present")));
            }
        }

        if let Some(Value::Object(writes)) = script.get("set") {
            for (spec, value) in writes {
                record.set(spec, value.clone()).map_err(key_fault)?;
            }
        }

        if let Some(Value::Object(copies)) = script.get("copy") {
            for (from, to) in copies {
                let value = record.get(from).map_err(key_fault)?.cloned();
                let to = to.as_str().unwrap_or_default();
                record
                    .set(to, value.unwrap_or(Value::Null))
                    .map_err(key_fault)?;
            }
        }

        if let Some(Value::Object(binds)) = script.get("bind") {
            for (name, spec) in binds {
                let value = match name.as_str() {
                    "line_num" => json!(line_num),
                    "filename" => json!(filename),
                    other => return Err(RuntimeFault::new("NameError", other)),
                };
                record
                    .set(spec.as_str().unwrap_or_default(), value)
                    .map_err(key_fault)?;
            }
        }

        if let Some(Value::Array(items)) = script.get("emit") {
            for item in items {
                let emitted = Record::try_from(item.clone())
                    .map_err(|e| RuntimeFault::new("TypeError", e.to_string()))?;
                emits.push(emitted);
            }
        }

        if script.get("emit_record") == Some(&Value::Bool(true)) {
            emits.push(record.clone());
        }

        if let Some(value) = script.get("return") {
            return Ok(EvalOutcome::value(value.clone()));
        }
        if let Some(spec) = script.get("return_field").and_then(Value::as_str) {
            let value = record
                .get(spec)
                .map_err(key_fault)?
                .cloned()
                .unwrap_or(Value::Null);
            return Ok(EvalOutcome::value(value));
        }
        Ok(EvalOutcome::none())
    }
}

fn key_fault(err: recs_core::KeySpecError) -> RuntimeFault {
    RuntimeFault::new("KeySpecError", err.to_string())
}
