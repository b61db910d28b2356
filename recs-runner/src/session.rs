//! Session state machine
//!
//! One session serves one inbound stream: it waits for `init`, validates the
//! mode, compiles the snippet, then processes records one at a time until
//! `done`, end of input, or a fatal fault.

use crate::channel::{LineReader, LineWriter};
use crate::error::{InvalidMode, ProtocolFault, RunnerError};
use crate::evaluator::{Bindings, CompileFault, EmitBuffer, EvalOutcome, Evaluator};
use crate::protocol::{Inbound, Mode, Outbound};
use recs_core::Record;
use serde_json::{Map, Value};
use std::io::{BufRead, Write};
use tracing::{debug, trace, warn};

/// Default value of the `filename` binding
pub const DEFAULT_FILENAME: &str = "NONE";

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Value exposed to snippets as `filename`
    pub filename: String,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            filename: DEFAULT_FILENAME.to_string(),
        }
    }
}

/// Where the session is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the first message
    AwaitInit,
    /// Mode accepted, snippet not yet compiled
    Validated,
    /// Reading and processing records
    ProcessingRecords,
    /// No further messages will be read or written
    Terminated,
}

/// How a session ended
#[derive(Debug, Clone)]
pub enum SessionOutcome {
    /// `done` or end of input after a successful init
    Completed,
    /// The output stream closed; the session stopped without reporting
    PeerGone,
    /// A fatal fault, already reported on the wire
    Failed(RunnerError),
}

impl SessionOutcome {
    /// Whether the session ended on a fatal fault
    pub fn is_failure(&self) -> bool {
        matches!(self, SessionOutcome::Failed(_))
    }
}

/// Statistics for a finished session
#[derive(Debug, Clone)]
pub struct SessionSummary {
    /// Final outcome
    pub outcome: SessionOutcome,
    /// Record messages received and processed
    pub records_processed: u64,
    /// Records whose snippet run raised
    pub records_failed: u64,
    /// Messages successfully written
    pub messages_written: usize,
}

/// Early exit from the session loop
enum Halt {
    PeerGone,
    Fatal(RunnerError),
}

impl From<ProtocolFault> for Halt {
    fn from(err: ProtocolFault) -> Self {
        Halt::Fatal(err.into())
    }
}

impl From<InvalidMode> for Halt {
    fn from(err: InvalidMode) -> Self {
        Halt::Fatal(err.into())
    }
}

impl From<CompileFault> for Halt {
    fn from(err: CompileFault) -> Self {
        Halt::Fatal(err.into())
    }
}

/// Drives one protocol session over a reader/writer pair.
pub struct Session<E: Evaluator, R, W> {
    evaluator: E,
    reader: LineReader<R>,
    writer: LineWriter<W>,
    options: SessionOptions,
    state: SessionState,
    records_processed: u64,
    records_failed: u64,
}

impl<E: Evaluator, R: BufRead, W: Write> Session<E, R, W> {
    /// Create a session over `input` and `output`
    pub fn new(evaluator: E, input: R, output: W, options: SessionOptions) -> Self {
        Self {
            evaluator,
            reader: LineReader::new(input),
            writer: LineWriter::new(output),
            options,
            state: SessionState::AwaitInit,
            records_processed: 0,
            records_failed: 0,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Run the session to completion.
    ///
    /// Fatal faults are reported as a single `error` message before the
    /// session terminates. A closed output stream ends the session silently.
    pub fn run(&mut self) -> SessionSummary {
        let outcome = match self.drive() {
            Ok(()) => SessionOutcome::Completed,
            Err(Halt::PeerGone) => {
                debug!("output closed; stopping");
                SessionOutcome::PeerGone
            }
            Err(Halt::Fatal(err)) => {
                debug!(error = %err, "session failed");
                let message = Outbound::Error {
                    message: err.to_string(),
                };
                if self.writer.send(&message) {
                    SessionOutcome::Failed(err)
                } else {
                    SessionOutcome::PeerGone
                }
            }
        };
        self.state = SessionState::Terminated;

        SessionSummary {
            outcome,
            records_processed: self.records_processed,
            records_failed: self.records_failed,
            messages_written: self.writer.messages_written(),
        }
    }

    /// Recover the output stream
    pub fn into_output(self) -> W {
        self.writer.into_inner()
    }

    fn drive(&mut self) -> Result<(), Halt> {
        let (mode, compiled) = self.start()?;
        self.state = SessionState::ProcessingRecords;

        loop {
            match self.reader.next_message()? {
                None => {
                    debug!("end of input");
                    return Ok(());
                }
                Some(Inbound::Done) => {
                    debug!("done received");
                    return Ok(());
                }
                Some(Inbound::Record { data }) => {
                    self.records_processed += 1;
                    let line_num = self.records_processed;
                    self.process_record(&compiled, mode, data, line_num)?;
                }
                Some(other) => {
                    trace!(kind = other.kind(), "ignoring message");
                }
            }
        }
    }

    fn start(&mut self) -> Result<(Mode, E::Compiled), Halt> {
        let (code, mode) = match self.reader.next_message()? {
            Some(Inbound::Init { code, mode }) => (code, mode),
            Some(other) => {
                return Err(ProtocolFault::UnexpectedMessage {
                    found: other.kind().to_string(),
                }
                .into())
            }
            None => return Err(ProtocolFault::MissingInit.into()),
        };

        let mode: Mode = mode.parse()?;
        self.state = SessionState::Validated;

        let compiled = self.evaluator.compile(&code, mode)?;
        debug!(%mode, "snippet compiled");
        Ok((mode, compiled))
    }

    fn process_record(
        &mut self,
        compiled: &E::Compiled,
        mode: Mode,
        data: Map<String, Value>,
        line_num: u64,
    ) -> Result<(), Halt> {
        let mut record = Record::new(data);
        let mut emits = EmitBuffer::new();

        let result = self.evaluator.run(
            compiled,
            mode,
            Bindings {
                record: &mut record,
                line_num,
                filename: &self.options.filename,
                emits: &mut emits,
            },
        );

        match result {
            Ok(outcome) => self.deliver(mode, record, outcome, emits)?,
            Err(fault) => {
                self.records_failed += 1;
                warn!(record = line_num, kind = %fault.kind, "snippet raised");
                self.send(Outbound::Error {
                    message: format!("Error processing record {line_num}: {}", fault.render()),
                })?;
            }
        }

        self.send(Outbound::RecordDone)
    }

    fn deliver(
        &mut self,
        mode: Mode,
        mut record: Record,
        outcome: EvalOutcome,
        mut emits: EmitBuffer,
    ) -> Result<(), Halt> {
        match mode {
            Mode::Grep => self.send(Outbound::Filter {
                passed: outcome.is_truthy(),
            }),
            Mode::Eval => {
                if let Some(Value::Object(fields)) = outcome.value {
                    record.merge(fields);
                }
                self.send(Outbound::Result {
                    data: record.into_map(),
                })
            }
            Mode::Xform | Mode::Generate => {
                for emitted in emits.drain() {
                    self.send(Outbound::Emit {
                        data: emitted.into_map(),
                    })?;
                }
                Ok(())
            }
        }
    }

    fn send(&mut self, message: Outbound) -> Result<(), Halt> {
        if self.writer.send(&message) {
            Ok(())
        } else {
            Err(Halt::PeerGone)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::RuntimeFault;
    use serde_json::json;
    use std::io::Cursor;

    /// Passes records whose `keep` field is true; raises on `boom`.
    struct KeepField;

    impl Evaluator for KeepField {
        type Compiled = ();

        fn compile(&self, source: &str, _mode: Mode) -> Result<(), CompileFault> {
            if source == "keep" {
                Ok(())
            } else {
                Err(CompileFault::new("expected 'keep'"))
            }
        }

        fn run(&self, _: &(), _: Mode, bindings: Bindings<'_>) -> Result<EvalOutcome, RuntimeFault> {
            if bindings.record.contains_key("boom") {
                return Err(RuntimeFault::new("ValueError", "boom"));
            }
            let keep = bindings.record.field("keep").cloned().unwrap_or(Value::Null);
            Ok(EvalOutcome::value(keep))
        }
    }

    fn run(input: &str) -> (SessionSummary, Vec<Value>, SessionState) {
        let mut session = Session::new(
            KeepField,
            Cursor::new(input.to_string()),
            Vec::new(),
            SessionOptions::default(),
        );
        let summary = session.run();
        let state = session.state();
        let output = String::from_utf8(session.into_output()).unwrap();
        let messages = output
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        (summary, messages, state)
    }

    #[test]
    fn filters_records_in_order() {
        let input = concat!(
            r#"{"type":"init","code":"keep","mode":"grep"}"#, "\n",
            r#"{"type":"record","data":{"keep":true}}"#, "\n",
            r#"{"type":"record","data":{"keep":false}}"#, "\n",
            r#"{"type":"done"}"#, "\n",
        );
        let (summary, messages, state) = run(input);

        assert!(matches!(summary.outcome, SessionOutcome::Completed));
        assert_eq!(summary.records_processed, 2);
        assert_eq!(state, SessionState::Terminated);
        assert_eq!(
            messages,
            vec![
                json!({"type": "filter", "passed": true}),
                json!({"type": "record_done"}),
                json!({"type": "filter", "passed": false}),
                json!({"type": "record_done"}),
            ]
        );
    }

    #[test]
    fn runtime_fault_is_scoped_to_record() {
        let input = concat!(
            r#"{"type":"init","code":"keep","mode":"grep"}"#, "\n",
            r#"{"type":"record","data":{"boom":1}}"#, "\n",
            r#"{"type":"record","data":{"keep":1}}"#, "\n",
        );
        let (summary, messages, _) = run(input);

        assert_eq!(summary.records_failed, 1);
        assert_eq!(
            messages,
            vec![
                json!({"type": "error", "message": "Error processing record 1: ValueError: boom"}),
                json!({"type": "record_done"}),
                json!({"type": "filter", "passed": true}),
                json!({"type": "record_done"}),
            ]
        );
    }

    #[test]
    fn compile_failure_is_fatal() {
        let (summary, messages, _) = run(r#"{"type":"init","code":"nope","mode":"grep"}"#);
        assert!(summary.outcome.is_failure());
        assert_eq!(
            messages,
            vec![json!({"type": "error", "message": "SyntaxError in snippet: expected 'keep'"})]
        );
    }

    #[test]
    fn eval_merges_object_results() {
        let input = concat!(
            r#"{"type":"init","code":"keep","mode":"eval"}"#, "\n",
            r#"{"type":"record","data":{"a":1,"keep":{"b":2}}}"#, "\n",
        );
        let (_, messages, _) = run(input);
        assert_eq!(
            messages[0],
            json!({"type": "result", "data": {"a": 1, "keep": {"b": 2}, "b": 2}})
        );
    }
}
