//! The snippet language behind the runner's [`Evaluator`] seam

use crate::ast::{Program, Span, StmtKind};
use crate::error::SyntaxError;
use crate::interp::Interpreter;
use crate::parser::parse;
use recs_runner::{Bindings, CompileFault, EvalOutcome, Evaluator, Mode, RuntimeFault};

/// Evaluator for the built-in snippet language
#[derive(Debug, Clone, Copy, Default)]
pub struct SnippetEvaluator;

/// A compiled snippet
#[derive(Debug, Clone)]
pub struct Snippet {
    program: Program,
}

impl Snippet {
    /// The parsed program
    pub fn program(&self) -> &Program {
        &self.program
    }
}

impl SnippetEvaluator {
    /// Create an evaluator
    pub fn new() -> Self {
        Self
    }
}

/// Parse `source` and check it against the rules of `mode`.
pub fn compile(source: &str, mode: Mode) -> Result<Snippet, SyntaxError> {
    let program = parse(source)?;
    if mode == Mode::Grep && !program.is_single_expression() {
        let span = program
            .body
            .iter()
            .find(|stmt| !matches!(stmt.kind, StmtKind::Expr(_)))
            .or_else(|| program.body.get(1))
            .map(|stmt| stmt.span)
            .unwrap_or_else(|| Span::new(1, 1));
        return Err(SyntaxError::new(
            span,
            "grep snippets must be a single expression",
        ));
    }
    Ok(Snippet { program })
}

impl Evaluator for SnippetEvaluator {
    type Compiled = Snippet;

    fn compile(&self, source: &str, mode: Mode) -> Result<Snippet, CompileFault> {
        compile(source, mode).map_err(|err| CompileFault::new(err.to_string()))
    }

    fn run(
        &self,
        compiled: &Snippet,
        _mode: Mode,
        bindings: Bindings<'_>,
    ) -> Result<EvalOutcome, RuntimeFault> {
        let value = Interpreter::new(bindings)
            .run(&compiled.program)
            .map_err(|fault| {
                RuntimeFault::new(fault.kind.as_str(), fault.message.clone())
                    .with_traceback(fault.render(&compiled.program))
            })?;
        Ok(EvalOutcome { value })
    }
}
