//! recs-runner - per-record snippet runner
//!
//! Reads protocol messages from stdin and writes responses to stdout, one
//! JSON object per line. Diagnostics go to stderr through `tracing`.
//!
//! With `--check` the binary only compiles a snippet and reports the result.

use clap::Parser;
use recs_runner::{
    run_session, Evaluator, Mode, RunnerError, SessionOptions, SessionOutcome, SessionSummary,
};
use recs_snippet::SnippetEvaluator;
use std::io::{self, BufReader};
use std::process::ExitCode;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "recs-runner")]
#[command(about = "Run a RecordStream snippet against records streamed on stdin")]
#[command(version)]
struct Cli {
    /// Value of the `filename` binding inside snippets
    #[arg(long, env = "RECS_RUNNER_FILENAME", default_value = recs_runner::session::DEFAULT_FILENAME)]
    filename: String,
    /// Log filter for stderr (e.g. "debug" or "recs_runner=trace")
    #[arg(long, env = "RECS_LOG", default_value = "warn")]
    log: String,
    /// Compile CODE and exit instead of running a session
    #[arg(long, value_name = "CODE", requires = "mode")]
    check: Option<String>,
    /// Mode to compile CODE for (eval, grep, xform, generate)
    #[arg(long, requires = "check")]
    mode: Option<Mode>,
}

fn init_tracing(directives: &str) {
    let filter = EnvFilter::try_new(directives).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(io::stderr)
        .try_init()
        .ok();
}

fn check(code: &str, mode: Mode) -> ExitCode {
    match SnippetEvaluator::new().compile(code, mode) {
        Ok(_) => {
            println!("ok: {mode} snippet compiles");
            ExitCode::SUCCESS
        }
        Err(fault) => {
            eprintln!("{}", RunnerError::from(fault));
            ExitCode::FAILURE
        }
    }
}

fn exit_code(summary: &SessionSummary) -> ExitCode {
    match &summary.outcome {
        SessionOutcome::Completed | SessionOutcome::PeerGone => ExitCode::SUCCESS,
        SessionOutcome::Failed(err) => {
            error!(error = %err, "session failed");
            ExitCode::FAILURE
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli.log);

    if let (Some(code), Some(mode)) = (cli.check.as_deref(), cli.mode) {
        return check(code, mode);
    }

    let options = SessionOptions {
        filename: cli.filename,
    };
    debug!(filename = %options.filename, "starting session");

    let stdin = io::stdin();
    let stdout = io::stdout();
    let summary = run_session(
        SnippetEvaluator::new(),
        BufReader::new(stdin.lock()),
        stdout.lock(),
        options,
    );

    info!(
        records = summary.records_processed,
        failed = summary.records_failed,
        messages = summary.messages_written,
        "session finished"
    );
    exit_code(&summary)
}
