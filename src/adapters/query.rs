//! Query language: statements run against a private in-memory database
//!
//! With a reference the database is first built from its schema and seed, the
//! submitted source must be a read query, and the produced rows are checked
//! against the expected output.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use super::{status_from_exit, Interpretation, LanguageAdapter, Rejection};
use crate::domain::{compare_lines, ExecutionLimits, RawOutcome, Reference, SandboxResult, Stage};
use crate::engine::{starts_with_keyword, QueryEngine, QueryOutput};
use crate::languages::Language;
use crate::runner::{ExecutionAction, Runner};

const READ_KEYWORD: &str = "SELECT";
const READ_ONLY_MESSAGE: &str =
    "Error: only read queries allowed (SELECT). Cannot use CREATE, INSERT, DROP, etc.";
/// Printed when a clean batch produced no rows
pub const NO_ROWS_MESSAGE: &str = "Query executed successfully";

#[derive(Debug, Default)]
pub struct QueryAdapter;

impl QueryAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl LanguageAdapter for QueryAdapter {
    fn language(&self) -> Language {
        Language::QueryEmbedded
    }

    fn prepare(
        &self,
        source: &str,
        reference: Option<&Reference>,
    ) -> Result<Box<dyn ExecutionAction>, Rejection> {
        Ok(Box::new(QueryAction {
            source: source.to_string(),
            reference: reference.cloned(),
        }))
    }

    fn interpret(&self, raw: RawOutcome, reference: Option<&Reference>) -> Interpretation {
        let status = status_from_exit(&raw);

        let expected = reference.and_then(|r| r.expected_output());
        let is_correct = expected.map(|expected| {
            let rows = raw.rows.as_deref().unwrap_or_default();
            !raw.timed_out && compare_lines(rows.iter().map(String::as_str), expected)
        });

        let mut result = Interpretation::from_raw(raw, status);
        result.expected_output = expected.map(str::to_string);
        result.is_correct = is_correct;
        result
    }
}

struct QueryAction {
    source: String,
    reference: Option<Reference>,
}

#[async_trait]
impl ExecutionAction for QueryAction {
    async fn run(
        self: Box<Self>,
        _runner: &dyn Runner,
        _stdin: Option<&[u8]>,
        limits: &ExecutionLimits,
    ) -> SandboxResult<RawOutcome> {
        let engine = QueryEngine::open_in_memory()?;
        let interrupt = engine.interrupt_handle();
        let cancelled = Arc::new(AtomicBool::new(false));
        let max_bytes = limits.max_output_bytes;
        let started = Instant::now();

        let flag = Arc::clone(&cancelled);
        let QueryAction { source, reference } = *self;
        let mut task = tokio::task::spawn_blocking(move || {
            run_batch(&engine, &source, reference.as_ref(), max_bytes, &flag)
        });

        let (output, timed_out) = match tokio::time::timeout(limits.timeout, &mut task).await {
            Ok(joined) => (joined??, false),
            Err(_) => {
                warn!("Query exceeded {:?}, interrupting", limits.timeout);
                cancelled.store(true, Ordering::Relaxed);
                interrupt.interrupt();
                (task.await??, true)
            }
        };

        let exit_code = if output.errors.is_empty() { 0 } else { 1 };
        let stdout = if output.lines.is_empty() && exit_code == 0 && !timed_out {
            NO_ROWS_MESSAGE.to_string()
        } else {
            output.lines.join("\n")
        };
        Ok(RawOutcome {
            stage: Stage::Engine,
            stdout: stdout.into_bytes(),
            stderr: output.errors.join("\n").into_bytes(),
            exit_code,
            timed_out,
            truncated: output.truncated,
            rows: Some(output.rows),
            elapsed: started.elapsed(),
        })
    }
}

/// Reference setup, read-only gate, then the submitted statements
fn run_batch(
    engine: &QueryEngine,
    source: &str,
    reference: Option<&Reference>,
    max_bytes: usize,
    cancelled: &AtomicBool,
) -> SandboxResult<QueryOutput> {
    let mut output = QueryOutput::new(max_bytes);

    let schema = reference.and_then(|r| r.schema());
    if let Some(schema) = schema {
        engine.run_script(schema, "Schema error:", &mut output, cancelled);
    }
    if let Some(seed) = reference.and_then(|r| r.seed()) {
        engine.run_script(seed, "Test data error:", &mut output, cancelled);
    }

    if schema.is_some() {
        if !starts_with_keyword(source, READ_KEYWORD) {
            debug!("Rejected non-read query against reference schema");
            output.errors.push(READ_ONLY_MESSAGE.to_string());
            return Ok(output);
        }
        // later statements in the batch must not write either
        engine.enable_read_only()?;
    }

    engine.run_script(source, "Query error:", &mut output, cancelled);
    Ok(output)
}
