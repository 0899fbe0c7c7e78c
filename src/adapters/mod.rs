//! Language adapters
//!
//! An adapter turns a request into an `ExecutionAction` for the runner and turns
//! the raw outcome back into a status. Adding a language means adding a `Language`
//! variant, an adapter and a `languages.toml` entry; nothing else changes.

pub mod compiled;
pub mod entry;
pub mod query;
pub mod script;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::SandboxConfig;
use crate::domain::{ExecutionStatus, RawOutcome, Reference};
use crate::languages::{Language, LanguageTable};
use crate::runner::ExecutionAction;

pub use compiled::CompiledAdapter;
pub use query::QueryAdapter;
pub use script::ScriptAdapter;

/// A request refused before anything ran
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub status: ExecutionStatus,
    pub message: String,
}

impl Rejection {
    pub fn new(status: ExecutionStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

/// Adapter verdict on a raw outcome, still undecoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interpretation {
    pub status: ExecutionStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: i32,
    pub truncated: bool,
    pub elapsed: Duration,
    pub expected_output: Option<String>,
    pub is_correct: Option<bool>,
}

impl Interpretation {
    /// Carry the raw outcome over unchanged under `status`
    pub fn from_raw(raw: RawOutcome, status: ExecutionStatus) -> Self {
        Self {
            status,
            stdout: raw.stdout,
            stderr: raw.stderr,
            exit_code: raw.exit_code,
            truncated: raw.truncated,
            elapsed: raw.elapsed,
            expected_output: None,
            is_correct: None,
        }
    }
}

pub trait LanguageAdapter: Send + Sync {
    fn language(&self) -> Language;

    /// Build the execution plan, or refuse the source outright
    fn prepare(
        &self,
        source: &str,
        reference: Option<&Reference>,
    ) -> Result<Box<dyn ExecutionAction>, Rejection>;

    /// Decide the status of a finished execution
    fn interpret(&self, raw: RawOutcome, reference: Option<&Reference>) -> Interpretation;
}

/// Status for a program that ran: timeout wins, then the exit code decides
pub fn status_from_exit(raw: &RawOutcome) -> ExecutionStatus {
    if raw.timed_out {
        ExecutionStatus::Timeout
    } else if raw.exit_code == 0 {
        ExecutionStatus::Success
    } else {
        ExecutionStatus::RuntimeError
    }
}

/// Instantiate an adapter for every language in the table
pub fn build_adapters(
    table: &LanguageTable,
    config: &SandboxConfig,
) -> HashMap<Language, Arc<dyn LanguageAdapter>> {
    let mut adapters: HashMap<Language, Arc<dyn LanguageAdapter>> = HashMap::new();

    for lang in table.configs() {
        let adapter: Arc<dyn LanguageAdapter> = match lang.kind {
            Language::Script => Arc::new(ScriptAdapter::new(lang.run_command.clone())),
            Language::Compiled => {
                Arc::new(CompiledAdapter::from_config(lang, config.compile_timeout()))
            }
            Language::QueryEmbedded => Arc::new(QueryAdapter::new()),
        };
        adapters.insert(lang.kind, adapter);
    }

    adapters
}
