//! Request, outcome and result types shared by every stage of an execution

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::status::ExecutionStatus;

/// Default wall-clock timeout for one execution
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
/// Default ceiling for each captured output stream
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 1024 * 1024;

/// Resource bounds applied to one execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionLimits {
    /// Wall-clock budget of the run phase
    pub timeout: Duration,
    /// Bytes kept per output stream, the rest is discarded
    pub max_output_bytes: usize,
}

impl ExecutionLimits {
    pub fn new(timeout: Duration, max_output_bytes: usize) -> Self {
        Self {
            timeout,
            max_output_bytes,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }
}

/// Expected-behaviour data for the query language
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    /// Statements creating the tables
    #[serde(default)]
    pub schema: Option<String>,
    /// Statements inserting the test rows
    #[serde(default)]
    pub seed: Option<String>,
    /// Expected data rows, one per line
    #[serde(default)]
    pub expected_output: Option<String>,
}

impl Reference {
    /// Schema script, if one was given and it is not blank
    pub fn schema(&self) -> Option<&str> {
        non_blank(self.schema.as_deref())
    }

    pub fn seed(&self) -> Option<&str> {
        non_blank(self.seed.as_deref())
    }

    pub fn expected_output(&self) -> Option<&str> {
        non_blank(self.expected_output.as_deref())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.trim().is_empty())
}

/// Input to the sandbox core
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRequest {
    pub language: String,
    pub source: String,
    pub stdin: Option<Vec<u8>>,
    pub limits: ExecutionLimits,
    pub reference: Option<Reference>,
}

impl ExecutionRequest {
    pub fn new(language: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            source: source.into(),
            stdin: None,
            limits: ExecutionLimits::default(),
            reference: None,
        }
    }

    pub fn with_stdin(mut self, stdin: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(stdin.into());
        self
    }

    pub fn with_limits(mut self, limits: ExecutionLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_reference(mut self, reference: Reference) -> Self {
        self.reference = Some(reference);
        self
    }

    /// Language name as used for lookup: trimmed and lowercased
    pub fn normalized_language(&self) -> String {
        self.language.trim().to_lowercase()
    }
}

/// Phase that produced a raw outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Compile,
    Run,
    Engine,
}

/// What came out of one execution attempt, before any interpretation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawOutcome {
    pub stage: Stage,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: i32,
    pub timed_out: bool,
    /// An output stream hit the size ceiling
    pub truncated: bool,
    /// Data rows without header lines (query engine only)
    pub rows: Option<Vec<String>>,
    pub elapsed: Duration,
}

/// The sandbox core's sole output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub language: String,
    pub status: ExecutionStatus,
    pub stdout: String,
    pub stderr: String,
    /// stdout if non-empty, else stderr
    pub output: String,
    pub exit_code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_correct: Option<bool>,
    pub truncated: bool,
    pub time_ms: u64,
}
