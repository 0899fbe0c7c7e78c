use serde::{Deserialize, Serialize};
use std::fmt;

/// Final status of one execution request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Success,
    RuntimeError,
    CompileError,
    Timeout,
    Unsupported,
    EmptyInput,
    InternalError,
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutionStatus::Success => "success",
            ExecutionStatus::RuntimeError => "runtime_error",
            ExecutionStatus::CompileError => "compile_error",
            ExecutionStatus::Timeout => "timeout",
            ExecutionStatus::Unsupported => "unsupported",
            ExecutionStatus::EmptyInput => "empty_input",
            ExecutionStatus::InternalError => "internal_error",
        };
        write!(f, "{}", s)
    }
}
