//! Turns adapter interpretations into the uniform `ExecutionResult`

use crate::adapters::Interpretation;
use crate::domain::{ExecutionResult, ExecutionStatus};

/// Decode captured bytes; invalid UTF-8 becomes U+FFFD
pub fn decode(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

pub fn normalize(language: &str, interpretation: Interpretation) -> ExecutionResult {
    let stdout = decode(&interpretation.stdout);
    let stderr = decode(&interpretation.stderr);
    let output = combined_output(&stdout, &stderr);

    ExecutionResult {
        language: language.to_string(),
        status: interpretation.status,
        stdout,
        stderr,
        output,
        exit_code: interpretation.exit_code,
        expected_output: interpretation.expected_output,
        is_correct: interpretation.is_correct,
        truncated: interpretation.truncated,
        time_ms: interpretation.elapsed.as_millis() as u64,
    }
}

/// Result for a request refused before anything ran
pub fn rejected(language: &str, status: ExecutionStatus, message: &str) -> ExecutionResult {
    ExecutionResult {
        language: language.to_string(),
        status,
        stdout: String::new(),
        stderr: message.to_string(),
        output: message.to_string(),
        exit_code: 1,
        expected_output: None,
        is_correct: None,
        truncated: false,
        time_ms: 0,
    }
}

fn combined_output(stdout: &str, stderr: &str) -> String {
    if stdout.is_empty() {
        stderr.to_string()
    } else {
        stdout.to_string()
    }
}
