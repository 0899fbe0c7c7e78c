pub mod compare;
pub mod error;
pub mod status;
pub mod types;

pub use compare::{compare_lines, compare_output};
pub use error::{SandboxError, SandboxResult};
pub use status::ExecutionStatus;
pub use types::{ExecutionLimits, ExecutionRequest, ExecutionResult, RawOutcome, Reference, Stage};
