//! Internal faults of the sandbox core
//!
//! Anything that surfaces as `SandboxError` is a fault of the host side (filesystem,
//! spawn, engine setup). The dispatcher turns it into an `InternalError` result;
//! failures of the submitted program are never reported through this type.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("failed to create scratch directory: {0}")]
    ScratchDir(#[source] std::io::Error),

    #[error("failed to write {}: {source}", path.display())]
    WriteSource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("empty command")]
    EmptyCommand,

    #[error("i/o error while supervising child: {0}")]
    Io(#[from] std::io::Error),

    #[error("query engine error: {0}")]
    Engine(#[from] rusqlite::Error),

    #[error("execution task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type SandboxResult<T> = std::result::Result<T, SandboxError>;
