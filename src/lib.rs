//! Code execution sandbox
//!
//! Runs untrusted source in one of three language kinds (script, compiled,
//! query-embedded) under a wall-clock limit and reports a uniform
//! `ExecutionResult`. The HTTP service in `server` and the `codebox` binary are
//! thin shells over `Dispatcher::dispatch`.

pub mod adapters;
pub mod config;
pub mod dispatch;
pub mod domain;
pub mod engine;
pub mod languages;
pub mod normalizer;
pub mod runner;
pub mod server;

pub use dispatch::Dispatcher;
pub use domain::{
    ExecutionLimits, ExecutionRequest, ExecutionResult, ExecutionStatus, Reference, SandboxError,
};
pub use languages::{Language, LanguageTable};
