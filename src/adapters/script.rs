//! Interpreted languages: the source is handed to the interpreter inline

use super::{status_from_exit, Interpretation, LanguageAdapter, Rejection};
use crate::domain::{RawOutcome, Reference};
use crate::languages::{expand_command, Language};
use crate::runner::{CommandAction, CommandSpec, ExecutionAction};

pub struct ScriptAdapter {
    run_command: Vec<String>,
}

impl ScriptAdapter {
    pub fn new(run_command: Vec<String>) -> Self {
        Self { run_command }
    }
}

impl LanguageAdapter for ScriptAdapter {
    fn language(&self) -> Language {
        Language::Script
    }

    fn prepare(
        &self,
        source: &str,
        _reference: Option<&Reference>,
    ) -> Result<Box<dyn ExecutionAction>, Rejection> {
        let cmd = expand_command(&self.run_command, &[("source", source)]);
        Ok(Box::new(CommandAction::new(CommandSpec::from_vec(&cmd))))
    }

    fn interpret(&self, raw: RawOutcome, _reference: Option<&Reference>) -> Interpretation {
        let status = status_from_exit(&raw);
        Interpretation::from_raw(raw, status)
    }
}
