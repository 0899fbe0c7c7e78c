//! Request dispatch
//!
//! A request moves through Received -> Validated -> Dispatched -> Executed ->
//! Normalized -> Returned, short-circuiting to Returned on a rejection. Every path
//! ends in an `ExecutionResult`; nothing escapes as an error or panic.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::adapters::{build_adapters, LanguageAdapter};
use crate::config::SandboxConfig;
use crate::domain::{ExecutionRequest, ExecutionResult, ExecutionStatus, SandboxResult};
use crate::languages::{Language, LanguageTable};
use crate::normalizer;
use crate::runner::{self, ProcessRunner, Runner};

pub const EMPTY_SOURCE_MESSAGE: &str = "No code provided or code is empty";

static REQUEST_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

struct Inner {
    languages: LanguageTable,
    adapters: HashMap<Language, Arc<dyn LanguageAdapter>>,
    runner: Arc<dyn Runner>,
}

impl Dispatcher {
    /// Dispatcher running programs as local processes
    pub fn new(languages: LanguageTable, config: &SandboxConfig) -> Self {
        let adapters = build_adapters(&languages, config);
        let runner = ProcessRunner::new().with_scratch_root(config.scratch_root.clone());
        Self::with_parts(languages, adapters, Arc::new(runner))
    }

    pub fn with_parts(
        languages: LanguageTable,
        adapters: HashMap<Language, Arc<dyn LanguageAdapter>>,
        runner: Arc<dyn Runner>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                languages,
                adapters,
                runner,
            }),
        }
    }

    /// Names accepted in the `language` field, sorted
    pub fn supported_languages(&self) -> Vec<String> {
        self.inner
            .languages
            .supported_names()
            .into_iter()
            .filter(|name| {
                self.inner
                    .languages
                    .resolve(name)
                    .is_some_and(|kind| self.inner.adapters.contains_key(&kind))
            })
            .collect()
    }

    /// Run one request to completion
    pub async fn dispatch(&self, request: ExecutionRequest) -> ExecutionResult {
        let id = REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        let language = request.normalized_language();
        debug!("[{}] Received: language={}", id, language);

        if request.source.trim().is_empty() {
            warn!("[{}] Rejected: empty source", id);
            return normalizer::rejected(
                &language,
                ExecutionStatus::EmptyInput,
                EMPTY_SOURCE_MESSAGE,
            );
        }

        let Some((kind, adapter)) = self.adapter_for(&language) else {
            warn!("[{}] Rejected: unsupported language {:?}", id, language);
            let message = format!(
                "Language '{}' not supported. Supported: {}",
                language,
                self.supported_languages().join(", ")
            );
            return normalizer::rejected(&language, ExecutionStatus::Unsupported, &message);
        };
        debug!("[{}] Validated: kind={}", id, kind);

        let this = self.clone();
        let task_language = language.clone();
        let handle = tokio::spawn(async move {
            this.execute(id, &task_language, adapter.as_ref(), request).await
        });

        let result = match handle.await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                error!("[{}] Internal error: {}", id, e);
                normalizer::rejected(
                    &language,
                    ExecutionStatus::InternalError,
                    &format!("Error: {}", e),
                )
            }
            Err(e) => {
                error!("[{}] Execution task failed: {}", id, e);
                normalizer::rejected(
                    &language,
                    ExecutionStatus::InternalError,
                    "Error: execution aborted unexpectedly",
                )
            }
        };

        info!(
            "[{}] Returned: language={}, status={}, exit_code={}, time_ms={}",
            id, result.language, result.status, result.exit_code, result.time_ms
        );
        result
    }

    fn adapter_for(&self, language: &str) -> Option<(Language, Arc<dyn LanguageAdapter>)> {
        let kind = self.inner.languages.resolve(language)?;
        let adapter = self.inner.adapters.get(&kind)?;
        Some((kind, Arc::clone(adapter)))
    }

    async fn execute(
        &self,
        id: u64,
        language: &str,
        adapter: &dyn LanguageAdapter,
        request: ExecutionRequest,
    ) -> SandboxResult<ExecutionResult> {
        let reference = request.reference.as_ref();

        let action = match adapter.prepare(&request.source, reference) {
            Ok(action) => action,
            Err(rejection) => {
                debug!("[{}] Rejected by adapter: {}", id, rejection.message);
                return Ok(normalizer::rejected(
                    language,
                    rejection.status,
                    &rejection.message,
                ));
            }
        };
        debug!("[{}] Dispatched", id);

        let raw = runner::execute(
            self.inner.runner.as_ref(),
            action,
            request.stdin.as_deref(),
            &request.limits,
        )
        .await?;
        debug!("[{}] Executed", id);

        let interpretation = adapter.interpret(raw, reference);
        let result = normalizer::normalize(language, interpretation);
        debug!("[{}] Normalized", id);

        Ok(result)
    }
}
