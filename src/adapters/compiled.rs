//! Compiled languages: write the source, compile it, then run the entry type
//!
//! Both phases share one scratch directory, which is gone once the action returns.
//! A failed or overdue compile ends the execution; the run phase never starts.

use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use super::entry::public_top_level_classes;
use super::{status_from_exit, Interpretation, LanguageAdapter, Rejection};
use crate::domain::{ExecutionLimits, ExecutionStatus, RawOutcome, Reference, SandboxResult, Stage};
use crate::languages::{expand_command, Language, LanguageConfig};
use crate::runner::{CommandSpec, ExecutionAction, Runner};

const DEFAULT_ENTRY: &str = "Main";
const DEFAULT_EXTENSION: &str = "java";
/// JVM banner printed to stderr whenever the variable is set in the environment
const JVM_OPTIONS_NOTICE: &[u8] = b"Picked up JAVA_TOOL_OPTIONS";

pub struct CompiledAdapter {
    compile_command: Vec<String>,
    run_command: Vec<String>,
    source_extension: String,
    default_entry: String,
    compile_timeout: Duration,
}

impl CompiledAdapter {
    pub fn new(
        compile_command: Vec<String>,
        run_command: Vec<String>,
        compile_timeout: Duration,
    ) -> Self {
        Self {
            compile_command,
            run_command,
            source_extension: DEFAULT_EXTENSION.to_string(),
            default_entry: DEFAULT_ENTRY.to_string(),
            compile_timeout,
        }
    }

    pub fn from_config(config: &LanguageConfig, compile_timeout: Duration) -> Self {
        let mut adapter = Self::new(
            config.compile_command.clone().unwrap_or_default(),
            config.run_command.clone(),
            compile_timeout,
        );
        if let Some(ext) = &config.source_extension {
            adapter.source_extension = ext.clone();
        }
        if let Some(entry) = &config.default_entry {
            adapter.default_entry = entry.clone();
        }
        adapter
    }

    /// Entry type the file must be named after
    fn entry_type(&self, source: &str) -> Result<String, Rejection> {
        let mut classes = public_top_level_classes(source);
        match classes.len() {
            0 => Ok(self.default_entry.clone()),
            1 => Ok(classes.remove(0)),
            _ => Err(Rejection::new(
                ExecutionStatus::CompileError,
                format!("multiple public classes declared: {}", classes.join(", ")),
            )),
        }
    }
}

impl LanguageAdapter for CompiledAdapter {
    fn language(&self) -> Language {
        Language::Compiled
    }

    fn prepare(
        &self,
        source: &str,
        _reference: Option<&Reference>,
    ) -> Result<Box<dyn ExecutionAction>, Rejection> {
        let entry = self.entry_type(source)?;
        debug!("Compiled entry type: {}", entry);

        Ok(Box::new(CompileAndRunAction {
            file_name: format!("{}.{}", entry, self.source_extension),
            entry,
            source: source.to_string(),
            compile_command: self.compile_command.clone(),
            run_command: self.run_command.clone(),
            compile_timeout: self.compile_timeout,
        }))
    }

    fn interpret(&self, raw: RawOutcome, _reference: Option<&Reference>) -> Interpretation {
        if raw.stage == Stage::Compile {
            return compile_failure(raw);
        }

        let status = status_from_exit(&raw);
        let mut result = Interpretation::from_raw(raw, status);
        result.stderr = strip_jvm_notice(&result.stderr);
        result
    }
}

/// Compiler diagnostics become the error text; stdout stays empty
fn compile_failure(raw: RawOutcome) -> Interpretation {
    let stderr = strip_jvm_notice(&raw.stderr);
    let message = if !stderr.iter().all(u8::is_ascii_whitespace) {
        stderr
    } else if !raw.stdout.is_empty() {
        raw.stdout.clone()
    } else if raw.timed_out {
        b"Compilation timed out".to_vec()
    } else {
        format!("Compilation failed with exit code {}", raw.exit_code).into_bytes()
    };

    let exit_code = if raw.exit_code == 0 { 1 } else { raw.exit_code };
    let mut result = Interpretation::from_raw(raw, ExecutionStatus::CompileError);
    result.stdout = Vec::new();
    result.stderr = message;
    result.exit_code = exit_code;
    result
}

fn strip_jvm_notice(stderr: &[u8]) -> Vec<u8> {
    if !stderr.windows(JVM_OPTIONS_NOTICE.len()).any(|w| w == JVM_OPTIONS_NOTICE) {
        return stderr.to_vec();
    }

    stderr
        .split(|b| *b == b'\n')
        .filter(|line| {
            let start = line.iter().position(|b| !b.is_ascii_whitespace());
            !start.is_some_and(|i| line[i..].starts_with(JVM_OPTIONS_NOTICE))
        })
        .collect::<Vec<_>>()
        .join(&b'\n')
}

struct CompileAndRunAction {
    source: String,
    entry: String,
    file_name: String,
    compile_command: Vec<String>,
    run_command: Vec<String>,
    compile_timeout: Duration,
}

#[async_trait]
impl ExecutionAction for CompileAndRunAction {
    async fn run(
        self: Box<Self>,
        runner: &dyn Runner,
        stdin: Option<&[u8]>,
        limits: &ExecutionLimits,
    ) -> SandboxResult<RawOutcome> {
        let scratch = runner.scratch_dir()?;
        let file = scratch.write_file(&self.file_name, &self.source)?;

        let dir = scratch.path().to_string_lossy().into_owned();
        let file = file.to_string_lossy().into_owned();
        let vars = [
            ("dir", dir.as_str()),
            ("file", file.as_str()),
            ("entry", self.entry.as_str()),
        ];

        let compile = CommandSpec::from_vec(&expand_command(&self.compile_command, &vars))
            .with_work_dir(scratch.path());
        let compile_limits = ExecutionLimits::new(self.compile_timeout, limits.max_output_bytes);
        let mut compiled = runner.run(&compile, None, &compile_limits).await?;

        if compiled.timed_out || compiled.exit_code != 0 {
            debug!(
                "Compilation failed: exit_code={}, timed_out={}",
                compiled.exit_code, compiled.timed_out
            );
            compiled.stage = Stage::Compile;
            return Ok(compiled);
        }

        let run = CommandSpec::from_vec(&expand_command(&self.run_command, &vars))
            .with_work_dir(scratch.path());
        runner.run(&run, stdin, limits).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::{ProcessRunner, ScratchDir};
    use std::path::PathBuf;
    use std::sync::Mutex;

    fn outcome(exit_code: i32, stdout: &[u8], stderr: &[u8], timed_out: bool) -> RawOutcome {
        RawOutcome {
            stage: Stage::Run,
            stdout: stdout.to_vec(),
            stderr: stderr.to_vec(),
            exit_code,
            timed_out,
            truncated: false,
            rows: None,
            elapsed: Duration::from_millis(5),
        }
    }

    /// Runner that records commands and answers from a script of outcomes
    struct ScriptedRunner {
        root: tempfile::TempDir,
        calls: Mutex<Vec<CommandSpec>>,
        scratch_dirs: Mutex<Vec<PathBuf>>,
        replies: Mutex<Vec<RawOutcome>>,
    }

    impl ScriptedRunner {
        fn new(replies: Vec<RawOutcome>) -> Self {
            Self {
                root: tempfile::tempdir().unwrap(),
                calls: Mutex::new(Vec::new()),
                scratch_dirs: Mutex::new(Vec::new()),
                replies: Mutex::new(replies),
            }
        }
    }

    #[async_trait]
    impl Runner for ScriptedRunner {
        async fn run(
            &self,
            cmd: &CommandSpec,
            _stdin: Option<&[u8]>,
            _limits: &ExecutionLimits,
        ) -> SandboxResult<RawOutcome> {
            self.calls.lock().unwrap().push(cmd.clone());
            Ok(self.replies.lock().unwrap().remove(0))
        }

        fn scratch_dir(&self) -> SandboxResult<ScratchDir> {
            let dir = ScratchDir::create(Some(self.root.path()))?;
            self.scratch_dirs.lock().unwrap().push(dir.path().to_path_buf());
            Ok(dir)
        }
    }

    fn adapter() -> CompiledAdapter {
        CompiledAdapter::new(
            vec!["javac".into(), "-d".into(), "{dir}".into(), "{file}".into()],
            vec!["java".into(), "-cp".into(), "{dir}".into(), "{entry}".into()],
            Duration::from_secs(10),
        )
    }

    async fn execute(runner: &ScriptedRunner, source: &str) -> Interpretation {
        let adapter = adapter();
        let action = adapter.prepare(source, None).unwrap();
        let raw = crate::runner::execute(runner, action, None, &ExecutionLimits::default())
            .await
            .unwrap();
        adapter.interpret(raw, None)
    }

    #[tokio::test]
    async fn test_compile_then_run() {
        let runner = ScriptedRunner::new(vec![
            outcome(0, b"", b"", false),
            outcome(0, b"hello\n", b"", false),
        ]);
        let result = execute(&runner, "public class Hello { }").await;

        assert_eq!(result.status, ExecutionStatus::Success);
        assert_eq!(result.stdout, b"hello\n");

        let calls = runner.calls.lock().unwrap();
        let dir = runner.scratch_dirs.lock().unwrap()[0].clone();
        let dir = dir.to_string_lossy().into_owned();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].program, "javac");
        assert_eq!(
            calls[0].args,
            vec!["-d".to_string(), dir.clone(), format!("{}/Hello.java", dir)]
        );
        assert_eq!(calls[1].args, vec!["-cp".to_string(), dir, "Hello".to_string()]);
    }

    #[tokio::test]
    async fn test_compile_failure_skips_run() {
        let runner = ScriptedRunner::new(vec![outcome(
            1,
            b"",
            b"Main.java:1: error: ';' expected\n",
            false,
        )]);
        let result = execute(&runner, "class Main { int x }").await;

        assert_eq!(result.status, ExecutionStatus::CompileError);
        assert!(result.stdout.is_empty());
        assert_eq!(result.stderr, b"Main.java:1: error: ';' expected\n");
        assert_ne!(result.exit_code, 0);
        assert_eq!(runner.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_compile_timeout_is_compile_error() {
        let runner = ScriptedRunner::new(vec![outcome(137, b"", b"", true)]);
        let result = execute(&runner, "class Main {}").await;

        assert_eq!(result.status, ExecutionStatus::CompileError);
        assert_eq!(result.stderr, b"Compilation timed out");
        assert_ne!(result.exit_code, 0);
    }

    #[tokio::test]
    async fn test_scratch_dir_removed_after_execution() {
        let runner = ScriptedRunner::new(vec![
            outcome(0, b"", b"", false),
            outcome(3, b"", b"boom", false),
        ]);
        let result = execute(&runner, "class Main {}").await;

        assert_eq!(result.status, ExecutionStatus::RuntimeError);
        let dirs = runner.scratch_dirs.lock().unwrap();
        assert_eq!(dirs.len(), 1);
        assert!(!dirs[0].exists());
        assert_eq!(std::fs::read_dir(runner.root.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_multiple_public_classes_rejected() {
        let err = adapter()
            .prepare("public class A {}\npublic class B {}", None)
            .err()
            .unwrap();
        assert_eq!(err.status, ExecutionStatus::CompileError);
        assert_eq!(err.message, "multiple public classes declared: A, B");
    }

    #[test]
    fn test_default_entry_when_no_public_class() {
        assert_eq!(adapter().entry_type("class Solution {}").unwrap(), "Main");
    }

    #[test]
    fn test_strip_jvm_notice() {
        let stderr = b"Picked up JAVA_TOOL_OPTIONS: -Xmx64m\nException in thread \"main\"\n";
        assert_eq!(strip_jvm_notice(stderr), b"Exception in thread \"main\"\n");
        assert_eq!(strip_jvm_notice(b"plain\n"), b"plain\n");
    }

    fn javac_available() -> bool {
        std::process::Command::new("javac")
            .arg("-version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    #[tokio::test]
    async fn test_real_toolchain_round_trip() {
        if !javac_available() {
            eprintln!("javac not found, skipping");
            return;
        }

        let adapter = adapter();
        let source = r#"
import java.util.Scanner;

public class Echo {
    public static void main(String[] args) {
        Scanner in = new Scanner(System.in);
        System.out.println(in.nextInt() * 2);
    }
}
"#;
        let action = adapter.prepare(source, None).unwrap();
        let stdin = b"21\n".as_slice();
        let limits = ExecutionLimits::default().with_timeout(Duration::from_secs(20));
        let raw = crate::runner::execute(&ProcessRunner::new(), action, Some(stdin), &limits)
            .await
            .unwrap();
        let result = adapter.interpret(raw, None);

        assert_eq!(result.status, ExecutionStatus::Success);
        assert_eq!(String::from_utf8_lossy(&result.stdout).trim(), "42");
    }
}
