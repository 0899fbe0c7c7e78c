//! Process runner implementation
//!
//! Runs a command as the leader of a fresh process group with piped stdio. On
//! timeout, and again once the leader has exited, the whole group is killed so no
//! descendant outlives the call. Descendants that left the group are found by
//! the output pipes they still hold and killed too.

use async_trait::async_trait;
use nix::sys::signal::{kill, killpg, Signal};
use nix::unistd::Pid;
use std::os::fd::AsRawFd;
use std::os::unix::fs::MetadataExt;
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{CommandSpec, Runner, ScratchDir};
use crate::domain::{ExecutionLimits, RawOutcome, SandboxError, SandboxResult, Stage};

const READ_CHUNK: usize = 8192;
/// How long the output pipes may stay open once the group is dead
const DRAIN_GRACE: Duration = Duration::from_millis(250);

/// Runner that executes commands as local child processes
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    /// Parent directory for scratch directories
    scratch_root: Option<PathBuf>,
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scratch_root(mut self, root: Option<PathBuf>) -> Self {
        self.scratch_root = root;
        self
    }

    /// Run a command and capture its output
    pub async fn execute(
        &self,
        cmd: &CommandSpec,
        stdin: Option<&[u8]>,
        limits: &ExecutionLimits,
    ) -> SandboxResult<RawOutcome> {
        if cmd.program.is_empty() {
            return Err(SandboxError::EmptyCommand);
        }

        debug!("Running `{}` (timeout {:?})", cmd, limits.timeout);

        let mut command = Command::new(&cmd.program);
        command
            .args(&cmd.args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true);

        if let Some(dir) = &cmd.work_dir {
            command.current_dir(dir);
        }

        let started = Instant::now();
        let mut child = command.spawn().map_err(|source| SandboxError::Spawn {
            program: cmd.program.clone(),
            source,
        })?;
        let mut group = ProcessGroupGuard::new(child.id());

        let stdin_task = match (child.stdin.take(), stdin) {
            (Some(mut pipe), Some(input)) => {
                let input = input.to_vec();
                Some(tokio::spawn(async move {
                    // the child may exit without reading; a broken pipe is not our error
                    let _ = pipe.write_all(&input).await;
                    let _ = pipe.shutdown().await;
                }))
            }
            _ => None,
        };

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("child stdout was not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| std::io::Error::other("child stderr was not captured"))?;
        let stdout_capture = Capture::spawn(stdout, limits.max_output_bytes);
        let stderr_capture = Capture::spawn(stderr, limits.max_output_bytes);

        let (status, timed_out) = match tokio::time::timeout(limits.timeout, child.wait()).await {
            Ok(status) => (Some(status?), false),
            Err(_) => {
                warn!(
                    "`{}` exceeded {:?}, killing process group",
                    cmd.program, limits.timeout
                );
                (None, true)
            }
        };

        // Leader is done or overdue; take down anything it left behind so the
        // output pipes close.
        group.kill();

        let status = match status {
            Some(status) => status,
            None => child.wait().await?,
        };
        let elapsed = started.elapsed();

        if let Some(task) = stdin_task {
            task.abort();
        }

        let drain_deadline = tokio::time::Instant::now() + DRAIN_GRACE;
        let (stdout, stdout_truncated) = stdout_capture.finish(drain_deadline).await?;
        let (stderr, stderr_truncated) = stderr_capture.finish(drain_deadline).await?;

        Ok(RawOutcome {
            stage: Stage::Run,
            stdout,
            stderr,
            exit_code: exit_code(status),
            timed_out,
            truncated: stdout_truncated || stderr_truncated,
            rows: None,
            elapsed,
        })
    }
}

#[async_trait]
impl Runner for ProcessRunner {
    async fn run(
        &self,
        cmd: &CommandSpec,
        stdin: Option<&[u8]>,
        limits: &ExecutionLimits,
    ) -> SandboxResult<RawOutcome> {
        self.execute(cmd, stdin, limits).await
    }

    fn scratch_dir(&self) -> SandboxResult<ScratchDir> {
        ScratchDir::create(self.scratch_root.as_deref())
    }
}

/// Kills the child's process group when dropped, unless already done
struct ProcessGroupGuard {
    pgid: Option<Pid>,
}

impl ProcessGroupGuard {
    fn new(pid: Option<u32>) -> Self {
        Self {
            pgid: pid.map(|pid| Pid::from_raw(pid as i32)),
        }
    }

    fn kill(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            // ESRCH just means the group is already gone
            if let Err(e) = killpg(pgid, Signal::SIGKILL) {
                if e != nix::errno::Errno::ESRCH {
                    warn!("Failed to kill process group {}: {}", pgid, e);
                }
            }
        }
    }
}

impl Drop for ProcessGroupGuard {
    fn drop(&mut self) {
        self.kill();
    }
}

type Captured = std::io::Result<(Vec<u8>, bool)>;

/// Background reader of one output pipe
struct Capture {
    task: JoinHandle<Captured>,
    stop: oneshot::Sender<()>,
    /// Inode of the pipe, used to find processes still writing to it
    pipe: Option<u64>,
}

impl Capture {
    fn spawn<R>(reader: R, cap: usize) -> Self
    where
        R: AsyncRead + AsRawFd + Unpin + Send + 'static,
    {
        let pipe = std::fs::metadata(format!("/proc/self/fd/{}", reader.as_raw_fd()))
            .ok()
            .map(|meta| meta.ino());
        let (stop, stopped) = oneshot::channel();
        Self {
            task: tokio::spawn(read_capped(reader, cap, stopped)),
            stop,
            pipe,
        }
    }

    /// Collect what was read. A pipe still open at `deadline` is held by an
    /// escaped descendant: its holders are killed and reading stops.
    async fn finish(mut self, deadline: tokio::time::Instant) -> SandboxResult<(Vec<u8>, bool)> {
        if let Ok(joined) = tokio::time::timeout_at(deadline, &mut self.task).await {
            return Ok(joined??);
        }

        if let Some(inode) = self.pipe {
            let killed = tokio::task::spawn_blocking(move || kill_pipe_holders(inode))
                .await
                .unwrap_or(0);
            warn!("Output pipe still open after group kill, killed {} holder(s)", killed);
        }
        let _ = self.stop.send(());
        Ok(self.task.await??)
    }
}

/// SIGKILL every other process with the pipe `inode` open
fn kill_pipe_holders(inode: u64) -> usize {
    let target = format!("pipe:[{}]", inode);
    let own_pid = std::process::id();
    let Ok(procs) = std::fs::read_dir("/proc") else {
        return 0;
    };

    let mut killed = 0;
    for entry in procs.flatten() {
        let Some(pid) = entry.file_name().to_str().and_then(|name| name.parse::<u32>().ok())
        else {
            continue;
        };
        if pid == own_pid {
            continue;
        }
        let Ok(fds) = std::fs::read_dir(entry.path().join("fd")) else {
            continue;
        };
        let holds_pipe = fds.flatten().any(|fd| {
            std::fs::read_link(fd.path()).is_ok_and(|link| link.as_os_str() == target.as_str())
        });
        if holds_pipe && kill(Pid::from_raw(pid as i32), Signal::SIGKILL).is_ok() {
            debug!("Killed pid {} holding {}", pid, target);
            killed += 1;
        }
    }
    killed
}

/// Read a stream to the end or until `stop` fires, keeping at most `cap` bytes
async fn read_capped<R>(mut reader: R, cap: usize, mut stop: oneshot::Receiver<()>) -> Captured
where
    R: AsyncRead + Unpin,
{
    let mut kept = Vec::new();
    let mut truncated = false;
    let mut buf = [0u8; READ_CHUNK];

    loop {
        let n = tokio::select! {
            read = reader.read(&mut buf) => read?,
            _ = &mut stop => break,
        };
        if n == 0 {
            break;
        }
        let room = cap.saturating_sub(kept.len());
        if n > room {
            truncated = true;
        }
        kept.extend_from_slice(&buf[..n.min(room)]);
    }

    Ok((kept, truncated))
}

/// Exit code, or 128 + signal number for signalled processes
fn exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .or_else(|| status.signal().map(|sig| 128 + sig))
        .unwrap_or(-1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new("/bin/sh").with_args(["-c", script])
    }

    fn limits(timeout_ms: u64) -> ExecutionLimits {
        ExecutionLimits::new(Duration::from_millis(timeout_ms), 1024 * 1024)
    }

    /// Running and not a zombie waiting for its new parent to reap it
    fn process_alive(pid: i32) -> bool {
        match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
            Ok(stat) => stat
                .rsplit_once(')')
                .and_then(|(_, rest)| rest.trim_start().chars().next())
                .map(|state| state != 'Z' && state != 'X')
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    #[tokio::test]
    async fn test_captures_stdout_and_stderr_separately() {
        let runner = ProcessRunner::new();
        let outcome = runner
            .execute(&sh("echo out; echo err >&2; exit 3"), None, &limits(5000))
            .await
            .unwrap();

        assert_eq!(outcome.stdout, b"out\n");
        assert_eq!(outcome.stderr, b"err\n");
        assert_eq!(outcome.exit_code, 3);
        assert!(!outcome.timed_out);
        assert!(!outcome.truncated);
        assert_eq!(outcome.stage, Stage::Run);
    }

    #[tokio::test]
    async fn test_stdin_is_piped_as_bytes() {
        let runner = ProcessRunner::new();
        let input = [b'h', b'i', 0xff, b'\n'];
        let outcome = runner
            .execute(&CommandSpec::new("cat"), Some(input.as_slice()), &limits(5000))
            .await
            .unwrap();

        assert_eq!(outcome.stdout, input);
        assert_eq!(outcome.exit_code, 0);
    }

    #[tokio::test]
    async fn test_no_stdin_reads_eof() {
        let runner = ProcessRunner::new();
        let outcome = runner
            .execute(&sh("cat; echo done"), None, &limits(5000))
            .await
            .unwrap();

        assert_eq!(outcome.stdout, b"done\n");
        assert!(!outcome.timed_out);
    }

    #[tokio::test]
    async fn test_timeout_kills_process_group() {
        let runner = ProcessRunner::new();
        let started = Instant::now();
        let outcome = runner
            .execute(
                &sh("sleep 30 & echo $! ; wait"),
                None,
                &limits(500),
            )
            .await
            .unwrap();

        assert!(outcome.timed_out);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(outcome.exit_code, 128 + 9);

        let background: i32 = String::from_utf8_lossy(&outcome.stdout)
            .trim()
            .parse()
            .unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!process_alive(background));
    }

    fn printed_pid(outcome: &RawOutcome) -> i32 {
        String::from_utf8_lossy(&outcome.stdout)
            .trim()
            .parse()
            .unwrap()
    }

    #[tokio::test]
    async fn test_timeout_with_detached_descendant_is_bounded() {
        let runner = ProcessRunner::new();
        let started = Instant::now();
        let outcome = runner
            .execute(
                &sh("setsid sleep 30 & echo $!; while :; do :; done"),
                None,
                &limits(1000),
            )
            .await
            .unwrap();

        assert!(outcome.timed_out);
        assert!(started.elapsed() < Duration::from_secs(3));

        let detached = printed_pid(&outcome);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!process_alive(detached));
    }

    #[tokio::test]
    async fn test_detached_descendant_does_not_hold_exited_leader() {
        let runner = ProcessRunner::new();
        let started = Instant::now();
        let outcome = runner
            .execute(&sh("setsid sleep 30 & echo $!"), None, &limits(5000))
            .await
            .unwrap();

        assert!(!outcome.timed_out);
        assert_eq!(outcome.exit_code, 0);
        assert!(started.elapsed() < Duration::from_secs(3));

        let detached = printed_pid(&outcome);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!process_alive(detached));
    }

    #[tokio::test]
    async fn test_background_children_do_not_outlive_leader() {
        let runner = ProcessRunner::new();
        let started = Instant::now();
        let outcome = runner
            .execute(&sh("sleep 30 & echo $!"), None, &limits(5000))
            .await
            .unwrap();

        assert!(!outcome.timed_out);
        assert_eq!(outcome.exit_code, 0);
        assert!(started.elapsed() < Duration::from_secs(5));

        let background: i32 = String::from_utf8_lossy(&outcome.stdout)
            .trim()
            .parse()
            .unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!process_alive(background));
    }

    #[tokio::test]
    async fn test_output_is_capped() {
        let runner = ProcessRunner::new();
        let limits = ExecutionLimits::new(Duration::from_secs(5), 16);
        let outcome = runner
            .execute(&sh("head -c 100000 /dev/zero"), None, &limits)
            .await
            .unwrap();

        assert_eq!(outcome.stdout.len(), 16);
        assert!(outcome.truncated);
        assert_eq!(outcome.exit_code, 0);
        assert!(!outcome.timed_out);
    }

    #[tokio::test]
    async fn test_spawn_failure_is_reported() {
        let runner = ProcessRunner::new();
        let err = runner
            .execute(
                &CommandSpec::new("/nonexistent/definitely-not-here"),
                None,
                &limits(1000),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, SandboxError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_empty_command_is_rejected() {
        let runner = ProcessRunner::new();
        let err = runner
            .execute(&CommandSpec::from_vec(&[]), None, &limits(1000))
            .await
            .unwrap_err();

        assert!(matches!(err, SandboxError::EmptyCommand));
    }

    #[tokio::test]
    async fn test_work_dir_is_applied() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ProcessRunner::new();
        let outcome = runner
            .execute(&sh("pwd").with_work_dir(dir.path()), None, &limits(5000))
            .await
            .unwrap();

        let printed = String::from_utf8_lossy(&outcome.stdout).trim().to_string();
        let expected = dir.path().canonicalize().unwrap();
        assert_eq!(PathBuf::from(printed).canonicalize().unwrap(), expected);
    }

    #[test]
    fn test_read_capped_keeps_prefix() {
        let data: &[u8] = b"abcdefgh";
        let (_keep, stopped) = oneshot::channel();
        let (kept, truncated) = tokio_test::block_on(read_capped(data, 3, stopped)).unwrap();
        assert_eq!(kept, b"abc");
        assert!(truncated);

        let (_keep, stopped) = oneshot::channel();
        let (kept, truncated) = tokio_test::block_on(read_capped(data, 8, stopped)).unwrap();
        assert_eq!(kept, b"abcdefgh");
        assert!(!truncated);
    }
}
