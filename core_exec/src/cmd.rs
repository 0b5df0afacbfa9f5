// core_exec/src/cmd.rs
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::timeout;


/// Budget used when a caller passes `0` or a negative timeout.
/// There is no way to ask for an unbounded wait.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Exit code reported when the process never started, was killed or died on a signal.
pub const NO_EXIT_CODE: i32 = -1;

// once the child is gone, readers get this long to hand over what they captured
const READER_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
  #[error("empty command")]
  EmptyCommand,
  #[error("failed to start `{cmd}`: {reason}")]
  Spawn { cmd: String, reason: String },
  #[error("`{cmd}` timed out after {secs}s")]
  Timeout { cmd: String, secs: u64 },
  #[error("`{cmd}` exited with status {code}")]
  ExitStatus { cmd: String, code: i32 },
  #[error("failed waiting for `{cmd}`: {reason}")]
  Wait { cmd: String, reason: String },
  // free text, mostly for stand-in runners in tests
  #[error("{0}")]
  Other(String),
}

impl CommandError {
  pub fn other(msg: impl Into<String>) -> Self {
    CommandError::Other(msg.into())
  }

  pub fn is_timeout(&self) -> bool {
    matches!(self, CommandError::Timeout { .. })
  }
}

/// What came back from one command: `error` is set iff the process could not be
/// started/reaped or did not exit with `0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
  pub exit_code: i32,
  pub error: Option<CommandError>,
  pub stdout: String,
  pub stderr: String,
}

impl CommandOutput {
  pub fn success(stdout: impl Into<String>) -> Self {
    Self { exit_code: 0, error: None, stdout: stdout.into(), stderr: String::new() }
  }

  pub fn failure(exit_code: i32, error: CommandError) -> Self {
    Self { exit_code, error: Some(error), stdout: String::new(), stderr: String::new() }
  }

  fn not_started(error: CommandError) -> Self {
    Self::failure(NO_EXIT_CODE, error)
  }

  pub fn is_success(&self) -> bool {
    self.error.is_none()
  }

  /// The process may have been stopped while working: killed on timeout, died on a
  /// signal or could not be reaped. Only a process that exited by itself, or never
  /// started, is known to have finished what it was doing.
  pub fn was_interrupted(&self) -> bool {
    match &self.error {
      None => false,
      Some(CommandError::Timeout { .. } | CommandError::Wait { .. }) => true,
      Some(CommandError::EmptyCommand | CommandError::Spawn { .. } | CommandError::ExitStatus { .. }) => false,
      // stand-ins only say how it ended through the exit code
      Some(CommandError::Other(_)) => self.exit_code == NO_EXIT_CODE,
    }
  }

  /// `Ok(self)` on success, otherwise an error carrying code, cause and both streams.
  pub fn check(self) -> anyhow::Result<CommandOutput> {
    match &self.error {
      None => Ok(self),
      Some(err) => Err(anyhow::anyhow!(
        "{} (exit code {}, stdout: '{}', stderr: '{}')",
        err, self.exit_code, self.stdout.trim_end(), self.stderr.trim_end()
      )),
    }
  }
}

/// Joins an argument vector the way it would be typed in a shell (no quoting).
pub fn command_line(argv: &[String]) -> String {
  argv.join(" ")
}

/// `timeout_secs <= 0` falls back to `default_secs`.
pub fn effective_timeout(timeout_secs: i64, default_secs: u64) -> u64 {
  if timeout_secs <= 0 { default_secs } else { timeout_secs as u64 }
}

/// The seam every step goes through to touch the OS.
/// Production uses `SystemCommandRunner`, tests hand in a `FnCommandRunner`.
#[async_trait]
pub trait CommandRunner: Send + Sync {
  async fn run(&self, argv: &[String], timeout_secs: i64) -> CommandOutput;
}

/// Spawns real processes with `tokio::process`.
#[derive(Debug, Clone, Copy)]
pub struct SystemCommandRunner {
  default_timeout_secs: u64,
}

impl SystemCommandRunner {
  pub fn new(default_timeout_secs: u64) -> Self {
    // at least one second
    Self { default_timeout_secs: default_timeout_secs.max(1) }
  }
}

impl Default for SystemCommandRunner {
  fn default() -> Self {
    Self::new(DEFAULT_TIMEOUT_SECS)
  }
}

#[async_trait]
impl CommandRunner for SystemCommandRunner {
  async fn run(&self, argv: &[String], timeout_secs: i64) -> CommandOutput {
    // empty `argv` is a caller bug: report it, never try to spawn
    let Some((program, args)) = argv.split_first() else {
      return CommandOutput::not_started(CommandError::EmptyCommand);
    };
    let cmd = command_line(argv);
    let secs = effective_timeout(timeout_secs, self.default_timeout_secs);
    log::debug!("running `{}` (timeout {}s)", cmd, secs);

    let mut child = match Command::new(program)
      .args(args)
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .kill_on_drop(true)
      .spawn()
    {
      Ok(child) => child,
      Err(e) => return CommandOutput::not_started(CommandError::Spawn { cmd, reason: e.to_string() }),
    };

    // stdout and stderr are captured separately, each by its own task
    let stdout_buf = Arc::new(Mutex::new(Vec::new()));
    let stderr_buf = Arc::new(Mutex::new(Vec::new()));
    let mut readers = Vec::with_capacity(2);
    if let Some(out) = child.stdout.take() {
      readers.push(capture(out, Arc::clone(&stdout_buf)));
    }
    if let Some(err) = child.stderr.take() {
      readers.push(capture(err, Arc::clone(&stderr_buf)));
    }

    let (exit_code, error) = match timeout(Duration::from_secs(secs), child.wait()).await {
      Ok(Ok(status)) => match status.code() {
        Some(0) => (0, None),
        Some(code) => (code, Some(CommandError::ExitStatus { cmd: cmd.clone(), code })),
        None => (NO_EXIT_CODE, Some(CommandError::Wait { cmd: cmd.clone(), reason: format!("terminated by signal ({status})") })),
      },
      Ok(Err(e)) => (NO_EXIT_CODE, Some(CommandError::Wait { cmd: cmd.clone(), reason: e.to_string() })),
      Err(_) => {
        log::warn!("`{}` exceeded {}s, killing it", cmd, secs);
        let _ = child.start_kill();
        let _ = child.wait().await;
        (NO_EXIT_CODE, Some(CommandError::Timeout { cmd: cmd.clone(), secs }))
      }
    };

    for reader in readers {
      drain_reader(reader).await;
    }

    CommandOutput {
      exit_code,
      error,
      stdout: take_buffer(&stdout_buf),
      stderr: take_buffer(&stderr_buf),
    }
  }
}

// raw bytes until EOF: the pipe stays drained whatever the tool prints
fn capture<R>(mut stream: R, sink: Arc<Mutex<Vec<u8>>>) -> JoinHandle<()>
where
  R: AsyncRead + Unpin + Send + 'static,
{
  tokio::spawn(async move {
    let mut chunk = vec![0u8; 8 * 1024];
    loop {
      match stream.read(&mut chunk).await {
        Ok(0) | Err(_) => break,
        Ok(n) => {
          if let Ok(mut buf) = sink.lock() {
            buf.extend_from_slice(&chunk[..n]);
          }
        }
      }
    }
  })
}

// a grandchild can keep the pipe open after the child died: don't wait for it forever
async fn drain_reader(mut reader: JoinHandle<()>) {
  if timeout(READER_GRACE, &mut reader).await.is_err() {
    reader.abort();
  }
}

fn take_buffer(buf: &Arc<Mutex<Vec<u8>>>) -> String {
  buf.lock()
    .map(|b| String::from_utf8_lossy(&b).into_owned())
    .unwrap_or_default()
}

/// Stand-in runner built from a closure with the same shape as `CommandRunner::run`.
pub struct FnCommandRunner<F> {
  f: F,
}

impl<F> FnCommandRunner<F>
where
  F: Fn(&[String], i64) -> CommandOutput + Send + Sync,
{
  pub fn new(f: F) -> Self {
    Self { f }
  }
}

#[async_trait]
impl<F> CommandRunner for FnCommandRunner<F>
where
  F: Fn(&[String], i64) -> CommandOutput + Send + Sync,
{
  async fn run(&self, argv: &[String], timeout_secs: i64) -> CommandOutput {
    (self.f)(argv, timeout_secs)
  }
}


#[cfg(test)]
mod tests {
  use super::*;
  use std::time::Instant;

  fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|p| p.to_string()).collect()
  }

  #[tokio::test]
  async fn captures_stdout_and_stderr_separately() {
    let out = SystemCommandRunner::default()
      .run(&argv(&["sh", "-c", "echo out; echo err 1>&2"]), 5)
      .await;
    assert_eq!(out.exit_code, 0);
    assert!(out.error.is_none());
    assert_eq!(out.stdout, "out\n");
    assert_eq!(out.stderr, "err\n");
  }

  #[tokio::test]
  async fn non_zero_exit_is_an_error_with_real_code() {
    let out = SystemCommandRunner::default().run(&argv(&["sh", "-c", "exit 3"]), 5).await;
    assert_eq!(out.exit_code, 3);
    assert_eq!(
      out.error,
      Some(CommandError::ExitStatus { cmd: "sh -c exit 3".to_string(), code: 3 })
    );
  }

  #[tokio::test]
  async fn empty_argv_never_spawns() {
    let out = SystemCommandRunner::default().run(&[], 5).await;
    assert_eq!(out.exit_code, NO_EXIT_CODE);
    assert_eq!(out.error, Some(CommandError::EmptyCommand));
  }

  #[tokio::test]
  async fn missing_binary_reports_spawn_failure() {
    let out = SystemCommandRunner::default()
      .run(&argv(&["/nonexistent/definitely-not-here"]), 5)
      .await;
    assert_eq!(out.exit_code, NO_EXIT_CODE);
    assert!(matches!(out.error, Some(CommandError::Spawn { .. })));
  }

  #[tokio::test]
  async fn timeout_kills_the_process_and_keeps_partial_output() {
    let started = Instant::now();
    let out = SystemCommandRunner::default()
      .run(&argv(&["sh", "-c", "echo partial; sleep 10"]), 1)
      .await;
    assert!(started.elapsed() < Duration::from_secs(4), "took {:?}", started.elapsed());
    assert_eq!(out.exit_code, NO_EXIT_CODE);
    assert!(out.error.as_ref().is_some_and(CommandError::is_timeout));
    assert_eq!(out.stdout, "partial\n");
  }

  #[tokio::test]
  async fn invalid_utf8_and_large_output_are_drained() {
    let out = SystemCommandRunner::default()
      .run(&argv(&["sh", "-c", "printf '\\377\\n'; head -c 200000 /dev/zero | tr '\\0' a; echo; exit 0"]), 5)
      .await;
    assert_eq!(out.error, None);
    assert_eq!(out.exit_code, 0);
    assert!(out.stdout.starts_with("\u{FFFD}\n"), "{:?}", out.stdout.chars().take(8).collect::<String>());
    assert_eq!(out.stdout.matches('a').count(), 200000);
  }

  #[tokio::test]
  async fn last_line_without_newline_is_kept_as_is() {
    let out = SystemCommandRunner::default().run(&argv(&["printf", "no newline"]), 5).await;
    assert_eq!(out.stdout, "no newline");
  }

  #[test]
  fn interrupted_only_when_the_process_did_not_exit_by_itself() {
    let cmd = "fw-util".to_string();
    assert!(CommandOutput::failure(NO_EXIT_CODE, CommandError::Timeout { cmd: cmd.clone(), secs: 1 }).was_interrupted());
    assert!(CommandOutput::failure(NO_EXIT_CODE, CommandError::Wait { cmd: cmd.clone(), reason: "signal".into() }).was_interrupted());
    assert!(CommandOutput::failure(NO_EXIT_CODE, CommandError::other("killed")).was_interrupted());
    assert!(!CommandOutput::failure(1, CommandError::ExitStatus { cmd: cmd.clone(), code: 1 }).was_interrupted());
    assert!(!CommandOutput::failure(NO_EXIT_CODE, CommandError::Spawn { cmd, reason: "ENOENT".into() }).was_interrupted());
    assert!(!CommandOutput::failure(NO_EXIT_CODE, CommandError::EmptyCommand).was_interrupted());
    assert!(!CommandOutput::failure(1, CommandError::other("bad image")).was_interrupted());
    assert!(!CommandOutput::success("").was_interrupted());
  }

  #[test]
  fn non_positive_timeout_uses_default() {
    assert_eq!(effective_timeout(0, DEFAULT_TIMEOUT_SECS), DEFAULT_TIMEOUT_SECS);
    assert_eq!(effective_timeout(-5, 12), 12);
    assert_eq!(effective_timeout(7, 12), 7);
  }

  #[test]
  fn check_keeps_cause_and_streams() {
    let mut out = CommandOutput::failure(1, CommandError::other("boom"));
    out.stderr = "bad things\n".to_string();
    let err = out.check().unwrap_err();
    assert_eq!(err.to_string(), "boom (exit code 1, stdout: '', stderr: 'bad things')");
  }

  #[tokio::test]
  async fn fn_runner_passes_arguments_through() {
    let runner = FnCommandRunner::new(|argv: &[String], timeout_secs: i64| {
      CommandOutput::success(format!("{} {}", command_line(argv), timeout_secs))
    });
    let out = runner.run(&argv(&["echo", "hi"]), 9).await;
    assert_eq!(out.stdout, "echo hi 9");
  }
}
