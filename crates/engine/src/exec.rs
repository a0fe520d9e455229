//! Cancellation-aware external tool execution.
//!
//! Spawns the tool with piped stdio and streams stdout/stderr as tagged
//! lines over a channel while a monitor task supervises the child:
//! normal exit, cancellation (child is signal-killed), or deadline
//! expiry. Adapters consume lines as they arrive — the whole output is
//! never buffered here.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::cancel::CancelToken;
use crate::error::{ScanError, ScanResult};
use crate::redact::redact_secrets;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Command description
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// The invocation as a single line, secrets masked. This is what
    /// goes into the scan log.
    pub fn display_redacted(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        redact_secrets(&line)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Streaming run
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// How the child ended. Non-zero exit codes are information, not
/// failure — several wrapped tools signal findings through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitKind {
    Finished(Option<i32>),
    Cancelled,
    TimedOut,
}

#[derive(Debug)]
pub struct ToolRun {
    lines: mpsc::Receiver<OutputLine>,
    monitor: JoinHandle<ExitKind>,
    timeout_secs: u64,
}

impl ToolRun {
    /// Next output line, or `None` once both pipes are closed.
    pub async fn next_line(&mut self) -> Option<OutputLine> {
        self.lines.recv().await
    }

    /// Drop the line stream and wait for the child to be reaped.
    pub async fn wait(self) -> ScanResult<ExitKind> {
        drop(self.lines);
        self.monitor
            .await
            .map_err(|e| ScanError::Tool(format!("tool monitor task failed: {e}")))
    }

    /// Like [`Self::wait`], but maps cancellation and deadline expiry to
    /// their control-flow errors. Returns the exit code on normal exit.
    pub async fn finish(self) -> ScanResult<Option<i32>> {
        let timeout_secs = self.timeout_secs;
        match self.wait().await? {
            ExitKind::Finished(code) => Ok(code),
            ExitKind::Cancelled => Err(ScanError::Cancelled),
            ExitKind::TimedOut => Err(ScanError::TimedOut(timeout_secs)),
        }
    }
}

/// Interval at which the monitor polls the cancellation token while the
/// child runs.
const CANCEL_POLL: Duration = Duration::from_millis(250);

/// Spawn a tool under supervision. The child is killed when `cancel`
/// fires or `timeout` elapses; `ToolRun::wait` reports which happened.
pub fn spawn(cmd: &ToolCommand, cancel: CancelToken, timeout: Duration) -> ScanResult<ToolRun> {
    let mut command = Command::new(&cmd.program);
    command
        .args(&cmd.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    for (key, value) in &cmd.env {
        command.env(key, value);
    }

    let mut child = command
        .spawn()
        .map_err(|e| ScanError::Tool(format!("failed to start {}: {e}", cmd.program)))?;

    let (tx, rx) = mpsc::channel::<OutputLine>(256);

    let stdout_task = spawn_reader(child.stdout.take(), tx.clone(), OutputLine::Stdout);
    let stderr_task = spawn_reader(child.stderr.take(), tx, OutputLine::Stderr);

    let monitor = tokio::spawn(async move {
        let mut poll = tokio::time::interval(CANCEL_POLL);
        poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                status = child.wait() => {
                    let _ = stdout_task.await;
                    let _ = stderr_task.await;
                    return ExitKind::Finished(status.ok().and_then(|s| s.code()));
                }
                _ = &mut deadline => {
                    let _ = child.start_kill();
                    let _ = child.wait().await;
                    stdout_task.abort();
                    stderr_task.abort();
                    return ExitKind::TimedOut;
                }
                _ = poll.tick() => {
                    if cancel.is_cancelled() {
                        let _ = child.start_kill();
                        let _ = child.wait().await;
                        stdout_task.abort();
                        stderr_task.abort();
                        return ExitKind::Cancelled;
                    }
                }
            }
        }
    });

    Ok(ToolRun {
        lines: rx,
        monitor,
        timeout_secs: timeout.as_secs(),
    })
}

fn spawn_reader<R>(
    pipe: Option<R>,
    tx: mpsc::Sender<OutputLine>,
    wrap: fn(String) -> OutputLine,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        if let Some(pipe) = pipe {
            let mut reader = BufReader::new(pipe).lines();
            while let Ok(Some(line)) = reader.next_line().await {
                // Receiver gone means the consumer stopped parsing.
                if tx.send(wrap(line)).await.is_err() {
                    break;
                }
            }
        }
    })
}

/// Substrings in stderr output that mark a line worth surfacing as a
/// scan warning.
pub fn stderr_is_noteworthy(line: &str) -> bool {
    let lower = line.to_ascii_lowercase();
    ["error", "fatal", "failed", "permission denied", "timeout", "refused"]
        .iter()
        .any(|needle| lower.contains(needle))
}
