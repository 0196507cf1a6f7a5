//! Child-process state machine with interrupt-then-kill stop.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::process::{ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Error types for runner operations.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    /// The process is running and the operation needs it stopped.
    #[error("process is running")]
    ProcessIsRunning,

    /// The process is stopped and the operation needs it running.
    #[error("process is not running")]
    ProcessIsNotRunning,

    /// The process launched but no pid could be recorded.
    #[error("failed to spawn process: {0}")]
    SpawnFailed(String),

    /// Signal delivery failed, e.g. because the process was reaped
    /// externally.
    #[error("failed to send signal: {0}")]
    SignalFailed(String),

    /// Launching the process failed at the OS level.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Standard stream wiring for a launched process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StdioConfig {
    /// Inherit the kernel's stream.
    #[default]
    Inherit,
    /// Connect to `/dev/null`.
    Null,
    /// Create a pipe retrievable through the runner after launch.
    Piped,
}

impl StdioConfig {
    fn to_stdio(self) -> Stdio {
        match self {
            Self::Inherit => Stdio::inherit(),
            Self::Null => Stdio::null(),
            Self::Piped => Stdio::piped(),
        }
    }
}

#[derive(Debug, Default)]
struct RunnerShared {
    is_running: bool,
    pid: u32,
    exit_code: i32,
    started_at: Option<Instant>,
    exited_at: Option<Instant>,
    /// Completion channel of the current launch; the waiter task publishes
    /// `true` once the child is reaped and the state above is final.
    done: Option<watch::Receiver<bool>>,
    stdin: Option<ChildStdin>,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
}

/// A single child-process lifecycle: launch, observe, stop.
///
/// The runner is either `stopped` (initial) or `running`. After the child
/// exits it may be started again; every launch resets the recorded pid, exit
/// code, and times. An internal waiter task owns the transition back to
/// `stopped`, and `stop`/`wait` return only after that transition completed.
#[derive(Debug)]
pub struct Runner {
    executable_path: PathBuf,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
    envs: HashMap<String, String>,
    stdin: StdioConfig,
    stdout: StdioConfig,
    stderr: StdioConfig,
    shared: Arc<Mutex<RunnerShared>>,
}

impl Runner {
    /// A runner for the given executable, inheriting all standard streams.
    #[must_use]
    pub fn new(executable_path: impl Into<PathBuf>) -> Self {
        Self {
            executable_path: executable_path.into(),
            args: Vec::new(),
            working_dir: None,
            envs: HashMap::new(),
            stdin: StdioConfig::Inherit,
            stdout: StdioConfig::Inherit,
            stderr: StdioConfig::Inherit,
            shared: Arc::new(Mutex::new(RunnerShared::default())),
        }
    }

    /// Sets the command-line arguments.
    #[must_use]
    pub fn with_args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the working directory.
    #[must_use]
    pub fn with_working_dir(mut self, working_dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(working_dir.into());
        self
    }

    /// Adds environment variables.
    #[must_use]
    pub fn with_envs(mut self, envs: HashMap<String, String>) -> Self {
        self.envs.extend(envs);
        self
    }

    /// Wires the child's stdin.
    #[must_use]
    pub fn with_stdin(mut self, stdin: StdioConfig) -> Self {
        self.stdin = stdin;
        self
    }

    /// Wires the child's stdout.
    #[must_use]
    pub fn with_stdout(mut self, stdout: StdioConfig) -> Self {
        self.stdout = stdout;
        self
    }

    /// Wires the child's stderr.
    #[must_use]
    pub fn with_stderr(mut self, stderr: StdioConfig) -> Self {
        self.stderr = stderr;
        self
    }

    fn lock(shared: &Mutex<RunnerShared>) -> MutexGuard<'_, RunnerShared> {
        shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Launches the child process.
    ///
    /// Must be called within a tokio runtime; the internal waiter task is
    /// spawned onto it.
    ///
    /// # Errors
    ///
    /// [`ProcessError::ProcessIsRunning`] when already running, otherwise
    /// the underlying OS launch error.
    pub fn start(&self) -> Result<(), ProcessError> {
        let mut shared = Self::lock(&self.shared);

        if shared.is_running {
            return Err(ProcessError::ProcessIsRunning);
        }

        shared.pid = 0;
        shared.exit_code = 0;
        shared.started_at = None;
        shared.exited_at = None;
        shared.done = None;
        shared.stdin = None;
        shared.stdout = None;
        shared.stderr = None;

        let mut command = Command::new(&self.executable_path);
        command
            .args(&self.args)
            .stdin(self.stdin.to_stdio())
            .stdout(self.stdout.to_stdio())
            .stderr(self.stderr.to_stdio())
            .kill_on_drop(false);

        if let Some(working_dir) = &self.working_dir {
            command.current_dir(working_dir);
        }
        for (key, value) in &self.envs {
            command.env(key, value);
        }

        debug!(executable = %self.executable_path.display(), "starting process");
        let mut child = command.spawn().inspect_err(|error| {
            warn!(executable = %self.executable_path.display(), error = %error, "process start failed");
        })?;

        let pid = child.id().ok_or_else(|| {
            ProcessError::SpawnFailed(String::from("process exited before a pid was recorded"))
        })?;

        shared.stdin = child.stdin.take();
        shared.stdout = child.stdout.take();
        shared.stderr = child.stderr.take();
        shared.pid = pid;
        shared.is_running = true;
        shared.started_at = Some(Instant::now());

        let (done_tx, done_rx) = watch::channel(false);
        shared.done = Some(done_rx);
        drop(shared);

        info!(pid, executable = %self.executable_path.display(), "process started");

        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            let status = child.wait().await;

            let mut guard = Self::lock(&shared);
            guard.exited_at = Some(Instant::now());
            guard.is_running = false;
            match status {
                Ok(status) => {
                    guard.exit_code = status.code().unwrap_or(-1);
                    let uptime = guard
                        .started_at
                        .map(|started| Instant::now().saturating_duration_since(started));
                    info!(pid, exit_code = guard.exit_code, ?uptime, "process finished");
                }
                Err(error) => {
                    guard.exit_code = -1;
                    warn!(pid, error = %error, "failed to collect process exit status");
                }
            }
            drop(guard);

            let _ = done_tx.send(true);
        });

        Ok(())
    }

    /// Blocks until the child exits.
    ///
    /// # Errors
    ///
    /// [`ProcessError::ProcessIsNotRunning`] when stopped.
    pub async fn wait(&self) -> Result<(), ProcessError> {
        let mut done = {
            let shared = Self::lock(&self.shared);
            if !shared.is_running {
                return Err(ProcessError::ProcessIsNotRunning);
            }
            let Some(done) = shared.done.clone() else {
                return Err(ProcessError::ProcessIsNotRunning);
            };
            done
        };

        done.wait_for(|finished| *finished)
            .await
            .map_err(|_| ProcessError::ProcessIsNotRunning)?;

        Ok(())
    }

    /// Stops the child: interrupt first, kill once the deadline elapses.
    ///
    /// Returns `Ok` on a clean stop and on a kill. Returns only after the
    /// internal waiter recorded the exit.
    ///
    /// # Errors
    ///
    /// [`ProcessError::ProcessIsNotRunning`] when stopped;
    /// [`ProcessError::SignalFailed`] when signal delivery fails, e.g.
    /// because the process was reaped externally.
    pub async fn stop(&self, deadline: Duration) -> Result<(), ProcessError> {
        let (pid, mut done) = {
            let shared = Self::lock(&self.shared);
            if !shared.is_running {
                return Err(ProcessError::ProcessIsNotRunning);
            }
            let Some(done) = shared.done.clone() else {
                return Err(ProcessError::ProcessIsNotRunning);
            };
            (shared.pid, done)
        };

        debug!(pid, "stopping process");
        Self::signal(pid, Signal::SIGINT)?;

        match tokio::time::timeout(deadline, done.wait_for(|finished| *finished)).await {
            Ok(result) => {
                result.map_err(|_| ProcessError::ProcessIsNotRunning)?;
                info!(pid, "process stopped");
                return Ok(());
            }
            Err(_) => {}
        }

        warn!(pid, "process ignored the interrupt before the deadline, killing it");
        Self::signal(pid, Signal::SIGKILL)?;

        done.wait_for(|finished| *finished)
            .await
            .map_err(|_| ProcessError::ProcessIsNotRunning)?;

        info!(pid, "process killed");
        Ok(())
    }

    #[allow(clippy::cast_possible_wrap)] // OS pids fit in i32
    fn signal(pid: u32, signal: Signal) -> Result<(), ProcessError> {
        signal::kill(Pid::from_raw(pid as i32), signal)
            .map_err(|errno| ProcessError::SignalFailed(errno.to_string()))
    }

    /// Whether the child is currently running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        Self::lock(&self.shared).is_running
    }

    /// OS process id of the running child.
    ///
    /// # Errors
    ///
    /// [`ProcessError::ProcessIsNotRunning`] when stopped.
    pub fn get_pid(&self) -> Result<u32, ProcessError> {
        let shared = Self::lock(&self.shared);
        if !shared.is_running {
            return Err(ProcessError::ProcessIsNotRunning);
        }
        Ok(shared.pid)
    }

    /// Exit code of the last completed run.
    ///
    /// # Errors
    ///
    /// [`ProcessError::ProcessIsRunning`] while running.
    pub fn get_exit_code(&self) -> Result<i32, ProcessError> {
        let shared = Self::lock(&self.shared);
        if shared.is_running {
            return Err(ProcessError::ProcessIsRunning);
        }
        Ok(shared.exit_code)
    }

    /// Time the child has been running, or the duration of the last
    /// completed run. Zero when never started.
    #[must_use]
    pub fn get_uptime(&self) -> Duration {
        let shared = Self::lock(&self.shared);
        match (shared.started_at, shared.exited_at) {
            (Some(started), None) => started.elapsed(),
            (Some(started), Some(exited)) => exited.saturating_duration_since(started),
            _ => Duration::ZERO,
        }
    }

    /// The write half of the child's stdin, when wired as
    /// [`StdioConfig::Piped`]. Retrievable once per launch.
    #[must_use]
    pub fn take_stdin(&self) -> Option<ChildStdin> {
        Self::lock(&self.shared).stdin.take()
    }

    /// The read half of the child's stdout, when wired as
    /// [`StdioConfig::Piped`]. Retrievable once per launch.
    #[must_use]
    pub fn take_stdout(&self) -> Option<ChildStdout> {
        Self::lock(&self.shared).stdout.take()
    }

    /// The read half of the child's stderr, when wired as
    /// [`StdioConfig::Piped`]. Retrievable once per launch.
    #[must_use]
    pub fn take_stderr(&self) -> Option<ChildStderr> {
        Self::lock(&self.shared).stderr.take()
    }
}
