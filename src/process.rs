//! Subprocess execution.
//!
//! Every external tool the bootstrapper touches (cargo, the node binary,
//! the supervisor) is started through a [`ProcessRunner`]. The orchestrator
//! only ever sees a [`CommandSpec`] going in and an [`ExitStatus`] coming
//! out, so tests can swap in a fake runner and never spawn anything.
//!
//! [`SystemRunner`] is the real implementation. While a child is running it
//! forwards SIGINT, SIGTERM and SIGHUP to it, so interrupting the
//! bootstrapper never leaves an orphaned child behind. Children stay in our
//! process group, so a Ctrl-C typed at the terminal already reaches them;
//! SIGINT is only forwarded when we are not the terminal's foreground group,
//! otherwise the child would see it twice.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use nix::sys::signal::Signal;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// A command to run: program, arguments and optional working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    program: String,
    args: Vec<String>,
    current_dir: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
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

    /// Append a path argument.
    pub fn arg_path(mut self, path: &Path) -> Self {
        self.args.push(path.to_string_lossy().into_owned());
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    pub fn get_current_dir(&self) -> Option<&Path> {
        self.current_dir.as_deref()
    }

    fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).kill_on_drop(true);
        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }
        cmd
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " '{}'", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// How a child process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// Exited normally with this code.
    Code(i32),
    /// Killed by this signal number.
    Signal(i32),
}

impl ExitStatus {
    pub fn success(&self) -> bool {
        matches!(self, ExitStatus::Code(0))
    }

    /// Shell-style exit code: the code itself, or `128 + signo`.
    pub fn code(&self) -> i32 {
        match *self {
            ExitStatus::Code(code) => code,
            ExitStatus::Signal(signo) => 128 + signo,
        }
    }
}

impl From<std::process::ExitStatus> for ExitStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        use std::os::unix::process::ExitStatusExt;

        match (status.code(), status.signal()) {
            (Some(code), _) => ExitStatus::Code(code),
            (None, Some(signo)) => ExitStatus::Signal(signo),
            (None, None) => ExitStatus::Code(1),
        }
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitStatus::Code(code) => write!(f, "exited with code {}", code),
            ExitStatus::Signal(signo) => match Signal::try_from(*signo) {
                Ok(sig) => write!(f, "killed by {}", sig.as_str()),
                Err(_) => write!(f, "killed by signal {}", signo),
            },
        }
    }
}

/// Captured result of a non-interactive run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

/// Capability to run external commands.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run to completion, capturing stdout and stderr.
    async fn run(&self, cmd: &CommandSpec) -> io::Result<ProcessOutput>;

    /// Run to completion with the caller's stdin, stdout and stderr attached.
    async fn run_attached(&self, cmd: &CommandSpec) -> io::Result<ExitStatus>;
}

/// Termination signals the runner listens for.
struct SignalSet {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
    hangup: tokio::signal::unix::Signal,
}

impl SignalSet {
    fn register() -> io::Result<Self> {
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
            hangup: signal(SignalKind::hangup())?,
        })
    }

    /// Wait for the next termination signal.
    async fn recv(&mut self) -> Signal {
        tokio::select! {
            _ = self.interrupt.recv() => Signal::SIGINT,
            _ = self.terminate.recv() => Signal::SIGTERM,
            _ = self.hangup.recv() => Signal::SIGHUP,
        }
    }

    /// A signal that arrived while no child was running, if any.
    async fn pending(&mut self) -> Option<Signal> {
        tokio::select! {
            biased;
            _ = self.interrupt.recv() => Some(Signal::SIGINT),
            _ = self.terminate.recv() => Some(Signal::SIGTERM),
            _ = self.hangup.recv() => Some(Signal::SIGHUP),
            _ = std::future::ready(()) => None,
        }
    }
}

/// Runs real subprocesses.
///
/// Must be created inside a tokio runtime. Once created, termination signals
/// are no longer fatal to this process; they are forwarded to whichever
/// child is running, or reported as [`io::ErrorKind::Interrupted`] by the
/// next spawn attempt.
pub struct SystemRunner {
    signals: Mutex<SignalSet>,
}

impl SystemRunner {
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            signals: Mutex::new(SignalSet::register()?),
        })
    }

    async fn spawn(&self, cmd: &CommandSpec, mut command: Command) -> io::Result<Child> {
        if let Some(sig) = self.signals.lock().await.pending().await {
            return Err(interrupted(sig));
        }
        debug!(command = %cmd, "spawning");
        command.spawn()
    }

    /// Wait for `child`, forwarding termination signals to it meanwhile.
    async fn wait(&self, child: &mut Child) -> io::Result<ExitStatus> {
        let mut signals = self.signals.lock().await;
        loop {
            tokio::select! {
                status = child.wait() => return status.map(ExitStatus::from),
                sig = signals.recv() => forward_signal(child, sig),
            }
        }
    }
}

#[async_trait]
impl ProcessRunner for SystemRunner {
    async fn run(&self, cmd: &CommandSpec) -> io::Result<ProcessOutput> {
        let mut command = cmd.to_command();
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = self.spawn(cmd, command).await?;
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let stdout_handle = tokio::spawn(async move {
            let mut collected = String::new();
            if let Some(mut stdout) = stdout {
                if let Err(e) = stdout.read_to_string(&mut collected).await {
                    warn!("error reading stdout: {}", e);
                }
            }
            collected
        });

        // Echo stderr live so long builds show progress, and keep a copy.
        let stderr_handle = tokio::spawn(async move {
            let mut collected = String::new();
            if let Some(stderr) = stderr {
                let mut lines = BufReader::new(stderr).lines();
                loop {
                    match lines.next_line().await {
                        Ok(Some(line)) => {
                            eprintln!("{}", line);
                            collected.push_str(&line);
                            collected.push('\n');
                        }
                        Ok(None) => break,
                        Err(e) => {
                            warn!("error reading stderr: {}", e);
                            break;
                        }
                    }
                }
            }
            collected
        });

        let status = self.wait(&mut child).await?;
        let stdout = stdout_handle.await.unwrap_or_default();
        let stderr = stderr_handle.await.unwrap_or_default();

        Ok(ProcessOutput {
            status,
            stdout,
            stderr,
        })
    }

    async fn run_attached(&self, cmd: &CommandSpec) -> io::Result<ExitStatus> {
        let mut command = cmd.to_command();
        command
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        let mut child = self.spawn(cmd, command).await?;
        self.wait(&mut child).await
    }
}

fn forward_signal(child: &Child, sig: Signal) {
    use nix::errno::Errno;
    use nix::unistd::{getpgrp, tcgetpgrp, Pid};

    let Some(pid) = child.id() else {
        return; // already reaped
    };
    let foreground = tcgetpgrp(io::stdin()).ok();
    if !needs_forwarding(sig, foreground, getpgrp()) {
        debug!(pid, "terminal already delivered SIGINT to child");
        return;
    }
    debug!(pid, signal = sig.as_str(), "forwarding signal to child");
    if let Err(e) = nix::sys::signal::kill(Pid::from_raw(pid as i32), sig) {
        if e != Errno::ESRCH {
            warn!(pid, error = ?e, "failed to forward {}", sig.as_str());
        }
    }
}

/// Whether `sig` must be sent on to a child in process group `own`.
///
/// A SIGINT while `own` is the terminal's foreground group came from the
/// terminal, which has already signalled the whole group.
fn needs_forwarding(
    sig: Signal,
    foreground: Option<nix::unistd::Pid>,
    own: nix::unistd::Pid,
) -> bool {
    sig != Signal::SIGINT || foreground != Some(own)
}

/// A termination signal that arrived while no child was running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interrupted(pub Signal);

impl fmt::Display for Interrupted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "received {}", self.0.as_str())
    }
}

impl std::error::Error for Interrupted {}

fn interrupted(sig: Signal) -> io::Error {
    io::Error::new(io::ErrorKind::Interrupted, Interrupted(sig))
}

/// Signal number carried by an error produced when a signal arrived
/// between children.
pub fn interrupted_signal(err: &io::Error) -> Option<i32> {
    err.get_ref()
        .and_then(|inner| inner.downcast_ref::<Interrupted>())
        .map(|Interrupted(sig)| *sig as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_spec_display() {
        let cmd = CommandSpec::new("pd")
            .arg("testnet")
            .args(["generate", "--chain-id", "local devnet"]);
        assert_eq!(cmd.to_string(), "pd testnet generate --chain-id 'local devnet'");
        assert_eq!(cmd.program(), "pd");
        assert_eq!(cmd.get_args().len(), 4);
    }

    #[test]
    fn test_exit_status_code() {
        assert!(ExitStatus::Code(0).success());
        assert!(!ExitStatus::Code(7).success());
        assert_eq!(ExitStatus::Code(7).code(), 7);
        assert_eq!(ExitStatus::Signal(2).code(), 130);
        assert!(!ExitStatus::Signal(15).success());
    }

    #[test]
    fn test_exit_status_display() {
        assert_eq!(ExitStatus::Code(3).to_string(), "exited with code 3");
        assert_eq!(ExitStatus::Signal(9).to_string(), "killed by SIGKILL");
    }

    #[test]
    fn test_interrupted_signal_roundtrip() {
        let err = interrupted(Signal::SIGTERM);
        assert_eq!(interrupted_signal(&err), Some(15));

        let other = io::Error::new(io::ErrorKind::NotFound, "nope");
        assert_eq!(interrupted_signal(&other), None);
    }

    #[test]
    fn test_sigint_from_terminal_not_forwarded() {
        use nix::unistd::Pid;

        let own = Pid::from_raw(100);
        let other = Pid::from_raw(200);
        assert!(!needs_forwarding(Signal::SIGINT, Some(own), own));
        assert!(needs_forwarding(Signal::SIGINT, Some(other), own));
        assert!(needs_forwarding(Signal::SIGINT, None, own));
        assert!(needs_forwarding(Signal::SIGTERM, Some(own), own));
        assert!(needs_forwarding(Signal::SIGHUP, Some(own), own));
    }

    #[tokio::test]
    async fn test_run_captures_output() {
        let runner = SystemRunner::new().unwrap();
        let cmd = CommandSpec::new("sh").args(["-c", "echo out; echo err >&2; exit 3"]);
        let output = runner.run(&cmd).await.unwrap();
        assert_eq!(output.status, ExitStatus::Code(3));
        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr, "err\n");
    }

    #[tokio::test]
    async fn test_run_in_current_dir() {
        let dir = tempfile::tempdir().unwrap();
        let runner = SystemRunner::new().unwrap();
        let cmd = CommandSpec::new("sh")
            .args(["-c", "touch marker"])
            .current_dir(dir.path());
        let output = runner.run(&cmd).await.unwrap();
        assert!(output.status.success());
        assert!(dir.path().join("marker").exists());
    }

    #[tokio::test]
    async fn test_run_missing_program() {
        let runner = SystemRunner::new().unwrap();
        let cmd = CommandSpec::new("definitely_not_a_real_command_12345");
        let err = runner.run(&cmd).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_run_attached_exit_code() {
        let runner = SystemRunner::new().unwrap();
        let cmd = CommandSpec::new("sh").args(["-c", "exit 7"]);
        let status = runner.run_attached(&cmd).await.unwrap();
        assert_eq!(status, ExitStatus::Code(7));
    }
}
