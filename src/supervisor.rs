//! Supervisor handoff.
//!
//! The last phase starts the process supervisor with the caller's terminal
//! attached and waits for it. Whatever the supervisor exits with becomes
//! our exit code.

use std::path::PathBuf;

use tracing::info;

use crate::error::{BootstrapError, Result};
use crate::process::{CommandSpec, ExitStatus, ProcessRunner};

/// One supervisor run: config file plus forwarded arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorInvocation {
    pub program: String,
    pub config_file: PathBuf,
    /// Forwarded verbatim, in caller order.
    pub extra_args: Vec<String>,
}

impl SupervisorInvocation {
    pub fn new(program: impl Into<String>, config_file: impl Into<PathBuf>, extra_args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            config_file: config_file.into(),
            extra_args,
        }
    }

    pub fn command(&self) -> CommandSpec {
        CommandSpec::new(&self.program)
            .arg("up")
            .arg("--config")
            .arg_path(&self.config_file)
            .args(self.extra_args.iter().cloned())
    }
}

/// Hands control to the supervisor.
pub struct SupervisorLauncher<'a> {
    runner: &'a dyn ProcessRunner,
}

impl<'a> SupervisorLauncher<'a> {
    pub fn new(runner: &'a dyn ProcessRunner) -> Self {
        Self { runner }
    }

    /// Run the supervisor until it exits.
    ///
    /// # Errors
    ///
    /// [`BootstrapError::Launch`] only if the supervisor could not be started.
    /// A supervisor that starts and then fails is reported through the
    /// returned [`ExitStatus`].
    pub async fn launch(&self, invocation: &SupervisorInvocation) -> Result<ExitStatus> {
        let cmd = invocation.command();
        info!(
            supervisor = %invocation.program,
            config = %invocation.config_file.display(),
            extra_args = invocation.extra_args.len(),
            "handing off to supervisor"
        );

        let status = self
            .runner
            .run_attached(&cmd)
            .await
            .map_err(|e| {
                BootstrapError::spawn_failure(e, |source| BootstrapError::Launch {
                    program: invocation.program.clone(),
                    source,
                })
            })?;

        info!(%status, "supervisor exited");
        Ok(status)
    }
}
