//! Node binary build gate.
//!
//! Nothing downstream runs until the node binary has been built in release
//! mode and answers `--help`. Cargo's own incremental build makes repeated
//! runs cheap, so the build is requested unconditionally.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{BootstrapError, Result};
use crate::process::{CommandSpec, ProcessRunner};

/// Cargo executable, overridable through `$CARGO` like cargo subcommands do.
fn cargo_program() -> String {
    std::env::var("CARGO").unwrap_or_else(|_| "cargo".to_string())
}

/// Where `cargo build --release` leaves `binary` in `workspace`.
pub fn release_path(workspace: &Path, binary: &str) -> PathBuf {
    workspace.join("target").join("release").join(binary)
}

/// The release build of the node binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildArtifact {
    pub path: PathBuf,
    /// Set once `--help` has succeeded.
    pub ready: bool,
}

/// Builds the node binary and checks that it starts.
pub struct BuildGate<'a> {
    runner: &'a dyn ProcessRunner,
    workspace: &'a Path,
    binary_name: &'a str,
    cargo: String,
}

impl<'a> BuildGate<'a> {
    pub fn new(runner: &'a dyn ProcessRunner, workspace: &'a Path, binary_name: &'a str) -> Self {
        Self {
            runner,
            workspace,
            binary_name,
            cargo: cargo_program(),
        }
    }

    /// Use a specific cargo executable.
    pub fn with_cargo(mut self, cargo: impl Into<String>) -> Self {
        self.cargo = cargo.into();
        self
    }

    /// The artifact this gate produces (not yet checked).
    pub fn artifact(&self) -> BuildArtifact {
        BuildArtifact {
            path: release_path(self.workspace, self.binary_name),
            ready: false,
        }
    }

    pub fn build_command(&self) -> CommandSpec {
        CommandSpec::new(&self.cargo)
            .args(["build", "--release", "--bin", self.binary_name])
            .current_dir(self.workspace)
    }

    pub fn help_command(&self) -> CommandSpec {
        CommandSpec::new(self.artifact().path.to_string_lossy()).arg("--help")
    }

    /// Run the release build.
    ///
    /// # Errors
    ///
    /// [`BootstrapError::Build`] with cargo's exit status and stderr.
    pub async fn ensure_built(&self) -> Result<()> {
        let cmd = self.build_command();
        info!(binary = self.binary_name, workspace = %self.workspace.display(), "building node binary");

        let output = self.runner.run(&cmd).await.map_err(|e| {
            BootstrapError::spawn_failure(e, |e| BootstrapError::Build {
                command: cmd.to_string(),
                status: format!("failed to start: {}", e),
                stderr: String::new(),
            })
        })?;

        if !output.status.success() {
            return Err(BootstrapError::Build {
                command: cmd.to_string(),
                status: output.status.to_string(),
                stderr: output.stderr,
            });
        }
        Ok(())
    }

    /// Run the built binary with `--help` and expect usage text back.
    ///
    /// # Errors
    ///
    /// [`BootstrapError::Invocation`] if the binary is missing, cannot start,
    /// exits non-zero, or prints nothing.
    pub async fn ensure_invocable(&self) -> Result<BuildArtifact> {
        let mut artifact = self.artifact();
        let cmd = self.help_command();

        if !artifact.path.is_file() {
            return Err(BootstrapError::Invocation {
                command: cmd.to_string(),
                status: format!("binary not found at {}", artifact.path.display()),
                stderr: String::new(),
            });
        }

        let output = self.runner.run(&cmd).await.map_err(|e| {
            BootstrapError::spawn_failure(e, |e| BootstrapError::Invocation {
                command: cmd.to_string(),
                status: format!("failed to start: {}", e),
                stderr: String::new(),
            })
        })?;

        if !output.status.success() {
            return Err(BootstrapError::Invocation {
                command: cmd.to_string(),
                status: output.status.to_string(),
                stderr: output.stderr,
            });
        }

        if output.stdout.trim().is_empty() {
            return Err(BootstrapError::Invocation {
                command: cmd.to_string(),
                status: "exited with code 0 but printed no help text".to_string(),
                stderr: output.stderr,
            });
        }

        artifact.ready = true;
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{ExitStatus, ProcessOutput};
    use async_trait::async_trait;
    use std::fs;
    use std::io;
    use std::sync::Mutex;
    use tempfile::tempdir;

    struct ScriptedRunner {
        exits: Mutex<Vec<i32>>,
        help_text: &'static str,
        seen: Mutex<Vec<CommandSpec>>,
    }

    impl ScriptedRunner {
        fn new(exits: &[i32]) -> Self {
            Self {
                exits: Mutex::new(exits.iter().rev().copied().collect()),
                help_text: "Usage: pd <COMMAND>\n",
                seen: Mutex::new(Vec::new()),
            }
        }

        fn silent(exits: &[i32]) -> Self {
            Self {
                help_text: "",
                ..Self::new(exits)
            }
        }
    }

    #[async_trait]
    impl ProcessRunner for ScriptedRunner {
        async fn run(&self, cmd: &CommandSpec) -> io::Result<ProcessOutput> {
            self.seen.lock().unwrap().push(cmd.clone());
            let code = self.exits.lock().unwrap().pop().unwrap_or(0);
            Ok(ProcessOutput {
                status: ExitStatus::Code(code),
                stdout: self.help_text.to_string(),
                stderr: if code == 0 { String::new() } else { "error[E0425]\n".into() },
            })
        }

        async fn run_attached(&self, _cmd: &CommandSpec) -> io::Result<ExitStatus> {
            unreachable!()
        }
    }

    #[test]
    fn test_build_command() {
        let runner = ScriptedRunner::new(&[]);
        let gate = BuildGate::new(&runner, Path::new("/ws"), "pd").with_cargo("cargo");
        let cmd = gate.build_command();
        assert_eq!(cmd.to_string(), "cargo build --release --bin pd");
        assert_eq!(cmd.get_current_dir(), Some(Path::new("/ws")));
        assert_eq!(gate.help_command().to_string(), "/ws/target/release/pd --help");
    }

    #[tokio::test]
    async fn test_ensure_built_failure() {
        let runner = ScriptedRunner::new(&[101]);
        let gate = BuildGate::new(&runner, Path::new("/ws"), "pd");
        let err = gate.ensure_built().await.unwrap_err();
        assert!(matches!(err, BootstrapError::Build { .. }));
        assert!(err.to_string().contains("exited with code 101"));
        assert!(err.to_string().contains("E0425"));
    }

    #[tokio::test]
    async fn test_ensure_invocable_missing_binary() {
        let dir = tempdir().unwrap();
        let runner = ScriptedRunner::new(&[]);
        let gate = BuildGate::new(&runner, dir.path(), "pd");
        let err = gate.ensure_invocable().await.unwrap_err();
        assert!(matches!(err, BootstrapError::Invocation { .. }));
        assert!(runner.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ensure_invocable_ok_and_broken() {
        let dir = tempdir().unwrap();
        let release = dir.path().join("target/release");
        fs::create_dir_all(&release).unwrap();
        fs::write(release.join("pd"), "").unwrap();

        let runner = ScriptedRunner::new(&[0, 1]);
        let gate = BuildGate::new(&runner, dir.path(), "pd");

        let artifact = gate.ensure_invocable().await.unwrap();
        assert!(artifact.ready);
        assert_eq!(artifact.path, release.join("pd"));

        let err = gate.ensure_invocable().await.unwrap_err();
        assert!(matches!(err, BootstrapError::Invocation { .. }));
    }

    #[tokio::test]
    async fn test_ensure_invocable_requires_help_text() {
        let dir = tempdir().unwrap();
        let release = dir.path().join("target/release");
        fs::create_dir_all(&release).unwrap();
        fs::write(release.join("pd"), "").unwrap();

        let runner = ScriptedRunner::silent(&[0]);
        let gate = BuildGate::new(&runner, dir.path(), "pd");
        let err = gate.ensure_invocable().await.unwrap_err();
        assert!(matches!(err, BootstrapError::Invocation { .. }));
        assert!(err.to_string().contains("no help text"));
    }

    #[test]
    fn test_release_path_matches_config() {
        let config = crate::config::DevnetConfig::new("/ws", "/state");
        let runner = ScriptedRunner::new(&[]);
        let gate = BuildGate::new(&runner, &config.workspace, &config.node_binary);
        assert_eq!(gate.artifact().path, config.artifact_path());
    }
}
