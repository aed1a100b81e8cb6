//! Error taxonomy for the bootstrap workflow.
//!
//! Every phase has its own variant so the operator can tell at a glance
//! which stage failed. Each variant maps to a distinct process exit code.

use std::path::PathBuf;

use thiserror::Error;

/// Exit code for configuration or filesystem failures outside a phase.
pub const EXIT_CONFIG: i32 = 1;
/// Exit code when the release build fails.
pub const EXIT_BUILD: i32 = 10;
/// Exit code when the built binary cannot be invoked.
pub const EXIT_INVOCATION: i32 = 11;
/// Exit code when network generation fails.
pub const EXIT_GENERATION: i32 = 12;
/// Exit code when the node config cannot be patched.
pub const EXIT_PATCH: i32 = 13;
/// Exit code when the supervisor cannot be started.
pub const EXIT_LAUNCH: i32 = 14;

/// A fatal bootstrap failure.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("[config] {0}")]
    Config(String),

    #[error("[io] {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("[build] `{command}` {status}{}\n  Fix the compile errors above and re-run.", stderr_tail(.stderr))]
    Build {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("[invoke] `{command}` {status}{}\n  The binary built but does not run; check linking and runtime deps.", stderr_tail(.stderr))]
    Invocation {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("[generate] `{command}` {status}{}\n  Inspect the generation parameters. Remove {} before re-running.", stderr_tail(.stderr), .state_dir.display())]
    Generation {
        command: String,
        status: String,
        stderr: String,
        state_dir: PathBuf,
    },

    #[error("[patch] {}: {reason}\n  The generated config format does not match what the patcher expects.", .path.display())]
    Patch { path: PathBuf, reason: String },

    #[error("[interrupted] received signal {0} between phases")]
    Interrupted(i32),

    #[error("[launch] failed to start `{program}`: {source}\n  Is the supervisor installed and on PATH?")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

impl BootstrapError {
    /// Process exit code for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            BootstrapError::Config(_) | BootstrapError::Io { .. } => EXIT_CONFIG,
            BootstrapError::Build { .. } => EXIT_BUILD,
            BootstrapError::Invocation { .. } => EXIT_INVOCATION,
            BootstrapError::Generation { .. } => EXIT_GENERATION,
            BootstrapError::Patch { .. } => EXIT_PATCH,
            BootstrapError::Launch { .. } => EXIT_LAUNCH,
            BootstrapError::Interrupted(signo) => 128 + signo,
        }
    }

    /// Map a spawn failure, keeping signal interruptions distinct from the
    /// phase's own failure.
    pub(crate) fn spawn_failure(err: std::io::Error, otherwise: impl FnOnce(std::io::Error) -> Self) -> Self {
        match crate::process::interrupted_signal(&err) {
            Some(signo) => BootstrapError::Interrupted(signo),
            None => otherwise(err),
        }
    }

    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        BootstrapError::Io {
            context: context.into(),
            source,
        }
    }
}

/// Number of stderr lines kept in error messages.
const STDERR_TAIL_LINES: usize = 20;

/// Format the last lines of captured stderr for display.
fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.is_empty() {
        return String::new();
    }
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    let mut out = String::from("\n\nstderr:\n");
    for line in &lines[start..] {
        out.push_str("  ");
        out.push_str(line);
        out.push('\n');
    }
    out
}

pub type Result<T, E = BootstrapError> = std::result::Result<T, E>;
