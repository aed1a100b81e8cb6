//! Bootstrap orchestration.
//!
//! Runs the four phases strictly in order:
//!
//! ```text
//! Init -> Built -> Generated -> Patched -> Launched -> Terminated
//!               \-> StateReused ---------/
//! ```
//!
//! Generation and patching only happen when the probe finds no network
//! state. Any failure before the handoff stops the run with that phase's
//! exit code and leaves the filesystem as the failing phase left it.

use tracing::{info, warn};

use crate::build::BuildGate;
use crate::config::DevnetConfig;
use crate::error::Result;
use crate::generate::NetworkBootstrapper;
use crate::patch::{ConfigPatcher, PatchOutcome};
use crate::probe::{NetworkState, NetworkStateProbe};
use crate::process::{ExitStatus, ProcessRunner};
use crate::supervisor::{SupervisorInvocation, SupervisorLauncher};
use crate::Timer;

/// Workflow state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Built,
    Generated,
    Patched,
    StateReused,
    Launched,
    Terminated,
}

impl Phase {
    /// Whether `next` directly follows `self`.
    pub fn can_advance_to(self, next: Phase) -> bool {
        use Phase::*;
        matches!(
            (self, next),
            (Init, Built)
                | (Built, Generated)
                | (Built, StateReused)
                | (Generated, Patched)
                | (Patched, Launched)
                | (StateReused, Launched)
                | (Launched, Terminated)
        )
    }
}

/// What a run would do, derived from the filesystem alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Plan {
    pub build: bool,
    pub state: NetworkState,
}

impl Plan {
    pub fn for_config(config: &DevnetConfig) -> Self {
        Self {
            build: !config.skip_build,
            state: NetworkStateProbe::new(&config.state_dir).inspect(),
        }
    }

    /// Generation (and therefore patching) will run.
    pub fn generates(&self) -> bool {
        !self.state.exists()
    }
}

/// Result of a run that reached the supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// Every phase entered, in order.
    pub phases: Vec<Phase>,
    /// How the supervisor exited.
    pub status: ExitStatus,
}

impl Outcome {
    /// The supervisor's exit code, passed through unchanged.
    pub fn exit_code(&self) -> i32 {
        self.status.code()
    }
}

/// Sequences one bootstrap run.
pub struct Bootstrap<'a> {
    config: &'a DevnetConfig,
    runner: &'a dyn ProcessRunner,
    cargo: Option<String>,
    phases: Vec<Phase>,
}

impl<'a> Bootstrap<'a> {
    pub fn new(config: &'a DevnetConfig, runner: &'a dyn ProcessRunner) -> Self {
        Self {
            config,
            runner,
            cargo: None,
            phases: vec![Phase::Init],
        }
    }

    /// Build with a specific cargo executable instead of `$CARGO`/`cargo`.
    pub fn with_cargo(mut self, cargo: impl Into<String>) -> Self {
        self.cargo = Some(cargo.into());
        self
    }

    pub fn phase(&self) -> Phase {
        self.phases.last().copied().unwrap_or(Phase::Init)
    }

    fn advance(&mut self, next: Phase) {
        let current = self.phase();
        debug_assert!(
            current.can_advance_to(next),
            "invalid phase transition {:?} -> {:?}",
            current,
            next
        );
        info!(from = ?current, to = ?next, "phase transition");
        self.phases.push(next);
    }

    /// Run every phase and hand off to the supervisor.
    ///
    /// `extra_args` are forwarded to the supervisor unchanged.
    pub async fn run(mut self, extra_args: Vec<String>) -> Result<Outcome> {
        let config = self.config;
        let runner = self.runner;
        config.validate()?;

        println!("=== Devnet Bootstrap ===\n");

        // 1. Build gate
        let mut gate = BuildGate::new(runner, &config.workspace, &config.node_binary);
        if let Some(cargo) = &self.cargo {
            gate = gate.with_cargo(cargo.clone());
        }

        if config.skip_build {
            println!("[SKIP] Build (--skip-build)");
        } else {
            println!("Building {} (release)...", config.node_binary);
            let t = Timer::start("Build");
            gate.ensure_built().await?;
            t.finish();
        }
        let artifact = gate.ensure_invocable().await?;
        self.advance(Phase::Built);

        // 2. Network state
        let probe = NetworkStateProbe::new(&config.state_dir);
        match probe.inspect() {
            NetworkState::Absent => {
                println!("\nGenerating network state...");
                let t = Timer::start("Generate");
                NetworkBootstrapper::new(runner, &artifact.path, &config.state_dir)
                    .generate(&config.genesis)
                    .await?;
                t.finish();
                self.advance(Phase::Generated);

                // 3. Indexer patch, only ever against freshly generated state
                let patcher = ConfigPatcher::new(config.node_config_path());
                if patcher.patch_indexer(&config.indexer_database_url)? == PatchOutcome::Unchanged {
                    warn!(path = %patcher.path().display(), "generated config already pointed at the external indexer");
                }
                println!("  Indexer -> {}", crate::patch::EXTERNAL_INDEXER);
                self.advance(Phase::Patched);

                if let Err(e) = probe.mark_complete(&config.genesis.chain_id) {
                    warn!("{}", e);
                }
            }
            state => {
                if state == NetworkState::Unmarked {
                    warn!(
                        state_dir = %config.state_dir.display(),
                        "network state has no completion marker; if a previous generation was interrupted, remove the directory and re-run"
                    );
                }
                println!(
                    "\n[SKIP] Network state exists at {}",
                    config.state_dir.display()
                );
                println!("  Delete it to regenerate");
                self.advance(Phase::StateReused);
            }
        }

        // 4. Supervisor handoff
        let invocation = SupervisorInvocation::new(
            &config.supervisor,
            &config.supervisor_config,
            extra_args,
        );
        println!("\n=== Starting {} ===", config.supervisor);
        let launcher = SupervisorLauncher::new(runner);
        self.advance(Phase::Launched);
        let status = launcher.launch(&invocation).await?;
        self.advance(Phase::Terminated);

        Ok(Outcome {
            phases: self.phases,
            status,
        })
    }
}
