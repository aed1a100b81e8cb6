//! Local devnet bootstrapper library.
//!
//! Builds the node binary, generates network state if there is none,
//! points the node's indexer at Postgres, then hands off to the process
//! supervisor. See [`bootstrap::Bootstrap`] for the sequencing.

pub mod bootstrap;
pub mod build;
pub mod config;
pub mod error;
pub mod generate;
pub mod patch;
pub mod probe;
pub mod process;
pub mod supervisor;
mod timing;

pub use bootstrap::{Bootstrap, Outcome, Phase, Plan};
pub use config::DevnetConfig;
pub use error::BootstrapError;
pub use process::{CommandSpec, ExitStatus, ProcessOutput, ProcessRunner, SystemRunner};
pub use timing::{format_elapsed, Timer};
