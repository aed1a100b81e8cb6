//! Node config patching.
//!
//! Generated node configs index into the local key/value store. For the
//! devnet we want the indexer in Postgres, so the single `indexer` line is
//! rewritten and a `psql-conn` line is placed right after it:
//!
//! ```text
//! indexer = "kv"            indexer = "psql"
//!                    ==>    psql-conn = "postgresql://..."
//! ```
//!
//! Patching is insert-or-replace: any existing `psql-conn` line is dropped
//! first, so running the patch twice produces the same file.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{BootstrapError, Result};

/// Key selecting the indexer backend.
pub const INDEXER_KEY: &str = "indexer";

/// Key holding the external store's connection string.
pub const CONNECTION_KEY: &str = "psql-conn";

/// Indexer backend backed by the external store.
pub const EXTERNAL_INDEXER: &str = "psql";

/// Result of a patch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOutcome {
    /// The file was rewritten.
    Patched,
    /// The file already had the requested settings.
    Unchanged,
}

/// Rewrites the indexer setting of one node config file.
pub struct ConfigPatcher {
    path: PathBuf,
}

impl ConfigPatcher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Point the indexer at the external store reachable via `connection_string`.
    ///
    /// # Errors
    ///
    /// [`BootstrapError::Patch`] if the file cannot be read or written, or
    /// does not contain exactly one `indexer` line.
    pub fn patch_indexer(&self, connection_string: &str) -> Result<PatchOutcome> {
        let original = fs::read_to_string(&self.path)
            .map_err(|e| self.error(format!("cannot read config: {}", e)))?;

        let patched =
            patch_indexer_text(&original, connection_string).map_err(|reason| self.error(reason))?;

        if patched == original {
            debug!(path = %self.path.display(), "indexer already patched");
            return Ok(PatchOutcome::Unchanged);
        }

        self.replace_contents(&patched)
            .map_err(|e| self.error(format!("cannot write config: {}", e)))?;

        info!(path = %self.path.display(), indexer = EXTERNAL_INDEXER, "patched indexer");
        Ok(PatchOutcome::Patched)
    }

    /// Swap in new contents via a temp file in the same directory.
    fn replace_contents(&self, contents: &str) -> std::io::Result<()> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        let permissions = fs::metadata(&self.path)?.permissions();

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(contents.as_bytes())?;
        tmp.as_file().sync_all()?;
        fs::set_permissions(tmp.path(), permissions)?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }

    fn error(&self, reason: String) -> BootstrapError {
        BootstrapError::Patch {
            path: self.path.clone(),
            reason,
        }
    }
}

/// Apply the indexer patch to config text.
///
/// Returns the reason on failure so callers can attach the file path.
pub fn patch_indexer_text(content: &str, connection_string: &str) -> std::result::Result<String, String> {
    let lines: Vec<&str> = content.lines().collect();

    let indexer_lines: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, line)| line_key(line) == Some(INDEXER_KEY))
        .map(|(i, _)| i)
        .collect();

    let target = match indexer_lines.as_slice() {
        [] => return Err(format!("no `{}` key found", INDEXER_KEY)),
        [one] => *one,
        many => {
            let numbers: Vec<String> = many.iter().map(|i| (i + 1).to_string()).collect();
            return Err(format!(
                "`{}` key appears {} times (lines {}); refusing to guess",
                INDEXER_KEY,
                many.len(),
                numbers.join(", ")
            ));
        }
    };

    let indent = leading_whitespace(lines[target]);
    let mut out: Vec<String> = Vec::with_capacity(lines.len() + 1);
    for (i, line) in lines.iter().enumerate() {
        if i == target {
            out.push(format!("{}{} = \"{}\"", indent, INDEXER_KEY, EXTERNAL_INDEXER));
            out.push(format!("{}{} = \"{}\"", indent, CONNECTION_KEY, connection_string));
        } else if line_key(line) != Some(CONNECTION_KEY) {
            out.push((*line).to_string());
        }
    }

    let mut patched = out.join("\n");
    if content.ends_with('\n') {
        patched.push('\n');
    }
    Ok(patched)
}

/// The key of a `key = value` line, ignoring comments.
fn line_key(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    if trimmed.starts_with('#') {
        return None;
    }
    let (key, _) = trimmed.split_once('=')?;
    let key = key.trim_end();
    if key.is_empty() || key.contains(char::is_whitespace) {
        return None;
    }
    Some(key)
}

fn leading_whitespace(line: &str) -> &str {
    &line[..line.len() - line.trim_start().len()]
}
