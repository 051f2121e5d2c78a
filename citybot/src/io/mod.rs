//! I/O helpers: configuration, ledger persistence, and the device and
//! detection collaborators.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

pub mod config;
pub mod ledger_store;
pub mod process;
pub mod transport;
pub mod vision;

/// Write `contents` next to `path` with `tmp_extension`, then rename over it.
pub(crate) fn write_atomic(path: &Path, tmp_extension: &str, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("path missing parent {}", path.display()))?;
    if !parent.as_os_str().is_empty() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension(tmp_extension);
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}
