//! Discovery module: Find .pdfqa.json by walking up the directory tree

use std::path::{Path, PathBuf};

use crate::{CONFIG_FILE, Result};

/// Find the nearest config file by walking up from the given path.
///
/// Returns the path to the file itself, or `None` when no ancestor has one.
pub fn find_config(start: &Path) -> Result<Option<PathBuf>> {
    let mut current = start.canonicalize()?;

    loop {
        let candidate = current.join(CONFIG_FILE);
        if candidate.is_file() {
            return Ok(Some(candidate));
        }

        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => return Ok(None),
        }
    }
}

/// Get the config file path for a directory.
pub fn config_path(dir: &Path) -> PathBuf {
    dir.join(CONFIG_FILE)
}
