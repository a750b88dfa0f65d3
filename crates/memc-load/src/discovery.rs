//! Input file discovery

use std::path::PathBuf;

use memc_load_common::{LoadError, Result};
use tracing::{debug, warn};

/// Regular files matching `pattern`, sorted by path.
///
/// An invalid pattern is a configuration error; no matches is fatal.
pub fn discover(pattern: &str) -> Result<Vec<PathBuf>> {
    let entries = glob::glob(pattern)
        .map_err(|e| LoadError::Config(format!("invalid file pattern {:?}: {}", pattern, e)))?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(e) => {
                warn!(path = %e.path().display(), error = %e.error(), "Skipping unreadable path");
                None
            },
        })
        .filter(|path| path.is_file())
        .collect();

    if files.is_empty() {
        return Err(LoadError::NoInputFiles(pattern.to_string()));
    }

    files.sort();
    debug!(pattern, count = files.len(), "Discovered input files");
    Ok(files)
}
