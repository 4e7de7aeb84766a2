//! Vendor driver compile-cache purge.
//!
//! At least one vendor's driver serves stale compiled binaries from its
//! on-disk cache when kernel sources change in ways its keying misses. When
//! build caching is disabled, the engine deletes and recreates that cache
//! directory before compiling. This is a workaround with no correctness
//! dependency: purge failures are logged and otherwise ignored.

use log::{debug, warn};
use std::path::{Path, PathBuf};

/// Location of the NVIDIA compute cache under the given home directory.
pub(crate) fn driver_cache_dir(home: &Path) -> PathBuf {
    if cfg!(windows) {
        home.join("AppData").join("Roaming").join("NVIDIA").join("ComputeCache")
    } else {
        home.join(".nv").join("ComputeCache")
    }
}

/// Delete and recreate the vendor compile cache.
pub(crate) fn purge() {
    let Some(home) = dirs::home_dir() else {
        warn!(target: "engine", "cannot purge driver compile cache: no home directory");
        return;
    };
    let dir = driver_cache_dir(&home);

    if dir.exists() {
        if let Err(e) = std::fs::remove_dir_all(&dir) {
            warn!(target: "engine", "failed to remove {}: {e}", dir.display());
            return;
        }
    }
    if let Err(e) = std::fs::create_dir_all(&dir) {
        warn!(target: "engine", "failed to recreate {}: {e}", dir.display());
        return;
    }
    debug!(target: "engine", "purged driver compile cache at {}", dir.display());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_dir_is_under_home() {
        let dir = driver_cache_dir(Path::new("/home/u"));
        assert!(dir.starts_with("/home/u"));
        assert!(dir.ends_with("ComputeCache"));
    }
}
