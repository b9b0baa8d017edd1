//! Rootfs registry.
//!
//! Lists and deletes materialized rootfs directories under the base path.

use std::fs;
use std::path::Path;

use crate::{ErrContext, Result};

/// Returns the names of all directories directly under `base`. Non-directory
/// entries (stray tar files left behind by a failed materialize, lockfiles)
/// are silently ignored, per spec.
pub fn list(base: &Path) -> Result<Vec<String>> {
    if !base.exists() {
        return Ok(Vec::new());
    }

    let mut names: Vec<String> = fs::read_dir(base)
        .with_context(|| format!("failed to read base directory `{}`", base.display()))?
        .filter_map(|entry| {
            let entry = entry.ok()?;
            if entry.file_type().ok()?.is_dir() {
                Some(entry.file_name().to_string_lossy().into_owned())
            } else {
                None
            }
        })
        .collect();

    names.sort();
    Ok(names)
}

/// Recursively deletes `<base>/<name>`.
pub fn remove(base: &Path, name: &str) -> Result<()> {
    let path = base.join(name);
    tracing::info!(rootfs = %path.display(), "removing rootfs");
    fs::remove_dir_all(&path)
        .with_context(|| format!("failed to remove rootfs `{}`", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs::File;

    #[test]
    fn lists_only_directories() {
        let base = tempfile::tempdir().unwrap();
        fs::create_dir(base.path().join("alpine_3.19")).unwrap();
        fs::create_dir(base.path().join("debian_bookworm")).unwrap();
        File::create(base.path().join("alpine_3.19.tar")).unwrap();

        let names = list(base.path()).unwrap();
        assert_eq!(names, vec!["alpine_3.19", "debian_bookworm"]);
    }

    #[test]
    fn missing_base_dir_lists_empty() {
        let base = tempfile::tempdir().unwrap();
        let missing = base.path().join("does-not-exist");
        assert_eq!(list(&missing).unwrap(), Vec::<String>::new());
    }

    #[test]
    fn remove_deletes_directory_recursively() {
        let base = tempfile::tempdir().unwrap();
        let rootfs = base.path().join("alpine_3.19");
        fs::create_dir_all(rootfs.join("etc")).unwrap();
        File::create(rootfs.join("etc/hostname")).unwrap();

        remove(base.path(), "alpine_3.19").unwrap();

        assert!(!rootfs.exists());
    }

    #[test]
    fn remove_missing_rootfs_errors() {
        let base = tempfile::tempdir().unwrap();
        assert!(remove(base.path(), "does-not-exist").is_err());
    }
}
