//! Image materializer.
//!
//! Drives an external image tool (`pull` -> create a temporary flattened
//! container -> `export` -> extract) to populate a rootfs directory. The
//! tool is reached through a trait rather than a daemon API so any
//! drop-in-compatible CLI (podman, docker) can stand in for it.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use scopeguard::defer;

use crate::slug::sanitize;
use crate::{err, ErrContext, Result};

/// Abstraction over the external image tool. The default implementation
/// shells out to a configurable binary (`podman` unless overridden); tests
/// substitute a fake implementation so `materialize` can be exercised
/// without a real container engine installed.
pub trait ImageTool {
    /// `<tool> pull <image>`
    fn pull(&self, image: &str) -> Result<()>;
    /// `<tool> create --name <name> <image>`
    fn create(&self, image: &str, name: &str) -> Result<()>;
    /// `<tool> export <name> -o <tar_path>`
    fn export(&self, name: &str, tar_path: &Path) -> Result<()>;
    /// `<tool> rm -f <name>`
    fn remove_container(&self, name: &str) -> Result<()>;
}

/// Shells out to an external image tool binary (podman, docker, or any
/// drop-in compatible CLI).
pub struct ExternalImageTool {
    binary: String,
}

impl ExternalImageTool {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn run(&self, args: &[&str], what: &str) -> Result<()> {
        tracing::debug!(binary = %self.binary, ?args, "invoking external image tool");
        let status = Command::new(&self.binary)
            .args(args)
            .status()
            .with_context(|| format!("failed to spawn `{}`", self.binary))?;
        if !status.success() {
            return err!(
                "{} failed: `{} {}` exited with {}",
                what,
                self.binary,
                args.join(" "),
                status
            );
        }
        Ok(())
    }
}

impl Default for ExternalImageTool {
    fn default() -> Self {
        Self::new("podman")
    }
}

impl ImageTool for ExternalImageTool {
    fn pull(&self, image: &str) -> Result<()> {
        self.run(&["pull", image], "image pull")
    }

    fn create(&self, image: &str, name: &str) -> Result<()> {
        self.run(&["create", "--name", name, image], "container create")
    }

    fn export(&self, name: &str, tar_path: &Path) -> Result<()> {
        let path = tar_path.to_string_lossy();
        self.run(&["export", "-o", &path, name], "container export")
    }

    fn remove_container(&self, name: &str) -> Result<()> {
        self.run(&["rm", "-f", name], "container remove")
    }
}

/// Materializes `image` into `<base>/sanitize(image)`, returning the slug.
///
/// An existing rootfs directory for the same slug is removed before
/// extraction rather than overwritten in place, so a repeated `pull` can
/// never leave stale files from a previous image mixed in with the new
/// one.
pub fn materialize(base: &Path, image: &str, tool: &dyn ImageTool) -> Result<String> {
    let _span = tracing::info_span!("materialize", image).entered();

    let slug = sanitize(image);

    fs::create_dir_all(base)
        .with_context(|| format!("failed to create base directory `{}`", base.display()))?;

    tracing::info!("pulling image");
    tool.pull(image).context("image pull failed")?;

    let container_name = format!("isolator-temp-{slug}");
    tracing::info!(container = %container_name, "creating temporary flattened container");
    tool.create(image, &container_name)
        .context("failed to create temporary container")?;
    defer! {
        if let Err(e) = tool.remove_container(&container_name) {
            tracing::warn!(error = ?e, "failed to remove temporary container");
        }
    }

    let tar_path = base.join(format!("{slug}.tar"));
    defer! {
        let _ = fs::remove_file(&tar_path);
    }

    tracing::info!(tar = %tar_path.display(), "exporting container filesystem");
    tool.export(&container_name, &tar_path)
        .context("container export failed")?;

    let rootfs_dir = base.join(&slug);
    if rootfs_dir.exists() {
        tracing::debug!(rootfs = %rootfs_dir.display(), "removing stale rootfs before extraction");
        fs::remove_dir_all(&rootfs_dir).with_context(|| {
            format!("failed to remove stale rootfs `{}`", rootfs_dir.display())
        })?;
    }
    fs::create_dir_all(&rootfs_dir)
        .with_context(|| format!("failed to create rootfs directory `{}`", rootfs_dir.display()))?;

    let tar_file = fs::File::open(&tar_path)
        .with_context(|| format!("failed to open exported tar `{}`", tar_path.display()))?;
    let mut archive = tar::Archive::new(tar_file);
    crate::archive::extract(&mut archive, &rootfs_dir)
        .with_context(|| format!("failed to extract image into `{}`", rootfs_dir.display()))?;

    tracing::info!(slug, "image materialized");
    Ok(slug)
}

/// Returns the absolute path of a materialized rootfs, if the caller already
/// knows its slug (used by `run`/`exec`/`build` to resolve `<base>/<slug>`).
pub fn rootfs_path(base: &Path, slug: &str) -> PathBuf {
    base.join(slug)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use std::io::Write;

    #[derive(Default)]
    struct FakeImageTool {
        calls: RefCell<Vec<String>>,
    }

    impl FakeImageTool {
        fn write_tarball(&self, tar_path: &Path) -> Result<()> {
            let buf = Vec::new();
            let mut builder = tar::Builder::new(buf);
            let content = b"#!/bin/sh\n";
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o755);
            header.set_cksum();
            builder
                .append_data(&mut header, "bin/sh", &content[..])
                .unwrap();
            let bytes = builder.into_inner().unwrap();
            fs::File::create(tar_path)?.write_all(&bytes)?;
            Ok(())
        }
    }

    impl ImageTool for FakeImageTool {
        fn pull(&self, image: &str) -> Result<()> {
            self.calls.borrow_mut().push(format!("pull {image}"));
            Ok(())
        }

        fn create(&self, image: &str, name: &str) -> Result<()> {
            self.calls
                .borrow_mut()
                .push(format!("create {image} {name}"));
            Ok(())
        }

        fn export(&self, name: &str, tar_path: &Path) -> Result<()> {
            self.calls.borrow_mut().push(format!("export {name}"));
            self.write_tarball(tar_path)
        }

        fn remove_container(&self, name: &str) -> Result<()> {
            self.calls.borrow_mut().push(format!("rm {name}"));
            Ok(())
        }
    }

    #[test]
    fn materialize_extracts_rootfs_and_cleans_up_temp_artifacts() {
        let base = tempfile::tempdir().unwrap();
        let tool = FakeImageTool::default();

        let slug = materialize(base.path(), "alpine:3.19", &tool).unwrap();

        assert_eq!(slug, "alpine_3.19");
        assert!(base.path().join("alpine_3.19/bin/sh").is_file());
        // Temp tar and container are cleaned up.
        assert!(!base.path().join("alpine_3.19.tar").exists());
        assert_eq!(
            *tool.calls.borrow(),
            vec![
                "pull alpine:3.19",
                "create alpine:3.19 isolator-temp-alpine_3.19",
                "export isolator-temp-alpine_3.19",
                "rm isolator-temp-alpine_3.19",
            ]
        );
    }

    #[test]
    fn repeated_materialize_removes_stale_files() {
        let base = tempfile::tempdir().unwrap();
        let tool = FakeImageTool::default();

        materialize(base.path(), "alpine:3.19", &tool).unwrap();
        fs::write(base.path().join("alpine_3.19/stale-marker"), "x").unwrap();

        materialize(base.path(), "alpine:3.19", &tool).unwrap();

        assert!(!base.path().join("alpine_3.19/stale-marker").exists());
        assert!(base.path().join("alpine_3.19/bin/sh").is_file());
    }
}
