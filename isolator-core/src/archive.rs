//! Tar archive extraction.
//!
//! Streams a POSIX tar archive into a target directory. Directories,
//! regular files, and symlinks are materialized; everything else is
//! skipped on a best-effort basis. No path-traversal validation is
//! performed -- the archive is trusted to come from our own image tool's
//! export, not an adversarial source.

use std::io::Read;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use tar::EntryType;

use crate::{ErrContext, Result};

/// Extracts every entry of `archive` into `root`, which is assumed to already
/// exist. Paths are joined with `root` via a plain `Path::join`; no
/// traversal validation is performed, trusting that the archive originates
/// from the image tool's own export.
pub fn extract<R: Read>(archive: &mut tar::Archive<R>, root: &Path) -> Result<()> {
    for entry_result in archive.entries().context("failed to read tar entries")? {
        let mut entry = entry_result.context("failed to read tar entry")?;
        let entry_type = entry.header().entry_type();
        let path = entry
            .path()
            .context("failed to read entry path")?
            .into_owned();
        let out_path = root.join(&path);

        match entry_type {
            EntryType::Directory => {
                std::fs::create_dir_all(&out_path).with_context(|| {
                    format!("failed to create directory `{}`", out_path.display())
                })?;
                let mode = entry.header().mode().context("failed to read entry mode")?;
                std::fs::set_permissions(&out_path, std::fs::Permissions::from_mode(mode))
                    .with_context(|| format!("failed to chmod `{}`", out_path.display()))?;
            }
            EntryType::Regular => {
                if let Some(parent) = out_path.parent() {
                    std::fs::create_dir_all(parent).with_context(|| {
                        format!("failed to create parent directory for `{}`", out_path.display())
                    })?;
                }
                entry
                    .unpack(&out_path)
                    .with_context(|| format!("failed to extract `{}`", out_path.display()))?;
            }
            EntryType::Symlink => {
                let target = entry
                    .link_name()
                    .context("failed to read symlink target")?
                    .context("symlink entry has no link name")?
                    .into_owned();
                if let Some(parent) = out_path.parent() {
                    std::fs::create_dir_all(parent).with_context(|| {
                        format!("failed to create parent directory for `{}`", out_path.display())
                    })?;
                }
                // Best-effort: if a previous extraction left a stale entry at
                // this path (pull-over-existing-rootfs before this version's
                // remove-then-extract fix existed), remove it before linking.
                let _ = std::fs::remove_file(&out_path);
                std::os::unix::fs::symlink(&target, &out_path).with_context(|| {
                    format!(
                        "failed to create symlink `{}` -> `{}`",
                        out_path.display(),
                        target.display()
                    )
                })?;
            }
            other => {
                tracing::debug!(
                    path = %path.display(),
                    entry_type = ?other,
                    "ignoring unsupported tar entry type"
                );
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Read as _;

    fn build_archive() -> Vec<u8> {
        let buf = Vec::new();
        let mut builder = tar::Builder::new(buf);

        let mut dir_header = tar::Header::new_gnu();
        dir_header.set_entry_type(EntryType::Directory);
        dir_header.set_mode(0o755);
        dir_header.set_size(0);
        dir_header.set_cksum();
        builder.append_data(&mut dir_header, "etc/", &[][..]).unwrap();

        let content = b"localhost\n";
        let mut file_header = tar::Header::new_gnu();
        file_header.set_size(content.len() as u64);
        file_header.set_mode(0o644);
        file_header.set_cksum();
        builder
            .append_data(&mut file_header, "etc/hostname", &content[..])
            .unwrap();

        let mut link_header = tar::Header::new_gnu();
        link_header.set_entry_type(EntryType::Symlink);
        link_header.set_size(0);
        link_header.set_cksum();
        builder
            .append_link(&mut link_header, "etc/hostname.link", "hostname")
            .unwrap();

        builder.into_inner().unwrap()
    }

    #[test]
    fn extracts_dirs_files_and_symlinks() {
        let bytes = build_archive();
        let tmp = tempfile::tempdir().unwrap();

        let mut archive = tar::Archive::new(&bytes[..]);
        extract(&mut archive, tmp.path()).unwrap();

        let dir_path = tmp.path().join("etc");
        assert!(dir_path.is_dir());
        let dir_mode = std::fs::metadata(&dir_path).unwrap().permissions().mode();
        assert_eq!(dir_mode & 0o777, 0o755);

        let content = std::fs::read_to_string(tmp.path().join("etc/hostname")).unwrap();
        assert_eq!(content, "localhost\n");

        let link = tmp.path().join("etc/hostname.link");
        assert_eq!(
            std::fs::read_link(&link).unwrap(),
            Path::new("hostname")
        );
    }

    #[test]
    fn ignores_unsupported_entry_types() {
        let buf = Vec::new();
        let mut builder = tar::Builder::new(buf);
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(EntryType::Fifo);
        header.set_size(0);
        header.set_cksum();
        builder.append_data(&mut header, "a-fifo", &[][..]).unwrap();
        let bytes = builder.into_inner().unwrap();

        let tmp = tempfile::tempdir().unwrap();
        let mut archive = tar::Archive::new(&bytes[..]);
        extract(&mut archive, tmp.path()).unwrap();

        assert!(!tmp.path().join("a-fifo").exists());
    }

    #[test]
    fn extract_into_nonexistent_parent_creates_it() {
        let buf = Vec::new();
        let mut builder = tar::Builder::new(buf);
        let content = b"x";
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_cksum();
        builder
            .append_data(&mut header, "deep/nested/file", &content[..])
            .unwrap();
        let bytes = builder.into_inner().unwrap();

        let tmp = tempfile::tempdir().unwrap();
        let mut archive = tar::Archive::new(&bytes[..]);
        extract(&mut archive, tmp.path()).unwrap();

        assert!(tmp.path().join("deep/nested/file").is_file());
        let mut out = String::new();
        std::fs::File::open(tmp.path().join("deep/nested/file"))
            .unwrap()
            .read_to_string(&mut out)
            .unwrap();
        assert_eq!(out, "x");
    }
}
