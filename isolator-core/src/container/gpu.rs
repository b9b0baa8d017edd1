//! GPU device passthrough.
//!
//! Checking `/dev/nvidia*` for presence -- and whether each path is a
//! directory (`/dev/dri`, holding `card0`/`renderD128`) or a device file
//! (`/dev/nvidiactl` and friends) -- only works *before* a fresh tmpfs is
//! mounted over `/dev`, so both are determined here, in the parent, and the
//! result is passed across the re-exec into the `child` subcommand, since
//! parent and child are separate processes with no shared memory.

use std::path::{Path, PathBuf};

/// Host device paths bind-mounted into the container when `--gpu` is
/// requested.
pub const GPU_DEVICE_PATHS: &[&str] = &[
    "/dev/nvidiactl",
    "/dev/nvidia-uvm",
    "/dev/nvidia0",
    "/dev/nvidia1",
    "/dev/dri",
];

/// A GPU device path found on the host, along with whether it is a
/// directory. The mount point created for it inside the container must match
/// this kind, or the bind-mount fails with `ENOTDIR`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresentDevice {
    pub path: PathBuf,
    pub is_dir: bool,
}

/// Returns the subset of `candidates` that exist on the host, tagged with
/// whether each is a directory. Must be called before any namespace is
/// entered or `/dev` is remounted -- otherwise every path will appear absent.
pub fn detect_present(candidates: &[&str]) -> Vec<PresentDevice> {
    candidates
        .iter()
        .map(Path::new)
        .filter(|path| path.exists())
        .map(|path| PresentDevice {
            path: path.to_path_buf(),
            is_dir: path.is_dir(),
        })
        .collect()
}
