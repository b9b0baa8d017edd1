//! Container launcher (parent) and container init (child).
//!
//! One binary, a hidden `child` subcommand, and a `/proc/self/exe` re-exec
//! stand in for a second wrapper process: the parent enters new namespaces
//! in a `pre_exec` hook and re-execs itself, and the re-exec'd process
//! drives `pivot_root`, mount-namespace privatization, and uid/gid mapping
//! before handing off to the user's command.

pub mod child;
pub mod gpu;
pub mod launcher;
mod namespace;

/// Name of the directory the old root is pivoted into before being detached,
/// relative to the new rootfs.
pub(crate) const OLD_ROOT_DIR_NAME: &str = "oldrootfs";

pub use launcher::launch;
