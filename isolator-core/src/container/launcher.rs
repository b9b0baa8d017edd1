//! Container launcher (parent side).
//!
//! Resolves a [`RunConfig`] into a rootfs path, detects GPU devices on the
//! host (before any namespace activity, see [`super::gpu`]), and re-execs
//! `/proc/self/exe` with a hidden `child` argv. Namespaces are entered in the
//! forked child's `pre_exec` hook via [`super::namespace`] -- but entering
//! the PID namespace takes one more step than the others: `unshare` only
//! arranges for the *next* forked process to land in it, so `pre_exec` forks
//! again there and lets only that second-generation child fall through to
//! `Command`'s own `execve`. The first-generation child (the one `pre_exec`
//! actually runs in) never execs; it waits for its child and relays the exit
//! status. A single binary re-executing itself avoids needing a second
//! wrapper executable.

use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::Command;

use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{fork, getgid, getuid, ForkResult};

use crate::run_config::RunConfig;
use crate::{err, image, ErrContext, Result};

use super::{gpu, namespace};

/// Hidden argv[1] the parent re-execs itself with; recognized only by the
/// CLI's dispatch table, never documented in `--help`.
pub const CHILD_SUBCOMMAND: &str = "child";

/// Launches `cfg.argv` inside the container rooted at `base/cfg.rootfs_slug`,
/// blocking until the container exits, and returns its exit code.
pub fn launch(base: &Path, cfg: &RunConfig) -> Result<i32> {
    let rootfs = image::rootfs_path(base, &cfg.rootfs_slug);
    if !rootfs.is_dir() {
        return err!(
            "no rootfs named `{}` under `{}` -- run `pull` or `build` first",
            cfg.rootfs_slug,
            base.display()
        );
    }
    let rootfs = rootfs
        .canonicalize()
        .with_context(|| format!("failed to resolve `{}`", rootfs.display()))?;

    let gpu_devices = if cfg.gpu {
        gpu::detect_present(gpu::GPU_DEVICE_PATHS)
    } else {
        Vec::new()
    };
    if cfg.gpu && gpu_devices.is_empty() {
        tracing::warn!("--gpu requested but no GPU devices were found on the host");
    }

    let exe = std::env::current_exe().context("failed to resolve the running executable")?;

    let mut command = Command::new(exe);
    command.arg(CHILD_SUBCOMMAND).arg(&rootfs);
    for device in &gpu_devices {
        let flag = if device.is_dir { "--device-dir" } else { "--device" };
        command.arg(flag).arg(&device.path);
    }
    if cfg.gui {
        command.arg("--gui");
    }
    command.arg("--");
    command.args(&cfg.argv);

    let uid = getuid();
    let gid = getgid();
    unsafe {
        command.pre_exec(move || {
            namespace::unshare_namespaces()?;

            // `unshare(CLONE_NEWPID)` above only takes effect for processes
            // this one forks from here on -- this process itself stays
            // outside the new PID namespace. So the process that `Command`
            // is about to `execve` must be a fresh child, not this one.
            match unsafe { fork() }
                .map_err(|errno| std::io::Error::from_raw_os_error(errno as i32))?
            {
                ForkResult::Parent { child } => {
                    let code = match waitpid(child, None) {
                        Ok(WaitStatus::Exited(_, code)) => code,
                        Ok(WaitStatus::Signaled(_, signal, _)) => 128 + signal as i32,
                        Ok(_) => 1,
                        Err(errno) => {
                            return Err(std::io::Error::from_raw_os_error(errno as i32))
                        }
                    };
                    std::process::exit(code);
                }
                ForkResult::Child => {
                    // First process to exist since the PID namespace was
                    // created above -- this is pid 1 of it. Map ids here so
                    // the child that execs the `child` subcommand is already
                    // fully inside every namespace it needs.
                    namespace::map_ids(uid, gid)?;
                    Ok(())
                }
            }
        });
    }

    tracing::debug!(rootfs = %rootfs.display(), gpu = cfg.gpu, gui = cfg.gui, "launching container");

    let status = command
        .status()
        .context("failed to spawn the re-exec'd child process")?;

    Ok(status.code().unwrap_or(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_missing_rootfs() {
        let base = tempfile::tempdir().unwrap();
        let cfg = RunConfig {
            rootfs_slug: "does_not_exist".to_string(),
            argv: vec!["/bin/true".to_string()],
            gpu: false,
            gui: false,
        };
        let err = launch(base.path(), &cfg).unwrap_err();
        assert!(err.to_string().contains("does_not_exist"));
    }
}
