//! Container init (child side).
//!
//! Runs as pid 1 of the freshly created PID namespace, already inside the
//! namespaces entered in the parent's `pre_exec` hook (see
//! [`super::namespace`] and [`super::launcher`] for how the process actually
//! gets there). Walks through the following states in order, aborting on the
//! first failure:
//!
//! `INIT -> REMOUNTED_PRIVATE -> BOUND -> PIVOTED -> CLEANED -> MOUNTED_FS
//! -> NETWORKED -> DEVICES_READY -> EXECVE`

use std::ffi::CString;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::path::{Path, PathBuf};
use std::process::Command;

use nix::errno::Errno;
use nix::mount::{mount, umount2, MntFlags, MsFlags};
use nix::sys::socket::{socket, AddressFamily, SockFlag, SockProtocol, SockType};
use nix::unistd::pivot_root;

use crate::{err, ErrContext, Result};

use super::OLD_ROOT_DIR_NAME;

/// Inputs gathered by the parent before re-exec: the rootfs to pivot into,
/// the (already-detected-on-the-host) GPU device paths to bind through --
/// split by whether each is a directory, since the mount point created for
/// it must match -- and whether to wire up the X11 socket.
pub struct ChildConfig {
    pub rootfs: PathBuf,
    pub gpu_device_files: Vec<PathBuf>,
    pub gpu_device_dirs: Vec<PathBuf>,
    pub gui: bool,
    pub argv: Vec<String>,
}

/// Runs the full container init sequence and then `execvpe`s the user
/// command. On success this function never returns; on failure it returns
/// an error describing which stage failed, which the caller (the `child`
/// CLI subcommand) reports as a non-zero exit.
pub fn run(cfg: ChildConfig) -> Result<std::convert::Infallible> {
    tracing::debug!(state = "INIT", rootfs = %cfg.rootfs.display());

    remount_root_private()?;
    tracing::debug!(state = "REMOUNTED_PRIVATE");

    bind_self(&cfg.rootfs)?;
    tracing::debug!(state = "BOUND");

    let old_root = cfg.rootfs.join(OLD_ROOT_DIR_NAME);
    std::fs::create_dir_all(&old_root)
        .with_context(|| format!("failed to create `{}`", old_root.display()))?;
    std::fs::set_permissions(&old_root, std::os::unix::fs::PermissionsExt::from(0o700))
        .with_context(|| format!("failed to chmod `{}`", old_root.display()))?;

    pivot_root(&cfg.rootfs, &old_root).context("pivot_root failed")?;
    tracing::debug!(state = "PIVOTED");

    std::env::set_current_dir("/").context("chdir(\"/\") after pivot_root failed")?;

    let old_root_mount = Path::new("/").join(OLD_ROOT_DIR_NAME);
    umount2(&old_root_mount, MntFlags::MNT_DETACH)
        .with_context(|| format!("failed to detach `{}`", old_root_mount.display()))?;
    std::fs::remove_dir(&old_root_mount)
        .with_context(|| format!("failed to remove `{}`", old_root_mount.display()))?;
    tracing::debug!(state = "CLEANED");

    mount_pseudo_filesystems()?;
    tracing::debug!(state = "MOUNTED_FS");

    if let Err(e) = bring_up_loopback() {
        tracing::warn!(error = ?e, "failed to bring up loopback interface");
    }
    tracing::debug!(state = "NETWORKED");

    if !cfg.gpu_device_files.is_empty() || !cfg.gpu_device_dirs.is_empty() {
        bind_gpu_devices(&cfg.gpu_device_files, &cfg.gpu_device_dirs)?;
    }
    if cfg.gui {
        bind_x11_socket()?;
    }
    tracing::debug!(state = "DEVICES_READY");

    let mut envs: std::collections::BTreeMap<String, String> = std::env::vars().collect();
    if cfg.gui {
        let display = envs.get("DISPLAY").cloned().unwrap_or_else(|| ":0".to_string());
        envs.insert("DISPLAY".to_string(), display);
    }

    if cfg.argv.is_empty() {
        return err!("no command given to exec in container");
    }

    // Flush buffered filesystem writes before we hand control to the user
    // command; the kernel tears the namespaces (and any in-memory mount
    // state) down when the PID-1 process exits, so this is our last chance
    // to make sure mount setup actually made it to disk.
    nix::unistd::sync();

    tracing::debug!(state = "EXECVE", argv = ?cfg.argv);
    exec_user_command(&cfg.argv, &envs)
}

fn remount_root_private() -> Result<()> {
    mount(
        Some(""),
        "/",
        Some(""),
        MsFlags::MS_PRIVATE | MsFlags::MS_REC,
        Some(""),
    )
    .context("failed to remount `/` as private")
}

fn bind_self(rootfs: &Path) -> Result<()> {
    mount(
        Some(rootfs),
        rootfs,
        None::<&str>,
        MsFlags::MS_BIND,
        None::<&str>,
    )
    .with_context(|| format!("failed to self-bind-mount `{}`", rootfs.display()))
}

fn mount_pseudo_filesystems() -> Result<()> {
    mount(
        Some("proc"),
        "/proc",
        Some("proc"),
        MsFlags::empty(),
        None::<&str>,
    )
    .context("failed to mount /proc")?;

    mount(
        Some("sysfs"),
        "/sys",
        Some("sysfs"),
        MsFlags::empty(),
        None::<&str>,
    )
    .context("failed to mount /sys")?;

    mount(
        Some("tmpfs"),
        "/dev",
        Some("tmpfs"),
        MsFlags::MS_NOSUID | MsFlags::MS_STRICTATIME,
        Some("mode=755"),
    )
    .context("failed to mount /dev")?;

    std::fs::create_dir_all("/dev/pts").context("failed to create /dev/pts mount point")?;
    mount(
        Some("devpts"),
        "/dev/pts",
        Some("devpts"),
        MsFlags::empty(),
        None::<&str>,
    )
    .context("failed to mount /dev/pts")?;

    std::fs::create_dir_all("/run").context("failed to create /run mount point")?;
    mount(
        Some("tmpfs"),
        "/run",
        Some("tmpfs"),
        MsFlags::MS_NOSUID | MsFlags::MS_NODEV | MsFlags::MS_STRICTATIME,
        Some("mode=755"),
    )
    .context("failed to mount /run")?;

    Ok(())
}

/// Brings up the loopback interface via `SIOCSIFFLAGS`.
fn bring_up_loopback() -> Result<()> {
    let sock = unsafe {
        OwnedFd::from_raw_fd(
            socket(
                AddressFamily::Inet,
                SockType::Datagram,
                SockFlag::SOCK_CLOEXEC,
                SockProtocol::Udp,
            )
            .context("socket(AF_INET, SOCK_DGRAM) failed")?,
        )
    };

    let mut ifreq = libc::ifreq {
        ifr_name: {
            let mut name = [0i8; 16];
            for (dst, src) in name.iter_mut().zip(b"lo\0".iter()) {
                *dst = *src as i8;
            }
            name
        },
        ifr_ifru: libc::__c_anonymous_ifr_ifru { ifru_flags: 0 },
    };

    let res = unsafe { libc::ioctl(sock.as_raw_fd(), libc::SIOCGIFFLAGS, &ifreq) };
    Errno::result(res).context("ioctl(SIOCGIFFLAGS) failed")?;

    unsafe {
        ifreq.ifr_ifru.ifru_flags |= (libc::IFF_UP | libc::IFF_RUNNING) as libc::c_short;
    }
    let res = unsafe { libc::ioctl(sock.as_raw_fd(), libc::SIOCSIFFLAGS, &ifreq) };
    Errno::result(res).context("ioctl(SIOCSIFFLAGS) failed")?;

    Ok(())
}

/// Creates a mount point of the right kind for each device and bind-mounts
/// the host device onto it. The kind (file vs. directory) must come from the
/// parent, determined before `/dev` was replaced by a fresh tmpfs -- by this
/// point every one of these paths is absent, so `is_dir()`/`exists()` checks
/// here would always say so and this function would always create a plain
/// file, which fails to bind-mount a directory source like `/dev/dri` with
/// `ENOTDIR`.
fn bind_gpu_devices(files: &[PathBuf], dirs: &[PathBuf]) -> Result<()> {
    for device in files {
        tracing::debug!(device = %device.display(), "bind-mounting GPU device file");
        if let Some(parent) = device.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        std::fs::File::create(device)
            .with_context(|| format!("failed to create mount point `{}`", device.display()))?;
        bind_mount_onto_self(device)?;
    }
    for device in dirs {
        tracing::debug!(device = %device.display(), "bind-mounting GPU device directory");
        std::fs::create_dir_all(device)
            .with_context(|| format!("failed to create mount point `{}`", device.display()))?;
        bind_mount_onto_self(device)?;
    }
    Ok(())
}

fn bind_mount_onto_self(path: &Path) -> Result<()> {
    mount(
        Some(path),
        path,
        None::<&str>,
        MsFlags::MS_BIND | MsFlags::MS_REC,
        None::<&str>,
    )
    .with_context(|| format!("failed to bind-mount `{}`", path.display()))
}

fn bind_x11_socket() -> Result<()> {
    let path = Path::new("/tmp/.X11-unix");
    std::fs::create_dir_all(path)
        .with_context(|| format!("failed to create mount point `{}`", path.display()))?;
    bind_mount_onto_self(path)
}

fn exec_user_command(
    argv: &[String],
    envs: &std::collections::BTreeMap<String, String>,
) -> Result<std::convert::Infallible> {
    let c_argv: Vec<CString> = argv
        .iter()
        .map(|arg| CString::new(arg.as_bytes()).context("argument contains a NUL byte"))
        .collect::<Result<_>>()?;
    let c_envs: Vec<CString> = envs
        .iter()
        .map(|(k, v)| {
            CString::new(format!("{k}={v}").into_bytes())
                .context("environment variable contains a NUL byte")
        })
        .collect::<Result<_>>()?;

    match nix::unistd::execvpe(&c_argv[0], &c_argv, &c_envs) {
        Ok(never) => match never {},
        Err(errno) => Err(anyhow::Error::from(errno))
            .with_context(|| format!("failed to exec `{}`", argv[0])),
    }
}

/// `ip link set lo up`, invoked as a regular subprocess from within an
/// already-running container -- used by the recipe build path and tests;
/// not part of the child bootstrap sequence itself (that calls
/// [`bring_up_loopback`] directly via ioctl, cheaper than spawning `ip`).
#[allow(dead_code)]
fn run_ip_link_up() -> Result<()> {
    let status = Command::new("ip")
        .args(["link", "set", "lo", "up"])
        .status()
        .context("failed to spawn `ip`")?;
    if !status.success() {
        return err!("`ip link set lo up` exited with {status}");
    }
    Ok(())
}
