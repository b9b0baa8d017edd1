//! Namespace entry and uid/gid mapping.
//!
//! Split into two steps because of a sharp edge in `CLONE_NEWPID`:
//! `unshare(CLONE_NEWPID)` does not move the calling process into the new PID
//! namespace, it only arranges for the *next* process that calls `fork()` to
//! become pid 1 of it. The caller ([`super::launcher`]) is responsible for
//! forking again, in the same process that called [`unshare_namespaces`],
//! before anything execs -- see the `pre_exec` hook there.

use nix::sched::{unshare, CloneFlags};
use nix::unistd::{Gid, Uid};

/// Enters new UTS, PID, mount, user, IPC, and network namespaces.
///
/// Only UTS/mount/user/IPC/network take effect on the calling process
/// immediately; PID namespace membership is deferred to whichever process
/// this one forks next (see module docs).
pub fn unshare_namespaces() -> std::io::Result<()> {
    unshare(
        CloneFlags::CLONE_NEWUTS
            | CloneFlags::CLONE_NEWPID
            | CloneFlags::CLONE_NEWNS
            | CloneFlags::CLONE_NEWUSER
            | CloneFlags::CLONE_NEWIPC
            | CloneFlags::CLONE_NEWNET,
    )
    .map_err(|errno| std::io::Error::from_raw_os_error(errno as i32))
}

/// Maps container uid/gid 0 to `uid`/`gid` (the invoking host identity) with
/// a range of 1 -- the classic rootless mapping, requiring no `/etc/subuid`
/// configuration on the host. Must run in a process that is a member of the
/// user namespace created by [`unshare_namespaces`], before anything else
/// writes that namespace's maps.
pub fn map_ids(uid: Uid, gid: Gid) -> std::io::Result<()> {
    std::fs::write("/proc/self/setgroups", "deny")?;
    std::fs::write("/proc/self/uid_map", format!("0 {uid} 1\n"))?;
    std::fs::write("/proc/self/gid_map", format!("0 {gid} 1\n"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // Requires CAP_SYS_ADMIN (or an unprivileged-user-namespace-enabled
    // kernel) to create namespaces at all.
    #[test]
    #[ignore = "needs CAP_SYS_ADMIN / unprivileged user namespace support"]
    fn unshare_namespaces_succeeds_under_privilege() {
        unshare_namespaces().unwrap();
    }

    // Must run inside a freshly unshared user namespace, or writing the maps
    // fails with EPERM.
    #[test]
    #[ignore = "needs CAP_SYS_ADMIN / unprivileged user namespace support"]
    fn map_ids_writes_single_entry_maps() {
        unshare_namespaces().unwrap();
        map_ids(nix::unistd::getuid(), nix::unistd::getgid()).unwrap();
        let uid_map = std::fs::read_to_string("/proc/self/uid_map").unwrap();
        assert!(uid_map.trim_start().starts_with('0'));
    }
}
