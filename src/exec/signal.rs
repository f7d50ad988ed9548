// src/exec/signal.rs

//! Termination signals for supervised processes.
//!
//! Services are spawned as leaders of their own process group, so a signal
//! sent to the group reaches the shell and everything it started (pipelines,
//! `&&` chains, dev servers that fork workers).

use tokio::process::Command;

/// Make the spawned process the leader of a new process group.
pub fn isolate_process_group(cmd: &mut Command) {
    #[cfg(unix)]
    {
        cmd.process_group(0);
    }
    #[cfg(not(unix))]
    {
        let _ = cmd;
    }
}

/// Ask the process group led by `pid` to terminate (SIGTERM).
///
/// Returns false when no graceful signal could be delivered; callers then
/// go straight to a forced kill.
#[cfg(unix)]
pub fn terminate(pid: u32) -> bool {
    send(pid, libc::SIGTERM)
}

/// Force-kill the process group led by `pid` (SIGKILL).
#[cfg(unix)]
pub fn kill(pid: u32) -> bool {
    send(pid, libc::SIGKILL)
}

/// Force-kill only the process group led by `pid`, never a lone process
/// with that id. Used once the leader may already be reaped.
#[cfg(unix)]
pub fn kill_group(pid: u32) -> bool {
    unsafe { libc::kill(-(pid as libc::pid_t), libc::SIGKILL) == 0 }
}

#[cfg(unix)]
fn send(pid: u32, sig: libc::c_int) -> bool {
    let pid = pid as libc::pid_t;
    // Negative pid addresses the whole group; fall back to the single
    // process if the group is already gone.
    if unsafe { libc::kill(-pid, sig) } == 0 {
        return true;
    }
    unsafe { libc::kill(pid, sig) == 0 }
}

#[cfg(not(unix))]
pub fn terminate(_pid: u32) -> bool {
    false
}

#[cfg(not(unix))]
pub fn kill(_pid: u32) -> bool {
    false
}

#[cfg(not(unix))]
pub fn kill_group(_pid: u32) -> bool {
    false
}
