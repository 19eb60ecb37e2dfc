use tokio::process::Child;
use tracing::{debug, warn};

/// Forcefully terminate `child` and, on Unix, the process group it leads.
///
/// Does nothing if the child has already exited. Must be called by the
/// owner of `child` before it is reaped, so the pid cannot have been reused.
pub(crate) fn terminate(child: &mut Child) {
    match child.try_wait() {
        Ok(Some(status)) => {
            debug!(%status, "Process already exited; skipping termination");
            return;
        }
        Ok(None) => {}
        Err(err) => warn!(error = %err, "Could not query process state before termination"),
    }

    #[cfg(unix)]
    if let Some(pid) = child.id() {
        kill_process_group(pid);
    }

    if let Err(err) = child.start_kill() {
        debug!(error = %err, "Direct kill failed; process likely already gone");
    }
}

/// Kills the process group led by `pid` when dropped while still armed.
///
/// Held across the wait for exit so that dropping an invocation mid-flight
/// takes the child's descendants down with it. Must be dropped before the
/// child is reaped.
pub(crate) struct GroupKillGuard {
    pid: Option<u32>,
    armed: bool,
}

impl GroupKillGuard {
    pub(crate) fn new(pid: Option<u32>) -> Self {
        Self { pid, armed: true }
    }

    /// Call once the child has been reaped; the pid may be reused after that.
    pub(crate) fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for GroupKillGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        debug!(pid = ?self.pid, "Invocation dropped before exit; killing process group");
        #[cfg(unix)]
        if let Some(pid) = self.pid {
            kill_process_group(pid);
        }
    }
}

#[cfg(unix)]
fn kill_process_group(pid: u32) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    // The child was spawned as its own group leader, so pgid == pid.
    match killpg(Pid::from_raw(raw), Signal::SIGKILL) {
        Ok(()) => debug!(pgid = raw, "Sent SIGKILL to process group"),
        Err(err) => debug!(pgid = raw, error = %err, "killpg failed"),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::command_spec::CommandSpec;
    use crate::launcher::launch;
    use std::os::unix::process::ExitStatusExt;
    use std::time::Duration;

    #[tokio::test]
    async fn test_armed_guard_kills_group_on_drop() {
        let mut launched = launch(&CommandSpec::new("sleep").arg("30")).unwrap();
        drop(GroupKillGuard::new(launched.child.id()));

        let status = tokio::time::timeout(Duration::from_secs(5), launched.child.wait())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(status.signal(), Some(9));
    }

    #[tokio::test]
    async fn test_disarmed_guard_leaves_group_alone() {
        let mut launched = launch(&CommandSpec::new("sleep").arg("0.3")).unwrap();
        let mut guard = GroupKillGuard::new(launched.child.id());
        guard.disarm();
        drop(guard);

        let status = launched.child.wait().await.unwrap();
        assert!(status.success());
    }
}
