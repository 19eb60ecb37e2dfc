use std::io;
use std::process::{ExitStatus, Stdio};
use tokio::process::{Child, ChildStderr, ChildStdout};
use tracing::debug;

use crate::command_spec::CommandSpec;
use crate::platform;
use crate::watchers::TerminationRequest;

/// A started child with both output pipes taken.
pub(crate) struct LaunchedProcess {
    pub child: Child,
    pub stdout: ChildStdout,
    pub stderr: ChildStderr,
}

/// Start the process described by `spec`.
///
/// Stdin is closed, stdout and stderr are piped. On Unix the child leads its
/// own process group so termination reaches its descendants. The child is
/// killed if its handle is dropped before it is reaped.
pub(crate) fn launch(spec: &CommandSpec) -> io::Result<LaunchedProcess> {
    let mut cmd = spec.to_tokio_command();
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd.spawn()?;
    debug!(pid = ?child.id(), "Spawned process");

    let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
        let _ = child.start_kill();
        return Err(io::Error::other("output pipes were not available after spawn"));
    };

    Ok(LaunchedProcess {
        child,
        stdout,
        stderr,
    })
}

/// Wait for `child` to exit, killing it first if `termination` is requested.
pub(crate) async fn wait_for_exit(
    child: &mut Child,
    termination: &TerminationRequest,
) -> io::Result<ExitStatus> {
    tokio::select! {
        status = child.wait() => status,
        () = termination.requested() => {
            platform::terminate(child);
            child.wait().await
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_launch_closes_stdin() {
        // `cat` exits immediately when stdin is at EOF.
        let mut launched = launch(&CommandSpec::new("cat")).unwrap();
        let term = TerminationRequest::new();
        let status = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            wait_for_exit(&mut launched.child, &term),
        )
        .await
        .unwrap()
        .unwrap();
        assert!(status.success());
    }

    #[tokio::test]
    async fn test_launch_missing_program_is_not_found() {
        let err = launch(&CommandSpec::new("/nonexistent/execwarden-test-binary"))
            .err()
            .unwrap();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_termination_request_kills_child() {
        use std::os::unix::process::ExitStatusExt;

        let mut launched = launch(&CommandSpec::new("sleep").arg("30")).unwrap();
        let term = TerminationRequest::new();
        term.request();

        let status = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            wait_for_exit(&mut launched.child, &term),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(status.signal(), Some(9));
    }
}
