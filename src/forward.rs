//! Port-forward tunnel lifecycle.
//!
//! Tunnels are `kubectl port-forward` children owned by the CLI process.
//! Shutdown is polite first (SIGTERM via `kill`), forceful after a bounded
//! grace period. Stopping is idempotent and best effort; a tunnel that
//! already died is treated as stopped.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::error::CommandError;

/// How long a tunnel gets to exit after SIGTERM before it is killed.
const STOP_GRACE: Duration = Duration::from_secs(5);
const STOP_POLL: Duration = Duration::from_millis(100);

/// Delay before checking whether a freshly spawned tunnel died on startup.
const STARTUP_CHECK_DELAY: Duration = Duration::from_millis(200);

/// A running tunnel plus the command line that produced it.
#[derive(Debug)]
pub struct PortForwardHandle {
    command: String,
    child: Child,
}

impl PortForwardHandle {
    pub fn new(command: String, child: Child) -> Self {
        Self { command, child }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Fail fast if the tunnel exited right after spawning, which is what
    /// kubectl does for an unknown service or an occupied local port.
    pub async fn check_startup(&mut self) -> Result<(), CommandError> {
        tokio::time::sleep(STARTUP_CHECK_DELAY).await;
        match self.child.try_wait() {
            Ok(Some(status)) => {
                let mut detail = String::new();
                if let Some(stderr) = self.child.stderr.as_mut() {
                    let _ = stderr.read_to_string(&mut detail).await;
                }
                Err(CommandError::Failed {
                    tool: "kubectl".to_string(),
                    verb: "port-forward".to_string(),
                    workload: self.command.clone(),
                    code: status.code().unwrap_or(-1),
                    detail: detail.trim().to_string(),
                })
            }
            Ok(None) => Ok(()),
            Err(e) => Err(CommandError::Spawn {
                tool: "kubectl".to_string(),
                message: e.to_string(),
            }),
        }
    }

    /// Terminate the tunnel, escalating from SIGTERM to SIGKILL.
    pub async fn stop(&mut self) {
        match self.child.try_wait() {
            Ok(Some(_)) => return,
            Err(e) => {
                warn!(command = %self.command, error = %e, "could not inspect tunnel state");
                return;
            }
            Ok(None) => {}
        }

        if let Some(pid) = self.child.id() {
            debug!(pid, command = %self.command, "terminating tunnel");
            let signalled = Command::new("kill")
                .arg(pid.to_string())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await
                .map(|s| s.success())
                .unwrap_or(false);

            if signalled {
                let mut waited = Duration::ZERO;
                while waited < STOP_GRACE {
                    if matches!(self.child.try_wait(), Ok(Some(_))) {
                        return;
                    }
                    tokio::time::sleep(STOP_POLL).await;
                    waited += STOP_POLL;
                }
            }
        }

        if let Err(e) = self.child.kill().await {
            warn!(command = %self.command, error = %e, "failed to kill tunnel");
        }
        let _ = self.child.wait().await;
    }
}

/// Spawns tunnel subprocesses. Swapped out in tests for throwaway shells.
pub trait TunnelSpawner {
    fn spawn(&self, argv: &[String]) -> Result<Child, CommandError>;
}

/// Spawns the real command with stderr captured for startup diagnostics.
pub struct SystemSpawner;

impl TunnelSpawner for SystemSpawner {
    fn spawn(&self, argv: &[String]) -> Result<Child, CommandError> {
        let (program, args) = argv.split_first().ok_or_else(|| CommandError::Spawn {
            tool: "kubectl".to_string(),
            message: "empty command".to_string(),
        })?;
        Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CommandError::Spawn {
                tool: program.clone(),
                message: e.to_string(),
            })
    }
}

/// Stop every tunnel in the batch. Never fails; each stop is best effort.
pub async fn stop_all(handles: &mut [PortForwardHandle]) {
    for handle in handles.iter_mut() {
        handle.stop().await;
    }
}

/// Keep tunnels alive until Ctrl-C or until every tunnel has exited,
/// then stop whatever is left.
pub async fn wait_on_forwards(handles: &mut Vec<PortForwardHandle>, poll_interval: Duration) {
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                debug!("interrupt received, stopping tunnels");
                break;
            }
            _ = tokio::time::sleep(poll_interval) => {
                if !handles.iter_mut().any(|h| h.is_running()) {
                    warn!("all tunnels exited");
                    break;
                }
            }
        }
    }

    stop_all(handles).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spawn_shell(script: &str) -> Child {
        Command::new("sh")
            .arg("-c")
            .arg(script)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .unwrap()
    }

    #[tokio::test]
    async fn test_running_tunnel_reports_running() {
        let child = spawn_shell("sleep 30");
        let mut handle = PortForwardHandle::new("sleep 30".to_string(), child);
        assert!(handle.is_running());
        handle.stop().await;
        assert!(!handle.is_running());
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let child = spawn_shell("true");
        let mut handle = PortForwardHandle::new("true".to_string(), child);
        tokio::time::sleep(Duration::from_millis(200)).await;
        handle.stop().await;
        handle.stop().await;
        assert!(!handle.is_running());
    }

    #[tokio::test]
    async fn test_startup_check_surfaces_early_exit() {
        let child = spawn_shell("echo 'unable to forward' >&2; exit 1");
        let mut handle =
            PortForwardHandle::new("kubectl port-forward svc/x 8080:8080".to_string(), child);
        let err = handle.check_startup().await.unwrap_err();
        match err {
            CommandError::Failed { code, detail, .. } => {
                assert_eq!(code, 1);
                assert!(detail.contains("unable to forward"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_startup_check_passes_for_live_tunnel() {
        let child = spawn_shell("sleep 30");
        let mut handle = PortForwardHandle::new("sleep 30".to_string(), child);
        assert!(handle.check_startup().await.is_ok());
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_wait_returns_once_all_tunnels_exit() {
        let child = spawn_shell("sleep 0.1");
        let mut handles = vec![PortForwardHandle::new("sleep 0.1".to_string(), child)];
        wait_on_forwards(&mut handles, Duration::from_millis(50)).await;
        assert!(!handles[0].is_running());
    }

    #[test]
    fn test_system_spawner_rejects_empty_command() {
        let result = SystemSpawner.spawn(&[]);
        assert!(matches!(result, Err(CommandError::Spawn { .. })));
    }
}
