//! Process groups for runner subprocesses.
//!
//! `kill_on_drop` reaches only the direct child. The test binary under `cargo`
//! or the command under `sh -c` runs one level deeper and would outlive a
//! timeout, so runners start in their own group and the whole group is killed.

use tokio::process::{Child, Command};

/// Kills the process group of a spawned runner when dropped.
#[derive(Debug)]
pub struct GroupGuard {
    #[cfg_attr(not(unix), allow(dead_code))]
    leader: Option<u32>,
}

/// Spawn `command` as the leader of a new process group.
pub fn spawn_in_group(command: &mut Command) -> std::io::Result<(Child, GroupGuard)> {
    #[cfg(unix)]
    command.process_group(0);
    let child = command.kill_on_drop(true).spawn()?;
    let guard = GroupGuard { leader: child.id() };
    Ok((child, guard))
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        #[cfg(unix)]
        if let Some(pgid) = self.leader.and_then(|id| i32::try_from(id).ok()) {
            use nix::errno::Errno;
            use nix::sys::signal::{killpg, Signal};
            use nix::unistd::Pid;

            match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
                // Nothing left in the group.
                Ok(()) | Err(Errno::ESRCH) => {}
                Err(e) => tracing::warn!("Failed to kill process group {}: {}", pgid, e),
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_dropping_guard_kills_grandchildren() {
        let temp = TempDir::new().unwrap();
        let marker = temp.path().join("survived");

        // The inner shell is a grandchild; `; true` keeps the outer shell from exec'ing it.
        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg(format!("sh -c 'sleep 1; touch {}'; true", marker.display()));
        let (child, guard) = spawn_in_group(&mut command).unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        drop(child);
        drop(guard);

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!marker.exists());
    }
}
