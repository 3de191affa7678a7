//! Native process control
//!
//! Native services are launched as detached shell commands in their own
//! process group with stdio discarded, and stopped through the configured
//! stop command (typically a process-name pattern kill). The force variant
//! substitutes the harsher signal form agreed at configuration time.

use crate::{LifecycleError, Result};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Deadline for a stop command to finish
const STOP_CMD_TIMEOUT: Duration = Duration::from_secs(30);

/// Launch `start_cmd` detached from the manager.
///
/// The child gets a fresh session so it survives the manager, and its
/// output goes to the void; managed services keep their own logs.
/// Returns the shell's PID, which is also written to `pid_file` when one
/// is configured.
pub fn spawn_detached(name: &str, start_cmd: &str, pid_file: Option<&Path>) -> Result<u32> {
    info!("starting native service {}: {}", name, start_cmd);

    let mut command = std::process::Command::new("sh");
    command
        .arg("-c")
        .arg(start_cmd)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }

    let child = command
        .spawn()
        .map_err(|e| LifecycleError::Process(format!("failed to spawn {}: {}", name, e)))?;

    let pid = child.id();
    if let Some(path) = pid_file {
        if let Err(e) = std::fs::write(path, pid.to_string()) {
            warn!("could not write PID file {}: {}", path.display(), e);
        }
    }

    debug!("native service {} spawned with pid {}", name, pid);
    Ok(pid)
}

/// Run the configured stop command to completion.
///
/// With `force`, `pkill` becomes `pkill -9`, the substitution the
/// configuration contract promises for the harsher variant.
pub async fn run_stop_command(name: &str, stop_cmd: &str, force: bool) -> Result<()> {
    let cmd = if force {
        stop_cmd.replace("pkill", "pkill -9")
    } else {
        stop_cmd.to_string()
    };

    info!("stopping native service {}: {}", name, cmd);

    let mut child = tokio::process::Command::new("sh")
        .arg("-c")
        .arg(&cmd)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| LifecycleError::Process(format!("failed to run stop for {}: {}", name, e)))?;

    match timeout(STOP_CMD_TIMEOUT, child.wait()).await {
        Ok(Ok(status)) => {
            // pkill exits 1 when nothing matched, which is an idempotent
            // stop, not a failure.
            debug!("stop command for {} exited with {}", name, status);
            Ok(())
        }
        Ok(Err(e)) => Err(LifecycleError::Process(format!(
            "stop command for {} failed: {}",
            name, e
        ))),
        Err(_) => {
            let _ = child.kill().await;
            Err(LifecycleError::StopTimeout(name.to_string()))
        }
    }
}
