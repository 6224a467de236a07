use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};

use crate::error::{FramecastError, FramecastResult};

/// How long a terminated process gets to exit on its own before SIGKILL.
const TERMINATE_GRACE: Duration = Duration::from_secs(5);

/// An external command plus the label used for it in logs and errors.
#[derive(Clone, Debug)]
pub struct CommandSpec {
    /// Human-readable label ("build", "preview server").
    pub label: String,
    /// Executable resolved via PATH.
    pub program: String,
    /// Arguments passed verbatim.
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(label: impl Into<String>, program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            label: label.into(),
            program: program.into(),
            args: args.iter().map(|a| (*a).to_owned()).collect(),
        }
    }

    /// The command as it would be typed in a shell, for logging.
    pub fn command_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// A spawned process whose stdout has not yet produced its readiness marker.
pub struct LaunchedProcess {
    label: String,
    child: Child,
    lines: Lines<BufReader<ChildStdout>>,
}

/// Spawn `spec` with stdout piped for readiness scanning.
///
/// stderr is inherited so diagnostics from the tool reach the terminal
/// unmodified. The child is killed on drop, which covers cancellation paths
/// that never reach an explicit [`RunningProcess::terminate`].
pub fn spawn_supervised(spec: &CommandSpec) -> FramecastResult<LaunchedProcess> {
    let mut child = Command::new(&spec.program)
        .args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| {
            FramecastError::process_startup(
                format!("failed to spawn {} ({}): {e}", spec.label, spec.command_line()),
                None,
            )
        })?;

    let stdout = child.stdout.take().ok_or_else(|| {
        FramecastError::process_startup(
            format!("failed to open {} stdout (unexpected)", spec.label),
            None,
        )
    })?;

    tracing::debug!(process = %spec.label, command = %spec.command_line(), pid = child.id(), "spawned");

    Ok(LaunchedProcess {
        label: spec.label.clone(),
        child,
        lines: BufReader::new(stdout).lines(),
    })
}

impl LaunchedProcess {
    /// Scan stdout line-by-line until `is_ready` matches, forwarding every
    /// line verbatim.
    ///
    /// EOF before a match means the process exited (or closed stdout) during
    /// startup; its exit status is reaped and reported. After the match a
    /// background task keeps draining stdout so the process never blocks on
    /// a full pipe.
    pub async fn await_ready(
        mut self,
        is_ready: impl Fn(&str) -> bool,
    ) -> FramecastResult<RunningProcess> {
        loop {
            let line = self.lines.next_line().await.map_err(|e| {
                FramecastError::process_startup(
                    format!("failed reading {} output: {e}", self.label),
                    None,
                )
            })?;
            match line {
                Some(line) => {
                    println!("{line}");
                    if is_ready(&line) {
                        break;
                    }
                }
                None => {
                    let status = self.child.wait().await.map_err(|e| {
                        FramecastError::process_startup(
                            format!("failed to reap {}: {e}", self.label),
                            None,
                        )
                    })?;
                    return Err(FramecastError::process_startup(
                        format!("{} exited before becoming ready ({status})", self.label),
                        status.code(),
                    ));
                }
            }
        }

        tracing::debug!(process = %self.label, "ready");

        let mut lines = self.lines;
        let drain = tokio::spawn(async move {
            while let Ok(Some(line)) = lines.next_line().await {
                println!("{line}");
            }
        });

        Ok(RunningProcess {
            label: self.label,
            child: self.child,
            drain: Some(drain),
            terminated: false,
        })
    }
}

/// Spawn `spec` and wait until a stdout line satisfies `is_ready`.
pub async fn launch_and_await_ready(
    spec: &CommandSpec,
    is_ready: impl Fn(&str) -> bool,
) -> FramecastResult<RunningProcess> {
    spawn_supervised(spec)?.await_ready(is_ready).await
}

/// Handle to a supervised process that has signalled readiness.
pub struct RunningProcess {
    label: String,
    child: Child,
    drain: Option<tokio::task::JoinHandle<()>>,
    terminated: bool,
}

impl RunningProcess {
    /// Stop the process and reap it. Idempotent.
    ///
    /// SIGINT first so wrappers like npm can forward the signal to their
    /// children, SIGKILL after [`TERMINATE_GRACE`]. A process that already
    /// exited on its own is simply reaped.
    pub async fn terminate(&mut self) {
        if self.terminated {
            return;
        }
        self.terminated = true;

        #[cfg(unix)]
        if let Some(pid) = self.child.id() {
            send_interrupt_best_effort(pid);
        }
        #[cfg(not(unix))]
        let _ = self.child.start_kill();

        if tokio::time::timeout(TERMINATE_GRACE, self.child.wait())
            .await
            .is_err()
        {
            tracing::warn!(process = %self.label, "no exit after interrupt; killing");
            let _ = self.child.start_kill();
            let _ = self.child.wait().await;
        }

        if let Some(drain) = self.drain.take() {
            let _ = drain.await;
        }
        tracing::debug!(process = %self.label, "terminated");
    }
}

#[cfg(unix)]
fn send_interrupt_best_effort(pid: u32) {
    let _ = std::process::Command::new("kill")
        .args(["-INT", &pid.to_string()])
        .output();
}

/// Forcibly free `port` by killing whatever still listens on it.
///
/// Out-of-band cleanup for interrupt and fatal-error paths where the preview
/// server may have been orphaned. Best-effort; all errors are ignored.
#[cfg(unix)]
pub async fn force_release_port(port: u16) {
    let script = format!("kill -9 $(lsof -t -i:{port})");
    let _ = Command::new("sh")
        .arg("-c")
        .arg(script)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
}

#[cfg(not(unix))]
pub async fn force_release_port(_port: u16) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_line_joins_program_and_args() {
        let spec = CommandSpec::new("build", "npm", &["run", "build"]);
        assert_eq!(spec.command_line(), "npm run build");
        assert_eq!(spec.label, "build");
    }
}
