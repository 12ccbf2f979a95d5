//! Subprocess executor with process-group timeouts.
//!
//! Each test program is started as the leader of a new process group so a
//! timeout can take down everything it spawned, not only the direct child.

use super::{Invocation, RunnerError, TestExecutor, TestOutcome};
use crate::config::RunnerConfig;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, warn};

/// Runs test programs as real child processes.
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    timeout: Duration,
    kill_grace: Duration,
}

impl ProcessExecutor {
    /// `timeout` bounds the whole invocation; `kill_grace` is how long a
    /// timed-out group gets between SIGTERM and SIGKILL.
    pub fn new(timeout: Duration, kill_grace: Duration) -> Self {
        Self {
            timeout,
            kill_grace,
        }
    }

    pub fn from_config(config: &RunnerConfig) -> Self {
        Self::new(config.timeout(), config.kill_grace())
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn terminate(&self, child: &mut Child, pid: Option<u32>) -> Option<ExitStatus> {
        signal_group(child, pid, GroupSignal::Terminate);

        let status = match timeout(self.kill_grace, child.wait()).await {
            Ok(Ok(status)) => Some(status),
            Ok(Err(e)) => {
                warn!(error = %e, "Failed to reap timed-out test program");
                None
            }
            Err(_) => {
                debug!("Process group ignored SIGTERM, escalating");
                signal_group(child, pid, GroupSignal::Kill);
                child.wait().await.ok()
            }
        };

        // Descendants that outlived the leader.
        signal_group(child, pid, GroupSignal::Kill);
        status
    }
}

impl Default for ProcessExecutor {
    fn default() -> Self {
        Self::from_config(&RunnerConfig::default())
    }
}

#[async_trait]
impl TestExecutor for ProcessExecutor {
    async fn execute(&self, invocation: &Invocation) -> Result<TestOutcome, RunnerError> {
        let started = Instant::now();
        let deadline = started + self.timeout;

        let mut std_command = std::process::Command::new(&invocation.program);
        std_command
            .args(invocation.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            std_command.process_group(0);
        }
        let mut command = Command::from(std_command);
        command.kill_on_drop(true);

        let mut child = command.spawn().map_err(|source| RunnerError::Spawn {
            program: invocation.program.clone(),
            source,
        })?;
        // Gone once the child is reaped, so grab it now.
        let pid = child.id();
        debug!(pid = ?pid, command = %invocation.command_line(), "Test program started");

        let output = Arc::new(Mutex::new(Vec::new()));
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(pump(stdout, Arc::clone(&output))));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(pump(stderr, Arc::clone(&output))));
        }

        let (status, mut timed_out) = match timeout_at(deadline, child.wait()).await {
            Ok(status) => {
                let status = status.map_err(|source| RunnerError::Wait {
                    program: invocation.program.clone(),
                    source,
                })?;
                (Some(status), false)
            }
            Err(_) => {
                warn!(
                    command = %invocation.command_line(),
                    timeout = ?self.timeout,
                    "Test timed out, terminating its process group"
                );
                (self.terminate(&mut child, pid).await, true)
            }
        };

        let drain_until = if timed_out {
            Instant::now() + self.kill_grace
        } else {
            deadline
        };
        if !drain(readers, drain_until).await && !timed_out {
            warn!(
                command = %invocation.command_line(),
                "Descendants kept the output open past the deadline"
            );
            signal_group(&mut child, pid, GroupSignal::Kill);
            timed_out = true;
        }

        let output = std::mem::take(&mut *output.lock());
        Ok(TestOutcome {
            program: invocation.program.clone(),
            device: invocation.device.name.clone(),
            command: invocation.command_line(),
            exit_code: status.and_then(|status| status.code()),
            output,
            timed_out,
            launch_error: None,
            duration: started.elapsed(),
        })
    }
}

/// Copy a child stream into the shared output buffer until EOF.
async fn pump<R>(mut stream: R, sink: Arc<Mutex<Vec<u8>>>)
where
    R: AsyncRead + Unpin,
{
    let mut buffer = [0u8; 4096];
    loop {
        match stream.read(&mut buffer).await {
            Ok(0) | Err(_) => break,
            Ok(n) => sink.lock().extend_from_slice(&buffer[..n]),
        }
    }
}

/// Wait for the output readers, aborting any still running at `until`.
///
/// Returns `false` if a reader had to be aborted.
async fn drain(readers: Vec<JoinHandle<()>>, until: Instant) -> bool {
    let mut complete = true;
    for handle in readers {
        let abort = handle.abort_handle();
        if timeout_at(until, handle).await.is_err() {
            abort.abort();
            complete = false;
        }
    }
    complete
}

#[derive(Debug, Clone, Copy)]
enum GroupSignal {
    Terminate,
    Kill,
}

#[cfg(unix)]
fn signal_group(_child: &mut Child, pid: Option<u32>, signal: GroupSignal) {
    let Some(pid) = pid else { return };
    let signo = match signal {
        GroupSignal::Terminate => libc::SIGTERM,
        GroupSignal::Kill => libc::SIGKILL,
    };

    // SAFETY: killpg only delivers a signal. The child was spawned with
    // process_group(0), so its pid is also its process group id.
    let rc = unsafe { libc::killpg(pid as libc::pid_t, signo) };
    if rc != 0 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            warn!(pid, ?signal, error = %err, "Failed to signal process group");
        }
    }
}

#[cfg(not(unix))]
fn signal_group(child: &mut Child, _pid: Option<u32>, _signal: GroupSignal) {
    // No process groups here; the direct child is all we can reach.
    let _ = child.start_kill();
}
