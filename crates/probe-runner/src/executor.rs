use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use scorebot_core::{Invocation, ProbeJob, ProbeOutcome, ProbeStatus};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;

use crate::error::ProbeError;
use crate::output::TailBuffer;
use crate::Result;

/// Default cap on captured output per probe.
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 10 * 1024;

/// How long to keep draining pipes after the probe exits. A background
/// grandchild can hold them open indefinitely.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

// ─── Executor ─────────────────────────────────────────────────────────────

/// Runs one invocation as a subprocess and classifies the result.
///
/// Stateless apart from its output cap; one instance is shared by every
/// job of every round.
#[derive(Debug, Clone)]
pub struct Executor {
    max_output_bytes: usize,
}

impl Default for Executor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_OUTPUT_BYTES)
    }
}

impl Executor {
    pub fn new(max_output_bytes: usize) -> Self {
        Self { max_output_bytes }
    }

    pub fn max_output_bytes(&self) -> usize {
        self.max_output_bytes
    }

    /// Run a job and apply its expected-content check.
    pub async fn run_job(&self, job: &ProbeJob) -> ProbeOutcome {
        let outcome = self.run(&job.invocation, job.timeout).await;
        match &job.expect {
            Some(expect) => outcome.require_match(expect),
            None => outcome,
        }
    }

    /// Run `invocation` for at most `timeout`.
    ///
    /// Exit 0 is `Success`, any other exit (or a signal) is `Failure`, running
    /// past the timeout is `Timeout`, and anything that stops the process from
    /// starting is `BuildError`. Never returns an error.
    pub async fn run(&self, invocation: &Invocation, timeout: Duration) -> ProbeOutcome {
        let started = Instant::now();
        match self.execute(invocation, timeout, started).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(
                    command = %invocation,
                    error = %e,
                    "probe could not be launched"
                );
                ProbeOutcome::new(ProbeStatus::BuildError, e.to_string(), elapsed_ms(started))
            }
        }
    }

    async fn execute(
        &self,
        invocation: &Invocation,
        timeout: Duration,
        started: Instant,
    ) -> Result<ProbeOutcome> {
        let program = which::which(invocation.program()).map_err(|source| {
            ProbeError::ProgramNotFound {
                program: invocation.program().to_string(),
                source,
            }
        })?;

        let mut cmd = Command::new(&program);
        cmd.args(invocation.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in invocation.env_vars() {
            cmd.env(key, value);
        }
        for (key, secret) in invocation.secret_vars() {
            cmd.env(key, secret.expose());
        }
        // Own process group, so a timeout takes down everything the probe forked.
        #[cfg(unix)]
        cmd.process_group(0);

        tracing::debug!(
            command = %invocation,
            secret_env = ?invocation.secret_names(),
            timeout_ms = timeout.as_millis() as u64,
            "spawning probe"
        );

        let mut child = cmd.spawn().map_err(|source| ProbeError::Spawn {
            program: invocation.program().to_string(),
            source,
        })?;
        let mut group = GroupKill::new(child.id());

        let tail = Arc::new(Mutex::new(TailBuffer::new(self.max_output_bytes)));
        let stdout = child.stdout.take().ok_or(ProbeError::Pipe("stdout"))?;
        let stderr = child.stderr.take().ok_or(ProbeError::Pipe("stderr"))?;
        let readers = [drain(stdout, Arc::clone(&tail)), drain(stderr, Arc::clone(&tail))];

        match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => {
                group.disarm();
                settle(readers).await;
                let output = snapshot(&tail);
                let code = status.code();
                let status_kind = if status.success() {
                    ProbeStatus::Success
                } else {
                    ProbeStatus::Failure
                };
                let output = match (status_kind, code) {
                    (ProbeStatus::Failure, None) if output.is_empty() => {
                        "terminated by signal".to_string()
                    }
                    _ => output,
                };
                Ok(ProbeOutcome::new(status_kind, output, elapsed_ms(started)).with_exit_code(code))
            }
            Ok(Err(e)) => {
                abort(readers);
                Err(ProbeError::Io(e))
            }
            Err(_) => {
                group.fire();
                let _ = child.kill().await;
                abort(readers);
                tracing::warn!(
                    command = %invocation,
                    timeout_ms = timeout.as_millis() as u64,
                    "probe timed out and was killed"
                );
                let captured = snapshot(&tail);
                let mut output = format!("timed out after {}ms", timeout.as_millis());
                if !captured.is_empty() {
                    output.push('\n');
                    output.push_str(&captured);
                }
                Ok(ProbeOutcome::new(ProbeStatus::Timeout, output, elapsed_ms(started)))
            }
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn snapshot(tail: &Mutex<TailBuffer>) -> String {
    let Ok(tail) = tail.lock() else {
        return String::new();
    };
    if tail.truncated() {
        tracing::debug!("output exceeded the cap, keeping the tail only");
    }
    tail.to_text()
}

// ─── Pipe readers ─────────────────────────────────────────────────────────

fn drain<R>(mut reader: R, tail: Arc<Mutex<TailBuffer>>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut chunk = [0u8; 4096];
        loop {
            match reader.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if let Ok(mut t) = tail.lock() {
                        t.push(&chunk[..n]);
                    }
                }
            }
        }
    })
}

/// Wait for both readers to hit EOF, giving up after `DRAIN_GRACE`.
async fn settle(readers: [JoinHandle<()>; 2]) {
    for mut reader in readers {
        if tokio::time::timeout(DRAIN_GRACE, &mut reader).await.is_err() {
            reader.abort();
        }
    }
}

fn abort(readers: [JoinHandle<()>; 2]) {
    for reader in readers {
        reader.abort();
    }
}

// ─── Process group cleanup ────────────────────────────────────────────────

/// SIGKILLs the probe's process group when fired or dropped while armed.
///
/// Dropping covers the case where the whole probe task is aborted at the
/// round deadline: `kill_on_drop` only reaches the direct child.
struct GroupKill {
    pid: Option<u32>,
}

impl GroupKill {
    fn new(pid: Option<u32>) -> Self {
        Self { pid }
    }

    fn disarm(&mut self) {
        self.pid = None;
    }

    fn fire(&mut self) {
        if let Some(pid) = self.pid.take() {
            kill_group(pid);
        }
    }
}

impl Drop for GroupKill {
    fn drop(&mut self) {
        self.fire();
    }
}

/// Terminate a process group using SIGKILL. Best-effort; errors are ignored.
#[cfg(unix)]
fn kill_group(pgid: u32) {
    let _ = std::process::Command::new("kill")
        .arg("-9")
        .arg("--")
        .arg(format!("-{pgid}"))
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
}

#[cfg(not(unix))]
fn kill_group(_pgid: u32) {}
