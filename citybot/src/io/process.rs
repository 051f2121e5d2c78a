//! Child processes with timeouts and bounded output (used for `adb`).

use std::io::Read;
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub timed_out: bool,
}

impl CommandOutput {
    /// Turn a timeout or non-zero exit into an error naming `label`.
    pub fn ensure_success(self, label: &str) -> Result<Self> {
        if self.timed_out {
            bail!("{label} timed out");
        }
        if !self.status.success() {
            let stderr = String::from_utf8_lossy(&self.stderr);
            bail!(
                "{label} exited with {:?}: {}",
                self.status.code(),
                stderr.trim()
            );
        }
        if self.stdout_truncated > 0 {
            bail!("{label} output exceeded limit by {} bytes", self.stdout_truncated);
        }
        Ok(self)
    }
}

/// Run a command with a timeout, capturing stdout/stderr without risking
/// pipe deadlocks.
///
/// Both pipes are drained on reader threads while the child runs.
/// `output_limit_bytes` bounds what is kept in memory per stream; excess
/// bytes are counted and discarded.
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), output_limit_bytes))]
pub fn run_command_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).context("spawn command");
        }
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let stdout_handle = thread::spawn(move || read_stream_limited(stdout, output_limit_bytes));
    let stderr_handle = thread::spawn(move || read_stream_limited(stderr, output_limit_bytes));

    let mut timed_out = false;
    let status = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => status,
        None => {
            warn!(
                timeout_secs = timeout.as_secs(),
                "command timed out, killing"
            );
            timed_out = true;
            child.kill().context("kill command")?;
            child.wait().context("wait command after kill")?
        }
    };

    let (stdout, stdout_truncated) = join_output(stdout_handle).context("join stdout")?;
    let (stderr, _) = join_output(stderr_handle).context("join stderr")?;

    debug!(exit_code = ?status.code(), timed_out, bytes = stdout.len(), "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        timed_out,
    })
}

fn join_output(handle: thread::JoinHandle<Result<(Vec<u8>, usize)>>) -> Result<(Vec<u8>, usize)> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        let keep = n.min(remaining);
        buf.extend_from_slice(&chunk[..keep]);
        truncated += n - keep;
    }

    Ok((buf, truncated))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn captures_stdout_and_success() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "printf hello"]);
        let out = run_command_with_timeout(cmd, Duration::from_secs(5), 1024)
            .expect("run")
            .ensure_success("sh")
            .expect("success");
        assert_eq!(out.stdout, b"hello");
    }

    #[test]
    fn non_zero_exit_is_an_error_with_stderr() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo device offline >&2; exit 1"]);
        let err = run_command_with_timeout(cmd, Duration::from_secs(5), 1024)
            .expect("run")
            .ensure_success("adb tap")
            .expect_err("failure");
        assert!(format!("{err}").contains("device offline"));
    }

    #[test]
    fn slow_command_is_killed() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "sleep 5"]);
        let out = run_command_with_timeout(cmd, Duration::from_millis(100), 1024).expect("run");
        assert!(out.timed_out);
    }

    #[test]
    fn output_beyond_limit_is_counted() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "printf 0123456789"]);
        let out = run_command_with_timeout(cmd, Duration::from_secs(5), 4).expect("run");
        assert_eq!(out.stdout, b"0123");
        assert_eq!(out.stdout_truncated, 6);
    }
}
