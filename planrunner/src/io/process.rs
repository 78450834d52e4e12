//! Bounded child processes for shell steps.
//!
//! A step's command runs with stdin closed, both output streams drained on
//! scoped reader threads, and at most `output_limit_bytes` kept per stream.

use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// Bytes kept from one output stream plus how many were dropped.
#[derive(Debug, Default)]
pub struct Captured {
    pub bytes: Vec<u8>,
    pub dropped: usize,
}

impl Captured {
    fn drain(mut reader: impl Read, limit: usize) -> Result<Self> {
        let mut captured = Captured::default();
        let mut chunk = [0u8; 8192];
        loop {
            let n = reader.read(&mut chunk).context("read output")?;
            if n == 0 {
                return Ok(captured);
            }
            let keep = n.min(limit.saturating_sub(captured.bytes.len()));
            captured.bytes.extend_from_slice(&chunk[..keep]);
            captured.dropped += n - keep;
        }
    }

    /// Lossy UTF-8, with a trailing marker when bytes were dropped.
    pub fn text(&self, label: &str) -> String {
        let mut text = String::from_utf8_lossy(&self.bytes).into_owned();
        if self.dropped > 0 {
            text.push_str(&format!("\n[{label} truncated {} bytes]\n", self.dropped));
        }
        text
    }
}

/// Outcome of one shell step's child process.
#[derive(Debug)]
pub struct StepProcess {
    pub status: ExitStatus,
    pub stdout: Captured,
    pub stderr: Captured,
    /// Set when the child outlived its timeout and was killed.
    pub timed_out: Option<Duration>,
}

impl StepProcess {
    /// Stdout of a clean exit; a timeout or non-zero exit becomes an error
    /// naming `command` and carrying its stderr.
    pub fn into_stdout(self, command: &str) -> Result<String> {
        if let Some(limit) = self.timed_out {
            bail!("command `{command}` timed out after {}s", limit.as_secs());
        }
        if !self.status.success() {
            bail!(
                "command `{command}` exited with status {:?}: {}",
                self.status.code(),
                self.stderr.text("stderr").trim()
            );
        }
        Ok(self.stdout.text("stdout"))
    }
}

/// Spawn `cmd` and wait up to `timeout`, killing it when the time runs out.
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), output_limit_bytes))]
pub fn run_bounded(
    mut cmd: Command,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<StepProcess> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    debug!(program = ?cmd.get_program(), "spawning child process");
    let mut child = cmd
        .spawn()
        .inspect_err(|err| error!(%err, "failed to spawn command"))
        .context("spawn command")?;
    let stdout = child.stdout.take().context("stdout was not piped")?;
    let stderr = child.stderr.take().context("stderr was not piped")?;

    thread::scope(|scope| {
        let stdout = scope.spawn(move || Captured::drain(stdout, output_limit_bytes));
        let stderr = scope.spawn(move || Captured::drain(stderr, output_limit_bytes));

        let waited = wait_or_kill(&mut child, timeout);
        let stdout = stdout
            .join()
            .map_err(|_| anyhow!("stdout reader panicked"))??;
        let stderr = stderr
            .join()
            .map_err(|_| anyhow!("stderr reader panicked"))??;
        let (status, timed_out) = waited?;

        if stdout.dropped > 0 || stderr.dropped > 0 {
            warn!(
                stdout_dropped = stdout.dropped,
                stderr_dropped = stderr.dropped,
                "output truncated"
            );
        }
        debug!(exit_code = ?status.code(), timed_out, "command finished");
        Ok(StepProcess {
            status,
            stdout,
            stderr,
            timed_out: timed_out.then_some(timeout),
        })
    })
}

fn wait_or_kill(child: &mut Child, timeout: Duration) -> Result<(ExitStatus, bool)> {
    if let Some(status) = child.wait_timeout(timeout).context("wait for command")? {
        return Ok((status, false));
    }
    warn!(timeout_secs = timeout.as_secs(), "command timed out, killing");
    child.kill().context("kill command")?;
    let status = child.wait().context("wait command after kill")?;
    Ok((status, true))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[test]
    fn clean_exit_yields_stdout() {
        let out = run_bounded(sh("echo hi"), Duration::from_secs(10), 1024).expect("run");
        assert_eq!(out.into_stdout("echo hi").expect("stdout"), "hi\n");
    }

    #[test]
    fn stdin_is_closed() {
        let out = run_bounded(sh("cat"), Duration::from_secs(10), 1024).expect("run");
        assert_eq!(out.into_stdout("cat").expect("stdout"), "");
    }

    #[test]
    fn truncates_beyond_limit() {
        let out = run_bounded(sh("printf abcdefgh"), Duration::from_secs(10), 4).expect("run");
        assert_eq!(out.stdout.bytes, b"abcd");
        assert_eq!(out.stdout.dropped, 4);
        let text = out.into_stdout("printf").expect("stdout");
        assert!(text.contains("[stdout truncated 4 bytes]"), "{text}");
    }

    #[test]
    fn timeout_kills_and_reports() {
        let out = run_bounded(sh("sleep 5"), Duration::from_millis(100), 1024).expect("run");
        assert_eq!(out.timed_out, Some(Duration::from_millis(100)));
        let err = out.into_stdout("sleep 5").expect_err("must time out");
        assert!(err.to_string().contains("timed out"), "{err}");
    }

    #[test]
    fn non_zero_exit_carries_stderr() {
        let out = run_bounded(sh("echo nope >&2; exit 2"), Duration::from_secs(10), 1024)
            .expect("run");
        let err = out.into_stdout("fail").expect_err("must fail");
        let message = err.to_string();
        assert!(message.contains("Some(2)"), "{message}");
        assert!(message.contains("nope"), "{message}");
    }
}
