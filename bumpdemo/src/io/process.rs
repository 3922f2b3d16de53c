//! Child process execution with a deadline and bounded output.
//!
//! Every `git` and `gh` invocation goes through [`run_with_limits`] so a hung
//! network call can never stall an orchestration step indefinitely.

use std::io::{Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};
use wait_timeout::ChildExt;

/// How long output pipes may stay open after the child itself is gone.
///
/// Helpers such as `git-remote-https` inherit the pipes; once this elapses the
/// readers are detached and whatever was captured so far is returned.
const DRAIN_GRACE: Duration = Duration::from_secs(1);

/// Deadline and capture bound applied to one child process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessLimits {
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

impl Default for ProcessLimits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            output_limit_bytes: 1024 * 1024,
        }
    }
}

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.status.success()
    }

    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Run `cmd` to completion or until `limits.timeout` elapses.
///
/// The child runs in its own process group. On timeout the whole group is
/// killed, so helpers it spawned cannot outlive the deadline, and `timed_out`
/// is set; that is not an `Err`. stdin is fed and stdout/stderr are drained on
/// separate threads, so neither a full pipe nor a child that never reads its
/// input can stall the caller. Bytes beyond `limits.output_limit_bytes` are
/// discarded.
#[instrument(skip_all, fields(timeout_secs = limits.timeout.as_secs()))]
pub fn run_with_limits(
    mut cmd: Command,
    stdin: Option<&[u8]>,
    limits: ProcessLimits,
) -> Result<CommandOutput> {
    if stdin.is_some() {
        cmd.stdin(Stdio::piped());
    } else {
        cmd.stdin(Stdio::null());
    }
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    own_process_group(&mut cmd);

    debug!(program = ?cmd.get_program(), "spawning child process");
    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawn {}", cmd.get_program().to_string_lossy()))?;

    if let Some(input) = stdin {
        let mut child_stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("stdin was not piped"))?;
        let input = input.to_vec();
        // Dropping the pipe at the end of the thread closes it so the child sees EOF.
        thread::spawn(move || {
            if let Err(err) = child_stdin.write_all(&input) {
                debug!(err = %err, "child stopped reading stdin");
            }
        });
    }

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let limit = limits.output_limit_bytes;
    let stdout_drain = Drain::spawn(stdout, limit);
    let stderr_drain = Drain::spawn(stderr, limit);

    let mut timed_out = false;
    let status = match child.wait_timeout(limits.timeout).context("wait for command")? {
        Some(status) => status,
        None => {
            warn!(timeout_secs = limits.timeout.as_secs(), "command timed out, killing");
            timed_out = true;
            kill_process_group(&mut child).context("kill command")?;
            child.wait().context("wait command after kill")?
        }
    };

    let deadline = Instant::now() + DRAIN_GRACE;
    let stdout = stdout_drain.finish(deadline).context("join stdout")?;
    let stderr = stderr_drain.finish(deadline).context("join stderr")?;

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        timed_out,
    })
}

#[cfg(unix)]
fn own_process_group(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;
    cmd.process_group(0);
}

#[cfg(not(unix))]
fn own_process_group(_cmd: &mut Command) {}

/// Kill the child and every process in its group.
fn kill_process_group(child: &mut Child) -> Result<()> {
    #[cfg(unix)]
    {
        // The child leads its group, so the group id is its pid.
        let group = format!("-{}", child.id());
        let killed = Command::new("kill")
            .args(["-KILL", "--", &group])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        if !matches!(killed, Ok(status) if status.success()) {
            debug!(group = %group, "group kill failed, killing child only");
        }
    }
    child.kill()?;
    Ok(())
}

/// Output pipe drained on a background thread into a bounded buffer.
struct Drain {
    buf: Arc<Mutex<Vec<u8>>>,
    done: mpsc::Receiver<Result<()>>,
}

impl Drain {
    fn spawn<R: Read + Send + 'static>(reader: R, limit: usize) -> Self {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let (tx, done) = mpsc::channel();
        let shared = Arc::clone(&buf);
        thread::spawn(move || {
            // The receiver may have given up already.
            let _ = tx.send(read_limited(reader, limit, &shared));
        });
        Self { buf, done }
    }

    /// Wait for EOF until `deadline`, then return what was captured.
    fn finish(self, deadline: Instant) -> Result<Vec<u8>> {
        match self.done.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
            Ok(result) => result?,
            Err(RecvTimeoutError::Timeout) => {
                warn!("output pipe held open after child exit, detaching reader");
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(anyhow!("output reader thread panicked"));
            }
        }
        let mut buf = self
            .buf
            .lock()
            .map_err(|_| anyhow!("output buffer poisoned"))?;
        Ok(std::mem::take(&mut *buf))
    }
}

fn read_limited<R: Read>(mut reader: R, limit: usize, buf: &Mutex<Vec<u8>>) -> Result<()> {
    let mut dropped = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let mut buf = buf.lock().map_err(|_| anyhow!("output buffer poisoned"))?;
        let keep = n.min(limit.saturating_sub(buf.len()));
        buf.extend_from_slice(&chunk[..keep]);
        dropped += n - keep;
    }

    if dropped > 0 {
        warn!(dropped, "child output truncated");
    }
    Ok(())
}
