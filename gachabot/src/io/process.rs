//! Child processes for the command notification sink.

use std::io::{Read, Write};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};
use wait_timeout::ChildExt;

/// Outcome of a finished (or killed) child.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    /// Captured stderr, at most the configured limit.
    pub stderr: Vec<u8>,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim().to_string()
    }
}

/// Spawn `cmd`, feed it `stdin`, and wait at most `timeout`.
///
/// Stdout is discarded; stderr is drained on a helper thread so a chatty
/// child cannot block on a full pipe.
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs()))]
pub fn run_with_input(
    mut cmd: Command,
    stdin: &[u8],
    timeout: Duration,
    stderr_limit_bytes: usize,
) -> Result<CommandOutput> {
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());

    let mut child = cmd.spawn().context("spawn command")?;
    {
        let mut child_stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("stdin was not piped"))?;
        if let Err(err) = child_stdin.write_all(stdin) {
            // A child that exits without reading stdin is not our failure.
            warn!(err = %err, "child closed stdin early");
        }
    }

    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;
    let stderr_handle = thread::spawn(move || read_limited(stderr, stderr_limit_bytes));

    let mut timed_out = false;
    let status = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => status,
        None => {
            warn!(timeout_secs = timeout.as_secs(), "command timed out, killing");
            timed_out = true;
            child.kill().context("kill command")?;
            child.wait().context("wait command after kill")?
        }
    };

    let stderr = match stderr_handle.join() {
        Ok(result) => result.context("read stderr")?,
        Err(_) => return Err(anyhow!("stderr reader thread panicked")),
    };

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stderr,
        timed_out,
    })
}

fn read_limited<R: Read>(mut reader: R, limit: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let keep = n.min(limit.saturating_sub(buf.len()));
        buf.extend_from_slice(&chunk[..keep]);
    }
    Ok(buf)
}
