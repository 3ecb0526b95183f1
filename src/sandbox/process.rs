//! Host process execution shared by the sandbox implementations.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::debug;

use super::CommandOutput;
use crate::error::Result;

const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Spawn `command`, optionally feed `stdin`, and collect combined output.
///
/// Output is drained concurrently with the wait so a timed-out command still
/// reports what it printed before it was killed.
pub(crate) async fn run_with_timeout(
    mut command: Command,
    stdin: Option<&str>,
    timeout: Duration,
) -> Result<CommandOutput> {
    command
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn()?;

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
        // A child that exits early closes its stdin; the exit status reports it.
        if let Err(e) = pipe.write_all(input.as_bytes()).await {
            debug!(error = %e, "Child closed stdin early");
        }
        drop(pipe);
    }

    let waited = tokio::time::timeout(timeout, child.wait()).await;

    let status = match waited {
        Ok(status) => Some(status?),
        Err(_) => {
            debug!(timeout_secs = timeout.as_secs(), "Killing timed out process");
            let _ = child.kill().await;
            None
        }
    };

    // Grandchildren may hold the pipes open after a kill.
    let grace = status.is_none().then_some(DRAIN_GRACE);
    let mut output = collect(stdout, grace).await;
    let err_output = collect(stderr, grace).await;
    if !err_output.is_empty() {
        output.push_str(&err_output);
    }

    Ok(match status {
        Some(status) => CommandOutput {
            output,
            // Signal-terminated processes have no code.
            exit_code: status.code().unwrap_or(-1),
            timed_out: false,
        },
        None => CommandOutput::timed_out(&output, timeout),
    })
}

fn drain<R>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    pipe.map(|mut reader| {
        tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = reader.read_to_end(&mut buf).await;
            buf
        })
    })
}

async fn collect(handle: Option<JoinHandle<Vec<u8>>>, grace: Option<Duration>) -> String {
    let Some(handle) = handle else {
        return String::new();
    };
    let joined = match grace {
        Some(grace) => match tokio::time::timeout(grace, handle).await {
            Ok(joined) => joined,
            Err(_) => return String::new(),
        },
        None => handle.await,
    };
    joined
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}
