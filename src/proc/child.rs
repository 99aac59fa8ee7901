// src/proc/child.rs

//! Per-child IO plumbing: output line readers and the exit watcher.

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Child;
use tokio::sync::oneshot;
use tracing::{debug, error, warn};

use crate::entry::{EntryId, ExitKind};
use crate::supervisor::{EventSender, SupervisorEvent};

/// Read chunk size for the output pipes.
const READ_BUF_SIZE: usize = 8192;

/// Attach line readers to the child's stdout and stderr pipes.
///
/// Each reader drains its pipe to EOF in its own task, sending one `Output`
/// batch per read. The two streams merge at line granularity in the
/// supervisor inbox.
pub(crate) fn spawn_output_readers(
    child: &mut Child,
    id: EntryId,
    generation: u64,
    events: &EventSender,
) {
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(read_lines(stdout, id, generation, events.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(read_lines(stderr, id, generation, events.clone()));
    }
}

/// Watch one child instance until it exits or a terminate request arrives.
///
/// A terminate request sends the child a termination signal and then waits
/// for the real exit, so the `Exited` event always reflects how the process
/// actually ended. If the terminate channel is instead dropped, the run was
/// abandoned: return without reporting anything and let `kill_on_drop`
/// dispose of the child.
pub(crate) async fn supervise_child(
    child: Child,
    id: EntryId,
    generation: u64,
    events: EventSender,
    terminate_rx: oneshot::Receiver<()>,
) {
    if let Err(err) = supervise_inner(child, id, generation, &events, terminate_rx).await {
        error!(id = %id, generation, error = %err, "child watcher error");
        let _ = events
            .send(SupervisorEvent::Exited {
                id,
                generation,
                exit: ExitKind::Code(-1),
            })
            .await;
    }
}

async fn supervise_inner(
    mut child: Child,
    id: EntryId,
    generation: u64,
    events: &EventSender,
    mut terminate_rx: oneshot::Receiver<()>,
) -> Result<()> {
    tokio::select! {
        status = child.wait() => {
            let status = status.context("waiting for child process")?;
            let exit = classify_exit(status);
            debug!(id = %id, generation, ?exit, "child exited");
            let _ = events
                .send(SupervisorEvent::Exited { id, generation, exit })
                .await;
        }

        request = &mut terminate_rx => {
            match request {
                Ok(()) => {
                    debug!(id = %id, generation, "terminate requested; signalling child");
                    send_terminate(&mut child);
                    let status = child.wait().await.context("waiting for terminated child")?;
                    let exit = classify_exit(status);
                    debug!(id = %id, generation, ?exit, "child exited after terminate");
                    let _ = events
                        .send(SupervisorEvent::Exited { id, generation, exit })
                        .await;
                }
                Err(_) => {
                    // Slot dropped: the run was abandoned (reset then
                    // respawn, or backend teardown). No exit event; the
                    // child dies with this task via kill_on_drop.
                    debug!(id = %id, generation, "child slot dropped; abandoning instance");
                }
            }
        }
    }

    Ok(())
}

/// Map an exit status onto the supervisor's exit classification.
fn classify_exit(status: std::process::ExitStatus) -> ExitKind {
    if status.success() {
        return ExitKind::Clean;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if status.signal().is_some() {
            return ExitKind::Signaled;
        }
    }

    ExitKind::Code(status.code().unwrap_or(-1))
}

/// Send the child a termination signal: SIGTERM where available, so scripts
/// get a chance to clean up, with tokio's kill as the fallback.
fn send_terminate(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
        if rc != 0 {
            warn!(
                pid,
                error = %std::io::Error::last_os_error(),
                "failed to signal child"
            );
        }
        return;
    }

    if let Err(err) = child.start_kill() {
        warn!(error = %err, "failed to kill child");
    }
}

/// Drain one output pipe to EOF, batching complete lines per read.
///
/// Bytes after the last newline of a read are carried over to the next one,
/// so decoding only ever sees whole lines and a multibyte character split
/// across reads cannot be mangled. EOF flushes whatever remains.
async fn read_lines<R>(mut stream: R, id: EntryId, generation: u64, events: EventSender)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut carry: Vec<u8> = Vec::new();
    let mut buf = [0u8; READ_BUF_SIZE];

    loop {
        match stream.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                carry.extend_from_slice(&buf[..n]);
                let lines = drain_complete_lines(&mut carry);
                if !lines.is_empty()
                    && events
                        .send(SupervisorEvent::Output {
                            id,
                            generation,
                            lines,
                        })
                        .await
                        .is_err()
                {
                    return;
                }
            }
            Err(err) => {
                debug!(id = %id, generation, error = %err, "output pipe read failed");
                break;
            }
        }
    }

    // A final line without a trailing newline still counts.
    if !carry.is_empty() {
        let tail = decode_line(&carry);
        if !tail.is_empty() {
            let _ = events
                .send(SupervisorEvent::Output {
                    id,
                    generation,
                    lines: vec![tail],
                })
                .await;
        }
    }
}

/// Split off every complete line in the carry buffer, leaving the
/// unterminated tail in place.
fn drain_complete_lines(carry: &mut Vec<u8>) -> Vec<String> {
    let Some(last_newline) = carry.iter().rposition(|b| *b == b'\n') else {
        return Vec::new();
    };

    let tail = carry.split_off(last_newline + 1);
    let complete = std::mem::replace(carry, tail);

    complete
        .split(|b| *b == b'\n')
        .map(decode_line)
        .filter(|line| !line.is_empty())
        .collect()
}

/// Decode one line's bytes, tolerating invalid UTF-8 and CRLF endings.
fn decode_line(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches('\r')
        .to_string()
}
