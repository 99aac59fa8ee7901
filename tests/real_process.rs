// tests/real_process.rs

//! End-to-end lifecycle against real `sh` child processes (unix only):
//! output capture, exit-status mapping, and stop via SIGTERM.

#![cfg(unix)]

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;

use scriptherd::Supervisor;
use scriptherd::config::Timing;
use scriptherd::entry::{EntryId, EntrySnapshot, ScriptStatus};
use scriptherd::fs::RealFileSystem;
use scriptherd::proc::RealProcessBackend;
use scriptherd::registry::Store;
use scriptherd::supervisor::SupervisorHandle;
use scriptherd_test_utils::builders::wait_until;
use scriptherd_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

fn write_script(dir: &TempDir, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.path().join(name);
    std::fs::write(&path, body).expect("write script");
    let mut perms = std::fs::metadata(&path).expect("stat script").permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).expect("chmod script");
    path
}

fn start_real(tmp: &TempDir) -> scriptherd::errors::Result<SupervisorHandle> {
    let store = Store::at_path(tmp.path().join("scripts.toml"));
    let (handle, _notifications) = Supervisor::spawn(
        store,
        Timing::fast(),
        RealProcessBackend::new(),
        Arc::new(RealFileSystem),
    )?;
    Ok(handle)
}

async fn wait_status(
    handle: &SupervisorHandle,
    id: EntryId,
    status: ScriptStatus,
) -> EntrySnapshot {
    let handle = handle.clone();
    wait_until(move || {
        let handle = handle.clone();
        async move {
            handle
                .entry(id)
                .await
                .expect("supervisor gone")
                .filter(|snapshot| snapshot.status == status)
        }
    })
    .await
}

#[tokio::test]
async fn script_output_is_captured_and_clean_exit_settles_idle() -> TestResult {
    init_tracing();

    let tmp = tempfile::tempdir()?;
    let script = write_script(&tmp, "hello.sh", "#!/bin/sh\necho hello\necho world\n");
    let handle = start_real(&tmp)?;

    let id = handle.add_script(&script).await?;
    handle.run(id).await?;

    let snapshot = wait_status(&handle, id, ScriptStatus::Idle).await;
    assert!(snapshot.output.iter().any(|l| l == "hello"), "{:?}", snapshot.output);
    assert!(snapshot.output.iter().any(|l| l == "world"), "{:?}", snapshot.output);
    assert_eq!(snapshot.pid, None);

    Ok(())
}

#[tokio::test]
async fn nonzero_exit_marks_error_with_status_line() -> TestResult {
    init_tracing();

    let tmp = tempfile::tempdir()?;
    let script = write_script(&tmp, "fail.sh", "#!/bin/sh\necho before failing\nexit 3\n");
    let handle = start_real(&tmp)?;

    let id = handle.add_script(&script).await?;
    handle.run(id).await?;

    let snapshot = wait_status(&handle, id, ScriptStatus::Error).await;
    assert!(
        snapshot.output.iter().any(|l| l == "Script exited with status 3"),
        "{:?}",
        snapshot.output
    );
    assert!(snapshot.output.iter().any(|l| l == "before failing"));

    Ok(())
}

#[tokio::test]
async fn stop_terminates_a_long_running_child() -> TestResult {
    init_tracing();

    let tmp = tempfile::tempdir()?;
    let script = write_script(&tmp, "forever.sh", "#!/bin/sh\nexec sleep 30\n");
    let handle = start_real(&tmp)?;

    let id = handle.add_script(&script).await?;
    handle.run(id).await?;
    let running = wait_status(&handle, id, ScriptStatus::Running).await;
    assert!(running.pid.is_some());

    with_timeout(handle.stop(id)).await?;

    let snapshot = handle.entry(id).await?.expect("entry exists");
    assert_eq!(snapshot.status, ScriptStatus::Idle, "stop maps to Idle, not Error");
    assert!(
        snapshot.output.iter().any(|l| l == "Process terminated by user"),
        "{:?}",
        snapshot.output
    );

    Ok(())
}

#[tokio::test]
async fn script_killed_by_a_signal_settles_idle() -> TestResult {
    init_tracing();

    let tmp = tempfile::tempdir()?;
    let script = write_script(&tmp, "selfkill.sh", "#!/bin/sh\nkill -9 $$\n");
    let handle = start_real(&tmp)?;

    let id = handle.add_script(&script).await?;
    handle.run(id).await?;

    let snapshot = wait_status(&handle, id, ScriptStatus::Idle).await;
    assert_eq!(snapshot.pid, None);

    Ok(())
}

#[tokio::test]
async fn decoding_handles_multibyte_crlf_and_missing_final_newline() -> TestResult {
    init_tracing();

    let tmp = tempfile::tempdir()?;
    let script = write_script(
        &tmp,
        "encodings.sh",
        "#!/bin/sh\nprintf 'caf\\303\\251\\n'\nprintf 'dos line\\r\\n'\nprintf 'tail without newline'\n",
    );
    let handle = start_real(&tmp)?;

    let id = handle.add_script(&script).await?;
    handle.run(id).await?;

    let snapshot = wait_status(&handle, id, ScriptStatus::Idle).await;
    assert!(snapshot.output.iter().any(|l| l == "café"), "{:?}", snapshot.output);
    assert!(snapshot.output.iter().any(|l| l == "dos line"), "{:?}", snapshot.output);
    assert!(
        snapshot.output.iter().any(|l| l == "tail without newline"),
        "{:?}",
        snapshot.output
    );

    Ok(())
}

#[tokio::test]
async fn stderr_is_merged_with_stdout() -> TestResult {
    init_tracing();

    let tmp = tempfile::tempdir()?;
    let script = write_script(
        &tmp,
        "mixed.sh",
        "#!/bin/sh\necho to stdout\necho to stderr 1>&2\n",
    );
    let handle = start_real(&tmp)?;

    let id = handle.add_script(&script).await?;
    handle.run(id).await?;

    let snapshot = wait_status(&handle, id, ScriptStatus::Idle).await;
    assert!(snapshot.output.iter().any(|l| l == "to stdout"), "{:?}", snapshot.output);
    assert!(snapshot.output.iter().any(|l| l == "to stderr"), "{:?}", snapshot.output);

    Ok(())
}
