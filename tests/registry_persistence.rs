// tests/registry_persistence.rs

//! Durable registry behavior: display ordering, record round-trips through
//! the TOML store, and startup with missing or corrupt store files.

use std::error::Error;

use scriptherd::buffer::OutputLimit;
use scriptherd::config::DEFAULT_OUTPUT_LIMIT;
use scriptherd::entry::ScriptStatus;
use scriptherd::registry::{ScriptRecord, Store, StoreFile};
use scriptherd_test_utils::builders::SupervisorBuilder;
use scriptherd_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test]
async fn entries_are_ordered_by_case_insensitive_filename() -> TestResult {
    init_tracing();

    let sup = SupervisorBuilder::new()
        .with_script("/s/zeta.sh", false)
        .with_script("/s/Alpha.sh", false)
        .with_script("/s/mid.sh", false)
        .start()?;

    let names: Vec<String> = sup
        .handle
        .entries()
        .await?
        .into_iter()
        .map(|e| e.name)
        .collect();
    assert_eq!(names, vec!["Alpha.sh", "mid.sh", "zeta.sh"]);

    Ok(())
}

#[tokio::test]
async fn added_script_keeps_sorted_position_and_persists() -> TestResult {
    init_tracing();

    let sup = SupervisorBuilder::new()
        .with_script("/s/bravo.sh", false)
        .with_script("/s/delta.sh", false)
        .start()?;

    sup.fs.add_file("/s/Charlie.sh");
    sup.handle.add_script("/s/Charlie.sh").await?;

    let names: Vec<String> = sup
        .handle
        .entries()
        .await?
        .into_iter()
        .map(|e| e.name)
        .collect();
    assert_eq!(names, vec!["bravo.sh", "Charlie.sh", "delta.sh"]);

    let persisted = sup.store.load()?;
    let paths: Vec<_> = persisted
        .scripts
        .iter()
        .map(|r| r.path.display().to_string())
        .collect();
    assert_eq!(paths, vec!["/s/bravo.sh", "/s/Charlie.sh", "/s/delta.sh"]);

    Ok(())
}

#[tokio::test]
async fn registry_survives_a_supervisor_restart() -> TestResult {
    init_tracing();

    let sup = SupervisorBuilder::new().with_script("/s/keep.sh", false).start()?;
    let id = sup.id_of("keep.sh").await;
    sup.handle.toggle_auto_start(id).await?;

    sup.fs.add_file("/s/new.sh");
    sup.handle.add_script("/s/new.sh").await?;
    with_timeout(sup.handle.shutdown()).await?;

    // Second supervisor over the same store file.
    let file = sup.store.load()?;
    assert_eq!(
        file.scripts,
        vec![
            ScriptRecord {
                path: "/s/keep.sh".into(),
                auto_start: true,
            },
            ScriptRecord {
                path: "/s/new.sh".into(),
                auto_start: false,
            },
        ]
    );

    Ok(())
}

#[tokio::test]
async fn removing_a_script_removes_its_record() -> TestResult {
    init_tracing();

    let sup = SupervisorBuilder::new()
        .with_script("/s/stay.sh", false)
        .with_script("/s/go.sh", false)
        .start()?;
    let id = sup.id_of("go.sh").await;

    sup.handle.remove_script(id).await?;
    sup.handle.entries().await?; // barrier: persist ran before this reply

    let persisted = sup.store.load()?;
    assert_eq!(persisted.scripts.len(), 1);
    assert_eq!(persisted.scripts[0].path.display().to_string(), "/s/stay.sh");

    Ok(())
}

#[tokio::test]
async fn output_limit_round_trips_through_the_store() -> TestResult {
    init_tracing();

    let sup = SupervisorBuilder::new().with_script("/s/x.sh", false).start()?;

    sup.handle.set_output_limit(OutputLimit::Unlimited).await?;
    sup.handle.entries().await?;
    assert_eq!(sup.store.load()?.output_buffer_limit, -1);

    sup.handle.set_output_limit(OutputLimit::Lines(42)).await?;
    sup.handle.entries().await?;
    assert_eq!(sup.store.load()?.output_buffer_limit, 42);

    sup.handle.set_output_limit(OutputLimit::Disabled).await?;
    sup.handle.entries().await?;
    assert_eq!(sup.store.load()?.output_buffer_limit, 0);

    Ok(())
}

#[test]
fn missing_store_file_loads_an_empty_registry() -> TestResult {
    init_tracing();

    let tmp = tempfile::tempdir()?;
    let store = Store::at_path(tmp.path().join("absent.toml"));

    let file = store.load()?;
    assert!(file.scripts.is_empty());
    assert_eq!(file.output_buffer_limit, DEFAULT_OUTPUT_LIMIT);

    Ok(())
}

#[test]
fn store_round_trip_preserves_records_and_sorts_on_load() -> TestResult {
    init_tracing();

    let tmp = tempfile::tempdir()?;
    let store = Store::at_path(tmp.path().join("nested/dir/scripts.toml"));

    let file = StoreFile {
        output_buffer_limit: 250,
        scripts: vec![
            ScriptRecord {
                path: "/s/b.sh".into(),
                auto_start: true,
            },
            ScriptRecord {
                path: "/s/A.sh".into(),
                auto_start: false,
            },
        ],
    };
    store.save(&file)?;

    let loaded = store.load()?;
    assert_eq!(loaded.output_buffer_limit, 250);
    let paths: Vec<_> = loaded
        .scripts
        .iter()
        .map(|r| r.path.display().to_string())
        .collect();
    assert_eq!(paths, vec!["/s/A.sh", "/s/b.sh"], "load sorts into display order");
    assert!(loaded.scripts[1].auto_start);

    Ok(())
}

#[tokio::test]
async fn corrupt_store_file_fails_startup() -> TestResult {
    init_tracing();

    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("scripts.toml");
    std::fs::write(&path, "output_buffer_limit = \"not a number\"")?;

    let result = scriptherd::Supervisor::spawn(
        Store::at_path(&path),
        scriptherd::config::Timing::fast(),
        scriptherd_test_utils::fake_backend::FakeProcessBackend::new(),
        std::sync::Arc::new(scriptherd::fs::mock::MockFileSystem::new()),
    );
    assert!(result.is_err(), "corrupt store must surface at startup");

    Ok(())
}

#[tokio::test]
async fn autostart_flag_is_loaded_and_honored() -> TestResult {
    init_tracing();

    let sup = SupervisorBuilder::new()
        .with_script("/s/boot.sh", true)
        .with_script("/s/manual.sh", false)
        .start()?;

    let boot = sup.id_of("boot.sh").await;
    sup.wait_for_status(boot, ScriptStatus::Running).await;

    let manual = sup.id_of("manual.sh").await;
    let snapshot = sup.handle.entry(manual).await?.expect("entry exists");
    assert_eq!(snapshot.status, ScriptStatus::Idle, "non-autostart stays idle");
    assert_eq!(sup.backend.spawn_count(), 1);

    Ok(())
}
