//! Integration scenarios for the exhaustion generators
//!
//! Drives both generators through realistic parameter sets and verifies
//! report cadence, recovery windows, degraded-mode behavior, cancellation,
//! and fatal payload handling end to end.

use oomgen::{
    HeapExhaustionGenerator, HeapRegionMonitor, MetadataExhaustionGenerator, OomgenError,
    RunExit,
};
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Cloneable sink so tests can inspect what a generator wrote
#[derive(Clone, Default)]
struct SharedSink(Arc<Mutex<Vec<u8>>>);

impl SharedSink {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }

    fn report_count(&self) -> usize {
        self.contents()
            .lines()
            .filter(|l| l.starts_with("===="))
            .count()
    }
}

impl Write for SharedSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Scenario: heap generator with the original tuning (10240/20480 bytes,
/// report every 2000 ticks, recover every 1000). After 2000 ticks exactly
/// one report has been written and the sweep windows line up precisely.
#[test]
fn heap_generator_original_tuning_cadence() {
    let sink = SharedSink::default();
    let mut generator = HeapExhaustionGenerator::new(
        10240,
        20480,
        2000,
        1000,
        sink.clone(),
        HeapRegionMonitor::new(),
        CancellationToken::new(),
    );

    for _ in 0..1500 {
        generator.tick().expect("tick failed");
    }

    // First sweep fired at tick 1000 over entries 1..=1000; nothing since
    assert_eq!(generator.wasters().len(), 1500);
    assert!(generator.wasters()[..1000]
        .iter()
        .all(|w| w.is_recovered()));
    assert!(generator.wasters()[1000..]
        .iter()
        .all(|w| !w.is_recovered()));
    assert_eq!(sink.report_count(), 0, "no report before tick 2000");

    for _ in 1500..2000 {
        generator.tick().expect("tick failed");
    }

    // Second sweep at tick 2000 covered entries 1001..=2000
    assert_eq!(generator.wasters().len(), 2000);
    assert!(generator.wasters().iter().all(|w| w.is_recovered()));
    assert_eq!(sink.report_count(), 1, "exactly one report after 2000 ticks");
}

/// Scenario: metadata generator with report period 100 and no monitor
/// handle. Generation proceeds, reporting stays disabled.
#[test]
fn metadata_generator_degraded_mode() {
    let payload = tempfile::NamedTempFile::new().expect("create payload");
    std::fs::write(payload.path(), b"fixed code unit definition").expect("write payload");

    let sink = SharedSink::default();
    let mut generator =
        MetadataExhaustionGenerator::new(100, sink.clone(), payload.path().to_path_buf(), None);

    for _ in 0..500 {
        generator.tick().expect("tick failed");
    }

    assert_eq!(generator.units().len(), 500);
    assert_eq!(sink.report_count(), 0, "reporting disabled without monitor");
}

/// Scenario: cancel the heap generator mid-pacing. The run resolves to
/// Cancelled promptly, writes exactly one notice, and appends nothing after
/// the signal.
#[tokio::test]
async fn heap_generator_cancellation_mid_pacing() {
    let cancel = CancellationToken::new();
    let sink = SharedSink::default();
    let mut generator = HeapExhaustionGenerator::new(
        64,
        64,
        0,
        0,
        sink.clone(),
        HeapRegionMonitor::new(),
        cancel.clone(),
    );

    let canceller = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            cancel.cancel();
        }
    });

    let exit = tokio::time::timeout(Duration::from_secs(5), generator.run())
        .await
        .expect("run did not return after cancellation");
    canceller.await.unwrap();

    assert!(exit.is_cancelled());
    let ticks_at_exit = generator.wasters().len();
    assert!(ticks_at_exit >= 1);

    let out = sink.contents();
    assert_eq!(
        out.matches("interrupted").count(),
        1,
        "exactly one informational notice"
    );
    assert!(out.ends_with("Stopping.\n"));

    // No further ticks once the run has resolved
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(generator.wasters().len(), ticks_at_exit);
}

/// Scenario: malformed (empty) payload. The first tick fails, the run
/// resolves to a fatal definition error, and the collection stays empty.
#[test]
fn metadata_generator_malformed_payload_is_fatal() {
    let payload = tempfile::NamedTempFile::new().expect("create payload");

    let sink = SharedSink::default();
    let mut generator =
        MetadataExhaustionGenerator::new(100, sink.clone(), payload.path().to_path_buf(), None);

    let exit = generator.run();

    match exit {
        RunExit::Fatal(OomgenError::PayloadMalformed(path)) => {
            assert_eq!(path, payload.path());
        }
        other => panic!("expected fatal payload error, got {other:?}"),
    }
    assert_eq!(generator.units().len(), 0, "failed unit is not retained");
}

/// Scenario: unreadable payload path is equally fatal.
#[test]
fn metadata_generator_unreadable_payload_is_fatal() {
    let sink = SharedSink::default();
    let mut generator = MetadataExhaustionGenerator::new(
        100,
        sink,
        std::path::PathBuf::from("/nonexistent/oomgen/unit.bin"),
        None,
    );

    let exit = generator.run();
    assert!(matches!(
        exit,
        RunExit::Fatal(OomgenError::PayloadRead { .. })
    ));
    assert!(generator.units().is_empty());
}
