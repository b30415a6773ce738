//! Engine run lifecycle integration tests.
//!
//! These tests drive complete runs through the engine with mocked host
//! and transport seams: admission under a concurrency cap, pause/resume,
//! stop, failure paths and run completion.

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use atelier_core::{
    spawn_engine,
    testing::{fixtures, MockArtifactStore, MockWorkerHost},
    ArtifactStore, DownloadState, EngineConfig, EngineError, EngineHandle, OptionsStore,
    ProgressEvent, PromptOptions, StartRequest, TransportEvents, WorkerId,
};

/// Test helper wiring an engine to mock collaborators.
struct TestHarness {
    handle: EngineHandle,
    host: Arc<MockWorkerHost>,
    options_store: OptionsStore,
    _temp_dir: TempDir,
}

impl TestHarness {
    fn new(config: EngineConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let options_store = OptionsStore::new(temp_dir.path().join("options.toml"));
        let host = Arc::new(MockWorkerHost::new());
        let store = Arc::new(MockArtifactStore::new());
        let handle = spawn_engine(config, options_store.clone(), host.clone(), |_| {
            store as Arc<dyn ArtifactStore>
        });
        Self {
            handle,
            host,
            options_store,
            _temp_dir: temp_dir,
        }
    }

    /// Poll until `count` prompts were delivered, returning them.
    async fn wait_for_prompts(&self, count: usize) -> Vec<(WorkerId, usize, String)> {
        wait_until(|| self.host.delivered_run_prompts().len() >= count).await;
        self.host.delivered_run_prompts()
    }

    /// Drive one in-flight item to `done` through the transport callbacks.
    async fn finish_item(&self, worker: WorkerId, index: usize, artifact_id: &str) {
        self.handle.submitted(worker, index);
        self.handle.artifact_created(artifact_id, worker).await;
        self.handle
            .state_changed(artifact_id, DownloadState::Complete)
            .await;
    }
}

async fn wait_until(mut check: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached within 5s");
}

async fn wait_for_event(
    rx: &mut tokio::sync::broadcast::Receiver<ProgressEvent>,
    mut matches: impl FnMut(&ProgressEvent) -> bool,
) -> ProgressEvent {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("no matching progress event within 5s")
            .expect("progress stream closed");
        if matches(&event) {
            return event;
        }
    }
}

#[tokio::test]
async fn test_single_item_full_lifecycle() {
    let harness = TestHarness::new(fixtures::fast_config());
    let mut events = harness.handle.subscribe();

    harness
        .handle
        .start(fixtures::start_request(1))
        .await
        .unwrap();
    wait_for_event(&mut events, |e| matches!(e, ProgressEvent::Started { total: 1 })).await;

    let prompts = harness.wait_for_prompts(1).await;
    let (worker, index, payload) = prompts[0].clone();
    assert_eq!(index, 0);
    assert!(payload.contains("[SCENE] scene 1"));
    assert!(payload.contains("[OUTPUT]"));

    harness.handle.submitted(worker, index);
    harness.handle.artifact_created("art-1", worker).await;

    let decision = harness
        .handle
        .determine_final_name("art-1", "blob.png", None)
        .await;
    assert_eq!(
        decision,
        atelier_core::NameDecision::Override {
            name: "assets/images/01.png".to_string()
        }
    );

    harness
        .handle
        .state_changed("art-1", DownloadState::Complete)
        .await;

    let event =
        wait_for_event(&mut events, |e| matches!(e, ProgressEvent::Completed { .. })).await;
    assert_eq!(event, ProgressEvent::Completed { done: 1, total: 1 });

    let snapshot = harness.handle.snapshot().await.unwrap();
    assert!(!snapshot.running);
    assert_eq!(snapshot.done, 1);
    assert_eq!(snapshot.total, 1);
    assert!(snapshot
        .recent
        .iter()
        .any(|entry| entry.message.contains("#01 done")));
}

#[tokio::test]
async fn test_capped_admission_backfills_on_completion() {
    let harness = TestHarness::new(fixtures::fast_config());
    harness
        .handle
        .start(fixtures::capped_request(3, 1))
        .await
        .unwrap();

    let prompts = harness.wait_for_prompts(1).await;
    assert_eq!(prompts[0].1, 0);

    // the single slot is occupied; nothing else is admitted
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(harness.host.delivered_run_prompts().len(), 1);

    harness.finish_item(prompts[0].0, 0, "art-1").await;
    let prompts = harness.wait_for_prompts(2).await;
    assert_eq!(prompts[1].1, 1);

    harness.finish_item(prompts[1].0, 1, "art-2").await;
    let prompts = harness.wait_for_prompts(3).await;
    assert_eq!(prompts[2].1, 2);
}

#[tokio::test]
async fn test_uncapped_mode_admits_everything() {
    let harness = TestHarness::new(fixtures::fast_config());
    let request = StartRequest {
        mode: atelier_core::ConcurrencyMode::All,
        cap: 1,
        ..fixtures::start_request(4)
    };
    harness.handle.start(request).await.unwrap();
    harness.wait_for_prompts(4).await;
}

#[tokio::test]
async fn test_pause_blocks_admission_until_resume() {
    let harness = TestHarness::new(fixtures::fast_config());
    harness
        .handle
        .start(fixtures::capped_request(2, 1))
        .await
        .unwrap();

    let prompts = harness.wait_for_prompts(1).await;
    harness.handle.pause().await.unwrap();

    // completing the in-flight item frees the slot, but admission is gated
    harness.finish_item(prompts[0].0, 0, "art-1").await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(harness.host.delivered_run_prompts().len(), 1);

    let snapshot = harness.handle.snapshot().await.unwrap();
    assert!(snapshot.paused);
    assert_eq!(snapshot.done, 1);

    harness.handle.resume().await.unwrap();
    let prompts = harness.wait_for_prompts(2).await;
    assert_eq!(prompts[1].1, 1);
}

#[tokio::test]
async fn test_login_required_pauses_run() {
    let harness = TestHarness::new(fixtures::fast_config());
    let mut events = harness.handle.subscribe();
    harness
        .handle
        .start(fixtures::start_request(1))
        .await
        .unwrap();
    harness.wait_for_prompts(1).await;

    harness.handle.login_required(0);
    wait_for_event(&mut events, |e| matches!(e, ProgressEvent::Paused)).await;

    let snapshot = harness.handle.snapshot().await.unwrap();
    assert!(snapshot.paused);
    assert!(!snapshot.running);

    harness.handle.resume().await.unwrap();
    let snapshot = harness.handle.snapshot().await.unwrap();
    assert!(snapshot.running);
}

#[tokio::test]
async fn test_stop_tears_down_and_reports_reason() {
    let harness = TestHarness::new(fixtures::fast_config());
    let mut events = harness.handle.subscribe();
    harness
        .handle
        .start(fixtures::capped_request(3, 3))
        .await
        .unwrap();
    harness.wait_for_prompts(3).await;

    harness.handle.stop("operator request").await.unwrap();
    let event = wait_for_event(&mut events, |e| matches!(e, ProgressEvent::Stopped { .. })).await;
    assert_eq!(
        event,
        ProgressEvent::Stopped {
            reason: "operator request".to_string()
        }
    );

    wait_until(|| harness.host.open_count() == 0).await;
    let snapshot = harness.handle.snapshot().await.unwrap();
    assert!(!snapshot.running);
    assert_eq!(snapshot.total, 0);
    assert!(snapshot
        .recent
        .iter()
        .any(|entry| entry.message.contains("Run stopped: operator request")));

    // stopping again is an error; the run is gone
    assert!(matches!(
        harness.handle.stop("again").await,
        Err(EngineError::NotRunning)
    ));
}

#[tokio::test]
async fn test_assign_timeout_fails_stuck_item() {
    let mut config = fixtures::fast_config();
    config.assign_timeout_secs = 1;
    let harness = TestHarness::new(config);
    harness.host.hold_opens();

    let mut events = harness.handle.subscribe();
    harness
        .handle
        .start(fixtures::start_request(1))
        .await
        .unwrap();

    let event =
        wait_for_event(&mut events, |e| matches!(e, ProgressEvent::Completed { .. })).await;
    assert_eq!(event, ProgressEvent::Completed { done: 0, total: 1 });

    let snapshot = harness.handle.snapshot().await.unwrap();
    assert!(snapshot
        .recent
        .iter()
        .any(|entry| entry.message.contains("#01 error: Context load timeout")));
}

#[tokio::test]
async fn test_injection_failure_fails_item_and_continues() {
    let harness = TestHarness::new(fixtures::fast_config());
    harness.host.fail_next_injection("driver rejected");
    harness
        .handle
        .start(fixtures::capped_request(2, 1))
        .await
        .unwrap();

    // item 0 dies on injection, item 1 takes the freed slot
    let prompts = harness.wait_for_prompts(1).await;
    assert_eq!(prompts[0].1, 1);

    let mut events = harness.handle.subscribe();
    harness.finish_item(prompts[0].0, 1, "art-1").await;
    let event =
        wait_for_event(&mut events, |e| matches!(e, ProgressEvent::Completed { .. })).await;
    assert_eq!(event, ProgressEvent::Completed { done: 1, total: 2 });

    let snapshot = harness.handle.snapshot().await.unwrap();
    assert!(snapshot
        .recent
        .iter()
        .any(|entry| entry.message.contains("#01 error: Driver injection failed")));
}

#[tokio::test]
async fn test_context_closed_fails_nonterminal_item() {
    let harness = TestHarness::new(fixtures::fast_config());
    let mut events = harness.handle.subscribe();
    harness
        .handle
        .start(fixtures::start_request(1))
        .await
        .unwrap();
    let prompts = harness.wait_for_prompts(1).await;

    harness.handle.context_closed(prompts[0].0);
    let event =
        wait_for_event(&mut events, |e| matches!(e, ProgressEvent::Completed { .. })).await;
    assert_eq!(event, ProgressEvent::Completed { done: 0, total: 1 });

    let snapshot = harness.handle.snapshot().await.unwrap();
    assert!(snapshot
        .recent
        .iter()
        .any(|entry| entry.message.contains("#01 error: Context closed")));
}

#[tokio::test]
async fn test_saved_options_shape_delivered_payloads() {
    let harness = TestHarness::new(fixtures::fast_config());
    harness
        .options_store
        .save(&PromptOptions {
            global_id: "[PROJECT] harbor-book".to_string(),
            style_module: "[STYLE] gouache".to_string(),
            output_suffix: "[OUTPUT] png".to_string(),
        })
        .unwrap();

    harness
        .handle
        .start(fixtures::start_request(1))
        .await
        .unwrap();
    let prompts = harness.wait_for_prompts(1).await;
    assert_eq!(
        prompts[0].2,
        "[PROJECT] harbor-book [STYLE] gouache [SCENE] scene 1 [OUTPUT] png"
    );
}

#[tokio::test]
async fn test_rotator_focuses_live_workers() {
    let harness = TestHarness::new(fixtures::fast_config());
    harness
        .handle
        .start(fixtures::capped_request(2, 2))
        .await
        .unwrap();
    harness.wait_for_prompts(2).await;

    // with a 20ms tick both workers come to the foreground quickly
    wait_until(|| {
        let focused = harness.host.focused();
        let mut workers: Vec<_> = focused.clone();
        workers.sort_unstable();
        workers.dedup();
        workers.len() == 2
    })
    .await;
}
