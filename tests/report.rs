mod common;

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::mpsc;
use std::time::Duration;

use common::init_logger;
use common::synthetic_volume::session_with_mask;
use image::{Rgba, RgbaImage};
use mpr_volume::{
    ArtifactRequest, EngineConfig, EngineError, ReportEvent, ReportScene, SnapshotRenderer,
};
use parking_lot::Mutex;
use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};

/// Blocks inside its first render until the test releases it.
struct GateRenderer {
    entered: Mutex<Option<mpsc::Sender<()>>>,
    release: Mutex<mpsc::Receiver<()>>,
}

impl GateRenderer {
    fn new() -> (Self, mpsc::Receiver<()>, mpsc::Sender<()>) {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let renderer = Self {
            entered: Mutex::new(Some(entered_tx)),
            release: Mutex::new(release_rx),
        };
        (renderer, entered_rx, release_tx)
    }
}

impl SnapshotRenderer for GateRenderer {
    fn render(
        &self,
        _scene: &ReportScene,
        request: &ArtifactRequest,
    ) -> mpr_volume::Result<RgbaImage> {
        let entered = self.entered.lock().take();
        if let Some(entered) = entered {
            let _ = entered.send(());
            let _ = self.release.lock().recv_timeout(Duration::from_secs(5));
        }
        Ok(RgbaImage::from_pixel(
            request.size.0,
            request.size.1,
            Rgba([0, 0, 0, 255]),
        ))
    }
}

fn small_config() -> EngineConfig {
    EngineConfig {
        view_snapshot_size: (32, 32),
        overview_snapshot_size: (16, 16),
        label_snapshot_size: (8, 8),
        shutdown_timeout_ms: 50,
        ..EngineConfig::default()
    }
}

fn drain(events: &mut UnboundedReceiver<ReportEvent>) -> Vec<ReportEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

async fn wait_for_entry(entered: mpsc::Receiver<()>) {
    tokio::task::spawn_blocking(move || entered.recv_timeout(Duration::from_secs(5)))
        .await
        .expect("join")
        .expect("renderer entered");
}

fn entry_count(dir: &Path) -> usize {
    fs::read_dir(dir).expect("read_dir").count()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn completed_report_writes_manifest_and_snapshots() {
    init_logger();
    let dir = tempfile::tempdir().expect("tempdir");
    let destination = dir.path().join("study.json");
    let mut session = session_with_mask(small_config());
    session.label_names_mut().insert(1, "Hippocampus");
    let renderer = Arc::new(session.default_renderer());
    let (tx, mut rx) = unbounded_channel();

    session
        .start_report(destination.clone(), renderer, Some(tx))
        .expect("start");
    let report = session.take_report().expect("handle");
    let written = report.join().await.expect("report");
    assert_eq!(written, destination);

    let events = drain(&mut rx);
    let percents: Vec<u8> = events
        .iter()
        .filter_map(|e| match e {
            ReportEvent::Progress { percent, .. } => Some(*percent),
            ReportEvent::Finished { .. } => None,
        })
        .collect();
    assert_eq!(percents, vec![5, 30, 55, 80, 85, 100]);
    assert!(matches!(
        events.last(),
        Some(ReportEvent::Finished { success: true, .. })
    ));

    let manifest: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&destination).expect("manifest")).expect("json");
    assert_eq!(manifest["source"], "synthetic");
    assert_eq!(manifest["volumes"][0]["name"], "Hippocampus");
    assert_eq!(manifest["volumes"][0]["voxel_count"], 64);
    assert_eq!(manifest["volumes"][1]["name"], "Label_2 (UNMAPPED)");
    // 3 views, 3 overviews, 3 per label for two labels
    assert_eq!(manifest["artifacts"].as_array().map(Vec::len), Some(12));

    let view = image::open(dir.path().join("study_assets/view_coronal.png")).expect("png");
    assert_eq!((view.width(), view.height()), (32, 32));
    assert_eq!(entry_count(dir.path()), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancel_mid_report_leaves_no_file() {
    init_logger();
    let dir = tempfile::tempdir().expect("tempdir");
    let destination = dir.path().join("report.json");
    let mut session = session_with_mask(small_config());
    let (renderer, entered, release) = GateRenderer::new();
    let (tx, mut rx) = unbounded_channel();

    session
        .start_report(destination.clone(), Arc::new(renderer), Some(tx))
        .expect("start");
    wait_for_entry(entered).await;
    assert!(session.is_report_running());

    assert!(session.cancel_report());
    release.send(()).expect("release");
    let report = session.take_report().expect("handle");
    assert!(matches!(report.join().await, Err(EngineError::Canceled)));

    let events = drain(&mut rx);
    assert_eq!(
        events.last(),
        Some(&ReportEvent::Finished {
            success: false,
            message: "canceled by user".to_string()
        })
    );
    assert!(!destination.exists());
    assert_eq!(entry_count(dir.path()), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn second_report_is_rejected_while_first_runs() {
    init_logger();
    let dir = tempfile::tempdir().expect("tempdir");
    let mut session = session_with_mask(small_config());
    let (renderer, entered, release) = GateRenderer::new();

    session
        .start_report(dir.path().join("first.json"), Arc::new(renderer), None)
        .expect("start");
    wait_for_entry(entered).await;

    let fallback = Arc::new(session.default_renderer());
    let second = session.start_report(dir.path().join("second.json"), fallback.clone(), None);
    assert!(matches!(second, Err(EngineError::ExportInProgress)));
    assert_eq!(
        EngineError::ExportInProgress.to_string(),
        "previous export still running"
    );

    release.send(()).expect("release");
    while session.is_report_running() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(
        session.report_status().and_then(|s| s.finished),
        Some(true)
    );
    session
        .start_report(dir.path().join("second.json"), fallback, None)
        .expect("finished report can be replaced");
    let report = session.take_report().expect("handle");
    report.join().await.expect("second report");
    assert!(dir.path().join("first.json").is_file());
    assert!(dir.path().join("second.json").is_file());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn taken_report_still_blocks_a_second_one() {
    init_logger();
    let dir = tempfile::tempdir().expect("tempdir");
    let mut session = session_with_mask(small_config());
    let (renderer, entered, release) = GateRenderer::new();

    session
        .start_report(dir.path().join("first.json"), Arc::new(renderer), None)
        .expect("start");
    wait_for_entry(entered).await;
    let first = session.take_report().expect("handle");
    assert!(session.is_report_running());

    let fallback = Arc::new(session.default_renderer());
    let second = session.start_report(dir.path().join("second.json"), fallback.clone(), None);
    assert!(matches!(second, Err(EngineError::ExportInProgress)));

    release.send(()).expect("release");
    first.join().await.expect("first report");
    assert!(!session.is_report_running());
    session
        .start_report(dir.path().join("second.json"), fallback, None)
        .expect("start after the first stopped");
    let report = session.take_report().expect("handle");
    report.join().await.expect("second report");
    assert!(dir.path().join("second.json").is_file());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_cancels_a_report_whose_handle_was_taken() {
    init_logger();
    let dir = tempfile::tempdir().expect("tempdir");
    let destination = dir.path().join("taken.json");
    let mut session = session_with_mask(EngineConfig {
        shutdown_timeout_ms: 2_000,
        ..small_config()
    });
    let (renderer, entered, release) = GateRenderer::new();

    session
        .start_report(destination.clone(), Arc::new(renderer), None)
        .expect("start");
    wait_for_entry(entered).await;
    let report = session.take_report().expect("handle");
    // let go of the renderer only after shutdown has requested cancellation
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        let _ = release.send(());
    });

    assert!(session.shutdown().await);
    assert!(!session.is_report_running());
    assert!(matches!(report.join().await, Err(EngineError::Canceled)));
    assert!(!destination.exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_abandons_a_stuck_worker_which_cleans_up_later() {
    init_logger();
    let dir = tempfile::tempdir().expect("tempdir");
    let destination = dir.path().join("stuck.json");
    let mut session = session_with_mask(small_config());
    let (renderer, entered, release) = GateRenderer::new();

    session
        .start_report(destination.clone(), Arc::new(renderer), None)
        .expect("start");
    wait_for_entry(entered).await;

    assert!(!session.shutdown().await);
    assert!(!session.is_report_running());

    release.send(()).expect("release");
    for _ in 0..200 {
        if entry_count(dir.path()) == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(entry_count(dir.path()), 0);
    assert!(!destination.exists());
}

#[tokio::test]
async fn shutdown_without_report_is_immediate() {
    let mut session = session_with_mask(EngineConfig::default());
    assert!(session.shutdown().await);
}
