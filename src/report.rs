//! Cancellable background report generation.
//!
//! A [`ReportScene`] is a deep copy of the session state taken when the report starts, so
//! the worker never observes later edits. The worker renders every artifact into a
//! scoped staging directory and only makes the manifest visible by an atomic persist after
//! the last cancellation check. A cancelled or abandoned run leaves nothing behind.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use image::{ImageFormat, RgbaImage};
use log::{debug, info, warn};
use ndarray::Array3;
use parking_lot::Mutex;
use serde::Serialize;
use tempfile::{NamedTempFile, TempDir};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

use crate::analysis::LabelVolume;
use crate::enums::{LabelFilter, Orientation};
use crate::error::{EngineError, Result};
use crate::navigator::SliceIndex;
use crate::volume::VolumeGrid;

/// Read-only state a report is generated from.
#[derive(Debug, Clone)]
pub struct ReportScene {
    /// Display name of the scan, recorded in the manifest.
    pub source: String,
    pub grid: VolumeGrid,
    pub labels: Option<Array3<u16>>,
    pub slices: SliceIndex,
    pub volumes: Vec<LabelVolume>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactTarget {
    /// One plane at the given slice index.
    Slice {
        orientation: Orientation,
        index: usize,
    },
    /// Labels seen along one of the three principal axes, `angle` in `0..3`.
    Projection { angle: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArtifactRequest {
    pub target: ArtifactTarget,
    pub labels: LabelFilter,
    /// `(width, height)` in pixels.
    pub size: (u32, u32),
}

/// Produces the image artifacts a report embeds.
pub trait SnapshotRenderer: Send + Sync {
    fn render(&self, scene: &ReportScene, request: &ArtifactRequest) -> Result<RgbaImage>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportSizes {
    pub view: (u32, u32),
    pub overview: (u32, u32),
    pub label: (u32, u32),
}

impl Default for ReportSizes {
    fn default() -> Self {
        Self {
            view: (400, 400),
            overview: (200, 200),
            label: (150, 150),
        }
    }
}

/// Cooperative cancellation flag shared between the owner and the worker.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    canceled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }

    /// Fails with [`EngineError::Canceled`] once cancellation was requested.
    pub fn check(&self) -> Result<()> {
        if self.is_canceled() {
            Err(EngineError::Canceled)
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportEvent {
    Progress { percent: u8, message: String },
    Finished { success: bool, message: String },
}

/// Latest observable state of a report run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportStatus {
    pub percent: u8,
    pub message: String,
    /// `Some(success)` once the worker finished.
    pub finished: Option<bool>,
}

#[derive(Clone)]
struct ProgressSink {
    events: Option<UnboundedSender<ReportEvent>>,
    status: Arc<Mutex<ReportStatus>>,
}

impl ProgressSink {
    fn progress(&self, percent: u8, message: impl Into<String>) {
        let message = message.into();
        debug!("report {percent}%: {message}");
        {
            let mut status = self.status.lock();
            status.percent = percent;
            status.message.clone_from(&message);
        }
        self.send(ReportEvent::Progress { percent, message });
    }

    fn finish(&self, success: bool, message: String) {
        {
            let mut status = self.status.lock();
            status.finished = Some(success);
            status.message.clone_from(&message);
        }
        self.send(ReportEvent::Finished { success, message });
    }

    fn send(&self, event: ReportEvent) {
        // A dropped receiver only means nobody is listening any more.
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    View,
    Overview,
    Label,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtifactEntry {
    pub kind: ArtifactKind,
    /// Path relative to the manifest's directory.
    pub file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orientation: Option<Orientation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VolumeRow {
    pub label: u16,
    pub name: String,
    pub voxel_count: usize,
    pub volume_cm3: f64,
    pub volume_mm3: f64,
}

/// The JSON manifest written at the report destination.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportDocument {
    pub source: String,
    /// `[depth, height, width]`.
    pub dims: [usize; 3],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spacing_mm: Option<[f64; 3]>,
    pub slices: SliceIndex,
    pub volumes: Vec<VolumeRow>,
    pub artifacts: Vec<ArtifactEntry>,
}

/// Everything a worker needs; moved onto the worker thread.
pub struct ReportJob {
    pub scene: ReportScene,
    pub destination: PathBuf,
    pub sizes: ReportSizes,
}

/// Observer of a report run. Stays valid after the owning [`ReportHandle`] is taken or
/// dropped, so the run can still be cancelled and waited for.
#[derive(Debug, Clone)]
pub struct ReportMonitor {
    running: Arc<AtomicBool>,
    cancel: CancelToken,
    status: Arc<Mutex<ReportStatus>>,
}

impl ReportMonitor {
    /// True until the worker closure has returned or unwound.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn request_cancel(&self) {
        debug!("report cancellation requested");
        self.cancel.cancel();
    }

    pub fn status(&self) -> ReportStatus {
        self.status.lock().clone()
    }

    /// Requests cancellation and polls the worker for up to `timeout`. Returns `false` if it
    /// was still running when the time ran out.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        self.request_cancel();
        let stopped = tokio::time::timeout(timeout, async {
            while self.is_running() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .is_ok();
        if !stopped {
            warn!("report worker did not stop within {timeout:?}, abandoning it");
        }
        stopped
    }
}

/// Clears the running flag when the worker exits, including by panic.
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Owner side of a running report.
pub struct ReportHandle {
    task: JoinHandle<Result<PathBuf>>,
    monitor: ReportMonitor,
}

impl ReportHandle {
    /// Spawns the worker on the current tokio runtime's blocking pool.
    ///
    /// # Errors
    ///
    /// [`EngineError::NoRuntime`] when called outside a tokio runtime.
    pub fn start(
        job: ReportJob,
        renderer: Arc<dyn SnapshotRenderer>,
        events: Option<UnboundedSender<ReportEvent>>,
    ) -> Result<Self> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| EngineError::NoRuntime)?;
        let cancel = CancelToken::new();
        let status = Arc::new(Mutex::new(ReportStatus::default()));
        let sink = ProgressSink {
            events,
            status: Arc::clone(&status),
        };
        let worker_cancel = cancel.clone();
        let running = Arc::new(AtomicBool::new(true));
        let worker_running = Arc::clone(&running);
        info!("starting report for {}", job.destination.display());

        let task = runtime.spawn_blocking(move || {
            let _running = RunningGuard(worker_running);
            let result = run_report(&job, renderer.as_ref(), &worker_cancel, &sink);
            match &result {
                Ok(path) => {
                    info!("report written to {}", path.display());
                    sink.finish(true, format!("report written to {}", path.display()));
                }
                Err(EngineError::Canceled) => {
                    info!("report canceled");
                    sink.finish(false, EngineError::Canceled.to_string());
                }
                Err(e) => {
                    warn!("report failed: {e}");
                    sink.finish(false, e.to_string());
                }
            }
            result
        });

        Ok(Self {
            task,
            monitor: ReportMonitor {
                running,
                cancel,
                status,
            },
        })
    }

    pub fn request_cancel(&self) {
        self.monitor.request_cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.monitor.cancel.clone()
    }

    pub fn monitor(&self) -> ReportMonitor {
        self.monitor.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub fn status(&self) -> ReportStatus {
        self.monitor.status()
    }

    /// Waits for the worker and returns the manifest path.
    pub async fn join(self) -> Result<PathBuf> {
        self.task
            .await
            .map_err(|e| EngineError::Worker(e.to_string()))?
    }

    /// Requests cancellation and waits up to `timeout`. Returns `false` if the worker had to
    /// be abandoned; its staging files are removed whenever it eventually unwinds.
    pub async fn shutdown(mut self, timeout: Duration) -> bool {
        self.request_cancel();
        match tokio::time::timeout(timeout, &mut self.task).await {
            Ok(_) => true,
            Err(_) => {
                warn!("report worker did not stop within {timeout:?}, abandoning it");
                false
            }
        }
    }
}

/// Runs the whole pipeline on the calling thread.
pub fn run_report(
    job: &ReportJob,
    renderer: &dyn SnapshotRenderer,
    cancel: &CancelToken,
    sink: &impl ReportProgress,
) -> Result<PathBuf> {
    let scene = &job.scene;
    let destination = job.destination.as_path();
    sink.report(5, "preparing report");
    cancel.check()?;

    let parent = destination
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let stem = destination
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "report".to_string());
    let assets_name = format!("{stem}_assets");
    fs::create_dir_all(parent)?;
    let staging = tempfile::Builder::new()
        .prefix(".report-")
        .tempdir_in(parent)?;

    let mut artifacts = Vec::new();
    let mut emit = |request: ArtifactRequest,
                    file: String,
                    kind: ArtifactKind,
                    orientation: Option<Orientation>,
                    label: Option<u16>|
     -> Result<()> {
        cancel.check()?;
        let image = renderer.render(scene, &request)?;
        image.save_with_format(staging.path().join(&file), ImageFormat::Png)?;
        artifacts.push(ArtifactEntry {
            kind,
            file: format!("{assets_name}/{file}"),
            orientation,
            label,
        });
        Ok(())
    };

    for orientation in Orientation::ALL {
        let request = ArtifactRequest {
            target: ArtifactTarget::Slice {
                orientation,
                index: scene.slices.get(orientation),
            },
            labels: LabelFilter::All,
            size: job.sizes.view,
        };
        let file = format!("view_{}.png", orientation.name());
        emit(request, file, ArtifactKind::View, Some(orientation), None)?;
    }

    if scene.labels.is_some() {
        for angle in 0..3 {
            let request = ArtifactRequest {
                target: ArtifactTarget::Projection { angle },
                labels: LabelFilter::All,
                size: job.sizes.overview,
            };
            emit(request, format!("overview_{angle}.png"), ArtifactKind::Overview, None, None)?;
        }
    }
    sink.report(30, "rendered views and overview");

    if scene.labels.is_some() {
        let total = scene.volumes.len();
        for (k, volume) in scene.volumes.iter().enumerate() {
            for angle in 0..3 {
                let request = ArtifactRequest {
                    target: ArtifactTarget::Projection { angle },
                    labels: LabelFilter::Only(volume.label),
                    size: job.sizes.label,
                };
                let file = format!("label_{}_{angle}.png", volume.label);
                emit(request, file, ArtifactKind::Label, None, Some(volume.label))?;
            }
            let percent = 30 + 50 * (k + 1) / total;
            sink.report(percent as u8, &format!("rendered snapshots for {}", volume.name));
        }
    }

    cancel.check()?;
    sink.report(85, "assembling report");
    let document = ReportDocument {
        source: scene.source.clone(),
        dims: {
            let (d, h, w) = scene.grid.dim();
            [d, h, w]
        },
        spacing_mm: scene.grid.spacing().map(|s| s.as_array()),
        slices: scene.slices,
        volumes: scene
            .volumes
            .iter()
            .map(|v| VolumeRow {
                label: v.label,
                name: v.name.clone(),
                voxel_count: v.voxel_count,
                volume_cm3: v.volume_cm3,
                volume_mm3: v.volume_mm3(),
            })
            .collect(),
        artifacts,
    };
    let mut manifest = NamedTempFile::new_in(parent)?;
    serde_json::to_writer_pretty(manifest.as_file_mut(), &document)?;
    manifest.as_file_mut().sync_all()?;

    cancel.check()?;
    publish(staging, manifest, &parent.join(&assets_name), destination)?;
    sink.report(100, "report complete");
    Ok(destination.to_path_buf())
}

/// Moves the staged assets to `assets` and the manifest to `destination`. An existing
/// assets directory is set aside first and put back if either step fails, so a failed
/// publish leaves the previous report untouched.
fn publish(
    staging: TempDir,
    manifest: NamedTempFile,
    assets: &Path,
    destination: &Path,
) -> Result<()> {
    let backup = if assets.exists() {
        let parent = assets.parent().unwrap_or(Path::new("."));
        let holder = tempfile::Builder::new()
            .prefix(".assets-old-")
            .tempdir_in(parent)?;
        let moved = holder.path().join("assets");
        fs::rename(assets, &moved)?;
        Some((holder, moved))
    } else {
        None
    };
    let restore = |backup: &Option<(TempDir, PathBuf)>| {
        if let Some((_, moved)) = backup {
            if let Err(e) = fs::rename(moved, assets) {
                warn!("could not restore {}: {e}", assets.display());
            }
        }
    };

    if let Err(e) = fs::rename(staging.path(), assets) {
        restore(&backup);
        return Err(e.into());
    }
    if let Err(e) = manifest.persist(destination) {
        // The staged files now live at `assets`; clear them before putting the old ones back.
        if let Err(cleanup) = fs::remove_dir_all(assets) {
            warn!("could not remove {}: {cleanup}", assets.display());
        }
        restore(&backup);
        return Err(EngineError::Io(e.error));
    }
    Ok(())
}

/// Receiver of progress milestones.
pub trait ReportProgress {
    fn report(&self, percent: u8, message: &str);
}

impl ReportProgress for ProgressSink {
    fn report(&self, percent: u8, message: &str) {
        self.progress(percent, message);
    }
}

/// Ignores progress, for synchronous runs.
pub struct NoProgress;

impl ReportProgress for NoProgress {
    fn report(&self, _percent: u8, _message: &str) {}
}
