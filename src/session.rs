//! The owner of one viewer's state.
//!
//! [`ViewerSession`] holds the scan, its mask, the navigator and the edit history as
//! separate components and is the only place that mutates them. The rendering layer talks
//! to it through pointer events and reads back slice positions and navigator events. At
//! most one report runs at a time and it works on a copy of the state.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{info, warn};
use tokio::sync::mpsc::UnboundedSender;

use crate::analysis::{LabelVolume, compute_volumes};
use crate::annotations::{Annotation, Annotations};
use crate::config::EngineConfig;
use crate::edits::EditOp;
use crate::enums::{Interpolation, Orientation, WindowPreset};
use crate::error::{EngineError, Result};
use crate::geometry::{Dims, PlanePoint, Voxel, WorldPoint};
use crate::history::EditHistory;
use crate::intensity::{IntensityStats, WindowLevel};
use crate::interaction::{Interaction, InteractionMapper, PointerEvent};
use crate::label_config::LabelNames;
use crate::label_mask::LabelMask;
use crate::navigator::{Navigator, NavigatorEvent, SliceIndex};
use crate::raster::SliceRasterizer;
use crate::report::{
    ReportEvent, ReportHandle, ReportJob, ReportMonitor, ReportScene, ReportStatus,
    SnapshotRenderer,
};
use crate::volume::VolumeGrid;

pub struct ViewerSession {
    config: EngineConfig,
    source: String,
    grid: Option<VolumeGrid>,
    mask: LabelMask,
    navigator: Option<Navigator>,
    history: EditHistory,
    names: LabelNames,
    annotations: Annotations,
    mappers: [InteractionMapper; 3],
    report: Option<ReportHandle>,
    /// Tracks the last started report even after its handle was taken.
    report_monitor: Option<ReportMonitor>,
}

impl Default for ViewerSession {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl ViewerSession {
    pub fn new(config: EngineConfig) -> Self {
        let threshold = config.seek_threshold_px;
        Self {
            history: EditHistory::new(config.history_capacity),
            mappers: Orientation::ALL.map(|o| InteractionMapper::new(o, threshold)),
            config,
            source: String::new(),
            grid: None,
            mask: LabelMask::new(),
            navigator: None,
            names: LabelNames::new(),
            annotations: Annotations::default(),
            report: None,
            report_monitor: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Replaces the scan. Mask, history and annotations are cleared and the navigator
    /// restarts at the grid midpoint.
    pub fn load_scan(&mut self, source: impl Into<String>, grid: VolumeGrid) {
        self.source = source.into();
        info!("loaded scan {} with dims {}", self.source, grid.dims());
        self.navigator = Some(Navigator::new(grid.geometry()));
        self.grid = Some(grid);
        self.mask.clear();
        self.history.clear();
        self.annotations.clear();
        for mapper in &mut self.mappers {
            mapper.reset();
        }
    }

    pub fn grid(&self) -> Option<&VolumeGrid> {
        self.grid.as_ref()
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Loads a label mask for the current scan. A rejected mask leaves the old one in place.
    pub fn load_mask(&mut self, raw: Vec<u16>, dims: Dims) -> Result<()> {
        let grid = self.grid.as_ref().ok_or(EngineError::MissingData("no volume loaded"))?;
        self.mask.load(raw, dims, grid.dims())
    }

    pub fn clear_mask(&mut self) {
        self.mask.clear();
    }

    pub fn mask(&self) -> &LabelMask {
        &self.mask
    }

    pub fn label_names(&self) -> &LabelNames {
        &self.names
    }

    pub fn label_names_mut(&mut self) -> &mut LabelNames {
        &mut self.names
    }

    /// Loads the label-name document at `path`; a missing file yields an empty mapping.
    pub fn load_label_names(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.names = LabelNames::load_or_default(path)?;
        Ok(())
    }

    pub fn history(&self) -> &EditHistory {
        &self.history
    }

    /// Applies a destructive voxel transform. The pre-edit voxels are pushed onto the
    /// history first. If the transform fails the voxels are restored and the history is
    /// left exactly as it was, including a snapshot evicted by the push.
    pub fn apply_edit(&mut self, op: &EditOp) -> Result<()> {
        let grid = self.grid.as_mut().ok_or(EngineError::MissingData("no volume loaded"))?;
        op.validate(grid.dims())?;
        let evicted = self.history.push(grid);
        match op.apply(grid.data()).and_then(|data| grid.replace_data(data)) {
            Ok(()) => {
                info!("applied {}", op.name());
                Ok(())
            }
            Err(e) => {
                if let Some(previous) = self.history.pop() {
                    grid.replace_data(previous)?;
                }
                if let Some(oldest) = evicted {
                    self.history.restore_oldest(oldest);
                }
                warn!("{} failed, volume restored: {e}", op.name());
                Err(e)
            }
        }
    }

    /// Restores the voxels from before the most recent edit.
    pub fn undo(&mut self) -> Result<()> {
        let grid = self.grid.as_mut().ok_or(EngineError::MissingData("no volume loaded"))?;
        let previous = self.history.pop().ok_or(EngineError::EmptyHistory)?;
        grid.replace_data(previous)?;
        info!("undo, {} snapshots left", self.history.len());
        Ok(())
    }

    pub fn compute_volumes(&self) -> Result<Vec<LabelVolume>> {
        compute_volumes(self.grid.as_ref(), &self.mask, &self.names)
    }

    pub fn window_level(&self, preset: WindowPreset) -> Result<WindowLevel> {
        let grid = self.grid.as_ref().ok_or(EngineError::MissingData("no volume loaded"))?;
        Ok(IntensityStats::from_data(grid.data()).window_level(preset))
    }

    pub fn navigator(&self) -> Option<&Navigator> {
        self.navigator.as_ref()
    }

    pub fn navigator_mut(&mut self) -> Option<&mut Navigator> {
        self.navigator.as_mut()
    }

    pub fn slices(&self) -> Option<SliceIndex> {
        self.navigator.as_ref().map(Navigator::slices)
    }

    /// Drains pending navigator notifications for the rendering layer.
    pub fn take_navigator_events(&mut self) -> Vec<NavigatorEvent> {
        self.navigator
            .as_mut()
            .map(Navigator::take_events)
            .unwrap_or_default()
    }

    /// Routes a pointer event from the view showing `orientation`.
    pub fn pointer(&mut self, orientation: Orientation, event: PointerEvent) -> Result<Interaction> {
        let navigator = self
            .navigator
            .as_mut()
            .ok_or(EngineError::MissingData("no volume loaded"))?;
        let mapper = &mut self.mappers[mapper_slot(orientation)];
        Ok(mapper.handle(event, navigator))
    }

    /// Adds an annotation at a world point. Points outside the volume are rejected.
    pub fn add_annotation(&mut self, world: &WorldPoint, note: impl Into<String>) -> Result<Voxel> {
        let grid = self.grid.as_ref().ok_or(EngineError::MissingData("no volume loaded"))?;
        let voxel = grid
            .geometry()
            .checked_voxel_from_world(world)
            .ok_or_else(|| {
                EngineError::InvalidParameter(format!("point {world} lies outside the volume"))
            })?;
        self.annotations.add(voxel, note);
        Ok(voxel)
    }

    pub fn annotations(&self) -> &Annotations {
        &self.annotations
    }

    pub fn annotations_on_slice(&self, orientation: Orientation) -> Vec<(PlanePoint, &Annotation)> {
        match self.slices() {
            Some(slices) => self.annotations.on_slice(orientation, slices),
            None => Vec::new(),
        }
    }

    /// The built-in renderer configured with this session's overlay opacity.
    pub fn default_renderer(&self) -> SliceRasterizer {
        SliceRasterizer {
            interpolation: Interpolation::Bilinear,
            window: None,
            mask_opacity: self.config.mask_opacity,
        }
    }

    /// Starts a report on a snapshot of the current state.
    ///
    /// # Errors
    ///
    /// [`EngineError::ExportInProgress`] while a previous report is still running, the
    /// volumetric errors when there is nothing to report, and [`EngineError::NoRuntime`]
    /// outside a tokio runtime.
    pub fn start_report(
        &mut self,
        destination: impl Into<PathBuf>,
        renderer: Arc<dyn SnapshotRenderer>,
        events: Option<UnboundedSender<ReportEvent>>,
    ) -> Result<()> {
        if self.is_report_running() {
            return Err(EngineError::ExportInProgress);
        }
        let volumes = self.compute_volumes()?;
        let grid = self.grid.as_ref().ok_or(EngineError::MissingData("no volume loaded"))?;
        let scene = ReportScene {
            source: self.source.clone(),
            grid: grid.clone(),
            labels: self.mask.labels().cloned(),
            slices: self.slices().unwrap_or_default(),
            volumes,
        };
        let job = ReportJob {
            scene,
            destination: destination.into(),
            sizes: self.config.report_sizes(),
        };
        let report = ReportHandle::start(job, renderer, events)?;
        self.report_monitor = Some(report.monitor());
        self.report = Some(report);
        Ok(())
    }

    pub fn report_status(&self) -> Option<ReportStatus> {
        self.report_monitor.as_ref().map(ReportMonitor::status)
    }

    /// True while the last started report's worker is alive, whether or not its handle
    /// has been taken.
    pub fn is_report_running(&self) -> bool {
        self.report_monitor
            .as_ref()
            .is_some_and(ReportMonitor::is_running)
    }

    /// Returns whether there was a report to cancel.
    pub fn cancel_report(&self) -> bool {
        match &self.report_monitor {
            Some(monitor) => {
                monitor.request_cancel();
                true
            }
            None => false,
        }
    }

    /// Releases ownership of the current report, e.g. to await its result. The session
    /// keeps watching the run, so no second report starts until this one has stopped.
    pub fn take_report(&mut self) -> Option<ReportHandle> {
        self.report.take()
    }

    /// Cancels a running report and waits for it up to the configured timeout. Returns
    /// `false` if the worker had to be abandoned.
    pub async fn shutdown(&mut self) -> bool {
        let report = self.report.take();
        let Some(monitor) = self.report_monitor.take() else {
            return true;
        };
        if !monitor.is_running() {
            return true;
        }
        let timeout = self.config.shutdown_timeout();
        match report {
            Some(report) => report.shutdown(timeout).await,
            None => monitor.shutdown(timeout).await,
        }
    }
}

fn mapper_slot(orientation: Orientation) -> usize {
    match orientation {
        Orientation::Axial => 0,
        Orientation::Coronal => 1,
        Orientation::Sagittal => 2,
    }
}
