use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::history::DEFAULT_CAPACITY;
use crate::report::ReportSizes;

/// Session tunables. Absent fields in a config file take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub history_capacity: usize,
    /// Pointer travel, in display pixels, above which a press becomes a pan.
    pub seek_threshold_px: f64,
    pub shutdown_timeout_ms: u64,
    pub view_snapshot_size: (u32, u32),
    pub overview_snapshot_size: (u32, u32),
    pub label_snapshot_size: (u32, u32),
    pub mask_opacity: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_CAPACITY,
            seek_threshold_px: 5.0,
            shutdown_timeout_ms: 10_000,
            view_snapshot_size: (400, 400),
            overview_snapshot_size: (200, 200),
            label_snapshot_size: (150, 150),
            mask_opacity: 0.5,
        }
    }
}

impl EngineConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn report_sizes(&self) -> ReportSizes {
        ReportSizes {
            view: self.view_snapshot_size,
            overview: self.overview_snapshot_size,
            label: self.label_snapshot_size,
        }
    }
}
