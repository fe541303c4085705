use thiserror::Error;

use crate::geometry::Dims;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("array holds {actual} elements but dims {dims} require {expected}")]
    Shape {
        dims: Dims,
        expected: usize,
        actual: usize,
    },

    #[error("dims {0} contain a zero extent")]
    ZeroExtent(Dims),

    #[error("mask dimensions {mask} do not match volume dimensions {grid}")]
    ShapeMismatch { grid: Dims, mask: Dims },

    #[error("missing data: {0}")]
    MissingData(&'static str),

    #[error("voxel spacing is unknown")]
    MissingSpacing,

    #[error("voxel spacing must be finite and positive, got {0:?}")]
    InvalidSpacing([f64; 3]),

    #[error("origin transform is not invertible")]
    SingularTransform,

    #[error("nothing to undo")]
    EmptyHistory,

    #[error("previous export still running")]
    ExportInProgress,

    #[error("canceled by user")]
    Canceled,

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("no async runtime available to run the report worker")]
    NoRuntime,

    #[error("report worker failed: {0}")]
    Worker(String),

    #[error("snapshot rendering failed: {0}")]
    Render(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}
