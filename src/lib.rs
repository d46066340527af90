//! mtfinder: moving-target finder catalog for HST planetary imaging
//!
//! This crate turns predicted sky positions of solar-system bodies into pixel
//! positions on full-frame exposures, works out which overlapping display tiles
//! show each position, and keeps a per-tile finder catalog in sync across
//! repeated (and possibly partial) processing runs.

use thiserror::Error;

pub mod config;
pub mod coordinates;
pub mod ephemeris;
pub mod exposure;
pub mod pipeline;
pub mod store;
pub mod tiling;

// Re-export commonly used types
pub use config::PipelineConfig;
pub use coordinates::{pixel_delta, Angle, PlateSolution};
pub use pipeline::{run_batch, BatchContext, BatchOptions, BatchSummary, Selection};
pub use store::{EphemerisSample, FinderRecord, FinderRepository, MemoryRepository, Reconciler};
pub use tiling::{assign_regions, RegionSet, TileGrid};

/// Main error type for the mtfinder library
#[derive(Debug, Error)]
pub enum FinderError {
    /// Malformed or out-of-range sexagesimal input
    #[error("Invalid coordinate: {0}")]
    InvalidCoordinate(String),

    /// The exposure metadata lacks reference pixel, reference position or plate scale
    #[error("Missing reference pixel data for exposure {exposure}: {detail}")]
    MissingReferencePixel { exposure: String, detail: String },

    /// Transient ephemeris failure, or the retry budget ran out
    #[error("Ephemeris fetch for {target} failed after {attempts} attempt(s): {message}")]
    RetryableFetch {
        target: String,
        attempts: u32,
        message: String,
    },

    /// Ephemeris failure that retrying cannot fix
    #[error("Ephemeris fetch for {target} failed: {message}")]
    FetchFailed { target: String, message: String },

    /// More than one ephemeris sample stored for the same key
    #[error("Duplicate ephemeris samples for exposure {exposure}, target {target}: {count} rows")]
    DuplicateRecord {
        exposure: String,
        target: String,
        count: usize,
    },

    /// A tile id fell outside the grid, or a pixel could not be placed
    #[error("Region assignment error: {0}")]
    RegionAssignment(String),

    /// The tile grid configuration is malformed
    #[error("Invalid tile grid: {0}")]
    InvalidGrid(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown exposure: {0}")]
    UnknownExposure(String),

    #[error("Unknown target: {0}")]
    UnknownTarget(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl FinderError {
    /// True for transient ephemeris failures worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, FinderError::RetryableFetch { .. })
    }

    /// True for configuration errors that must stop the run at startup
    pub fn is_fatal(&self) -> bool {
        matches!(self, FinderError::InvalidGrid(_) | FinderError::Config(_))
    }
}

/// Result type for mtfinder operations
pub type Result<T> = std::result::Result<T, FinderError>;
