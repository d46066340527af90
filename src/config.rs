//! Pipeline configuration
//!
//! Settings are read from a JSON file; every field is optional and falls back
//! to the values the WFPC2 wide-field pipeline runs with.
//!
//! ```json
//! {
//!   "grid": { "rows": 3, "cols": 4, "tile_nominal_size": 425,
//!             "overlap_margin": 25, "width": 1725, "height": 1300 },
//!   "retry": { "max_attempts": 5, "initial_backoff_ms": 500 },
//!   "workers": 4
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::coordinates::DEFAULT_PLATE_SCALE;
use crate::ephemeris::{HorizonsConfig, RetryPolicy, MAX_WINDOW_MINUTES};
use crate::tiling::TileGrid;
use crate::{FinderError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub grid: TileGrid,
    /// Plate scale used for exposures whose metadata omits one
    pub default_plate_scale: f64,
    /// Whether a missing plate scale may fall back to `default_plate_scale`
    pub allow_default_plate_scale: bool,
    pub retry: RetryPolicy,
    pub horizons: HorizonsConfig,
    /// Worker threads across exposures; 1 runs sequentially
    pub workers: usize,
    /// Planet/moon list replacing the built-in target systems
    pub targets_file: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            grid: TileGrid::default(),
            default_plate_scale: DEFAULT_PLATE_SCALE,
            allow_default_plate_scale: false,
            retry: RetryPolicy::default(),
            horizons: HorizonsConfig::default(),
            workers: 1,
            targets_file: None,
        }
    }
}

impl PipelineConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        let config: PipelineConfig = serde_json::from_str(&text).map_err(|e| {
            FinderError::Config(format!("{}: {}", path.as_ref().display(), e))
        })?;
        Ok(config)
    }

    /// Load from `path` when given, otherwise use defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Startup validation; any error here stops the run
    pub fn validate(&self) -> Result<()> {
        self.grid.validate()?;
        self.retry.validate()?;
        if !self.default_plate_scale.is_finite() || self.default_plate_scale <= 0.0 {
            return Err(FinderError::Config(format!(
                "default_plate_scale must be positive, got {}",
                self.default_plate_scale
            )));
        }
        if self.workers == 0 {
            return Err(FinderError::Config("workers must be at least 1".to_string()));
        }
        if !(1..=MAX_WINDOW_MINUTES).contains(&self.horizons.window_minutes) {
            return Err(FinderError::Config(format!(
                "horizons.window_minutes must be between 1 and {}, got {}",
                MAX_WINDOW_MINUTES, self.horizons.window_minutes
            )));
        }
        if self.horizons.timeout_secs == 0 {
            return Err(FinderError::Config(
                "horizons.timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Plate scale fallback for exposures, if enabled
    pub fn plate_scale_fallback(&self) -> Option<f64> {
        self.allow_default_plate_scale
            .then_some(self.default_plate_scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.grid.tile_count(), 12);
        assert_eq!(config.plate_scale_fallback(), None);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "workers": 4, "retry": {{ "max_attempts": 2 }}, "allow_default_plate_scale": true }}"#
        )
        .unwrap();

        let config = PipelineConfig::load(file.path()).unwrap();
        config.validate().unwrap();
        assert_eq!(config.workers, 4);
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.retry.initial_backoff_ms, 500);
        assert_eq!(config.grid, TileGrid::default());
        assert_eq!(config.plate_scale_fallback(), Some(DEFAULT_PLATE_SCALE));
    }

    #[test]
    fn test_malformed_grid_is_fatal() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "grid": {{ "rows": 3, "cols": 4, "tile_nominal_size": 425, "overlap_margin": 0, "width": 1725, "height": 1300 }} }}"#
        )
        .unwrap();

        let err = PipelineConfig::load(file.path())
            .unwrap()
            .validate()
            .unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(err, FinderError::InvalidGrid(_)));
    }

    #[test]
    fn test_unparseable_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "workers = 4").unwrap();
        assert!(matches!(
            PipelineConfig::load(file.path()),
            Err(FinderError::Config(_))
        ));
    }

    #[test]
    fn test_window_minutes_out_of_range_is_fatal() {
        for window_minutes in [0, MAX_WINDOW_MINUTES + 1, i64::MAX] {
            let mut file = tempfile::NamedTempFile::new().unwrap();
            write!(
                file,
                r#"{{ "horizons": {{ "window_minutes": {} }} }}"#,
                window_minutes
            )
            .unwrap();

            let err = PipelineConfig::load(file.path())
                .unwrap()
                .validate()
                .unwrap_err();
            assert!(err.is_fatal());
            assert!(err.to_string().contains("window_minutes"));
        }
    }

    #[test]
    fn test_zero_workers_rejected() {
        let config = PipelineConfig {
            workers: 0,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
