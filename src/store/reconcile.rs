//! Reconciliation of ephemeris samples into per-tile finder records
//!
//! Reconciling a sample is idempotent: running it again with `reproc` unset
//! changes nothing, and a run that died halfway is completed by the next one
//! because missing finder records are always inserted. With `reproc` set the
//! stored sample is overwritten, finder records are refreshed to the new
//! position and records for tiles that no longer show it are deleted.

use std::ops::AddAssign;

use super::{EphemerisSample, FinderRecord, FinderRepository, RowChange, SampleKey};
use crate::tiling::TileGrid;
use crate::Result;

/// Row tallies for one table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileCounts {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub removed: usize,
}

impl ReconcileCounts {
    pub fn record(&mut self, change: RowChange) {
        match change {
            RowChange::Inserted => self.inserted += 1,
            RowChange::Updated => self.updated += 1,
            RowChange::Unchanged => self.unchanged += 1,
        }
    }

    /// Rows written or deleted
    pub fn changed(&self) -> usize {
        self.inserted + self.updated + self.removed
    }
}

impl AddAssign for ReconcileCounts {
    fn add_assign(&mut self, other: Self) {
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.unchanged += other.unchanged;
        self.removed += other.removed;
    }
}

/// Outcome of reconciling one sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileReport {
    /// What happened to the ephemeris sample row
    pub sample: RowChange,
    /// What happened to the finder rows
    pub finders: ReconcileCounts,
    /// The stored position is off the frame, so no tile shows it
    pub off_frame: bool,
}

/// Sole writer of finder records
#[derive(Debug)]
pub struct Reconciler<R> {
    grid: TileGrid,
    repository: R,
}

impl<R: FinderRepository> Reconciler<R> {
    /// # Errors
    ///
    /// `FinderError::InvalidGrid` when `grid` fails [`TileGrid::validate`].
    pub fn new(grid: TileGrid, repository: R) -> Result<Self> {
        grid.validate()?;
        Ok(Reconciler { grid, repository })
    }

    pub fn grid(&self) -> &TileGrid {
        &self.grid
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Store `sample` for (exposure, target) and bring its finder records in line
    ///
    /// Without `reproc` an existing sample is kept as stored and its finder
    /// records are only filled in where missing. With `reproc` the sample and
    /// its finder records are overwritten and stale tiles are cleared.
    ///
    /// # Errors
    ///
    /// * `FinderError::DuplicateRecord` if the key already has several samples
    /// * `FinderError::RegionAssignment` if a tile id or local coordinate
    ///   comes out of range
    pub fn reconcile(
        &self,
        exposure_id: &str,
        target: &str,
        sample: &EphemerisSample,
        reproc: bool,
    ) -> Result<ReconcileReport> {
        let key = SampleKey::new(exposure_id, target);
        let (current, sample_change) = self.repository.upsert_sample(&key, sample, reproc)?;

        let mut finders = ReconcileCounts::default();
        let mut covered: Vec<u32> = Vec::new();
        let off_frame = !self.grid.contains(current.pixel_x, current.pixel_y);

        if off_frame {
            log::debug!(
                "{} at ({}, {}) is off the {}x{} frame",
                key,
                current.pixel_x,
                current.pixel_y,
                self.grid.width,
                self.grid.height
            );
        } else {
            let regions = self
                .grid
                .assign_regions(current.pixel_x, current.pixel_y)?;
            for tile_id in regions.iter() {
                let (local_x, local_y) =
                    self.grid
                        .local_coordinate(tile_id, current.pixel_x, current.pixel_y)?;
                let record = FinderRecord {
                    tile_id,
                    local_x,
                    local_y,
                    magnitude: current.magnitude,
                    diameter: current.diameter,
                };
                finders.record(self.repository.upsert_finder(&key, &record, reproc)?);
                covered.push(tile_id);
            }
        }

        if reproc {
            let stale: Vec<u32> = self
                .repository
                .finders_for(&key)?
                .into_iter()
                .map(|record| record.tile_id)
                .filter(|tile_id| !covered.contains(tile_id))
                .collect();
            if !stale.is_empty() {
                finders.removed = self.repository.remove_finders(&key, &stale)?;
                log::debug!("{}: removed stale finders in tiles {:?}", key, stale);
            }
        }

        Ok(ReconcileReport {
            sample: sample_change,
            finders,
            off_frame,
        })
    }
}
