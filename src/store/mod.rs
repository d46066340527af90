//! Position catalog storage
//!
//! Two tables make up the catalog. Ephemeris samples hold one predicted
//! position per (exposure, target); finder records hold the per-tile local
//! position derived from a sample, one per tile that shows it. The
//! [`FinderRepository`] trait is the only way either table is written, and
//! [`Reconciler`] is the only caller that writes finder records.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::Result;

pub mod memory;
pub mod reconcile;

pub use memory::MemoryRepository;
pub use reconcile::{ReconcileCounts, ReconcileReport, Reconciler};

/// Identifies the ephemeris sample of one target on one exposure
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SampleKey {
    pub exposure_id: String,
    pub target: String,
}

impl SampleKey {
    pub fn new(exposure_id: impl Into<String>, target: impl Into<String>) -> Self {
        SampleKey {
            exposure_id: exposure_id.into(),
            target: target.into(),
        }
    }
}

impl fmt::Display for SampleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.exposure_id, self.target)
    }
}

/// One predicted position of a target on an exposure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EphemerisSample {
    /// Right ascension as received, `hh:mm:ss.ss`
    pub ra: String,
    /// Declination as received, `±dd:mm:ss.s`
    pub dec: String,
    /// Full-frame pixel column, rounded
    pub pixel_x: i64,
    /// Full-frame pixel row, rounded
    pub pixel_y: i64,
    /// Apparent magnitude, when the ephemeris service provides one
    pub magnitude: Option<f64>,
    /// Angular diameter in arcseconds, when the ephemeris service provides one
    pub diameter: Option<f64>,
}

/// A target's position local to one display tile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinderRecord {
    pub tile_id: u32,
    pub local_x: u32,
    pub local_y: u32,
    pub magnitude: Option<f64>,
    pub diameter: Option<f64>,
}

/// What an upsert did to a stored row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowChange {
    Inserted,
    Updated,
    Unchanged,
}

/// Storage contract for the position catalog
///
/// Implementations make each upsert atomic with respect to other callers, so
/// workers reconciling different exposures may share one repository.
pub trait FinderRepository: Send + Sync {
    /// All stored samples for a key; more than one means the table is corrupt
    fn samples_for(&self, key: &SampleKey) -> Result<Vec<EphemerisSample>>;

    /// Check whether any sample is stored for a key
    fn has_sample(&self, key: &SampleKey) -> Result<bool> {
        Ok(!self.samples_for(key)?.is_empty())
    }

    /// Insert the sample if absent, overwrite it when `reproc` is set
    ///
    /// Returns the sample now stored and what happened to the row.
    ///
    /// # Errors
    ///
    /// `FinderError::DuplicateRecord` when more than one sample already
    /// matches the key; nothing is written in that case.
    fn upsert_sample(
        &self,
        key: &SampleKey,
        sample: &EphemerisSample,
        reproc: bool,
    ) -> Result<(EphemerisSample, RowChange)>;

    /// All finder records stored for a key, ordered by tile id
    fn finders_for(&self, key: &SampleKey) -> Result<Vec<FinderRecord>>;

    /// Insert the finder record if absent, overwrite it when `reproc` is set
    fn upsert_finder(&self, key: &SampleKey, record: &FinderRecord, reproc: bool)
        -> Result<RowChange>;

    /// Delete the finder records of `key` in the given tiles, returning how many went
    fn remove_finders(&self, key: &SampleKey, tile_ids: &[u32]) -> Result<usize>;
}

impl<T: FinderRepository + ?Sized> FinderRepository for &T {
    fn samples_for(&self, key: &SampleKey) -> Result<Vec<EphemerisSample>> {
        (**self).samples_for(key)
    }

    fn has_sample(&self, key: &SampleKey) -> Result<bool> {
        (**self).has_sample(key)
    }

    fn upsert_sample(
        &self,
        key: &SampleKey,
        sample: &EphemerisSample,
        reproc: bool,
    ) -> Result<(EphemerisSample, RowChange)> {
        (**self).upsert_sample(key, sample, reproc)
    }

    fn finders_for(&self, key: &SampleKey) -> Result<Vec<FinderRecord>> {
        (**self).finders_for(key)
    }

    fn upsert_finder(
        &self,
        key: &SampleKey,
        record: &FinderRecord,
        reproc: bool,
    ) -> Result<RowChange> {
        (**self).upsert_finder(key, record, reproc)
    }

    fn remove_finders(&self, key: &SampleKey, tile_ids: &[u32]) -> Result<usize> {
        (**self).remove_finders(key, tile_ids)
    }
}

impl<T: FinderRepository + ?Sized> FinderRepository for Arc<T> {
    fn samples_for(&self, key: &SampleKey) -> Result<Vec<EphemerisSample>> {
        (**self).samples_for(key)
    }

    fn has_sample(&self, key: &SampleKey) -> Result<bool> {
        (**self).has_sample(key)
    }

    fn upsert_sample(
        &self,
        key: &SampleKey,
        sample: &EphemerisSample,
        reproc: bool,
    ) -> Result<(EphemerisSample, RowChange)> {
        (**self).upsert_sample(key, sample, reproc)
    }

    fn finders_for(&self, key: &SampleKey) -> Result<Vec<FinderRecord>> {
        (**self).finders_for(key)
    }

    fn upsert_finder(
        &self,
        key: &SampleKey,
        record: &FinderRecord,
        reproc: bool,
    ) -> Result<RowChange> {
        (**self).upsert_finder(key, record, reproc)
    }

    fn remove_finders(&self, key: &SampleKey, tile_ids: &[u32]) -> Result<usize> {
        (**self).remove_finders(key, tile_ids)
    }
}
