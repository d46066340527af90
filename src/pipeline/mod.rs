//! Batch driver
//!
//! For every selected exposure, every body in the exposure's planet system is
//! placed on the frame and reconciled into the finder catalog. Failures are
//! contained: a bad record skips that target, a bad exposure skips that
//! exposure, and the batch always runs to the end.

use rayon::prelude::*;
use std::fmt;
use std::ops::AddAssign;

use crate::coordinates::PlateSolution;
use crate::ephemeris::{EphemerisSource, SerializedSource, Target, TargetCatalog, TimeWindow};
use crate::exposure::{select_matching, ExposureMetadata, ExposureMetadataProvider};
use crate::store::{
    EphemerisSample, FinderRepository, ReconcileCounts, Reconciler, RowChange, SampleKey,
};
use crate::{FinderError, Result};

/// Which exposures a batch visits
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Exposure ids matching a shell-style pattern
    Glob(String),
    /// Exposures with at least one target lacking a stored sample
    MissingOnly,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchOptions {
    pub selection: Selection,
    /// Overwrite stored samples and finders instead of keeping them
    pub reproc: bool,
    /// Worker threads; 1 runs sequentially
    pub workers: usize,
    /// Length of the ephemeris time window
    pub window_minutes: i64,
    /// Plate scale for exposures whose metadata lacks one
    pub plate_scale_fallback: Option<f64>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        BatchOptions {
            selection: Selection::Glob("*".to_string()),
            reproc: false,
            workers: 1,
            window_minutes: 1,
            plate_scale_fallback: None,
        }
    }
}

/// End-of-run tallies
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    /// Exposures selected for this run
    pub exposures_selected: usize,
    /// Exposures whose targets were all attempted
    pub exposures_processed: usize,
    /// Exposures skipped because their frame does not match the grid
    pub exposures_skipped: usize,
    /// Exposures abandoned before any target was attempted
    pub exposures_failed: usize,
    /// Targets reconciled without error
    pub records_processed: usize,
    /// Targets that failed
    pub records_failed: usize,
    /// Targets whose position falls off the frame
    pub off_frame: usize,
    /// Ephemeris fetches issued
    pub fetches: usize,
    pub samples: ReconcileCounts,
    pub finders: ReconcileCounts,
}

impl AddAssign for BatchSummary {
    fn add_assign(&mut self, other: Self) {
        self.exposures_selected += other.exposures_selected;
        self.exposures_processed += other.exposures_processed;
        self.exposures_skipped += other.exposures_skipped;
        self.exposures_failed += other.exposures_failed;
        self.records_processed += other.records_processed;
        self.records_failed += other.records_failed;
        self.off_frame += other.off_frame;
        self.fetches += other.fetches;
        self.samples += other.samples;
        self.finders += other.finders;
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Exposures: {} selected, {} processed, {} skipped, {} failed",
            self.exposures_selected,
            self.exposures_processed,
            self.exposures_skipped,
            self.exposures_failed
        )?;
        writeln!(
            f,
            "Targets:   {} reconciled, {} failed, {} off frame, {} fetches",
            self.records_processed, self.records_failed, self.off_frame, self.fetches
        )?;
        writeln!(
            f,
            "Samples:   {} inserted, {} updated, {} unchanged",
            self.samples.inserted, self.samples.updated, self.samples.unchanged
        )?;
        write!(
            f,
            "Finders:   {} inserted, {} updated, {} unchanged, {} removed",
            self.finders.inserted,
            self.finders.updated,
            self.finders.unchanged,
            self.finders.removed
        )
    }
}

/// Everything a batch run reads from or writes to
pub struct BatchContext<'a, R, P: ?Sized, S> {
    pub reconciler: &'a Reconciler<R>,
    pub exposures: &'a P,
    pub targets: &'a TargetCatalog,
    pub source: &'a SerializedSource<S>,
}

/// Run one batch over the selected exposures
///
/// Only selection errors (such as a malformed pattern) are returned; every
/// per-exposure and per-target failure is logged and counted in the summary.
pub fn run_batch<R, P, S>(context: &BatchContext<'_, R, P, S>, options: &BatchOptions) -> Result<BatchSummary>
where
    R: FinderRepository,
    P: ExposureMetadataProvider + ?Sized,
    S: EphemerisSource,
{
    let selected = select_exposures(context, &options.selection)?;
    log::info!(
        "Processing {} exposures (reproc = {}, workers = {})",
        selected.len(),
        options.reproc,
        options.workers
    );

    let mut summary = if options.workers > 1 {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.workers)
            .build()
            .map_err(|e| FinderError::Config(format!("failed to start worker pool: {}", e)))?;
        pool.install(|| {
            selected
                .par_iter()
                .map(|exposure_id| process_exposure(context, options, exposure_id))
                .reduce(BatchSummary::default, |mut total, part| {
                    total += part;
                    total
                })
        })
    } else {
        let mut total = BatchSummary::default();
        for (count, exposure_id) in selected.iter().enumerate() {
            total += process_exposure(context, options, exposure_id);
            if (count + 1) % 10 == 0 {
                log::info!("{} of {} exposures done", count + 1, selected.len());
            }
        }
        total
    };
    summary.exposures_selected = selected.len();

    log::info!(
        "Batch complete: {} exposures processed, {} targets reconciled, {} failed",
        summary.exposures_processed,
        summary.records_processed,
        summary.records_failed
    );
    Ok(summary)
}

fn select_exposures<R, P, S>(context: &BatchContext<'_, R, P, S>, selection: &Selection) -> Result<Vec<String>>
where
    R: FinderRepository,
    P: ExposureMetadataProvider + ?Sized,
{
    match selection {
        Selection::Glob(pattern) => select_matching(context.exposures, pattern),
        Selection::MissingOnly => Ok(context
            .exposures
            .exposure_ids()
            .into_iter()
            .filter(|exposure_id| lacks_samples(context, exposure_id))
            .collect()),
    }
}

/// True unless every target of the exposure already has a sample
///
/// Exposures whose metadata or targets cannot be resolved count as lacking,
/// so their failure shows up in the run instead of being hidden.
fn lacks_samples<R, P, S>(context: &BatchContext<'_, R, P, S>, exposure_id: &str) -> bool
where
    R: FinderRepository,
    P: ExposureMetadataProvider + ?Sized,
{
    let targets = match context
        .exposures
        .get(exposure_id)
        .and_then(|metadata| context.targets.targets_for(&metadata.targname).map(<[Target]>::to_vec))
    {
        Ok(targets) => targets,
        Err(_) => return true,
    };
    let repository = context.reconciler.repository();
    targets.iter().any(|target| {
        !repository
            .has_sample(&SampleKey::new(exposure_id, &target.name))
            .unwrap_or(false)
    })
}

fn process_exposure<R, P, S>(
    context: &BatchContext<'_, R, P, S>,
    options: &BatchOptions,
    exposure_id: &str,
) -> BatchSummary
where
    R: FinderRepository,
    P: ExposureMetadataProvider + ?Sized,
    S: EphemerisSource,
{
    let mut summary = BatchSummary::default();

    let metadata = match context.exposures.get(exposure_id) {
        Ok(metadata) => metadata,
        Err(err) => {
            log::error!("Exposure {}: {}", exposure_id, err);
            summary.exposures_failed += 1;
            return summary;
        }
    };

    let grid = context.reconciler.grid();
    if metadata.width != grid.width || metadata.height != grid.height {
        log::warn!(
            "Exposure {}: frame {}x{} does not match the {}x{} tile grid, skipped",
            exposure_id,
            metadata.width,
            metadata.height,
            grid.width,
            grid.height
        );
        summary.exposures_skipped += 1;
        return summary;
    }

    let prepared = metadata
        .plate_solution(options.plate_scale_fallback)
        .and_then(|solution| {
            let window = TimeWindow::starting_at(metadata.observed_at, options.window_minutes)?;
            context
                .targets
                .targets_for(&metadata.targname)
                .map(|targets| (solution, window, targets))
        });
    let (solution, window, targets) = match prepared {
        Ok(prepared) => prepared,
        Err(err) => {
            log::error!("Exposure {} ({}): {}", exposure_id, metadata.targname, err);
            summary.exposures_failed += 1;
            return summary;
        }
    };

    for target in targets {
        match process_target(context, options, &metadata, &solution, &window, target, &mut summary) {
            Ok(()) => summary.records_processed += 1,
            Err(failure) => {
                summary.records_failed += 1;
                let pixel = failure
                    .pixel
                    .map(|(x, y)| format!("({}, {})", x, y))
                    .unwrap_or_else(|| "unknown".to_string());
                if let FinderError::DuplicateRecord { .. } = failure.error {
                    log::warn!(
                        "Data integrity: exposure {} target {} pixel {}: {}",
                        exposure_id,
                        target.name,
                        pixel,
                        failure.error
                    );
                } else {
                    log::error!(
                        "Exposure {} target {} pixel {}: {}",
                        exposure_id,
                        target.name,
                        pixel,
                        failure.error
                    );
                }
            }
        }
    }

    summary.exposures_processed += 1;
    log::info!("Completed {}", exposure_id);
    summary
}

/// A failed target, with the pixel it was placed at when known
struct RecordFailure {
    error: FinderError,
    pixel: Option<(i64, i64)>,
}

impl From<FinderError> for RecordFailure {
    fn from(error: FinderError) -> Self {
        RecordFailure { error, pixel: None }
    }
}

fn process_target<R, P, S>(
    context: &BatchContext<'_, R, P, S>,
    options: &BatchOptions,
    metadata: &ExposureMetadata,
    solution: &PlateSolution,
    window: &TimeWindow,
    target: &Target,
    summary: &mut BatchSummary,
) -> std::result::Result<(), RecordFailure>
where
    R: FinderRepository,
    P: ExposureMetadataProvider + ?Sized,
    S: EphemerisSource,
{
    let key = SampleKey::new(&metadata.exposure_id, &target.name);
    let stored = context.reconciler.repository().samples_for(&key)?;

    // A stored sample is reused as-is unless reprocessing; reconciling it
    // again still fills in finder records a previous run did not finish.
    let sample = match stored.first() {
        Some(existing) if !options.reproc => existing.clone(),
        _ => {
            summary.fetches += 1;
            let fix = context.source.fetch(target, window)?;
            let (pixel_x, pixel_y) = solution.pixel_position(&fix.ra, &fix.dec)?;
            EphemerisSample {
                ra: fix.ra,
                dec: fix.dec,
                pixel_x,
                pixel_y,
                magnitude: fix.magnitude,
                diameter: fix.diameter,
            }
        }
    };

    let report = context
        .reconciler
        .reconcile(&metadata.exposure_id, &target.name, &sample, options.reproc)
        .map_err(|error| RecordFailure {
            error,
            pixel: Some((sample.pixel_x, sample.pixel_y)),
        })?;

    summary.samples.record(report.sample);
    summary.finders += report.finders;
    if report.off_frame {
        summary.off_frame += 1;
    }
    if report.sample != RowChange::Unchanged || report.finders.changed() > 0 {
        log::debug!(
            "{} at ({}, {}): sample {:?}, finders {:?}",
            key,
            sample.pixel_x,
            sample.pixel_y,
            report.sample,
            report.finders
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_accumulates() {
        let mut total = BatchSummary::default();
        let mut part = BatchSummary {
            exposures_processed: 1,
            records_processed: 3,
            ..BatchSummary::default()
        };
        part.finders.inserted = 4;
        total += part;
        total += part;
        assert_eq!(total.exposures_processed, 2);
        assert_eq!(total.records_processed, 6);
        assert_eq!(total.finders.inserted, 8);
    }

    #[test]
    fn test_summary_display() {
        let summary = BatchSummary {
            exposures_selected: 2,
            exposures_processed: 2,
            ..BatchSummary::default()
        };
        let text = summary.to_string();
        assert!(text.starts_with("Exposures: 2 selected, 2 processed"));
        assert!(text.contains("Finders:   0 inserted"));
    }
}
