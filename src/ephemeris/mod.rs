//! Ephemeris sources
//!
//! An ephemeris source answers one question: where does a target appear on the
//! sky during an observation window. The production source is the JPL
//! Horizons batch interface; tests substitute their own. Sources are driven
//! through [`SerializedSource`], which allows one fetch at a time and bounds
//! retries.

use chrono::{Duration, NaiveDateTime};
use std::fmt;

use crate::{FinderError, Result};

pub mod horizons;
pub mod retry;
pub mod targets;

pub use horizons::{HorizonsClient, HorizonsConfig};
pub use retry::{RetryPolicy, SerializedSource};
pub use targets::{Target, TargetCatalog};

/// Horizons start/stop time format, e.g. `2009-Jul-23 14:05`
pub const HORIZONS_TIME_FORMAT: &str = "%Y-%b-%d %H:%M";

/// Longest ephemeris window a batch may request
pub const MAX_WINDOW_MINUTES: i64 = 24 * 60;

/// Time span an ephemeris is requested for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: NaiveDateTime,
    pub stop: NaiveDateTime,
}

impl TimeWindow {
    /// A window opening at the observation time and lasting `minutes`
    ///
    /// Windows shorter than a minute are widened to one minute.
    ///
    /// # Errors
    ///
    /// `FinderError::Config` when `minutes` exceeds [`MAX_WINDOW_MINUTES`] or
    /// the stop time is not representable.
    pub fn starting_at(observed_at: NaiveDateTime, minutes: i64) -> Result<Self> {
        let bad_window = || {
            FinderError::Config(format!(
                "ephemeris window of {} minutes from {} is out of range",
                minutes, observed_at
            ))
        };
        if minutes > MAX_WINDOW_MINUTES {
            return Err(bad_window());
        }
        let stop = Duration::try_minutes(minutes.max(1))
            .and_then(|length| observed_at.checked_add_signed(length))
            .ok_or_else(bad_window)?;
        Ok(TimeWindow {
            start: observed_at,
            stop,
        })
    }

    pub fn horizons_start(&self) -> String {
        self.start.format(HORIZONS_TIME_FORMAT).to_string()
    }

    pub fn horizons_stop(&self) -> String {
        self.stop.format(HORIZONS_TIME_FORMAT).to_string()
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} .. {}", self.horizons_start(), self.horizons_stop())
    }
}

/// Predicted position and photometry of a target
#[derive(Debug, Clone, PartialEq)]
pub struct EphemerisFix {
    /// Right ascension, `hh:mm:ss.ss`
    pub ra: String,
    /// Declination, `±dd:mm:ss.s`
    pub dec: String,
    /// Apparent magnitude; `None` when the service reports it as not available
    pub magnitude: Option<f64>,
    /// Angular diameter in arcseconds; `None` when not available
    pub diameter: Option<f64>,
}

/// A provider of predicted target positions
///
/// Fetching takes `&mut self`: a source is a rate-limited external resource
/// and is never queried concurrently. Share one through [`SerializedSource`].
pub trait EphemerisSource: Send {
    /// Predicted position of `target` during `window`
    ///
    /// Transient failures are reported as `FinderError::RetryableFetch`;
    /// anything else is final.
    fn fetch(&mut self, target: &Target, window: &TimeWindow) -> Result<EphemerisFix>;
}

impl<S: EphemerisSource + ?Sized> EphemerisSource for Box<S> {
    fn fetch(&mut self, target: &Target, window: &TimeWindow) -> Result<EphemerisFix> {
        (**self).fetch(target, window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_time_window_formatting() {
        let observed = NaiveDate::from_ymd_opt(2009, 7, 23)
            .unwrap()
            .and_hms_opt(14, 5, 37)
            .unwrap();
        let window = TimeWindow::starting_at(observed, 1).unwrap();
        assert_eq!(window.horizons_start(), "2009-Jul-23 14:05");
        assert_eq!(window.horizons_stop(), "2009-Jul-23 14:06");
        assert_eq!(window.to_string(), "2009-Jul-23 14:05 .. 2009-Jul-23 14:06");
    }

    #[test]
    fn test_time_window_is_never_empty() {
        let observed = NaiveDate::from_ymd_opt(1995, 12, 31)
            .unwrap()
            .and_hms_opt(23, 59, 0)
            .unwrap();
        let window = TimeWindow::starting_at(observed, 0).unwrap();
        assert_eq!(window.horizons_stop(), "1996-Jan-01 00:00");
    }

    #[test]
    fn test_time_window_rejects_oversized_length() {
        let observed = NaiveDate::from_ymd_opt(2009, 7, 23)
            .unwrap()
            .and_hms_opt(14, 5, 0)
            .unwrap();
        let day = TimeWindow::starting_at(observed, MAX_WINDOW_MINUTES).unwrap();
        assert_eq!(day.horizons_stop(), "2009-Jul-24 14:05");
        assert!(matches!(
            TimeWindow::starting_at(observed, MAX_WINDOW_MINUTES + 1),
            Err(FinderError::Config(_))
        ));
        assert!(TimeWindow::starting_at(observed, i64::MAX).is_err());
    }
}
