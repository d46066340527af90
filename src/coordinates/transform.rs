//! Sky-to-detector offsets for a single exposure
//!
//! An exposure's world coordinate solution is reduced to its reference pixel,
//! the sky position at that pixel and the plate scale. A predicted target
//! position is placed on the detector by scaling the sky offset from the
//! reference position into pixels.

use serde::{Deserialize, Serialize};

use super::angle::Angle;
use crate::Result;

/// WFPC2 drizzled plate scale in arcseconds per pixel
pub const DEFAULT_PLATE_SCALE: f64 = 0.05;

const ARCSEC_PER_DEGREE: f64 = 3600.0;

/// Reference pixel, reference sky position and plate scale of one exposure
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlateSolution {
    /// Reference pixel column (CRPIX1)
    pub ref_pixel_x: f64,
    /// Reference pixel row (CRPIX2)
    pub ref_pixel_y: f64,
    /// Right ascension at the reference pixel in degrees (CRVAL1)
    pub ref_ra_deg: f64,
    /// Declination at the reference pixel in degrees (CRVAL2)
    pub ref_dec_deg: f64,
    /// Arcseconds per pixel
    pub plate_scale: f64,
}

impl PlateSolution {
    /// Pixel offset of a sexagesimal sky position from the reference pixel
    pub fn pixel_delta(&self, target_ra: &str, target_dec: &str) -> Result<(f64, f64)> {
        pixel_delta_at_scale(
            self.ref_ra_deg,
            self.ref_dec_deg,
            target_ra,
            target_dec,
            self.plate_scale,
        )
    }

    /// Full-frame pixel of a sexagesimal sky position, rounded to the nearest pixel
    pub fn pixel_position(&self, target_ra: &str, target_dec: &str) -> Result<(i64, i64)> {
        let (delta_x, delta_y) = self.pixel_delta(target_ra, target_dec)?;
        Ok((
            (self.ref_pixel_x + delta_x).round() as i64,
            (self.ref_pixel_y + delta_y).round() as i64,
        ))
    }
}

/// Pixel offset of a target from the reference position at the default plate scale
///
/// # Arguments
/// * `ref_ra_deg`, `ref_dec_deg` - Sky position of the reference pixel in degrees
/// * `target_ra` - Target right ascension as `hh:mm:ss`
/// * `target_dec` - Target declination as `±dd:mm:ss`
///
/// # Returns
/// `(delta_x, delta_y)` in pixels. RA increases to the east, which is toward
/// lower pixel columns, so the x offset carries the opposite sign of the RA
/// difference.
pub fn pixel_delta(
    ref_ra_deg: f64,
    ref_dec_deg: f64,
    target_ra: &str,
    target_dec: &str,
) -> Result<(f64, f64)> {
    pixel_delta_at_scale(
        ref_ra_deg,
        ref_dec_deg,
        target_ra,
        target_dec,
        DEFAULT_PLATE_SCALE,
    )
}

/// Pixel offset of a target from the reference position at an explicit plate scale
pub fn pixel_delta_at_scale(
    ref_ra_deg: f64,
    ref_dec_deg: f64,
    target_ra: &str,
    target_dec: &str,
    plate_scale: f64,
) -> Result<(f64, f64)> {
    let ra = Angle::parse_hms(target_ra)?.to_degrees();
    let dec = Angle::parse_dms(target_dec)?.to_degrees();
    let pixels_per_degree = ARCSEC_PER_DEGREE / plate_scale;

    let delta_x = -1.0 * wrap_degrees(ra - ref_ra_deg) * pixels_per_degree;
    let delta_y = (dec - ref_dec_deg) * pixels_per_degree;
    Ok((delta_x, delta_y))
}

/// Folds an RA difference into (-180, 180] so positions straddling 0h stay close
fn wrap_degrees(delta: f64) -> f64 {
    let wrapped = delta.rem_euclid(360.0);
    if wrapped > 180.0 {
        wrapped - 360.0
    } else {
        wrapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FinderError;
    use approx::assert_abs_diff_eq;

    const REF_RA: f64 = 301.1233313134;
    const REF_DEC: f64 = -19.93255391992;

    #[test]
    fn test_pixel_delta_reference_fixture() {
        let (delta_x, delta_y) = pixel_delta(REF_RA, REF_DEC, "20:04:28.46", "-19:56:02.8").unwrap();

        assert!(delta_x > 0.0);
        assert!(delta_y < 0.0);
        assert_abs_diff_eq!(delta_x, 341.86, epsilon = 0.05);
        assert_abs_diff_eq!(delta_y, -112.12, epsilon = 0.05);
    }

    #[test]
    fn test_pixel_position_rounds_to_nearest() {
        let solution = PlateSolution {
            ref_pixel_x: 862.0,
            ref_pixel_y: 650.0,
            ref_ra_deg: REF_RA,
            ref_dec_deg: REF_DEC,
            plate_scale: DEFAULT_PLATE_SCALE,
        };
        let (x, y) = solution.pixel_position("20:04:28.46", "-19:56:02.8").unwrap();
        // 862 + 341.86 and 650 - 112.12
        assert_eq!((x, y), (1204, 538));
    }

    #[test]
    fn test_plate_scale_scales_offsets() {
        let (fine_x, fine_y) =
            pixel_delta_at_scale(REF_RA, REF_DEC, "20:04:28.46", "-19:56:02.8", 0.05).unwrap();
        let (coarse_x, coarse_y) =
            pixel_delta_at_scale(REF_RA, REF_DEC, "20:04:28.46", "-19:56:02.8", 0.1).unwrap();
        assert_abs_diff_eq!(fine_x, 2.0 * coarse_x, epsilon = 1e-9);
        assert_abs_diff_eq!(fine_y, 2.0 * coarse_y, epsilon = 1e-9);
    }

    #[test]
    fn test_ra_wraps_across_zero_hours() {
        // 00:00:01.2 is 0.005 degrees, the reference sits just west of 0h
        let (delta_x, _) = pixel_delta(359.995, 0.0, "00:00:01.2", "+00:00:00").unwrap();
        assert_abs_diff_eq!(delta_x, -0.01 * 72000.0, epsilon = 1e-6);
    }

    #[test]
    fn test_invalid_target_coordinate() {
        assert!(matches!(
            pixel_delta(REF_RA, REF_DEC, "20:04", "-19:56:02.8"),
            Err(FinderError::InvalidCoordinate(_))
        ));
        assert!(matches!(
            pixel_delta(REF_RA, REF_DEC, "20:04:28.46", "-95:00:00"),
            Err(FinderError::InvalidCoordinate(_))
        ));
    }
}
