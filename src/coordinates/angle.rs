//! # Angle Representation Module
//!
//! Angles arrive from ephemeris services as sexagesimal strings: right
//! ascension in hours of time (`hh:mm:ss.sss`) and declination in signed
//! degrees (`±dd:mm:ss.ss`). This module parses both forms into a decimal
//! degree `Angle`, enforcing the field ranges, and formats them back.
//!
//! ## Examples
//!
//! ```rust
//! use mtfinder::coordinates::angle::Angle;
//!
//! let ra = Angle::parse_hms("20:04:28.46").unwrap();
//! assert!((ra.to_degrees() - 301.118583).abs() < 1e-6);
//!
//! let dec = Angle::parse_dms("-19:56:02.8").unwrap();
//! assert!((dec.to_degrees() + 19.934111).abs() < 1e-6);
//! ```

use lazy_static::lazy_static;
use regex::Regex;
use std::f64::consts::PI;
use std::fmt;

use crate::{FinderError, Result};

lazy_static! {
    /// `hh:mm:ss[.sss]`
    static ref HMS_PATTERN: Regex =
        Regex::new(r"^\s*(\d{1,2}):(\d{1,2}):(\d{1,2}(?:\.\d*)?)\s*$").unwrap();

    /// `[+-]dd:mm:ss[.sss]`
    static ref DMS_PATTERN: Regex =
        Regex::new(r"^\s*([+-]?)(\d{1,2}):(\d{1,2}):(\d{1,2}(?:\.\d*)?)\s*$").unwrap();
}

/// An angular measurement held in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Angle {
    degrees: f64,
}

impl Angle {
    /// Creates an angle from a value in degrees
    pub fn from_degrees(degrees: f64) -> Self {
        Angle { degrees }
    }

    /// Creates an angle from a value in radians
    pub fn from_radians(radians: f64) -> Self {
        Angle {
            degrees: radians * (180.0 / PI),
        }
    }

    /// Parses a right ascension in hours, minutes and seconds of time
    ///
    /// The result is `15 * (hh + mm/60 + ss/3600)` degrees. Hours must lie in
    /// [0, 24], minutes and seconds in [0, 60].
    ///
    /// # Errors
    ///
    /// Returns `FinderError::InvalidCoordinate` for malformed text or an
    /// out-of-range field.
    pub fn parse_hms(text: &str) -> Result<Self> {
        let caps = HMS_PATTERN.captures(text).ok_or_else(|| {
            FinderError::InvalidCoordinate(format!("expected hh:mm:ss, got {:?}", text))
        })?;

        let hours = parse_field(&caps[1], text)?;
        let minutes = parse_field(&caps[2], text)?;
        let seconds = parse_field(&caps[3], text)?;

        check_range("Hours", hours, 0.0, 24.0, text)?;
        check_range("Minutes", minutes, 0.0, 60.0, text)?;
        check_range("Seconds", seconds, 0.0, 60.0, text)?;

        Ok(Angle::from_degrees(
            15.0 * (hours + minutes / 60.0 + seconds / 3600.0),
        ))
    }

    /// Parses a declination in signed degrees, arcminutes and arcseconds
    ///
    /// The sign is taken from the text, so `-00:30:00` is half a degree south.
    /// Degrees must lie in [-90, 90], arcminutes and arcseconds in [0, 60], and
    /// the combined value may not exceed 90 degrees in magnitude.
    ///
    /// # Errors
    ///
    /// Returns `FinderError::InvalidCoordinate` for malformed text or an
    /// out-of-range field.
    pub fn parse_dms(text: &str) -> Result<Self> {
        let caps = DMS_PATTERN.captures(text).ok_or_else(|| {
            FinderError::InvalidCoordinate(format!("expected ±dd:mm:ss, got {:?}", text))
        })?;

        let sign = if &caps[1] == "-" { -1.0 } else { 1.0 };
        let degrees = parse_field(&caps[2], text)?;
        let minutes = parse_field(&caps[3], text)?;
        let seconds = parse_field(&caps[4], text)?;

        check_range("Degrees", degrees, 0.0, 90.0, text)?;
        check_range("Minutes", minutes, 0.0, 60.0, text)?;
        check_range("Seconds", seconds, 0.0, 60.0, text)?;

        let magnitude = degrees + minutes / 60.0 + seconds / 3600.0;
        if magnitude > 90.0 {
            return Err(FinderError::InvalidCoordinate(format!(
                "Declination {} exceeds 90 degrees",
                text.trim()
            )));
        }

        Ok(Angle::from_degrees(sign * magnitude))
    }

    /// Returns the angle value in degrees
    pub fn to_degrees(&self) -> f64 {
        self.degrees
    }

    /// Returns the angle value in radians
    pub fn to_radians(&self) -> f64 {
        self.degrees * (PI / 180.0)
    }

    /// Formats the angle as hours of time, `hh:mm:ss.ss`
    pub fn to_hms_string(&self) -> String {
        let (h, m, s) = split_sexagesimal(self.degrees.rem_euclid(360.0) / 15.0, 2);
        format!("{:02}:{:02}:{:05.2}", h, m, s)
    }

    /// Formats the angle as signed degrees, `±dd:mm:ss.s`
    pub fn to_dms_string(&self) -> String {
        let sign = if self.degrees < 0.0 { '-' } else { '+' };
        let (d, m, s) = split_sexagesimal(self.degrees.abs(), 1);
        format!("{}{:02}:{:02}:{:04.1}", sign, d, m, s)
    }
}

impl fmt::Display for Angle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}°", self.degrees)
    }
}

fn parse_field(field: &str, text: &str) -> Result<f64> {
    field.parse::<f64>().map_err(|_| {
        FinderError::InvalidCoordinate(format!("unparseable field {:?} in {:?}", field, text))
    })
}

fn check_range(name: &str, value: f64, min: f64, max: f64, text: &str) -> Result<()> {
    if value < min || value > max {
        return Err(FinderError::InvalidCoordinate(format!(
            "{} {} out of range [{},{}] in {:?}",
            name, value, min, max, text
        )));
    }
    Ok(())
}

/// Splits a non-negative decimal value into whole units, minutes and seconds,
/// carrying so the rounded seconds never print as 60.
fn split_sexagesimal(value: f64, decimals: i32) -> (u32, u32, f64) {
    let scale = 10f64.powi(decimals);
    let total_seconds = (value * 3600.0 * scale).round() / scale;
    let units = (total_seconds / 3600.0).floor();
    let minutes = ((total_seconds - units * 3600.0) / 60.0).floor();
    let seconds = total_seconds - units * 3600.0 - minutes * 60.0;
    (units as u32, minutes as u32, seconds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rstest::rstest;

    #[test]
    fn test_parse_hms_reference_target() {
        let ra = Angle::parse_hms("20:04:28.46").unwrap();
        assert_abs_diff_eq!(ra.to_degrees(), 301.1185833, epsilon = 1e-6);
    }

    #[test]
    fn test_parse_dms_reference_target() {
        let dec = Angle::parse_dms("-19:56:02.8").unwrap();
        assert_abs_diff_eq!(dec.to_degrees(), -19.9341111, epsilon = 1e-6);
    }

    #[test]
    fn test_negative_zero_degrees_keeps_sign() {
        let dec = Angle::parse_dms("-00:30:00").unwrap();
        assert_abs_diff_eq!(dec.to_degrees(), -0.5, epsilon = 1e-12);

        let north = Angle::parse_dms("+00:30:00").unwrap();
        assert_abs_diff_eq!(north.to_degrees(), 0.5, epsilon = 1e-12);
    }

    #[rstest]
    #[case("25:00:00")]
    #[case("12:61:00")]
    #[case("12:00:60.5")]
    #[case("12:00")]
    #[case("12h30m00s")]
    #[case("")]
    fn test_parse_hms_rejects(#[case] text: &str) {
        assert!(matches!(
            Angle::parse_hms(text),
            Err(FinderError::InvalidCoordinate(_))
        ));
    }

    #[rstest]
    #[case("-91:00:00")]
    #[case("+90:00:01")]
    #[case("45:75:00")]
    #[case("45:00:99")]
    #[case("north")]
    fn test_parse_dms_rejects(#[case] text: &str) {
        assert!(matches!(
            Angle::parse_dms(text),
            Err(FinderError::InvalidCoordinate(_))
        ));
    }

    #[rstest]
    #[case("00:00:00", 0.0)]
    #[case("24:00:00", 360.0)]
    #[case("06:00:00", 90.0)]
    #[case("01:30:00", 22.5)]
    fn test_parse_hms_values(#[case] text: &str, #[case] expected: f64) {
        assert_abs_diff_eq!(
            Angle::parse_hms(text).unwrap().to_degrees(),
            expected,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_sexagesimal_formatting() {
        let ra = Angle::parse_hms("20:04:28.46").unwrap();
        assert_eq!(ra.to_hms_string(), "20:04:28.46");

        let dec = Angle::parse_dms("-19:56:02.8").unwrap();
        assert_eq!(dec.to_dms_string(), "-19:56:02.8");

        // Seconds rounding up to 60 carries into the minutes
        let almost = Angle::from_degrees(15.0 * (1.0 + 59.0 / 60.0 + 59.999 / 3600.0));
        assert_eq!(almost.to_hms_string(), "02:00:00.00");
    }

    #[test]
    fn test_radian_conversions() {
        let angle = Angle::from_radians(PI / 2.0);
        assert_abs_diff_eq!(angle.to_degrees(), 90.0, epsilon = 1e-12);
        assert_abs_diff_eq!(Angle::from_degrees(180.0).to_radians(), PI, epsilon = 1e-12);
    }
}
