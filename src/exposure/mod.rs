//! Exposure metadata
//!
//! Each full-frame exposure contributes its plate solution, frame size,
//! observation time and pointed-at body. Header extraction happens upstream;
//! this crate reads the results from a JSON manifest.

use chrono::NaiveDateTime;
use glob::Pattern;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::coordinates::PlateSolution;
use crate::{FinderError, Result};

/// Header-derived facts about one full-frame exposure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExposureMetadata {
    /// Exposure identifier, usually the rootname
    pub exposure_id: String,
    /// Pointed-at body as written in the header TARGNAME
    pub targname: String,
    /// Start of the observation (UT)
    pub observed_at: NaiveDateTime,
    /// Reference pixel (CRPIX1, CRPIX2)
    #[serde(default)]
    pub ref_pixel: Option<[f64; 2]>,
    /// Sky position of the reference pixel in degrees (CRVAL1, CRVAL2)
    #[serde(default)]
    pub ref_sky: Option<[f64; 2]>,
    /// Arcseconds per pixel
    #[serde(default)]
    pub plate_scale: Option<f64>,
    pub width: u32,
    pub height: u32,
}

impl ExposureMetadata {
    /// Plate solution for sky-to-pixel conversion
    ///
    /// A missing plate scale falls back to `default_scale` when one is given.
    ///
    /// # Errors
    ///
    /// `FinderError::MissingReferencePixel` when the reference pixel,
    /// reference position or plate scale is absent or not a usable number.
    pub fn plate_solution(&self, default_scale: Option<f64>) -> Result<PlateSolution> {
        let missing = |detail: &str| FinderError::MissingReferencePixel {
            exposure: self.exposure_id.clone(),
            detail: detail.to_string(),
        };

        let [ref_pixel_x, ref_pixel_y] = self.ref_pixel.ok_or_else(|| missing("no reference pixel"))?;
        let [ref_ra_deg, ref_dec_deg] = self
            .ref_sky
            .ok_or_else(|| missing("no reference sky position"))?;
        let plate_scale = self
            .plate_scale
            .or(default_scale)
            .ok_or_else(|| missing("no plate scale"))?;

        if ![ref_pixel_x, ref_pixel_y, ref_ra_deg, ref_dec_deg]
            .iter()
            .all(|value| value.is_finite())
        {
            return Err(missing("non-finite reference value"));
        }
        if !(-90.0..=90.0).contains(&ref_dec_deg) {
            return Err(missing("reference declination outside [-90,90]"));
        }
        if !plate_scale.is_finite() || plate_scale <= 0.0 {
            return Err(missing("plate scale must be positive"));
        }

        Ok(PlateSolution {
            ref_pixel_x,
            ref_pixel_y,
            ref_ra_deg,
            ref_dec_deg,
            plate_scale,
        })
    }
}

/// Source of exposure metadata
pub trait ExposureMetadataProvider: Send + Sync {
    /// Metadata for one exposure
    fn get(&self, exposure_id: &str) -> Result<ExposureMetadata>;

    /// All known exposure ids, sorted
    fn exposure_ids(&self) -> Vec<String>;
}

/// Exposure metadata loaded from a JSON array
#[derive(Debug, Clone, Default)]
pub struct ExposureManifest {
    exposures: BTreeMap<String, ExposureMetadata>,
}

impl ExposureManifest {
    pub fn new(exposures: Vec<ExposureMetadata>) -> Result<Self> {
        let mut map = BTreeMap::new();
        for exposure in exposures {
            let id = exposure.exposure_id.clone();
            if map.insert(id.clone(), exposure).is_some() {
                return Err(FinderError::Config(format!(
                    "exposure {} listed more than once",
                    id
                )));
            }
        }
        Ok(ExposureManifest { exposures: map })
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let exposures: Vec<ExposureMetadata> = serde_json::from_reader(BufReader::new(file))?;
        log::info!(
            "Loaded {} exposures from {}",
            exposures.len(),
            path.as_ref().display()
        );
        Self::new(exposures)
    }

    pub fn len(&self) -> usize {
        self.exposures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exposures.is_empty()
    }
}

impl ExposureMetadataProvider for ExposureManifest {
    fn get(&self, exposure_id: &str) -> Result<ExposureMetadata> {
        self.exposures
            .get(exposure_id)
            .cloned()
            .ok_or_else(|| FinderError::UnknownExposure(exposure_id.to_string()))
    }

    fn exposure_ids(&self) -> Vec<String> {
        self.exposures.keys().cloned().collect()
    }
}

/// Compile a shell-style exposure pattern (`*`, `?` and `[...]` classes)
pub fn glob_pattern(pattern: &str) -> Result<Pattern> {
    Pattern::new(pattern)
        .map_err(|e| FinderError::Config(format!("bad exposure pattern {:?}: {}", pattern, e)))
}

/// Exposure ids from `provider` matching a shell-style pattern
pub fn select_matching<P: ExposureMetadataProvider + ?Sized>(
    provider: &P,
    pattern: &str,
) -> Result<Vec<String>> {
    let matcher = glob_pattern(pattern)?;
    Ok(provider
        .exposure_ids()
        .into_iter()
        .filter(|id| matcher.matches(id))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rstest::rstest;
    use std::io::Write;

    fn exposure(id: &str) -> ExposureMetadata {
        ExposureMetadata {
            exposure_id: id.to_string(),
            targname: "JUP-IO".to_string(),
            observed_at: NaiveDate::from_ymd_opt(2009, 7, 23)
                .unwrap()
                .and_hms_opt(14, 5, 0)
                .unwrap(),
            ref_pixel: Some([862.0, 650.0]),
            ref_sky: Some([301.1233313134, -19.93255391992]),
            plate_scale: Some(0.05),
            width: 1725,
            height: 1300,
        }
    }

    #[test]
    fn test_plate_solution() {
        let solution = exposure("ib4v12abq").plate_solution(None).unwrap();
        assert_eq!(solution.ref_pixel_x, 862.0);
        assert_eq!(solution.ref_dec_deg, -19.93255391992);
        assert_eq!(solution.plate_scale, 0.05);
    }

    #[test]
    fn test_missing_reference_data() {
        let mut no_pixel = exposure("a");
        no_pixel.ref_pixel = None;
        assert!(matches!(
            no_pixel.plate_solution(Some(0.05)),
            Err(FinderError::MissingReferencePixel { .. })
        ));

        let mut no_sky = exposure("b");
        no_sky.ref_sky = None;
        assert!(no_sky.plate_solution(Some(0.05)).is_err());

        let mut bad_scale = exposure("c");
        bad_scale.plate_scale = Some(0.0);
        assert!(bad_scale.plate_solution(None).is_err());
    }

    #[test]
    fn test_default_plate_scale_fallback() {
        let mut no_scale = exposure("a");
        no_scale.plate_scale = None;
        assert!(no_scale.plate_solution(None).is_err());
        assert_eq!(no_scale.plate_solution(Some(0.1)).unwrap().plate_scale, 0.1);
    }

    #[rstest]
    #[case("ib4v*", vec!["ib4v12abq", "ib4v12acq"])]
    #[case("*acq", vec!["ib4v12acq"])]
    #[case("ib4v12a?q", vec!["ib4v12abq", "ib4v12acq"])]
    #[case("*", vec!["ib4v12abq", "ib4v12acq", "u2lx0101t"])]
    #[case("u2lx.*", vec![])]
    #[case("ib4v12a[bc]q", vec!["ib4v12abq", "ib4v12acq"])]
    #[case("ib4v12a[!b]q", vec!["ib4v12acq"])]
    fn test_select_matching(#[case] pattern: &str, #[case] expected: Vec<&str>) {
        let manifest = ExposureManifest::new(vec![
            exposure("u2lx0101t"),
            exposure("ib4v12abq"),
            exposure("ib4v12acq"),
        ])
        .unwrap();
        assert_eq!(select_matching(&manifest, pattern).unwrap(), expected);
    }

    #[test]
    fn test_malformed_pattern_is_config_error() {
        let manifest = ExposureManifest::new(vec![exposure("ib4v12abq")]).unwrap();
        assert!(matches!(
            select_matching(&manifest, "ib4v[12"),
            Err(FinderError::Config(_))
        ));
    }

    #[test]
    fn test_manifest_load_and_lookup() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let json = serde_json::to_string(&vec![exposure("ib4v12abq")]).unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let manifest = ExposureManifest::load(file.path()).unwrap();
        assert_eq!(manifest.len(), 1);
        assert_eq!(manifest.get("ib4v12abq").unwrap(), exposure("ib4v12abq"));
        assert!(matches!(
            manifest.get("nope"),
            Err(FinderError::UnknownExposure(_))
        ));
    }

    #[test]
    fn test_duplicate_manifest_entries() {
        assert!(ExposureManifest::new(vec![exposure("a"), exposure("a")]).is_err());
    }
}
