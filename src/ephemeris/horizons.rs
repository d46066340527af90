//! JPL Horizons batch interface
//!
//! Observer tables are requested from the Horizons batch CGI in CSV form with
//! quantities 1,2,3,4,9,13 (astrometric and apparent RA/Dec, rates, apparent
//! magnitude and angular diameter). The data row sits between the `$$SOE`
//! and `$$EOE` markers.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{EphemerisFix, EphemerisSource, Target, TimeWindow};
use crate::{FinderError, Result};

/// Default Horizons batch endpoint
pub const HORIZONS_URL: &str = "https://ssd.jpl.nasa.gov/horizons_batch.cgi";

/// Marker for values Horizons cannot provide
const NOT_AVAILABLE: &str = "n.a.";

// CSV columns of interest for QUANTITIES='1,2,3,4,9,13'
const COLUMN_RA: usize = 3;
const COLUMN_DEC: usize = 4;
const COLUMN_MAGNITUDE: usize = 11;
const COLUMN_DIAMETER: usize = 13;

/// Horizons connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HorizonsConfig {
    pub base_url: String,
    /// Per-request timeout
    pub timeout_secs: u64,
    /// Length of the requested time window
    pub window_minutes: i64,
    /// Observer location, `geo` for the geocenter
    pub center: String,
    pub step_size: String,
}

impl Default for HorizonsConfig {
    fn default() -> Self {
        HorizonsConfig {
            base_url: HORIZONS_URL.to_string(),
            timeout_secs: 30,
            window_minutes: 1,
            center: "geo".to_string(),
            step_size: "1m".to_string(),
        }
    }
}

/// Blocking client for the Horizons batch interface
#[derive(Debug)]
pub struct HorizonsClient {
    client: reqwest::blocking::Client,
    config: HorizonsConfig,
}

impl HorizonsClient {
    pub fn new(config: HorizonsConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| FinderError::Config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(HorizonsClient { client, config })
    }

    /// Query parameters for one observer-table request
    pub fn query(&self, target: &Target, window: &TimeWindow) -> Vec<(&'static str, String)> {
        let quoted = |value: &str| format!("'{}'", value);
        vec![
            ("batch", "1".to_string()),
            ("COMMAND", quoted(&target.horizons_id)),
            ("TABLE_TYPE", quoted("OBSERVER")),
            ("CENTER", quoted(&self.config.center)),
            ("START_TIME", quoted(&window.horizons_start())),
            ("STOP_TIME", quoted(&window.horizons_stop())),
            ("STEP_SIZE", quoted(&self.config.step_size)),
            ("QUANTITIES", quoted("1,2,3,4,9,13")),
            ("CSV_FORMAT", quoted("YES")),
        ]
    }

    fn request(&self, target: &Target, window: &TimeWindow) -> Result<String> {
        let retryable = |message: String| FinderError::RetryableFetch {
            target: target.name.clone(),
            attempts: 1,
            message,
        };

        let response = self
            .client
            .get(&self.config.base_url)
            .query(&self.query(target, window))
            .send()
            .map_err(|e| retryable(format!("request failed: {}", e)))?;

        let status = response.status();
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(retryable(format!("Horizons returned {}", status)));
        }
        if !status.is_success() {
            return Err(FinderError::FetchFailed {
                target: target.name.clone(),
                message: format!("Horizons returned {}", status),
            });
        }

        response
            .text()
            .map_err(|e| retryable(format!("failed to read response: {}", e)))
    }
}

impl EphemerisSource for HorizonsClient {
    fn fetch(&mut self, target: &Target, window: &TimeWindow) -> Result<EphemerisFix> {
        log::debug!("Requesting {} ({}) for {}", target.name, target.horizons_id, window);
        let body = self.request(target, window)?;
        parse_observer_csv(&body, &target.name)
    }
}

/// Extract the first ephemeris row of a Horizons CSV observer table
///
/// Space-separated sexagesimal fields (`20 04 28.46`) are rejoined with
/// colons. `n.a.` magnitudes and diameters become `None`.
pub fn parse_observer_csv(body: &str, target: &str) -> Result<EphemerisFix> {
    let failed = |message: String| FinderError::FetchFailed {
        target: target.to_string(),
        message,
    };

    let row = body
        .lines()
        .map(str::trim)
        .skip_while(|line| *line != "$$SOE")
        .nth(1)
        .filter(|line| *line != "$$EOE" && !line.is_empty())
        .ok_or_else(|| failed("no ephemeris rows between $$SOE and $$EOE".to_string()))?;

    let fields: Vec<&str> = row.split(',').map(str::trim).collect();
    if fields.len() <= COLUMN_DIAMETER {
        return Err(failed(format!(
            "expected at least {} columns, got {}: {:?}",
            COLUMN_DIAMETER + 1,
            fields.len(),
            row
        )));
    }

    let sexagesimal = |field: &str| field.split_whitespace().collect::<Vec<_>>().join(":");
    let ra = sexagesimal(fields[COLUMN_RA]);
    let dec = sexagesimal(fields[COLUMN_DEC]);
    if ra.is_empty() || dec.is_empty() {
        return Err(failed(format!("empty RA/Dec in {:?}", row)));
    }

    Ok(EphemerisFix {
        ra,
        dec,
        magnitude: optional_value(fields[COLUMN_MAGNITUDE], "magnitude", target),
        diameter: optional_value(fields[COLUMN_DIAMETER], "angular diameter", target),
    })
}

fn optional_value(field: &str, name: &str, target: &str) -> Option<f64> {
    if field == NOT_AVAILABLE || field.is_empty() {
        return None;
    }
    match field.parse::<f64>() {
        Ok(value) => Some(value),
        Err(_) => {
            log::warn!("Unparseable {} {:?} for {}, storing none", name, field, target);
            None
        }
    }
}
