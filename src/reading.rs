//! Sensor reading input
//!
//! One `SensorReading` is the already-extracted feature vector the baby band
//! sends per sample: two cry features from the microphone plus motion and
//! heart-rate features. The fusion policy trusts readings as given; the range
//! checks here are for ingestion layers that want to reject bad samples early.

use crate::error::FusionError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One fused audio + biometric sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    /// Cry loudness (0-1)
    pub cry_volume: f64,
    /// Normalized spectral measure of the cry (>= 0)
    pub cry_frequency: f64,
    /// Motion intensity (0-1)
    pub motion_intensity: f64,
    /// Restlessness (0-1)
    pub restlessness: f64,
    /// Heart rate (bpm)
    pub heart_rate: i64,
    /// Change in heart rate across the recent history (bpm)
    pub heart_rate_trend: i64,
    /// Normalized heart rate variability (>= 0)
    pub hr_variability: f64,
}

impl SensorReading {
    /// Audio features in the order the classifier expects them
    pub fn audio_features(&self) -> [f64; 2] {
        [self.cry_volume, self.cry_frequency]
    }

    /// Check field ranges, reporting the first violation found
    pub fn validate(&self) -> Result<(), ReadingIssue> {
        check_unit("cry_volume", self.cry_volume)?;
        check_non_negative("cry_frequency", self.cry_frequency)?;
        check_unit("motion_intensity", self.motion_intensity)?;
        check_unit("restlessness", self.restlessness)?;
        if self.heart_rate <= 0 {
            return Err(ReadingIssue::NonPositiveHeartRate(self.heart_rate));
        }
        check_non_negative("hr_variability", self.hr_variability)?;
        Ok(())
    }
}

fn check_unit(field: &'static str, value: f64) -> Result<(), ReadingIssue> {
    if !value.is_finite() {
        return Err(ReadingIssue::NonFinite { field });
    }
    if !(0.0..=1.0).contains(&value) {
        return Err(ReadingIssue::OutOfRange {
            field,
            value,
            bounds: "[0, 1]",
        });
    }
    Ok(())
}

fn check_non_negative(field: &'static str, value: f64) -> Result<(), ReadingIssue> {
    if !value.is_finite() {
        return Err(ReadingIssue::NonFinite { field });
    }
    if value < 0.0 {
        return Err(ReadingIssue::OutOfRange {
            field,
            value,
            bounds: ">= 0",
        });
    }
    Ok(())
}

/// Range violation in a sensor reading
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReadingIssue {
    #[error("{field} is not a finite number")]
    NonFinite { field: &'static str },

    #[error("{field} = {value} is outside {bounds}")]
    OutOfRange {
        field: &'static str,
        value: f64,
        bounds: &'static str,
    },

    #[error("heart_rate must be positive, got {0}")]
    NonPositiveHeartRate(i64),
}

/// Parser for batches of readings
pub struct ReadingAdapter;

impl ReadingAdapter {
    /// Parse a JSON array of readings
    pub fn parse_array(json: &str) -> Result<Vec<SensorReading>, FusionError> {
        let readings: Vec<SensorReading> = serde_json::from_str(json)?;
        Ok(readings)
    }

    /// Parse NDJSON, one reading per line; blank lines are skipped
    pub fn parse_ndjson(ndjson: &str) -> Result<Vec<SensorReading>, FusionError> {
        let mut readings = Vec::new();
        for (line_num, line) in ndjson.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<SensorReading>(trimmed) {
                Ok(reading) => readings.push(reading),
                Err(e) => {
                    return Err(FusionError::InvalidReading(format!(
                        "Failed to parse line {}: {}",
                        line_num + 1,
                        e
                    )));
                }
            }
        }
        Ok(readings)
    }

    /// Range-check a batch, returning only the failing entries
    pub fn validate_readings(readings: &[SensorReading]) -> Vec<ValidationResult> {
        readings
            .iter()
            .enumerate()
            .filter_map(|(index, reading)| {
                reading
                    .validate()
                    .err()
                    .map(|issue| ValidationResult { index, issue })
            })
            .collect()
    }
}

/// A reading that failed validation
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    pub index: usize,
    pub issue: ReadingIssue,
}
