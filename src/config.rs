//! Fusion policy configuration
//!
//! The defaults are the thresholds the classifier was trained against and
//! must not drift; overriding them is meant for experiments only.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::FusionError;

/// Cry volume below which the reading is treated as silence
pub const DEFAULT_IDLE_CRY_VOLUME: f64 = 0.05;
/// Heart rate above which (with high motion) stress is asserted
pub const DEFAULT_STRESS_HEART_RATE: i64 = 150;
pub const DEFAULT_STRESS_MOTION: f64 = 0.7;
pub const DEFAULT_STRESS_CONFIDENCE: f64 = 0.95;
/// Heart rate below which (with low motion and a quiet cry) sleepiness is asserted
pub const DEFAULT_SLEEPY_HEART_RATE: i64 = 110;
pub const DEFAULT_SLEEPY_MOTION: f64 = 0.3;
pub const DEFAULT_SLEEPY_CRY_VOLUME: f64 = 0.2;
pub const DEFAULT_SLEEPY_CONFIDENCE: f64 = 0.9;
/// Classifier confidence below which its label is discarded
pub const DEFAULT_MIN_CLASSIFIER_CONFIDENCE: f64 = 0.55;

/// Thresholds and literal confidences used by the rule cascade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    pub idle_cry_volume: f64,
    pub stress_heart_rate: i64,
    pub stress_motion: f64,
    pub stress_confidence: f64,
    pub sleepy_heart_rate: i64,
    pub sleepy_motion: f64,
    pub sleepy_cry_volume: f64,
    pub sleepy_confidence: f64,
    pub min_classifier_confidence: f64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            idle_cry_volume: DEFAULT_IDLE_CRY_VOLUME,
            stress_heart_rate: DEFAULT_STRESS_HEART_RATE,
            stress_motion: DEFAULT_STRESS_MOTION,
            stress_confidence: DEFAULT_STRESS_CONFIDENCE,
            sleepy_heart_rate: DEFAULT_SLEEPY_HEART_RATE,
            sleepy_motion: DEFAULT_SLEEPY_MOTION,
            sleepy_cry_volume: DEFAULT_SLEEPY_CRY_VOLUME,
            sleepy_confidence: DEFAULT_SLEEPY_CONFIDENCE,
            min_classifier_confidence: DEFAULT_MIN_CLASSIFIER_CONFIDENCE,
        }
    }
}

impl FusionConfig {
    /// Parse from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self, FusionError> {
        let config: FusionConfig = serde_json::from_str(json)
            .map_err(|e| FusionError::Config(format!("malformed config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, FusionError> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> Result<String, FusionError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// True if every value equals the trained defaults
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }

    pub fn validate(&self) -> Result<(), FusionError> {
        for (name, value) in [
            ("idle_cry_volume", self.idle_cry_volume),
            ("stress_motion", self.stress_motion),
            ("stress_confidence", self.stress_confidence),
            ("sleepy_motion", self.sleepy_motion),
            ("sleepy_cry_volume", self.sleepy_cry_volume),
            ("sleepy_confidence", self.sleepy_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(FusionError::Config(format!(
                    "{} = {} must be within [0, 1]",
                    name, value
                )));
            }
        }

        // A zero threshold would let a failed classification through as a label
        if !(self.min_classifier_confidence > 0.0 && self.min_classifier_confidence <= 1.0) {
            return Err(FusionError::Config(format!(
                "min_classifier_confidence = {} must be within (0, 1]",
                self.min_classifier_confidence
            )));
        }

        if self.sleepy_heart_rate <= 0 || self.stress_heart_rate <= 0 {
            return Err(FusionError::Config(
                "heart rate thresholds must be positive".to_string(),
            ));
        }

        if self.sleepy_heart_rate > self.stress_heart_rate {
            return Err(FusionError::Config(format!(
                "sleepy_heart_rate ({}) must not exceed stress_heart_rate ({})",
                self.sleepy_heart_rate, self.stress_heart_rate
            )));
        }

        if self.idle_cry_volume >= self.sleepy_cry_volume {
            return Err(FusionError::Config(format!(
                "idle_cry_volume ({}) must be below sleepy_cry_volume ({})",
                self.idle_cry_volume, self.sleepy_cry_volume
            )));
        }

        Ok(())
    }
}
