//! Engine orchestration
//!
//! This module provides the public entry points for Cradle Fusion. It wires a
//! loaded classifier into a fusion policy and turns readings into reports for
//! whatever forwards results to the parent band.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::config::FusionConfig;
use crate::error::FusionError;
use crate::model::{ForestModel, ProbabilityModel, ProbabilityProvider};
use crate::policy::{round_confidence, FusionPolicy};
use crate::reading::SensorReading;
use crate::types::{Decision, DecisionReport, Producer};
use crate::{ENGINE_VERSION, PRODUCER_NAME};

/// Decide one reading against a forest artifact, both given as JSON.
///
/// # Arguments
/// * `model_json` - A `cradle.forest.v1` artifact
/// * `reading_json` - One sensor reading
///
/// # Returns
/// The decision report as JSON
///
/// # Example
/// ```ignore
/// let report = decide_json(forest_json, r#"{"cry_volume": 0.5, ...}"#.to_string())?;
/// ```
pub fn decide_json(model_json: String, reading_json: String) -> Result<String, FusionError> {
    let engine = FusionEngine::from_model_json(&model_json)?;
    engine.process_json(&reading_json)
}

/// Long-lived engine holding one loaded classifier.
///
/// Load it once at startup and share it; `decide` takes `&self` and never
/// mutates anything.
#[derive(Debug, Clone)]
pub struct FusionEngine {
    policy: FusionPolicy,
    instance_id: String,
}

impl FusionEngine {
    /// Create an engine around an existing policy
    pub fn new(policy: FusionPolicy) -> Self {
        Self::with_instance_id(policy, Uuid::new_v4().to_string())
    }

    /// Create an engine with a specific producer instance ID
    pub fn with_instance_id(policy: FusionPolicy, instance_id: String) -> Self {
        Self {
            policy,
            instance_id,
        }
    }

    /// Create an engine from any model with the default thresholds
    pub fn from_model(model: Arc<dyn ProbabilityModel>) -> Self {
        Self::new(FusionPolicy::new(ProbabilityProvider::new(model)))
    }

    /// Load a forest artifact from JSON
    pub fn from_model_json(json: &str) -> Result<Self, FusionError> {
        let forest = ForestModel::from_json(json)?;
        Ok(Self::from_model(Arc::new(forest)))
    }

    /// Load a forest artifact from disk, optionally with custom thresholds
    pub fn from_model_path(path: &Path, config: Option<FusionConfig>) -> Result<Self, FusionError> {
        let forest = ForestModel::from_path(path)?;
        let provider = ProbabilityProvider::new(Arc::new(forest));
        let policy = match config {
            Some(config) => {
                if !config.is_default() {
                    log::warn!("Using non-default fusion thresholds");
                }
                FusionPolicy::with_config(provider, config)?
            }
            None => FusionPolicy::new(provider),
        };
        Ok(Self::new(policy))
    }

    pub fn policy(&self) -> &FusionPolicy {
        &self.policy
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn producer(&self) -> Producer {
        Producer {
            name: PRODUCER_NAME.to_string(),
            version: ENGINE_VERSION.to_string(),
            instance_id: self.instance_id.clone(),
        }
    }

    pub fn decide(&self, reading: &SensorReading) -> Decision {
        self.policy.decide(reading)
    }

    /// Decide a reading and attach timestamp, heart rate and producer
    pub fn report(&self, reading: &SensorReading) -> DecisionReport {
        let decision = self.decide(reading);

        DecisionReport {
            timestamp: Utc::now().to_rfc3339(),
            state: decision.state,
            confidence: round_confidence(decision.confidence),
            bpm: reading.heart_rate,
            rule: decision.rule,
            diagnostic: decision.diagnostic,
            producer: self.producer(),
        }
    }

    /// Report on every reading of a batch, in order
    pub fn report_batch(&self, readings: &[SensorReading]) -> Vec<DecisionReport> {
        readings.iter().map(|r| self.report(r)).collect()
    }

    /// Parse one JSON reading and return its report as JSON
    pub fn process_json(&self, reading_json: &str) -> Result<String, FusionError> {
        let reading: SensorReading = serde_json::from_str(reading_json)
            .map_err(|e| FusionError::InvalidReading(e.to_string()))?;
        let report = self.report(&reading);
        Ok(serde_json::to_string(&report)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{InferenceState, RuleId};

    const SAMPLE_FOREST: &str = include_str!("../models/sample_forest.json");

    fn stress_reading_json() -> &'static str {
        r#"{
            "cry_volume": 0.5,
            "cry_frequency": 0.4,
            "motion_intensity": 0.8,
            "restlessness": 0.5,
            "heart_rate": 160,
            "heart_rate_trend": 5,
            "hr_variability": 0.2
        }"#
    }

    fn quiet_reading() -> SensorReading {
        SensorReading {
            cry_volume: 0.02,
            cry_frequency: 0.5,
            motion_intensity: 0.1,
            restlessness: 0.1,
            heart_rate: 100,
            heart_rate_trend: 0,
            hr_variability: 0.1,
        }
    }

    #[test]
    fn test_decide_json() {
        let result = decide_json(SAMPLE_FOREST.to_string(), stress_reading_json().to_string());
        assert!(result.is_ok());

        let report: serde_json::Value = serde_json::from_str(&result.unwrap()).unwrap();
        assert_eq!(report["state"], "Stress");
        assert_eq!(report["confidence"], 0.95);
        assert_eq!(report["bpm"], 160);
        assert_eq!(report["rule"], "stress_override");
        assert_eq!(report["producer"]["name"], "cradle-fusion");
        assert!(report.get("diagnostic").is_none());
    }

    #[test]
    fn test_report_carries_heart_rate() {
        let engine = FusionEngine::from_model_json(SAMPLE_FOREST).unwrap();
        let report = engine.report(&quiet_reading());

        assert_eq!(report.state, InferenceState::Idle);
        assert_eq!(report.confidence, 1.0);
        assert_eq!(report.bpm, 100);
        assert_eq!(report.rule, RuleId::NoCry);
        assert!(chrono::DateTime::parse_from_rfc3339(&report.timestamp).is_ok());
    }

    #[test]
    fn test_forest_decisions_are_consistent() {
        let engine = FusionEngine::from_model_json(SAMPLE_FOREST).unwrap();
        let reading = SensorReading {
            cry_volume: 0.85,
            cry_frequency: 0.3,
            motion_intensity: 0.5,
            heart_rate: 130,
            ..quiet_reading()
        };

        let decision = engine.decide(&reading);
        assert!(matches!(
            decision.rule,
            RuleId::LowConfidence | RuleId::TrustClassifier
        ));
        assert!((0.0..=1.0).contains(&decision.confidence));
        assert_eq!(decision, engine.decide(&reading));
    }

    #[test]
    fn test_instance_id_is_stable() {
        let engine = FusionEngine::from_model_json(SAMPLE_FOREST).unwrap();
        let first = engine.report(&quiet_reading());
        let second = engine.report(&quiet_reading());

        assert_eq!(first.producer.instance_id, engine.instance_id());
        assert_eq!(first.producer, second.producer);
    }

    #[test]
    fn test_report_batch_preserves_order() {
        let engine = FusionEngine::from_model_json(SAMPLE_FOREST).unwrap();
        let stress: SensorReading = serde_json::from_str(stress_reading_json()).unwrap();

        let reports = engine.report_batch(&[quiet_reading(), stress, quiet_reading()]);
        let states: Vec<InferenceState> = reports.iter().map(|r| r.state).collect();
        assert_eq!(
            states,
            vec![
                InferenceState::Idle,
                InferenceState::Stress,
                InferenceState::Idle
            ]
        );
    }

    #[test]
    fn test_invalid_reading_json() {
        let engine = FusionEngine::from_model_json(SAMPLE_FOREST).unwrap();
        let result = engine.process_json(r#"{"cry_volume": "loud"}"#);
        assert!(matches!(result, Err(FusionError::InvalidReading(_))));
    }

    #[test]
    fn test_invalid_model_is_fatal() {
        let result = decide_json("{}".to_string(), stress_reading_json().to_string());
        assert!(matches!(result, Err(FusionError::ModelLoad(_))));
    }

    #[test]
    fn test_with_instance_id() {
        let policy = FusionEngine::from_model_json(SAMPLE_FOREST)
            .unwrap()
            .policy()
            .clone();
        let engine = FusionEngine::with_instance_id(policy, "band-01".to_string());
        assert_eq!(engine.report(&quiet_reading()).producer.instance_id, "band-01");
    }
}
