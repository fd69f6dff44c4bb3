//! Fusion policy
//!
//! Decides one [`Decision`] per reading by walking a fixed, ordered rule
//! table. The first rule whose predicate holds produces the outcome:
//!
//! 1. `no_cry` - cry volume below the idle threshold → `Idle` at 1.0.
//!    The classifier is not consulted.
//! 2. `stress_override` - tachycardia with high motion → `Stress` at 0.95.
//! 3. `sleepy_confirmation` - low heart rate, low motion, quiet cry →
//!    `Sleepy` at 0.9.
//! 4. `low_confidence` - classifier confidence below 0.55 → `Uncertain`
//!    with the rounded confidence.
//! 5. `trust_classifier` - the classifier's label with its rounded confidence.
//!
//! The classifier is scored exactly once, just before the first rule that
//! runs after it, even if that rule ignores its opinion. All comparisons are
//! strict.

use crate::config::FusionConfig;
use crate::error::FusionError;
use crate::model::ProbabilityProvider;
use crate::reading::SensorReading;
use crate::types::{ClassifierOutput, Decision, Diagnostic, InferenceState, RuleId};

/// Confidence reported for silence
pub const IDLE_CONFIDENCE: f64 = 1.0;

/// Whether a rule runs before or after the classifier is scored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    BeforeClassifier,
    AfterClassifier,
}

/// What the classifier contributed to the current call
#[derive(Debug, Clone, PartialEq)]
pub enum Evidence {
    NotScored,
    Scored(ClassifierOutput),
    Failed(String),
}

impl Evidence {
    /// Classifier confidence; a failed classification counts as zero
    pub fn confidence(&self) -> f64 {
        match self {
            Evidence::Scored(output) => output.confidence,
            Evidence::NotScored | Evidence::Failed(_) => 0.0,
        }
    }
}

/// One entry of the cascade
pub struct Rule {
    pub id: RuleId,
    pub stage: Stage,
    pub applies: fn(&FusionConfig, &SensorReading, &Evidence) -> bool,
    pub outcome: fn(&FusionConfig, &Evidence) -> (InferenceState, f64),
}

impl Rule {
    pub fn matches(&self, config: &FusionConfig, reading: &SensorReading, evidence: &Evidence) -> bool {
        (self.applies)(config, reading, evidence)
    }
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule")
            .field("id", &self.id)
            .field("stage", &self.stage)
            .finish()
    }
}

/// The cascade, in priority order
pub static RULES: [Rule; 5] = [
    Rule {
        id: RuleId::NoCry,
        stage: Stage::BeforeClassifier,
        applies: |config, reading, _| reading.cry_volume < config.idle_cry_volume,
        outcome: |_, _| (InferenceState::Idle, IDLE_CONFIDENCE),
    },
    Rule {
        id: RuleId::StressOverride,
        stage: Stage::AfterClassifier,
        applies: |config, reading, _| {
            reading.heart_rate > config.stress_heart_rate
                && reading.motion_intensity > config.stress_motion
        },
        outcome: |config, _| (InferenceState::Stress, config.stress_confidence),
    },
    Rule {
        id: RuleId::SleepyConfirmation,
        stage: Stage::AfterClassifier,
        applies: |config, reading, _| {
            reading.heart_rate < config.sleepy_heart_rate
                && reading.motion_intensity < config.sleepy_motion
                && reading.cry_volume < config.sleepy_cry_volume
        },
        outcome: |config, _| (InferenceState::Sleepy, config.sleepy_confidence),
    },
    Rule {
        id: RuleId::LowConfidence,
        stage: Stage::AfterClassifier,
        applies: |config, _, evidence| evidence.confidence() < config.min_classifier_confidence,
        outcome: |_, evidence| {
            (
                InferenceState::Uncertain,
                round_confidence(evidence.confidence()),
            )
        },
    },
    Rule {
        id: RuleId::TrustClassifier,
        stage: Stage::AfterClassifier,
        applies: |_, _, _| true,
        outcome: |_, evidence| match evidence {
            Evidence::Scored(output) => (
                InferenceState::from(output.label),
                round_confidence(output.confidence),
            ),
            // Unreachable while min_classifier_confidence > 0
            Evidence::NotScored | Evidence::Failed(_) => {
                (InferenceState::Uncertain, round_confidence(evidence.confidence()))
            }
        },
    },
];

/// Round to two decimals, half-to-even on the exact binary value
pub fn round_confidence(value: f64) -> f64 {
    if !value.is_finite() {
        return value;
    }
    format!("{:.2}", value).parse().unwrap_or(value)
}

/// Rule cascade bound to a classifier and a set of thresholds
#[derive(Debug, Clone)]
pub struct FusionPolicy {
    provider: ProbabilityProvider,
    config: FusionConfig,
}

impl FusionPolicy {
    /// Create a policy with the trained default thresholds
    pub fn new(provider: ProbabilityProvider) -> Self {
        Self {
            provider,
            config: FusionConfig::default(),
        }
    }

    /// Create a policy with custom thresholds (validated)
    pub fn with_config(
        provider: ProbabilityProvider,
        config: FusionConfig,
    ) -> Result<Self, FusionError> {
        config.validate()?;
        Ok(Self { provider, config })
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    pub fn provider(&self) -> &ProbabilityProvider {
        &self.provider
    }

    pub fn rules(&self) -> &'static [Rule] {
        &RULES
    }

    /// Decide the state for one reading
    pub fn decide(&self, reading: &SensorReading) -> Decision {
        let mut evidence = Evidence::NotScored;

        for rule in RULES.iter() {
            if rule.stage == Stage::AfterClassifier && matches!(evidence, Evidence::NotScored) {
                evidence = self.score(reading);
            }

            if rule.matches(&self.config, reading, &evidence) {
                let (state, confidence) = (rule.outcome)(&self.config, &evidence);
                log::debug!(
                    "Rule {} fired: {} ({:.2})",
                    rule.id.as_str(),
                    state,
                    confidence
                );

                let decision = Decision::new(state, confidence, rule.id);
                return match evidence {
                    Evidence::Failed(message) => {
                        decision.with_diagnostic(Diagnostic::ClassificationFailed { message })
                    }
                    _ => decision,
                };
            }
        }

        // The last rule always applies
        unreachable!("rule cascade ended without a decision")
    }

    fn score(&self, reading: &SensorReading) -> Evidence {
        match self.provider.predict(reading.cry_volume, reading.cry_frequency) {
            Ok(output) => Evidence::Scored(output),
            Err(e) => {
                log::warn!("Classifier failed, treating confidence as zero: {}", e);
                Evidence::Failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ProbabilityModel;
    use crate::types::ClassLabel;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Returns a fixed vector and counts how often it is asked
    struct CountingModel {
        probabilities: Vec<f64>,
        calls: AtomicUsize,
    }

    impl CountingModel {
        fn new(probabilities: Vec<f64>) -> Arc<Self> {
            Arc::new(Self {
                probabilities,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl ProbabilityModel for CountingModel {
        fn predict_proba(&self, _features: &[f64; 2]) -> Result<Vec<f64>, FusionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.probabilities.clone())
        }

        fn describe(&self) -> String {
            "counting stub".to_string()
        }
    }

    struct BrokenModel;

    impl ProbabilityModel for BrokenModel {
        fn predict_proba(&self, _features: &[f64; 2]) -> Result<Vec<f64>, FusionError> {
            Err(FusionError::Classification("model exploded".to_string()))
        }

        fn describe(&self) -> String {
            "broken stub".to_string()
        }
    }

    fn policy_with(model: Arc<dyn ProbabilityModel>) -> FusionPolicy {
        FusionPolicy::new(ProbabilityProvider::new(model))
    }

    /// Reading that skips both override rules
    fn neutral_reading() -> SensorReading {
        SensorReading {
            cry_volume: 0.6,
            cry_frequency: 0.4,
            motion_intensity: 0.5,
            restlessness: 0.3,
            heart_rate: 130,
            heart_rate_trend: 0,
            hr_variability: 0.2,
        }
    }

    #[test]
    fn test_no_cry_skips_classifier() {
        let model = CountingModel::new(vec![0.0, 0.0, 0.0, 1.0]);
        let policy = policy_with(model.clone());

        let reading = SensorReading {
            cry_volume: 0.02,
            cry_frequency: 0.5,
            motion_intensity: 0.1,
            restlessness: 0.1,
            heart_rate: 100,
            heart_rate_trend: 0,
            hr_variability: 0.1,
        };
        let decision = policy.decide(&reading);

        assert_eq!(decision.state, InferenceState::Idle);
        assert_eq!(decision.confidence, 1.0);
        assert_eq!(decision.rule, RuleId::NoCry);
        assert_eq!(model.calls(), 0);

        // Even an alarming heart rate is ignored without a cry
        let reading = SensorReading {
            heart_rate: 190,
            motion_intensity: 0.95,
            cry_volume: 0.0,
            ..reading
        };
        assert_eq!(policy.decide(&reading).state, InferenceState::Idle);
        assert_eq!(model.calls(), 0);
    }

    #[test]
    fn test_idle_threshold_is_strict() {
        let model = CountingModel::new(vec![0.9, 0.1, 0.0, 0.0]);
        let policy = policy_with(model.clone());

        let reading = SensorReading {
            cry_volume: 0.05,
            ..neutral_reading()
        };
        let decision = policy.decide(&reading);

        assert_ne!(decision.state, InferenceState::Idle);
        assert_eq!(model.calls(), 1);
    }

    #[test]
    fn test_stress_override() {
        let model = CountingModel::new(vec![0.9, 0.1, 0.0, 0.0]);
        let policy = policy_with(model.clone());

        let reading = SensorReading {
            cry_volume: 0.5,
            cry_frequency: 0.4,
            motion_intensity: 0.8,
            restlessness: 0.5,
            heart_rate: 160,
            heart_rate_trend: 5,
            hr_variability: 0.2,
        };
        let decision = policy.decide(&reading);

        assert_eq!(
            decision,
            Decision::new(InferenceState::Stress, 0.95, RuleId::StressOverride)
        );
        // Scored once even though the override ignores it
        assert_eq!(model.calls(), 1);
    }

    #[test]
    fn test_stress_override_beats_low_confidence() {
        let policy = policy_with(CountingModel::new(vec![0.3, 0.3, 0.2, 0.2]));
        let reading = SensorReading {
            heart_rate: 151,
            motion_intensity: 0.71,
            ..neutral_reading()
        };

        assert_eq!(policy.decide(&reading).state, InferenceState::Stress);
    }

    #[test]
    fn test_stress_thresholds_are_strict() {
        let policy = policy_with(CountingModel::new(vec![0.9, 0.1, 0.0, 0.0]));

        let at_hr = SensorReading {
            heart_rate: 150,
            motion_intensity: 0.9,
            ..neutral_reading()
        };
        assert_eq!(policy.decide(&at_hr).state, InferenceState::Hungry);

        let at_motion = SensorReading {
            heart_rate: 170,
            motion_intensity: 0.7,
            ..neutral_reading()
        };
        assert_eq!(policy.decide(&at_motion).state, InferenceState::Hungry);
    }

    #[test]
    fn test_sleepy_confirmation() {
        let policy = policy_with(CountingModel::new(vec![0.9, 0.1, 0.0, 0.0]));

        for cry_volume in [0.05, 0.1, 0.19] {
            let reading = SensorReading {
                cry_volume,
                heart_rate: 100,
                motion_intensity: 0.2,
                ..neutral_reading()
            };
            assert_eq!(
                policy.decide(&reading),
                Decision::new(InferenceState::Sleepy, 0.9, RuleId::SleepyConfirmation)
            );
        }
    }

    #[test]
    fn test_sleepy_thresholds_are_strict() {
        let policy = policy_with(CountingModel::new(vec![0.1, 0.1, 0.8, 0.0]));
        let base = SensorReading {
            cry_volume: 0.1,
            heart_rate: 100,
            motion_intensity: 0.2,
            ..neutral_reading()
        };

        for reading in [
            SensorReading {
                heart_rate: 110,
                ..base
            },
            SensorReading {
                motion_intensity: 0.3,
                ..base
            },
            SensorReading {
                cry_volume: 0.2,
                ..base
            },
        ] {
            assert_eq!(policy.decide(&reading).state, InferenceState::Discomfort);
        }
    }

    #[test]
    fn test_low_confidence_fallback() {
        let policy = policy_with(CountingModel::new(vec![0.1, 0.1, 0.1, 0.1]));
        let decision = policy.decide(&neutral_reading());

        assert_eq!(
            decision,
            Decision::new(InferenceState::Uncertain, 0.1, RuleId::LowConfidence)
        );
        assert!(!decision.is_degraded());
    }

    #[test]
    fn test_low_confidence_rounds() {
        let policy = policy_with(CountingModel::new(vec![0.3, 0.5467, 0.1533, 0.0]));
        let decision = policy.decide(&neutral_reading());

        assert_eq!(decision.state, InferenceState::Uncertain);
        assert_eq!(decision.confidence, 0.55);
    }

    #[test]
    fn test_confidence_threshold_is_inclusive_for_trust() {
        let policy = policy_with(CountingModel::new(vec![0.15, 0.15, 0.15, 0.55]));
        let decision = policy.decide(&neutral_reading());

        assert_eq!(
            decision,
            Decision::new(InferenceState::Stress, 0.55, RuleId::TrustClassifier)
        );
    }

    #[test]
    fn test_trust_classifier() {
        let policy = policy_with(CountingModel::new(vec![0.05, 0.12345, 0.82655, 0.0]));
        let decision = policy.decide(&neutral_reading());

        assert_eq!(decision.state, InferenceState::Discomfort);
        assert_eq!(decision.confidence, 0.83);
        assert_eq!(decision.rule, RuleId::TrustClassifier);
    }

    #[test]
    fn test_each_classifier_label_passes_through() {
        for label in ClassLabel::ALL {
            let mut probabilities = vec![0.0; 4];
            probabilities[label.index()] = 1.0;
            let policy = policy_with(CountingModel::new(probabilities));

            let decision = policy.decide(&neutral_reading());
            assert_eq!(decision.state, InferenceState::from(label));
            assert_eq!(decision.confidence, 1.0);
        }
    }

    #[test]
    fn test_classification_failure_degrades_to_uncertain() {
        let policy = policy_with(Arc::new(BrokenModel));
        let decision = policy.decide(&neutral_reading());

        assert_eq!(decision.state, InferenceState::Uncertain);
        assert_eq!(decision.confidence, 0.0);
        assert_eq!(decision.rule, RuleId::LowConfidence);
        assert!(matches!(
            decision.diagnostic,
            Some(Diagnostic::ClassificationFailed { ref message }) if message.contains("model exploded")
        ));
    }

    #[test]
    fn test_non_finite_frequency_degrades() {
        let policy = policy_with(CountingModel::new(vec![1.0, 0.0, 0.0, 0.0]));
        let reading = SensorReading {
            cry_frequency: f64::NAN,
            ..neutral_reading()
        };

        let decision = policy.decide(&reading);
        assert_eq!(decision.state, InferenceState::Uncertain);
        assert!(decision.is_degraded());
    }

    #[test]
    fn test_out_of_range_probability_degrades() {
        let policy = policy_with(CountingModel::new(vec![2.5, 0.0, 0.0, 0.0]));
        let decision = policy.decide(&neutral_reading());

        assert_eq!(decision.state, InferenceState::Uncertain);
        assert_eq!(decision.confidence, 0.0);
        assert!(decision.is_degraded());
    }

    #[test]
    fn test_overrides_still_apply_when_classifier_fails() {
        let policy = policy_with(Arc::new(BrokenModel));
        let reading = SensorReading {
            heart_rate: 165,
            motion_intensity: 0.9,
            ..neutral_reading()
        };

        let decision = policy.decide(&reading);
        assert_eq!(decision.state, InferenceState::Stress);
        assert_eq!(decision.confidence, 0.95);
        assert!(decision.is_degraded());
    }

    #[test]
    fn test_decide_is_idempotent() {
        let model = CountingModel::new(vec![0.2, 0.6, 0.1, 0.1]);
        let policy = policy_with(model.clone());
        let reading = neutral_reading();

        let first = policy.decide(&reading);
        let second = policy.decide(&reading);

        assert_eq!(first, second);
        assert_eq!(model.calls(), 2);
    }

    #[test]
    fn test_rule_table_order() {
        let ids: Vec<RuleId> = RULES.iter().map(|r| r.id).collect();
        assert_eq!(
            ids,
            vec![
                RuleId::NoCry,
                RuleId::StressOverride,
                RuleId::SleepyConfirmation,
                RuleId::LowConfidence,
                RuleId::TrustClassifier,
            ]
        );
        assert_eq!(RULES[0].stage, Stage::BeforeClassifier);
        assert!(RULES[1..].iter().all(|r| r.stage == Stage::AfterClassifier));
    }

    #[test]
    fn test_rules_match_individually() {
        let config = FusionConfig::default();
        let scored = Evidence::Scored(ClassifierOutput {
            label: ClassLabel::Hungry,
            confidence: 0.4,
            probabilities: [0.4, 0.3, 0.2, 0.1],
        });
        let reading = neutral_reading();

        assert!(!RULES[0].matches(&config, &reading, &scored));
        assert!(!RULES[1].matches(&config, &reading, &scored));
        assert!(!RULES[2].matches(&config, &reading, &scored));
        assert!(RULES[3].matches(&config, &reading, &scored));
        assert!(RULES[4].matches(&config, &reading, &scored));
        assert!(RULES[3].matches(&config, &reading, &Evidence::Failed("x".to_string())));
    }

    #[test]
    fn test_custom_config() {
        let config = FusionConfig {
            min_classifier_confidence: 0.7,
            ..FusionConfig::default()
        };
        let provider = ProbabilityProvider::new(CountingModel::new(vec![0.6, 0.2, 0.1, 0.1]));
        let policy = FusionPolicy::with_config(provider, config).unwrap();

        assert_eq!(policy.decide(&neutral_reading()).state, InferenceState::Uncertain);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = FusionConfig {
            min_classifier_confidence: 0.0,
            ..FusionConfig::default()
        };
        let provider = ProbabilityProvider::new(CountingModel::new(vec![0.25; 4]));
        assert!(FusionPolicy::with_config(provider, config).is_err());
    }

    #[test]
    fn test_round_confidence() {
        assert_eq!(round_confidence(0.1), 0.1);
        assert_eq!(round_confidence(0.6666), 0.67);
        assert_eq!(round_confidence(0.994), 0.99);
        assert_eq!(round_confidence(0.996), 1.0);
        // Exact binary ties round to even
        assert_eq!(round_confidence(0.125), 0.12);
        assert_eq!(round_confidence(0.375), 0.38);
    }

    #[test]
    fn test_policy_is_shareable_across_threads() {
        let policy = Arc::new(policy_with(CountingModel::new(vec![0.1, 0.7, 0.1, 0.1])));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let policy = Arc::clone(&policy);
                std::thread::spawn(move || policy.decide(&neutral_reading()))
            })
            .collect();

        for handle in handles {
            let decision = handle.join().unwrap();
            assert_eq!(decision.state, InferenceState::Sleepy);
            assert_eq!(decision.rule, RuleId::TrustClassifier);
        }
    }
}
