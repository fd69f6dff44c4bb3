//! Core types for the Cradle Fusion engine
//!
//! This module defines the label sets shared between training, the classifier
//! and the fusion policy, plus the records that flow out of a decision:
//! classifier output, the final decision and the report handed to dispatch.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of labels the classifier scores
pub const CLASS_COUNT: usize = 4;

/// Labels produced by the audio classifier, in fixed model output order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClassLabel {
    Hungry,
    Sleepy,
    Discomfort,
    Stress,
}

impl ClassLabel {
    /// All classifier labels in probability vector order
    pub const ALL: [ClassLabel; CLASS_COUNT] = [
        ClassLabel::Hungry,
        ClassLabel::Sleepy,
        ClassLabel::Discomfort,
        ClassLabel::Stress,
    ];

    /// Position of this label in the probability vector
    pub fn index(&self) -> usize {
        match self {
            ClassLabel::Hungry => 0,
            ClassLabel::Sleepy => 1,
            ClassLabel::Discomfort => 2,
            ClassLabel::Stress => 3,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ClassLabel::Hungry => "Hungry",
            ClassLabel::Sleepy => "Sleepy",
            ClassLabel::Discomfort => "Discomfort",
            ClassLabel::Stress => "Stress",
        }
    }
}

impl fmt::Display for ClassLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Labels used when the classifier was fitted.
///
/// Training carries a fifth `Normal` class that the deployed classifier never
/// reports. [`TrainingLabel::to_class`] is the only bridge between the two
/// sets: every training label except `Normal` maps onto the classifier label
/// with the same name and index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrainingLabel {
    Hungry,
    Sleepy,
    Discomfort,
    Stress,
    Normal,
}

impl TrainingLabel {
    pub const ALL: [TrainingLabel; 5] = [
        TrainingLabel::Hungry,
        TrainingLabel::Sleepy,
        TrainingLabel::Discomfort,
        TrainingLabel::Stress,
        TrainingLabel::Normal,
    ];

    /// Map onto the classifier label set (`Normal` has no counterpart)
    pub fn to_class(&self) -> Option<ClassLabel> {
        match self {
            TrainingLabel::Hungry => Some(ClassLabel::Hungry),
            TrainingLabel::Sleepy => Some(ClassLabel::Sleepy),
            TrainingLabel::Discomfort => Some(ClassLabel::Discomfort),
            TrainingLabel::Stress => Some(ClassLabel::Stress),
            TrainingLabel::Normal => None,
        }
    }
}

impl From<ClassLabel> for TrainingLabel {
    fn from(label: ClassLabel) -> Self {
        match label {
            ClassLabel::Hungry => TrainingLabel::Hungry,
            ClassLabel::Sleepy => TrainingLabel::Sleepy,
            ClassLabel::Discomfort => TrainingLabel::Discomfort,
            ClassLabel::Stress => TrainingLabel::Stress,
        }
    }
}

/// Final state reported for a reading.
///
/// `Idle` and `Uncertain` are produced only by the fusion policy; the other
/// four come either from an override rule or from the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InferenceState {
    Idle,
    Hungry,
    Sleepy,
    Discomfort,
    Stress,
    Uncertain,
}

impl InferenceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            InferenceState::Idle => "Idle",
            InferenceState::Hungry => "Hungry",
            InferenceState::Sleepy => "Sleepy",
            InferenceState::Discomfort => "Discomfort",
            InferenceState::Stress => "Stress",
            InferenceState::Uncertain => "Uncertain",
        }
    }

    /// True for states the classifier itself can never emit
    pub fn is_policy_only(&self) -> bool {
        matches!(self, InferenceState::Idle | InferenceState::Uncertain)
    }
}

impl From<ClassLabel> for InferenceState {
    fn from(label: ClassLabel) -> Self {
        match label {
            ClassLabel::Hungry => InferenceState::Hungry,
            ClassLabel::Sleepy => InferenceState::Sleepy,
            ClassLabel::Discomfort => InferenceState::Discomfort,
            ClassLabel::Stress => InferenceState::Stress,
        }
    }
}

impl fmt::Display for InferenceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Arg-max view over one classifier probability vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierOutput {
    /// Most probable label (lowest index wins ties)
    pub label: ClassLabel,
    /// Probability of `label`, i.e. the maximum of `probabilities`
    pub confidence: f64,
    /// Full distribution in [`ClassLabel::ALL`] order
    pub probabilities: [f64; CLASS_COUNT],
}

/// Cascade node that produced a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleId {
    NoCry,
    StressOverride,
    SleepyConfirmation,
    LowConfidence,
    TrustClassifier,
}

impl RuleId {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleId::NoCry => "no_cry",
            RuleId::StressOverride => "stress_override",
            RuleId::SleepyConfirmation => "sleepy_confirmation",
            RuleId::LowConfidence => "low_confidence",
            RuleId::TrustClassifier => "trust_classifier",
        }
    }
}

/// Caller-visible note attached to a decision reached on a degraded path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// The classifier could not score the reading; its confidence was taken as zero
    ClassificationFailed { message: String },
}

/// Outcome of one fusion call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub state: InferenceState,
    pub confidence: f64,
    pub rule: RuleId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<Diagnostic>,
}

impl Decision {
    pub fn new(state: InferenceState, confidence: f64, rule: RuleId) -> Self {
        Self {
            state,
            confidence,
            rule,
            diagnostic: None,
        }
    }

    pub fn with_diagnostic(mut self, diagnostic: Diagnostic) -> Self {
        self.diagnostic = Some(diagnostic);
        self
    }

    /// True if the classifier failed while this decision was being made
    pub fn is_degraded(&self) -> bool {
        self.diagnostic.is_some()
    }
}

/// Producer metadata stamped on every report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Producer {
    pub name: String,
    pub version: String,
    pub instance_id: String,
}

/// Decision plus the context the display band needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionReport {
    /// When the decision was made (UTC, RFC 3339)
    pub timestamp: String,
    pub state: InferenceState,
    /// Confidence rounded to two decimals
    pub confidence: f64,
    /// Heart rate carried over from the reading
    pub bpm: i64,
    pub rule: RuleId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<Diagnostic>,
    pub producer: Producer,
}
