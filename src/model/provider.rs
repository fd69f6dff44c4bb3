//! Probability provider

use std::sync::Arc;

use super::ProbabilityModel;
use crate::error::FusionError;
use crate::types::{ClassLabel, ClassifierOutput, CLASS_COUNT};

/// Allowed deviation of a probability vector's sum from 1
pub const PROBABILITY_SUM_TOLERANCE: f64 = 1e-6;

/// Checked arg-max wrapper around a shared, read-only model
#[derive(Clone)]
pub struct ProbabilityProvider {
    model: Arc<dyn ProbabilityModel>,
}

impl ProbabilityProvider {
    pub fn new(model: Arc<dyn ProbabilityModel>) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &dyn ProbabilityModel {
        self.model.as_ref()
    }

    /// Score one pair of cry features.
    ///
    /// Features are not range-checked. Non-finite input, a vector of the
    /// wrong length, or an entry outside `[0, 1]` yields
    /// `FusionError::Classification`. A vector whose sum is off 1 is only
    /// logged.
    pub fn predict(
        &self,
        cry_volume: f64,
        cry_frequency: f64,
    ) -> Result<ClassifierOutput, FusionError> {
        if !cry_volume.is_finite() || !cry_frequency.is_finite() {
            return Err(FusionError::Classification(format!(
                "non-finite features: cry_volume={}, cry_frequency={}",
                cry_volume, cry_frequency
            )));
        }

        let raw = self.model.predict_proba(&[cry_volume, cry_frequency])?;
        let probabilities = check_distribution(&raw)?;

        // Strict `>` keeps the lowest index on ties
        let mut best = 0;
        for idx in 1..CLASS_COUNT {
            if probabilities[idx] > probabilities[best] {
                best = idx;
            }
        }

        let label = ClassLabel::from_index(best).ok_or_else(|| {
            FusionError::Classification(format!("no label at index {}", best))
        })?;

        Ok(ClassifierOutput {
            label,
            confidence: probabilities[best],
            probabilities,
        })
    }
}

impl std::fmt::Debug for ProbabilityProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbabilityProvider")
            .field("model", &self.model.describe())
            .finish()
    }
}

fn check_distribution(raw: &[f64]) -> Result<[f64; CLASS_COUNT], FusionError> {
    let probabilities: [f64; CLASS_COUNT] = raw.try_into().map_err(|_| {
        FusionError::Classification(format!(
            "expected {} probabilities, model returned {}",
            CLASS_COUNT,
            raw.len()
        ))
    })?;

    if let Some(bad) = probabilities.iter().find(|p| !(0.0..=1.0).contains(*p)) {
        return Err(FusionError::Classification(format!(
            "invalid probability {}",
            bad
        )));
    }

    let sum: f64 = probabilities.iter().sum();
    if (sum - 1.0).abs() > PROBABILITY_SUM_TOLERANCE {
        log::warn!("Classifier probabilities sum to {}, using them as-is", sum);
    }

    Ok(probabilities)
}
