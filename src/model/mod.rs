//! Audio classifier
//!
//! A [`ProbabilityModel`] is any loaded scoring artifact that maps the two cry
//! features onto a distribution over the four classifier labels. The
//! [`ProbabilityProvider`] wraps one such artifact and turns its raw vector
//! into a checked [`ClassifierOutput`](crate::types::ClassifierOutput).

mod forest;
mod provider;

pub use forest::{ForestModel, Node, Tree, FOREST_FORMAT};
pub use provider::ProbabilityProvider;

use crate::error::FusionError;

/// Feature names in the order the classifier consumes them
pub const FEATURE_NAMES: [&str; 2] = ["cry_volume", "cry_frequency"];

/// Trait for loaded scoring artifacts
pub trait ProbabilityModel: Send + Sync {
    /// Score `[cry_volume, cry_frequency]`, returning one probability per
    /// classifier label in `ClassLabel::ALL` order
    fn predict_proba(&self, features: &[f64; 2]) -> Result<Vec<f64>, FusionError>;

    /// Short human-readable summary for logs and health checks
    fn describe(&self) -> String;
}
