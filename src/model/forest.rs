//! Random forest artifact (`cradle.forest.v1`)
//!
//! The classifier ships as a JSON document describing a forest of binary
//! decision trees over the two cry features. Splits follow the usual
//! `x[feature] <= threshold` goes left convention, leaves hold per-class
//! weights, and the forest probability is the mean of the per-tree leaf
//! distributions.
//!
//! ```json
//! {
//!   "format": "cradle.forest.v1",
//!   "features": ["cry_volume", "cry_frequency"],
//!   "classes": ["Hungry", "Sleepy", "Discomfort", "Stress"],
//!   "trees": [
//!     { "nodes": [
//!         { "feature": 0, "threshold": 0.5, "left": 1, "right": 2 },
//!         { "value": [3, 1, 0, 0] },
//!         { "value": [0, 0, 2, 2] }
//!     ] }
//!   ]
//! }
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{ProbabilityModel, FEATURE_NAMES};
use crate::error::FusionError;
use crate::types::{ClassLabel, TrainingLabel, CLASS_COUNT};

/// Format tag every forest artifact must carry
pub const FOREST_FORMAT: &str = "cradle.forest.v1";

/// One tree node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: Vec<f64>,
    },
}

/// A decision tree stored as a flat node list rooted at index 0
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<Node>,
}

impl Tree {
    /// Walk from the root to a leaf and return its normalized distribution
    fn leaf_distribution(&self, features: &[f64; 2]) -> [f64; CLASS_COUNT] {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if features[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
                Node::Leaf { value } => {
                    let total: f64 = value.iter().sum();
                    let mut distribution = [0.0; CLASS_COUNT];
                    for (slot, weight) in distribution.iter_mut().zip(value) {
                        *slot = weight / total;
                    }
                    return distribution;
                }
            }
        }
    }

    fn validate(&self, tree_idx: usize) -> Result<(), FusionError> {
        let fail = |node_idx: usize, msg: String| -> Result<(), FusionError> {
            Err(FusionError::ModelLoad(format!(
                "tree {} node {}: {}",
                tree_idx, node_idx, msg
            )))
        };

        if self.nodes.is_empty() {
            return Err(FusionError::ModelLoad(format!("tree {} has no nodes", tree_idx)));
        }

        for (node_idx, node) in self.nodes.iter().enumerate() {
            match node {
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    if *feature >= FEATURE_NAMES.len() {
                        return fail(node_idx, format!("feature index {} out of range", feature));
                    }
                    if !threshold.is_finite() {
                        return fail(node_idx, "threshold is not finite".to_string());
                    }
                    // Children strictly after the parent keeps every walk finite
                    for child in [*left, *right] {
                        if child <= node_idx || child >= self.nodes.len() {
                            return fail(node_idx, format!("invalid child index {}", child));
                        }
                    }
                }
                Node::Leaf { value } => {
                    if value.len() != CLASS_COUNT {
                        return fail(
                            node_idx,
                            format!("leaf has {} weights, expected {}", value.len(), CLASS_COUNT),
                        );
                    }
                    if value.iter().any(|w| !w.is_finite() || *w < 0.0) {
                        return fail(node_idx, "leaf weights must be finite and >= 0".to_string());
                    }
                    let total: f64 = value.iter().sum();
                    if !total.is_finite() {
                        return fail(node_idx, "leaf weights overflow".to_string());
                    }
                    if total <= 0.0 {
                        return fail(node_idx, "leaf weights sum to zero".to_string());
                    }
                }
            }
        }
        Ok(())
    }
}

/// Artifact as read from JSON, before validation
#[derive(Deserialize)]
struct RawForest {
    format: String,
    features: Vec<String>,
    classes: Vec<TrainingLabel>,
    trees: Vec<Tree>,
}

/// Loaded random forest classifier
///
/// Every way of obtaining one, `Deserialize` included, goes through
/// validation, so tree walks never leave the node list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawForest")]
pub struct ForestModel {
    format: String,
    features: Vec<String>,
    classes: Vec<TrainingLabel>,
    trees: Vec<Tree>,
}

impl TryFrom<RawForest> for ForestModel {
    type Error = FusionError;

    fn try_from(raw: RawForest) -> Result<Self, Self::Error> {
        let model = Self {
            format: raw.format,
            features: raw.features,
            classes: raw.classes,
            trees: raw.trees,
        };
        model.validate()?;
        Ok(model)
    }
}

impl ForestModel {
    /// Build a forest over the standard features and classes
    pub fn new(trees: Vec<Tree>) -> Result<Self, FusionError> {
        let model = Self {
            format: FOREST_FORMAT.to_string(),
            features: FEATURE_NAMES.iter().map(|f| f.to_string()).collect(),
            classes: ClassLabel::ALL.iter().map(|l| TrainingLabel::from(*l)).collect(),
            trees,
        };
        model.validate()?;
        Ok(model)
    }

    /// Parse and validate a forest artifact
    pub fn from_json(json: &str) -> Result<Self, FusionError> {
        let raw: RawForest = serde_json::from_str(json)
            .map_err(|e| FusionError::ModelLoad(format!("malformed artifact: {}", e)))?;
        Self::try_from(raw)
    }

    /// Read, parse and validate a forest artifact from disk
    pub fn from_path(path: &Path) -> Result<Self, FusionError> {
        let json = fs::read_to_string(path).map_err(|e| {
            FusionError::ModelLoad(format!("cannot read {}: {}", path.display(), e))
        })?;
        let model = Self::from_json(&json)?;
        log::info!("Loaded {} from {}", model.describe(), path.display());
        Ok(model)
    }

    pub fn to_json(&self) -> Result<String, FusionError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    fn validate(&self) -> Result<(), FusionError> {
        if self.format != FOREST_FORMAT {
            return Err(FusionError::ModelLoad(format!(
                "unsupported format '{}', expected '{}'",
                self.format, FOREST_FORMAT
            )));
        }

        if self.features != FEATURE_NAMES {
            return Err(FusionError::ModelLoad(format!(
                "features must be {:?}, got {:?}",
                FEATURE_NAMES, self.features
            )));
        }

        // Class list must map one-to-one onto the classifier labels, in order
        let mapped: Vec<Option<ClassLabel>> = self.classes.iter().map(|c| c.to_class()).collect();
        if let Some(pos) = mapped.iter().position(|c| c.is_none()) {
            return Err(FusionError::ModelLoad(format!(
                "class {:?} has no classifier label",
                self.classes[pos]
            )));
        }
        let expected: Vec<Option<ClassLabel>> = ClassLabel::ALL.iter().map(|l| Some(*l)).collect();
        if mapped != expected {
            return Err(FusionError::ModelLoad(format!(
                "classes must be {:?}, got {:?}",
                ClassLabel::ALL,
                self.classes
            )));
        }

        if self.trees.is_empty() {
            return Err(FusionError::ModelLoad("forest has no trees".to_string()));
        }

        for (tree_idx, tree) in self.trees.iter().enumerate() {
            tree.validate(tree_idx)?;
        }
        Ok(())
    }
}

impl ProbabilityModel for ForestModel {
    fn predict_proba(&self, features: &[f64; 2]) -> Result<Vec<f64>, FusionError> {
        let mut totals = [0.0; CLASS_COUNT];
        for tree in &self.trees {
            for (total, p) in totals.iter_mut().zip(tree.leaf_distribution(features)) {
                *total += p;
            }
        }

        let n = self.trees.len() as f64;
        Ok(totals.iter().map(|t| t / n).collect())
    }

    fn describe(&self) -> String {
        format!("{} forest with {} trees", self.format, self.trees.len())
    }
}
