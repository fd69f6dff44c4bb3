//! Cradle Fusion - Decision fusion engine for infant state inference
//!
//! Each sensor reading from the baby band (cry features plus motion and heart
//! rate) is turned into one state with a confidence by a fixed rule cascade:
//! silence short-circuits to `Idle`, physiological overrides beat the audio
//! classifier, and a low-confidence classifier is reported as `Uncertain`.
//!
//! ## Modules
//!
//! - **Model**: Loaded classifier artifacts and the checked probability provider
//! - **Policy**: The ordered rule cascade and its configuration
//! - **Engine**: Long-lived façade producing reports for result dispatch

pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod policy;
pub mod reading;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use config::FusionConfig;
pub use engine::{decide_json, FusionEngine};
pub use error::FusionError;
pub use model::{ForestModel, ProbabilityModel, ProbabilityProvider};
pub use policy::FusionPolicy;
pub use reading::SensorReading;
pub use types::{ClassLabel, ClassifierOutput, Decision, DecisionReport, InferenceState};

/// Engine version embedded in all decision reports
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for decision reports
pub const PRODUCER_NAME: &str = "cradle-fusion";
