//! ML model inference components

pub mod inference;
pub mod loader;

pub use inference::{ClassProbabilities, DelayClassifier, DemandRegressor, OnnxDelayModel, OnnxDemandModel};
pub use loader::ModelLoader;
