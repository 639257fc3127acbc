//! Supply Chain Dashboard Library
//!
//! Loads a pre-processed logistics dataset together with a trained shipment
//! delay classifier, a demand model and a fitted feature scaler, then renders
//! delay and demand predictions alongside restocking and rerouting tables.

pub mod artifacts;
pub mod config;
pub mod dashboard;
pub mod dataset;
pub mod derived;
pub mod error;
pub mod feature_aligner;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod scaler;
pub mod types;

pub use config::AppConfig;
pub use dashboard::{ArtifactLoader, Dashboard, FsArtifactLoader};
pub use error::{DashboardError, Result};
pub use feature_aligner::{FeatureAligner, FeatureSchema, MissingFieldPolicy};
pub use pipeline::{DashboardContext, DelayPrediction, InferencePipeline};
pub use scaler::ScalerState;
pub use types::{FormInput, Record, RenderReport};
