//! Loaders for the JSON companion artifacts: feature schemas and the scaler

use crate::error::{ArtifactKind, DashboardError, Result};
use crate::feature_aligner::FeatureSchema;
use crate::scaler::ScalerState;
use serde::de::DeserializeOwned;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::info;

fn read_json<T: DeserializeOwned>(kind: ArtifactKind, path: &Path) -> Result<T> {
    let file = File::open(path).map_err(|e| DashboardError::load(kind, path, e))?;
    serde_json::from_reader(BufReader::new(file)).map_err(|e| DashboardError::load(kind, path, e))
}

/// Load an ordered column list (a JSON array of strings)
pub fn load_feature_schema<P: AsRef<Path>>(kind: ArtifactKind, path: P) -> Result<FeatureSchema> {
    let path = path.as_ref();
    let columns: Vec<String> = read_json(kind, path)?;

    let name = match kind {
        ArtifactKind::DemandSchema => "demand",
        _ => "delay",
    };
    let schema =
        FeatureSchema::new(name, columns).map_err(|reason| DashboardError::load(kind, path, reason))?;

    info!(schema = name, columns = schema.len(), path = %path.display(), "Feature schema loaded");
    Ok(schema)
}

/// Load the fitted scaler and confirm it matches the delay schema's column order
pub fn load_scaler<P: AsRef<Path>>(path: P, delay_schema: &FeatureSchema) -> Result<ScalerState> {
    let path = path.as_ref();
    let scaler: ScalerState = read_json(ArtifactKind::Scaler, path)?;

    scaler
        .validate()
        .and_then(|_| scaler.check_schema(delay_schema))
        .map_err(|e| DashboardError::load(ArtifactKind::Scaler, path, e))?;

    info!(
        features = scaler.n_features(),
        named = scaler.feature_names().is_some(),
        path = %path.display(),
        "Scaler loaded"
    );
    Ok(scaler)
}
