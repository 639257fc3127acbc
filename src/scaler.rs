//! Fitted feature scaler applied to delay-model inputs

use crate::error::{DashboardError, Result};
use crate::feature_aligner::{FeatureMatrix, FeatureSchema};
use serde::{Deserialize, Serialize};

/// Fitted standardization parameters: `(x - mean) / scale` per feature.
///
/// Produced by training and exported as JSON. Field aliases accept the
/// attribute names of a fitted scikit-learn `StandardScaler`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalerState {
    #[serde(alias = "mean_")]
    mean: Vec<f64>,
    #[serde(alias = "scale_")]
    scale: Vec<f64>,
    /// Column order the scaler was fitted on, when the export recorded it
    #[serde(default, alias = "feature_names_in_", skip_serializing_if = "Option::is_none")]
    feature_names: Option<Vec<String>>,
}

impl ScalerState {
    pub fn new(mean: Vec<f64>, scale: Vec<f64>) -> Result<Self> {
        let state = Self {
            mean,
            scale,
            feature_names: None,
        };
        state.validate()?;
        Ok(state)
    }

    pub fn with_feature_names(mut self, names: Vec<String>) -> Self {
        self.feature_names = Some(names);
        self
    }

    /// Check internal consistency after deserialization
    pub fn validate(&self) -> Result<()> {
        if self.mean.len() != self.scale.len() {
            return Err(DashboardError::mismatch(
                "scaler parameters",
                self.mean.len(),
                self.scale.len(),
            ));
        }
        if self.mean.is_empty() {
            return Err(DashboardError::mismatch("scaler parameters", 1, 0));
        }
        if let Some(names) = &self.feature_names {
            if names.len() != self.mean.len() {
                return Err(DashboardError::mismatch(
                    "scaler feature names",
                    self.mean.len(),
                    names.len(),
                ));
            }
        }
        Ok(())
    }

    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    pub fn feature_names(&self) -> Option<&[String]> {
        self.feature_names.as_deref()
    }

    /// Verify the scaler was fitted on `schema`'s column order.
    ///
    /// Without recorded names only the width can be checked.
    pub fn check_schema(&self, schema: &FeatureSchema) -> Result<()> {
        match &self.feature_names {
            Some(names) => schema.ensure_same_order("scaler", names),
            None if self.n_features() != schema.len() => Err(DashboardError::mismatch(
                "scaler",
                self.n_features(),
                schema.len(),
            )),
            None => Ok(()),
        }
    }

    /// Scale every row of `features`. Pure function of input and fitted state.
    pub fn transform(&self, features: &FeatureMatrix) -> Result<FeatureMatrix> {
        if features.n_features() != self.n_features() {
            return Err(DashboardError::mismatch(
                "scaler transform",
                self.n_features(),
                features.n_features(),
            ));
        }

        let data = features
            .rows()
            .flat_map(|row| {
                row.iter()
                    .zip(self.mean.iter().zip(&self.scale))
                    .map(|(&x, (&mean, &scale))| {
                        let scale = if scale == 0.0 { 1.0 } else { scale };
                        (x - mean) / scale
                    })
            })
            .collect();

        FeatureMatrix::from_rows(self.n_features(), data)
    }
}
