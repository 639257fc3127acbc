//! Schema alignment for model inference.
//!
//! Turns arbitrary records into fixed-order numeric vectors matching the
//! column list a model was trained on. Schema order is authoritative: models
//! consume positional vectors, so the aligner never reorders or infers columns.

use crate::error::{DashboardError, Result};
use crate::types::record::{FieldValue, Record};
use serde::Deserialize;
use std::collections::HashSet;

/// What to do when a record lacks a column the schema requires
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MissingFieldPolicy {
    /// Substitute 0.0 silently, as the dashboard has always done
    #[default]
    Zero,
    /// Report the absent column as an error
    Reject,
}

/// Ordered list of feature names a model expects
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureSchema {
    name: String,
    columns: Vec<String>,
}

impl FeatureSchema {
    /// Build a schema, rejecting empty lists and duplicate column names.
    pub fn new(name: &str, columns: Vec<String>) -> std::result::Result<Self, String> {
        if columns.is_empty() {
            return Err("schema has no columns".to_string());
        }

        let mut seen = HashSet::with_capacity(columns.len());
        for column in &columns {
            if !seen.insert(column.as_str()) {
                return Err(format!("duplicate column '{}'", column));
            }
        }

        Ok(Self {
            name: name.to_string(),
            columns,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn position(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// Check that `names` matches this schema exactly, position by position.
    pub fn ensure_same_order(&self, context: &str, names: &[String]) -> Result<()> {
        if names.len() != self.len() {
            return Err(DashboardError::mismatch(context, self.len(), names.len()));
        }

        for (position, (expected, found)) in self.columns.iter().zip(names).enumerate() {
            if expected != found {
                return Err(DashboardError::FeatureOrder {
                    context: context.to_string(),
                    position,
                    expected: expected.clone(),
                    found: found.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Dense row-major matrix of aligned features
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    n_features: usize,
    data: Vec<f64>,
}

impl FeatureMatrix {
    /// Wrap row-major data. `data.len()` must be a multiple of `n_features`.
    pub fn from_rows(n_features: usize, data: Vec<f64>) -> Result<Self> {
        if n_features == 0 || data.len() % n_features != 0 {
            return Err(DashboardError::mismatch(
                "feature matrix",
                n_features,
                data.len(),
            ));
        }
        Ok(Self { n_features, data })
    }

    pub fn single(row: Vec<f64>) -> Self {
        Self {
            n_features: row.len(),
            data: row,
        }
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_rows(&self) -> usize {
        if self.n_features == 0 {
            0
        } else {
            self.data.len() / self.n_features
        }
    }

    pub fn row(&self, index: usize) -> &[f64] {
        let start = index * self.n_features;
        &self.data[start..start + self.n_features]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        self.data.chunks(self.n_features.max(1))
    }

    /// Single-precision copy for ONNX input tensors
    pub fn to_f32(&self) -> Vec<f32> {
        self.data.iter().map(|&v| v as f32).collect()
    }
}

/// Aligns records to a feature schema.
pub struct FeatureAligner {
    policy: MissingFieldPolicy,
}

impl FeatureAligner {
    pub fn new(policy: MissingFieldPolicy) -> Self {
        Self { policy }
    }

    /// Align one record to a schema.
    ///
    /// The result always has `schema.len()` values in schema order. Extra
    /// record fields are dropped.
    pub fn align(&self, record: &Record, schema: &FeatureSchema) -> Result<Vec<f64>> {
        let mut features = Vec::with_capacity(schema.len());

        for column in schema.columns() {
            let value = match record.get(column) {
                Some(FieldValue::Number(v)) => *v,
                Some(FieldValue::Text(raw)) => {
                    return Err(DashboardError::NonNumericField {
                        field: column.clone(),
                        value: raw.clone(),
                    })
                }
                None => match self.policy {
                    MissingFieldPolicy::Zero => 0.0,
                    MissingFieldPolicy::Reject => {
                        return Err(DashboardError::MissingField {
                            field: column.clone(),
                        })
                    }
                },
            };
            features.push(value);
        }

        Ok(features)
    }

    /// Align a batch of records into one row-major matrix
    pub fn align_batch(&self, records: &[Record], schema: &FeatureSchema) -> Result<FeatureMatrix> {
        let mut data = Vec::with_capacity(records.len() * schema.len());
        for record in records {
            data.extend(self.align(record, schema)?);
        }
        Ok(FeatureMatrix {
            n_features: schema.len(),
            data,
        })
    }
}

impl Default for FeatureAligner {
    fn default() -> Self {
        Self::new(MissingFieldPolicy::Zero)
    }
}
