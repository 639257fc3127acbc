//! Model handles for delay classification and demand forecasting

use crate::error::{DashboardError, Result};
use crate::feature_aligner::FeatureMatrix;
use crate::models::loader::{LoadedModel, ModelLoader};
use anyhow::Context;
use ort::memory::Allocator;
use ort::value::{DowncastableTarget, DynMapValueType, DynSequenceValueType, Tensor};
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;

/// Probabilities a binary classifier assigns to its two classes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassProbabilities {
    classes: [i64; 2],
    values: [f64; 2],
}

impl ClassProbabilities {
    /// Probabilities keyed by explicit class ids
    pub fn new(classes: [i64; 2], values: [f64; 2]) -> Self {
        Self { classes, values }
    }

    /// Probabilities for classes 0 and 1, in that order
    pub fn binary(values: [f64; 2]) -> Self {
        Self::new([0, 1], values)
    }

    pub fn classes(&self) -> [i64; 2] {
        self.classes
    }

    pub fn sum(&self) -> f64 {
        self.values[0] + self.values[1]
    }

    /// `(p(class), p(other class))`, or `None` if the model never predicts `class`
    pub fn split(&self, class: i64) -> Option<(f64, f64)> {
        let index = self.classes.iter().position(|&c| c == class)?;
        Some((self.values[index], self.values[1 - index]))
    }

    /// Class with the higher probability; ties go to the first class
    pub fn argmax(&self) -> i64 {
        if self.values[1] > self.values[0] {
            self.classes[1]
        } else {
            self.classes[0]
        }
    }
}

/// Binary delay classifier: label and class probabilities per row
pub trait DelayClassifier: Send + Sync {
    fn name(&self) -> &str;

    /// One label per input row
    fn predict(&self, features: &FeatureMatrix) -> Result<Vec<i64>>;

    /// Probabilities of both classes, one entry per input row
    fn predict_proba(&self, features: &FeatureMatrix) -> Result<Vec<ClassProbabilities>>;
}

/// Demand forecaster: one value per input row
pub trait DemandRegressor: Send + Sync {
    fn name(&self) -> &str;

    fn predict(&self, features: &FeatureMatrix) -> Result<Vec<f64>>;
}

/// Delay classifier backed by an ONNX Runtime session
pub struct OnnxDelayModel {
    name: String,
    n_features: usize,
    model: Mutex<LoadedModel>,
}

impl OnnxDelayModel {
    pub fn load<P: AsRef<Path>>(loader: &ModelLoader, path: P, n_features: usize) -> anyhow::Result<Self> {
        let model = loader.load_model(path, "delay_model")?;
        check_declared_width(&model.name, model.input_width, n_features)?;
        Ok(Self {
            name: model.name.clone(),
            n_features,
            model: Mutex::new(model),
        })
    }

    fn run_probabilities(&self, features: &FeatureMatrix) -> anyhow::Result<Vec<ClassProbabilities>> {
        let mut guard = self
            .model
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;
        let model = &mut *guard;

        let outputs = model
            .session
            .run(ort::inputs![model.input_name.as_str() => input_tensor(features)?])?;

        if let Some(output) = outputs.get(model.outputs.value.as_str()) {
            let dtype = output.dtype();

            if let Ok((shape, data)) = output.try_extract_tensor::<f32>() {
                let dims: Vec<i64> = shape.iter().copied().collect();
                return probabilities_from_tensor(&dims, data);
            }

            if DynSequenceValueType::can_downcast(&dtype) {
                return probabilities_from_sequence_map(output);
            }
        }

        anyhow::bail!("no probability output named '{}'", model.outputs.value)
    }

    fn run_labels(&self, features: &FeatureMatrix) -> anyhow::Result<Option<Vec<i64>>> {
        let mut guard = self
            .model
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;
        let model = &mut *guard;

        let Some(label_output) = model.outputs.label.clone() else {
            return Ok(None);
        };

        let outputs = model
            .session
            .run(ort::inputs![model.input_name.as_str() => input_tensor(features)?])?;

        let output = outputs
            .get(label_output.as_str())
            .context(format!("output '{}' missing from run", label_output))?;

        let (_, data) = output
            .try_extract_tensor::<i64>()
            .context("label output is not an int64 tensor")?;

        Ok(Some(data.to_vec()))
    }

}

impl DelayClassifier for OnnxDelayModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn predict(&self, features: &FeatureMatrix) -> Result<Vec<i64>> {
        check_width(&self.name, self.n_features, features)?;

        let labels = match self.run_labels(features).map_err(|e| invocation(&self.name, e))? {
            Some(labels) => labels,
            // Graph without a label output: the label is the argmax class
            None => self
                .predict_proba(features)?
                .iter()
                .map(ClassProbabilities::argmax)
                .collect(),
        };

        expect_rows(&self.name, features.n_rows(), labels.len())?;
        debug!(model = %self.name, rows = labels.len(), "Delay labels predicted");
        Ok(labels)
    }

    fn predict_proba(&self, features: &FeatureMatrix) -> Result<Vec<ClassProbabilities>> {
        check_width(&self.name, self.n_features, features)?;

        let probabilities = self
            .run_probabilities(features)
            .map_err(|e| invocation(&self.name, e))?;

        expect_rows(&self.name, features.n_rows(), probabilities.len())?;
        debug!(model = %self.name, rows = probabilities.len(), "Delay probabilities predicted");
        Ok(probabilities)
    }
}

/// Demand model backed by an ONNX Runtime session
pub struct OnnxDemandModel {
    name: String,
    n_features: usize,
    model: Mutex<LoadedModel>,
}

impl OnnxDemandModel {
    pub fn load<P: AsRef<Path>>(loader: &ModelLoader, path: P, n_features: usize) -> anyhow::Result<Self> {
        let model = loader.load_model(path, "demand_model")?;
        check_declared_width(&model.name, model.input_width, n_features)?;
        Ok(Self {
            name: model.name.clone(),
            n_features,
            model: Mutex::new(model),
        })
    }

    fn run(&self, features: &FeatureMatrix) -> anyhow::Result<Vec<f64>> {
        let mut guard = self
            .model
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;
        let model = &mut *guard;

        let output_name = model.outputs.prediction().to_string();

        let outputs = model
            .session
            .run(ort::inputs![model.input_name.as_str() => input_tensor(features)?])?;

        let output = outputs
            .get(output_name.as_str())
            .context(format!("output '{}' missing from run", output_name))?;

        // Regressors emit float values; classifier-style demand models emit int64 labels
        if let Ok((_, data)) = output.try_extract_tensor::<f32>() {
            debug!(model = %model.name, output = %output_name, "Extracted demand from float tensor");
            return Ok(data.iter().map(|&v| v as f64).collect());
        }
        if let Ok((_, data)) = output.try_extract_tensor::<i64>() {
            debug!(model = %model.name, output = %output_name, "Extracted demand from label tensor");
            return Ok(data.iter().map(|&v| v as f64).collect());
        }

        anyhow::bail!("output '{}' is not a numeric tensor", output_name)
    }
}

impl DemandRegressor for OnnxDemandModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn predict(&self, features: &FeatureMatrix) -> Result<Vec<f64>> {
        check_width(&self.name, self.n_features, features)?;

        let values = self.run(features).map_err(|e| invocation(&self.name, e))?;
        expect_rows(&self.name, features.n_rows(), values.len())?;
        Ok(values)
    }
}

/// Prepare input tensor - shape [rows, features]
fn input_tensor(features: &FeatureMatrix) -> anyhow::Result<Tensor<f32>> {
    let shape = vec![features.n_rows() as i64, features.n_features() as i64];
    Tensor::from_array((shape, features.to_f32())).context("Failed to create input tensor")
}

/// A graph with a fixed input width must match the schema it is fed from
fn check_declared_width(model: &str, declared: Option<usize>, schema_len: usize) -> Result<()> {
    match declared {
        Some(width) if width != schema_len => Err(DashboardError::mismatch(model, width, schema_len)),
        _ => Ok(()),
    }
}

fn check_width(model: &str, n_features: usize, features: &FeatureMatrix) -> Result<()> {
    if features.n_features() != n_features {
        return Err(DashboardError::mismatch(model, n_features, features.n_features()));
    }
    Ok(())
}

fn invocation(model: &str, err: anyhow::Error) -> DashboardError {
    DashboardError::Invocation {
        model: model.to_string(),
        reason: format!("{:#}", err),
    }
}

fn expect_rows(model: &str, expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(DashboardError::MalformedOutput {
            model: model.to_string(),
            reason: format!("expected {} rows, got {}", expected, actual),
        });
    }
    Ok(())
}

/// Split a `[rows, 2]` (or flat `[2]`) probability tensor into pairs.
///
/// Tensor columns carry no class ids; they are read as classes 0 and 1.
fn probabilities_from_tensor(dims: &[i64], data: &[f32]) -> anyhow::Result<Vec<ClassProbabilities>> {
    let num_classes = dims.last().copied().unwrap_or(0);
    if num_classes != 2 {
        anyhow::bail!("expected 2 classes in probability tensor, shape {:?}", dims);
    }

    Ok(data
        .chunks_exact(2)
        .map(|pair| ClassProbabilities::binary([pair[0] as f64, pair[1] as f64]))
        .collect())
}

/// Read probabilities from seq(map(int64, float)) format.
///
/// This is what the ZipMap operator of sklearn/lightgbm exports produces:
/// one map per row, keyed by class id.
fn probabilities_from_sequence_map(output: &ort::value::DynValue) -> anyhow::Result<Vec<ClassProbabilities>> {
    let allocator = Allocator::default();

    let sequence = output
        .downcast_ref::<DynSequenceValueType>()
        .map_err(|e| anyhow::anyhow!("Failed to downcast to sequence: {}", e))?;

    let maps = sequence.try_extract_sequence::<DynMapValueType>(&allocator)?;

    let mut rows = Vec::with_capacity(maps.len());
    for map_value in &maps {
        let kv_pairs = map_value.try_extract_key_values::<i64, f32>()?;
        rows.push(probabilities_from_pairs(kv_pairs)?);
    }

    Ok(rows)
}

/// One row of a probability map, ordered by class id
fn probabilities_from_pairs(mut pairs: Vec<(i64, f32)>) -> anyhow::Result<ClassProbabilities> {
    pairs.sort_by_key(|(class_id, _)| *class_id);
    match pairs.as_slice() {
        [(c0, p0), (c1, p1)] => Ok(ClassProbabilities::new(
            [*c0, *c1],
            [*p0 as f64, *p1 as f64],
        )),
        other => anyhow::bail!("expected 2 classes in probability map, got {}", other.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probabilities_from_batch_tensor() {
        let probs = probabilities_from_tensor(&[2, 2], &[0.9, 0.1, 0.25, 0.75]).unwrap();

        assert_eq!(probs.len(), 2);
        assert_eq!(probs[0].classes(), [0, 1]);
        let (p_one, p_zero) = probs[1].split(1).unwrap();
        assert!((p_one - 0.75).abs() < 1e-6);
        assert!((p_zero - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_probability_map_keeps_class_ids() {
        let probs = probabilities_from_pairs(vec![(2, 0.3), (1, 0.7)]).unwrap();

        assert_eq!(probs.classes(), [1, 2]);
        assert_eq!(probs.argmax(), 1);
        let (p_two, p_one) = probs.split(2).unwrap();
        assert!((p_two - 0.3).abs() < 1e-6);
        assert!((p_one - 0.7).abs() < 1e-6);
        assert!(probs.split(0).is_none());
        assert!(probabilities_from_pairs(vec![(0, 1.0)]).is_err());
    }

    #[test]
    fn test_argmax_returns_class_id() {
        assert_eq!(ClassProbabilities::new([3, 7], [0.2, 0.8]).argmax(), 7);
        assert_eq!(ClassProbabilities::binary([0.5, 0.5]).argmax(), 0);
    }

    #[test]
    fn test_graph_width_must_match_schema() {
        let err = check_declared_width("delay_model", Some(13), 12).unwrap_err();
        assert!(matches!(
            err,
            DashboardError::SchemaMismatch { expected: 13, actual: 12, .. }
        ));
        assert!(check_declared_width("delay_model", Some(13), 13).is_ok());
        assert!(check_declared_width("demand_model", None, 12).is_ok());
    }

    #[test]
    fn test_wrong_width_input_is_rejected() {
        let features = FeatureMatrix::single(vec![1.0, 2.0]);
        let err = check_width("demand_model", 3, &features).unwrap_err();
        assert!(matches!(
            err,
            DashboardError::SchemaMismatch { expected: 3, actual: 2, .. }
        ));
    }

    #[test]
    fn test_probabilities_require_two_classes() {
        assert!(probabilities_from_tensor(&[1, 3], &[0.2, 0.3, 0.5]).is_err());
    }

    #[test]
    fn test_row_count_mismatch_is_malformed() {
        let err = expect_rows("demand_model", 3, 1).unwrap_err();
        assert!(matches!(err, DashboardError::MalformedOutput { .. }));
    }
}
