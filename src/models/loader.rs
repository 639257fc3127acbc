//! ONNX model loader

use anyhow::{Context, Result};
use ort::session::{builder::GraphOptimizationLevel, Session};
use std::path::Path;
use tracing::info;

/// Loaded ONNX model with the input/output names the pipeline needs
pub struct LoadedModel {
    /// Model name
    pub name: String,
    /// ONNX Runtime session
    pub session: Session,
    /// Input name for the feature tensor
    pub input_name: String,
    /// Feature count the graph declares for its input, when fixed
    pub input_width: Option<usize>,
    /// Which graph outputs carry labels and values
    pub outputs: OutputRoles,
}

/// Graph outputs resolved by name to the roles the models read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputRoles {
    /// Output carrying predicted labels, if the graph exposes one
    pub label: Option<String>,
    /// Output carrying class probabilities or regression values
    pub value: String,
}

impl OutputRoles {
    /// Pick outputs from a graph's declared output names.
    ///
    /// Classifiers expose "label" and "probabilities"; regressors usually a
    /// single "variable".
    pub fn resolve(names: &[&str]) -> Option<Self> {
        let label = names.iter().find(|n| n.contains("label")).map(|n| n.to_string());

        let value = names
            .iter()
            .find(|n| n.contains("prob"))
            .or_else(|| names.iter().find(|n| !n.contains("label")))
            .or_else(|| names.last())
            .map(|n| n.to_string())?;

        Some(Self { label, value })
    }

    /// Output a single-value predictor reads: labels when present, else values
    pub fn prediction(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.value)
    }
}

/// Fixed size of the last input dimension; `None` when it is dynamic
pub(crate) fn declared_width(dims: &[i64]) -> Option<usize> {
    dims.last().copied().filter(|d| *d > 0).map(|d| d as usize)
}

/// Loader for ONNX models
pub struct ModelLoader {
    /// Number of threads for ONNX inference
    onnx_threads: usize,
}

impl ModelLoader {
    /// Create a new model loader with specified number of threads
    pub fn with_threads(onnx_threads: usize) -> Result<Self> {
        ort::init().commit()?;
        info!(onnx_threads = onnx_threads, "ONNX Runtime initialized");
        Ok(Self { onnx_threads })
    }

    /// Load a single ONNX model from file
    pub fn load_model<P: AsRef<Path>>(&self, path: P, name: &str) -> Result<LoadedModel> {
        let path = path.as_ref();

        if !path.exists() {
            anyhow::bail!("model file not found");
        }

        info!(model = %name, path = %path.display(), threads = self.onnx_threads, "Loading ONNX model");

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(self.onnx_threads)?
            .commit_from_file(path)
            .context(format!("Failed to load model from {:?}", path))?;

        let input = session.inputs.first();
        let input_name = input
            .map(|i| i.name.clone())
            .unwrap_or_else(|| "float_input".to_string());
        let input_width = input
            .and_then(|i| i.input_type.tensor_shape())
            .and_then(|shape| declared_width(shape));

        let output_names: Vec<&str> = session.outputs.iter().map(|o| o.name.as_str()).collect();
        let outputs = OutputRoles::resolve(&output_names).context("model graph declares no outputs")?;

        info!(
            model = %name,
            input = %input_name,
            input_width = ?input_width,
            label_output = ?outputs.label,
            value_output = %outputs.value,
            "Model loaded successfully"
        );

        Ok(LoadedModel {
            name: name.to_string(),
            session,
            input_name,
            input_width,
            outputs,
        })
    }
}

impl Default for ModelLoader {
    fn default() -> Self {
        Self { onnx_threads: 1 }
    }
}
