//! Inference pipeline: schema alignment, scaling, model invocation.
//!
//! Raw records are aligned to a model's feature schema, scaled when the path
//! requires it, and handed to the model. Model outputs are returned unchanged
//! apart from consistency checks on the probability pairs.

use crate::config::PipelineConfig;
use crate::dataset::Dataset;
use crate::error::{DashboardError, Result};
use crate::feature_aligner::{FeatureAligner, FeatureMatrix, FeatureSchema};
use crate::metrics::InferenceMetrics;
use crate::models::{DelayClassifier, DemandRegressor};
use crate::scaler::ScalerState;
use crate::types::record::Record;
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, warn};

/// Everything a render pass reads: loaded once, never mutated
pub struct DashboardContext {
    pub dataset: Dataset,
    pub delay_schema: FeatureSchema,
    pub demand_schema: FeatureSchema,
    pub scaler: ScalerState,
    pub delay_model: Box<dyn DelayClassifier>,
    pub demand_model: Box<dyn DemandRegressor>,
}

impl DashboardContext {
    /// Assemble a context, checking the scaler against the delay schema
    pub fn new(
        dataset: Dataset,
        delay_schema: FeatureSchema,
        demand_schema: FeatureSchema,
        scaler: ScalerState,
        delay_model: Box<dyn DelayClassifier>,
        demand_model: Box<dyn DemandRegressor>,
    ) -> Result<Self> {
        scaler.check_schema(&delay_schema)?;
        Ok(Self {
            dataset,
            delay_schema,
            demand_schema,
            scaler,
            delay_model,
            demand_model,
        })
    }
}

/// Delay model output for one row
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DelayPrediction {
    pub label: i64,
    pub probability_no_delay: f64,
    pub probability_delay: f64,
}

/// Runs predictions over a context with one set of pipeline settings
pub struct InferencePipeline<'a> {
    context: &'a DashboardContext,
    settings: &'a PipelineConfig,
    metrics: &'a InferenceMetrics,
    aligner: FeatureAligner,
}

impl<'a> InferencePipeline<'a> {
    pub fn new(
        context: &'a DashboardContext,
        settings: &'a PipelineConfig,
        metrics: &'a InferenceMetrics,
    ) -> Self {
        Self {
            context,
            settings,
            metrics,
            aligner: FeatureAligner::new(settings.missing_field_policy),
        }
    }

    /// Aligned and scaled delay-model input
    pub fn delay_features(&self, records: &[Record]) -> Result<FeatureMatrix> {
        let aligned = self.aligner.align_batch(records, &self.context.delay_schema)?;
        self.context.scaler.transform(&aligned)
    }

    /// Aligned demand-model input, scaled only when the path is configured to
    pub fn demand_features(&self, records: &[Record]) -> Result<FeatureMatrix> {
        let aligned = self.aligner.align_batch(records, &self.context.demand_schema)?;
        if self.settings.demand_path_skips_scaling {
            Ok(aligned)
        } else {
            self.context.scaler.transform(&aligned)
        }
    }

    /// Delay labels only, as the bulk dataset pass needs
    pub fn predict_delay_labels(&self, records: &[Record]) -> Result<Vec<i64>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let features = self.delay_features(records)?;
        let model = self.context.delay_model.as_ref();
        self.invoke(model.name(), features.n_rows(), || model.predict(&features))
    }

    /// Labels and probabilities computed from the same scaled input
    pub fn predict_delay(&self, records: &[Record]) -> Result<Vec<DelayPrediction>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let features = self.delay_features(records)?;
        let model = self.context.delay_model.as_ref();
        let rows = features.n_rows();

        let labels = self.invoke(model.name(), rows, || model.predict(&features))?;
        let probabilities = self.invoke(model.name(), rows, || model.predict_proba(&features))?;

        if labels.len() != probabilities.len() {
            return Err(DashboardError::MalformedOutput {
                model: model.name().to_string(),
                reason: format!(
                    "{} labels but {} probability rows",
                    labels.len(),
                    probabilities.len()
                ),
            });
        }

        let delay_class = self.settings.delay_class;
        labels
            .into_iter()
            .zip(probabilities)
            .map(|(label, probs)| {
                let sum = probs.sum();
                if (sum - 1.0).abs() > self.settings.probability_tolerance {
                    return Err(DashboardError::MalformedOutput {
                        model: model.name().to_string(),
                        reason: format!("probabilities sum to {:.6}", sum),
                    });
                }

                let (p_delay, p_no_delay) =
                    probs.split(delay_class).ok_or_else(|| DashboardError::MalformedOutput {
                        model: model.name().to_string(),
                        reason: format!(
                            "delay class {} is not one of the model's classes {:?}",
                            delay_class,
                            probs.classes()
                        ),
                    })?;

                let argmax_delayed = probs.argmax() == delay_class;
                if argmax_delayed != (label == delay_class) && p_delay != p_no_delay {
                    warn!(
                        model = %model.name(),
                        label = label,
                        probability_delay = p_delay,
                        "Predicted label disagrees with the higher-probability class"
                    );
                }

                Ok(DelayPrediction {
                    label,
                    probability_no_delay: p_no_delay,
                    probability_delay: p_delay,
                })
            })
            .collect()
    }

    /// Demand forecast for each record
    pub fn predict_demand(&self, records: &[Record]) -> Result<Vec<f64>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let features = self.demand_features(records)?;
        let model = self.context.demand_model.as_ref();
        self.invoke(model.name(), features.n_rows(), || model.predict(&features))
    }

    fn invoke<T>(&self, model: &str, rows: usize, call: impl FnOnce() -> Result<T>) -> Result<T> {
        let start = Instant::now();
        let result = call();
        let elapsed = start.elapsed();

        self.metrics
            .record_model_call(model, rows, elapsed, result.is_ok());
        debug!(
            model = %model,
            rows = rows,
            ok = result.is_ok(),
            elapsed_us = elapsed.as_micros() as u64,
            "Model invoked"
        );
        result
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::feature_aligner::MissingFieldPolicy;
    use crate::models::ClassProbabilities;
    use crate::types::record::{FormInput, DASHBOARD_COLUMNS};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Logistic model over the first scaled feature; records what it saw
    pub(crate) struct LogisticDelay {
        pub calls: Arc<AtomicUsize>,
        pub seen: Arc<Mutex<Vec<Vec<f64>>>>,
    }

    impl LogisticDelay {
        pub(crate) fn new() -> Self {
            Self {
                calls: Arc::new(AtomicUsize::new(0)),
                seen: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn proba(row: &[f64]) -> ClassProbabilities {
            let p = 1.0 / (1.0 + (-row[0]).exp());
            ClassProbabilities::binary([1.0 - p, p])
        }
    }

    impl DelayClassifier for LogisticDelay {
        fn name(&self) -> &str {
            "delay_model"
        }

        fn predict(&self, features: &FeatureMatrix) -> Result<Vec<i64>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen
                .lock()
                .unwrap()
                .extend(features.rows().map(|r| r.to_vec()));
            Ok(features
                .rows()
                .map(|r| Self::proba(r).argmax())
                .collect())
        }

        fn predict_proba(&self, features: &FeatureMatrix) -> Result<Vec<ClassProbabilities>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(features.rows().map(Self::proba).collect())
        }
    }

    /// Sums its inputs; remembers the last matrix it received
    pub(crate) struct SumDemand {
        pub calls: Arc<AtomicUsize>,
        pub last: Arc<Mutex<Option<FeatureMatrix>>>,
    }

    impl SumDemand {
        pub(crate) fn new() -> Self {
            Self {
                calls: Arc::new(AtomicUsize::new(0)),
                last: Arc::new(Mutex::new(None)),
            }
        }
    }

    impl DemandRegressor for SumDemand {
        fn name(&self) -> &str {
            "demand_model"
        }

        fn predict(&self, features: &FeatureMatrix) -> Result<Vec<f64>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last.lock().unwrap() = Some(features.clone());
            Ok(features.rows().map(|r| r.iter().sum()).collect())
        }
    }

    struct BrokenDelay;

    impl DelayClassifier for BrokenDelay {
        fn name(&self) -> &str {
            "delay_model"
        }

        fn predict(&self, features: &FeatureMatrix) -> Result<Vec<i64>> {
            Ok(vec![1; features.n_rows()])
        }

        fn predict_proba(&self, features: &FeatureMatrix) -> Result<Vec<ClassProbabilities>> {
            Ok(vec![ClassProbabilities::binary([0.7, 0.7]); features.n_rows()])
        }
    }

    /// Same label and probabilities for every row
    struct FixedDelay {
        label: i64,
        probs: ClassProbabilities,
    }

    impl DelayClassifier for FixedDelay {
        fn name(&self) -> &str {
            "delay_model"
        }

        fn predict(&self, features: &FeatureMatrix) -> Result<Vec<i64>> {
            Ok(vec![self.label; features.n_rows()])
        }

        fn predict_proba(&self, features: &FeatureMatrix) -> Result<Vec<ClassProbabilities>> {
            Ok(vec![self.probs; features.n_rows()])
        }
    }

    fn predict_fixed(delay: FixedDelay, delay_class: i64) -> Result<Vec<DelayPrediction>> {
        let context = context_with(Dataset::default(), Box::new(delay), Box::new(SumDemand::new()));
        let settings = PipelineConfig {
            delay_class,
            ..PipelineConfig::default()
        };
        let metrics = InferenceMetrics::new();
        let pipeline = InferencePipeline::new(&context, &settings, &metrics);
        pipeline.predict_delay(&[FormInput::default().to_record()])
    }

    pub(crate) fn delay_schema() -> FeatureSchema {
        FeatureSchema::new("delay", DASHBOARD_COLUMNS.iter().map(|c| c.to_string()).collect())
            .unwrap()
    }

    pub(crate) fn demand_schema() -> FeatureSchema {
        FeatureSchema::new(
            "demand",
            vec![
                "Inventory_Level".to_string(),
                "Temperature".to_string(),
                "Supplier_Score".to_string(),
            ],
        )
        .unwrap()
    }

    /// Scaler that subtracts the form defaults, so the default form scales to zeros
    pub(crate) fn centred_scaler() -> ScalerState {
        let mean = FormInput::default().values().iter().map(|(_, v)| *v).collect();
        ScalerState::new(mean, vec![2.0; 13]).unwrap()
    }

    pub(crate) fn context_with(
        dataset: Dataset,
        delay: Box<dyn DelayClassifier>,
        demand: Box<dyn DemandRegressor>,
    ) -> DashboardContext {
        DashboardContext::new(
            dataset,
            delay_schema(),
            demand_schema(),
            centred_scaler(),
            delay,
            demand,
        )
        .unwrap()
    }

    #[test]
    fn test_delay_path_scales_before_model() {
        let delay = LogisticDelay::new();
        let seen = delay.seen.clone();
        let context = context_with(Dataset::default(), Box::new(delay), Box::new(SumDemand::new()));
        let settings = PipelineConfig::default();
        let metrics = InferenceMetrics::new();
        let pipeline = InferencePipeline::new(&context, &settings, &metrics);

        let form = FormInput {
            latitude: 16.9716,
            ..FormInput::default()
        };
        let predictions = pipeline.predict_delay(&[form.to_record()]).unwrap();

        let seen = seen.lock().unwrap();
        assert!((seen[0][0] - 2.0).abs() < 1e-9);
        assert!(seen[0][1..].iter().all(|v| v.abs() < 1e-9));
        assert_eq!(predictions[0].label, 1);
        assert_eq!(metrics.total_model_calls(), 2);
    }

    #[test]
    fn test_delay_probabilities_sum_to_one_and_match_label() {
        let context = context_with(
            Dataset::default(),
            Box::new(LogisticDelay::new()),
            Box::new(SumDemand::new()),
        );
        let settings = PipelineConfig::default();
        let metrics = InferenceMetrics::new();
        let pipeline = InferencePipeline::new(&context, &settings, &metrics);

        let records: Vec<Record> = (-5..=5)
            .map(|i| {
                let mut form = FormInput::default();
                form.latitude += i as f64;
                form.to_record()
            })
            .collect();

        for prediction in pipeline.predict_delay(&records).unwrap() {
            let sum = prediction.probability_no_delay + prediction.probability_delay;
            assert!((sum - 1.0).abs() < 1e-9);
            if prediction.probability_delay > prediction.probability_no_delay {
                assert_eq!(prediction.label, 1);
            } else if prediction.probability_delay < prediction.probability_no_delay {
                assert_eq!(prediction.label, 0);
            }
        }
    }

    #[test]
    fn test_probabilities_not_summing_to_one_are_reported() {
        let context = context_with(
            Dataset::default(),
            Box::new(BrokenDelay),
            Box::new(SumDemand::new()),
        );
        let settings = PipelineConfig::default();
        let metrics = InferenceMetrics::new();
        let pipeline = InferencePipeline::new(&context, &settings, &metrics);

        let err = pipeline
            .predict_delay(&[FormInput::default().to_record()])
            .unwrap_err();

        assert!(matches!(err, DashboardError::MalformedOutput { .. }));
    }

    #[test]
    fn test_delay_probability_follows_configured_delay_class() {
        let delay = FixedDelay {
            label: 0,
            probs: ClassProbabilities::binary([0.9, 0.1]),
        };

        let prediction = predict_fixed(delay, 0).unwrap()[0];

        assert_eq!(prediction.label, 0);
        assert!((prediction.probability_delay - 0.9).abs() < 1e-9);
        assert!((prediction.probability_no_delay - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_delay_probability_with_non_binary_class_ids() {
        let delay = FixedDelay {
            label: 2,
            probs: ClassProbabilities::new([1, 2], [0.35, 0.65]),
        };

        let prediction = predict_fixed(delay, 2).unwrap()[0];

        assert!((prediction.probability_delay - 0.65).abs() < 1e-9);
        assert!((prediction.probability_no_delay - 0.35).abs() < 1e-9);
    }

    #[test]
    fn test_delay_class_unknown_to_model_is_reported() {
        let delay = FixedDelay {
            label: 1,
            probs: ClassProbabilities::binary([0.4, 0.6]),
        };

        let err = predict_fixed(delay, 5).unwrap_err();

        assert!(matches!(err, DashboardError::MalformedOutput { reason, .. } if reason.contains("delay class 5")));
    }

    #[test]
    fn test_demand_path_skips_scaling_and_fills_missing() {
        let demand = SumDemand::new();
        let last = demand.last.clone();
        let context = context_with(Dataset::default(), Box::new(LogisticDelay::new()), Box::new(demand));
        let settings = PipelineConfig::default();
        let metrics = InferenceMetrics::new();
        let pipeline = InferencePipeline::new(&context, &settings, &metrics);

        let forecast = pipeline
            .predict_demand(&[FormInput::default().to_record()])
            .unwrap();

        // Inventory_Level 45 + Temperature 30 + absent Supplier_Score 0, unscaled
        assert_eq!(forecast, vec![75.0]);
        let last = last.lock().unwrap();
        assert_eq!(last.as_ref().unwrap().row(0), &[45.0, 30.0, 0.0]);
    }

    #[test]
    fn test_scaled_demand_path_with_mismatched_width_is_reported() {
        let context = context_with(
            Dataset::default(),
            Box::new(LogisticDelay::new()),
            Box::new(SumDemand::new()),
        );
        let settings = PipelineConfig {
            demand_path_skips_scaling: false,
            ..PipelineConfig::default()
        };
        let metrics = InferenceMetrics::new();
        let pipeline = InferencePipeline::new(&context, &settings, &metrics);

        let err = pipeline
            .predict_demand(&[FormInput::default().to_record()])
            .unwrap_err();

        assert!(matches!(
            err,
            DashboardError::SchemaMismatch { expected: 13, actual: 3, .. }
        ));
        assert_eq!(metrics.total_model_calls(), 0);
    }

    #[test]
    fn test_reject_policy_flows_through_pipeline() {
        let context = context_with(
            Dataset::default(),
            Box::new(LogisticDelay::new()),
            Box::new(SumDemand::new()),
        );
        let settings = PipelineConfig {
            missing_field_policy: MissingFieldPolicy::Reject,
            ..PipelineConfig::default()
        };
        let metrics = InferenceMetrics::new();
        let pipeline = InferencePipeline::new(&context, &settings, &metrics);

        let err = pipeline
            .predict_demand(&[FormInput::default().to_record()])
            .unwrap_err();

        assert!(matches!(err, DashboardError::MissingField { field } if field == "Supplier_Score"));
    }

    #[test]
    fn test_context_rejects_scaler_of_wrong_width() {
        let result = DashboardContext::new(
            Dataset::default(),
            delay_schema(),
            demand_schema(),
            ScalerState::new(vec![0.0; 3], vec![1.0; 3]).unwrap(),
            Box::new(LogisticDelay::new()),
            Box::new(SumDemand::new()),
        );

        assert!(result.is_err());
    }
}
