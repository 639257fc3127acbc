//! Render pass orchestration: load once, then compute every section.
//!
//! Loading is all-or-nothing. Once the context exists, the bulk delay pass,
//! the manual delay prediction and the manual demand prediction are isolated
//! from one another so a failure in one still lets the others render.

use crate::artifacts::{load_feature_schema, load_scaler};
use crate::config::{AppConfig, ArtifactsConfig, PipelineConfig};
use crate::dataset::Dataset;
use crate::derived;
use crate::error::{ArtifactKind, DashboardError, Result};
use crate::metrics::InferenceMetrics;
use crate::models::{ModelLoader, OnnxDelayModel, OnnxDemandModel};
use crate::pipeline::{DashboardContext, InferencePipeline};
use crate::types::record::FormInput;
use crate::types::report::{DashboardView, ErrorBanner, RenderReport, Section, Table};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

const INVENTORY_COLUMNS: [&str; 3] = ["Asset_ID_enc", "Inventory_Level", "Demand_Forecast"];
const REROUTE_COLUMNS: [&str; 4] = ["Asset_ID_enc", "Latitude", "Longitude", "Inventory_Level"];

/// Source of a fully loaded context
pub trait ArtifactLoader {
    fn load(&self) -> Result<DashboardContext>;
}

/// Loads the dataset and artifacts from the configured directory
pub struct FsArtifactLoader {
    artifacts: ArtifactsConfig,
    onnx_threads: usize,
}

impl FsArtifactLoader {
    pub fn new(artifacts: ArtifactsConfig, onnx_threads: usize) -> Self {
        Self {
            artifacts,
            onnx_threads,
        }
    }
}

fn require_file(kind: ArtifactKind, path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(DashboardError::load(kind, path, "file not found"))
    }
}

impl ArtifactLoader for FsArtifactLoader {
    fn load(&self) -> Result<DashboardContext> {
        let dataset = Dataset::from_csv_path(self.artifacts.dataset_path())?;
        let delay_schema =
            load_feature_schema(ArtifactKind::DelaySchema, self.artifacts.delay_schema_path())?;
        let demand_schema =
            load_feature_schema(ArtifactKind::DemandSchema, self.artifacts.demand_schema_path())?;
        let scaler = load_scaler(self.artifacts.scaler_path(), &delay_schema)?;

        let delay_path = self.artifacts.delay_model_path();
        let demand_path = self.artifacts.demand_model_path();
        require_file(ArtifactKind::DelayModel, &delay_path)?;
        require_file(ArtifactKind::DemandModel, &demand_path)?;

        let loader = ModelLoader::with_threads(self.onnx_threads).map_err(|e| {
            DashboardError::load(ArtifactKind::DelayModel, &delay_path, format!("{:#}", e))
        })?;

        let delay_model = OnnxDelayModel::load(&loader, &delay_path, delay_schema.len())
            .map_err(|e| DashboardError::load(ArtifactKind::DelayModel, &delay_path, format!("{:#}", e)))?;
        let demand_model = OnnxDemandModel::load(&loader, &demand_path, demand_schema.len())
            .map_err(|e| DashboardError::load(ArtifactKind::DemandModel, &demand_path, format!("{:#}", e)))?;

        DashboardContext::new(
            dataset,
            delay_schema,
            demand_schema,
            scaler,
            Box::new(delay_model),
            Box::new(demand_model),
        )
    }
}

/// A dashboard session: caches the loaded context across render passes
pub struct Dashboard<L: ArtifactLoader> {
    loader: L,
    settings: PipelineConfig,
    diagnostics: bool,
    metrics: Arc<InferenceMetrics>,
    context: Option<Arc<DashboardContext>>,
}

impl Dashboard<FsArtifactLoader> {
    pub fn from_config(config: &AppConfig) -> Self {
        let loader = FsArtifactLoader::new(config.artifacts.clone(), config.pipeline.onnx_threads);
        Self::new(loader, config.pipeline.clone(), config.display.diagnostics)
    }
}

impl<L: ArtifactLoader> Dashboard<L> {
    pub fn new(loader: L, settings: PipelineConfig, diagnostics: bool) -> Self {
        Self {
            loader,
            settings,
            diagnostics,
            metrics: Arc::new(InferenceMetrics::new()),
            context: None,
        }
    }

    pub fn metrics(&self) -> Arc<InferenceMetrics> {
        self.metrics.clone()
    }

    /// The loaded context, loading it on first use. Failed loads are not cached.
    pub fn context(&mut self) -> Result<Arc<DashboardContext>> {
        if let Some(context) = &self.context {
            return Ok(context.clone());
        }

        let context = Arc::new(self.loader.load()?);
        info!(
            rows = context.dataset.len(),
            delay_features = context.delay_schema.len(),
            demand_features = context.demand_schema.len(),
            "Dashboard context loaded"
        );
        self.context = Some(context.clone());
        Ok(context)
    }

    /// Run one render pass with the given form inputs
    pub fn render(&mut self, form: &FormInput) -> RenderReport {
        self.metrics.record_render();

        let context = match self.context() {
            Ok(context) => context,
            Err(e) => {
                error!(error = %e, "Load phase failed, render halted");
                self.metrics.record_load_failure();
                return RenderReport::halted(ErrorBanner::new("load", &e, self.diagnostics));
            }
        };

        let pipeline = InferencePipeline::new(&context, &self.settings, &self.metrics);
        let rows = context.dataset.rows();

        let bulk_labels = self.section("bulk delay prediction", pipeline.predict_delay_labels(rows));
        let restock = derived::restock_rows(rows);

        let manual = [form.to_record()];
        let delay_prediction = self.section(
            "shipment delay prediction",
            pipeline
                .predict_delay(&manual)
                .and_then(|p| first(context.delay_model.name(), p)),
        );
        let demand_forecast = self.section(
            "demand forecast",
            pipeline
                .predict_demand(&manual)
                .and_then(|p| first(context.demand_model.name(), p)),
        );

        let delay_class = self.settings.delay_class;
        let view = DashboardView {
            total_assets: rows.len(),
            predicted_delays: bulk_labels
                .map_ready(|labels| derived::reroute_rows(labels, delay_class).len()),
            assets_to_restock: restock.len(),
            delay_prediction,
            demand_forecast,
            inventory_overview: Table::project(rows, 0..rows.len(), &INVENTORY_COLUMNS),
            restock_recommendations: Table::project(rows, restock.iter().copied(), &INVENTORY_COLUMNS),
            reroute_recommendations: bulk_labels.map_ready(|labels| {
                Table::project(rows, derived::reroute_rows(labels, delay_class), &REROUTE_COLUMNS)
            }),
            delay_distribution: bulk_labels.map_ready(|labels| derived::label_distribution(labels)),
        };

        info!(
            total_assets = view.total_assets,
            assets_to_restock = view.assets_to_restock,
            predicted_delays = ?view.predicted_delays.ready(),
            "Render pass complete"
        );
        RenderReport::rendered(view)
    }

    fn section<T>(&self, name: &str, result: Result<T>) -> Section<T> {
        match result {
            Ok(value) => Section::Ready(value),
            Err(e) => {
                error!(section = name, error = %e, "Section failed");
                self.metrics.record_section_failure();
                Section::Failed(ErrorBanner::new(name, &e, self.diagnostics))
            }
        }
    }
}

fn first<T>(model: &str, values: Vec<T>) -> Result<T> {
    values
        .into_iter()
        .next()
        .ok_or_else(|| DashboardError::MalformedOutput {
            model: model.to_string(),
            reason: "no prediction for the submitted record".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature_aligner::FeatureMatrix;
    use crate::models::{ClassProbabilities, DelayClassifier, DemandRegressor};
    use crate::pipeline::tests::{context_with, delay_schema, LogisticDelay, SumDemand};
    use crate::types::record::Record;
    use std::cell::{Cell, RefCell};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Hands out a prepared context; counts how often it was asked
    struct StaticLoader {
        loads: Cell<usize>,
        context: RefCell<Option<DashboardContext>>,
    }

    impl StaticLoader {
        fn new(context: DashboardContext) -> Self {
            Self {
                loads: Cell::new(0),
                context: RefCell::new(Some(context)),
            }
        }
    }

    impl ArtifactLoader for StaticLoader {
        fn load(&self) -> Result<DashboardContext> {
            self.loads.set(self.loads.get() + 1);
            self.context
                .borrow_mut()
                .take()
                .ok_or_else(|| DashboardError::load(ArtifactKind::Dataset, "memory", "already taken"))
        }
    }

    /// Builds counting models, then fails reading the dataset from disk
    struct MissingDatasetLoader {
        delay_calls: Arc<AtomicUsize>,
        demand_calls: Arc<AtomicUsize>,
    }

    impl ArtifactLoader for MissingDatasetLoader {
        fn load(&self) -> Result<DashboardContext> {
            let delay = LogisticDelay {
                calls: self.delay_calls.clone(),
                ..LogisticDelay::new()
            };
            let demand = SumDemand {
                calls: self.demand_calls.clone(),
                ..SumDemand::new()
            };

            let dataset = Dataset::from_csv_path("this/path/does/not/exist.csv")?;
            Ok(context_with(dataset, Box::new(delay), Box::new(demand)))
        }
    }

    struct FailingDemand;

    impl DemandRegressor for FailingDemand {
        fn name(&self) -> &str {
            "demand_model"
        }

        fn predict(&self, _features: &FeatureMatrix) -> Result<Vec<f64>> {
            Err(DashboardError::Invocation {
                model: "demand_model".to_string(),
                reason: "runtime exploded".to_string(),
            })
        }
    }

    struct FailingDelay;

    impl DelayClassifier for FailingDelay {
        fn name(&self) -> &str {
            "delay_model"
        }

        fn predict(&self, _features: &FeatureMatrix) -> Result<Vec<i64>> {
            Err(DashboardError::Invocation {
                model: "delay_model".to_string(),
                reason: "bad graph".to_string(),
            })
        }

        fn predict_proba(&self, _features: &FeatureMatrix) -> Result<Vec<ClassProbabilities>> {
            Err(DashboardError::Invocation {
                model: "delay_model".to_string(),
                reason: "bad graph".to_string(),
            })
        }
    }

    /// Rows around the form defaults; latitude offsets drive the logistic fake
    fn dataset() -> Dataset {
        let rows = [(-3.0, 50.0, 100.0), (2.0, 120.0, 100.0), (4.0, 80.0, 80.0), (1.0, 10.0, 90.0)]
            .iter()
            .enumerate()
            .map(|(i, &(lat_offset, inventory, forecast))| {
                let mut form = FormInput::default();
                form.latitude += lat_offset;
                form.inventory_level = inventory;
                form.demand_forecast = forecast;
                form.asset_id_enc = i as f64;
                form.to_record()
            })
            .collect::<Vec<Record>>();

        let columns = delay_schema().columns().to_vec();
        Dataset::from_records(columns, rows)
    }

    #[test]
    fn test_full_render_pass() {
        let context = context_with(dataset(), Box::new(LogisticDelay::new()), Box::new(SumDemand::new()));
        let mut dashboard = Dashboard::new(StaticLoader::new(context), PipelineConfig::default(), false);

        let report = dashboard.render(&FormInput::default());
        let view = report.view().unwrap();

        assert_eq!(view.total_assets, 4);
        // Inventory below forecast: rows 0 and 3
        assert_eq!(view.assets_to_restock, 2);
        assert_eq!(view.restock_recommendations.indices, vec![0, 3]);
        // Positive latitude offsets are predicted delayed: rows 1, 2 and 3
        assert_eq!(view.predicted_delays.ready(), Some(&3));
        let reroute = view.reroute_recommendations.ready().unwrap();
        assert_eq!(reroute.indices, vec![1, 2, 3]);
        assert_eq!(reroute.columns, REROUTE_COLUMNS.to_vec());
        let distribution = view.delay_distribution.ready().unwrap();
        assert_eq!(distribution.get(&0), Some(&1));
        assert_eq!(distribution.get(&1), Some(&3));

        // Default form scales to zero: a coin flip
        let delay = view.delay_prediction.ready().unwrap();
        assert!((delay.probability_delay - 0.5).abs() < 1e-9);
        // Inventory 45 + Temperature 30 + missing Supplier_Score 0
        assert_eq!(view.demand_forecast.ready(), Some(&75.0));
    }

    #[test]
    fn test_context_is_loaded_once_per_session() {
        let context = context_with(dataset(), Box::new(LogisticDelay::new()), Box::new(SumDemand::new()));
        let mut dashboard = Dashboard::new(StaticLoader::new(context), PipelineConfig::default(), false);

        assert!(!dashboard.render(&FormInput::default()).is_halted());
        assert!(!dashboard.render(&FormInput::default()).is_halted());

        assert_eq!(dashboard.loader.loads.get(), 1);
        assert_eq!(dashboard.metrics().renders.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_missing_dataset_halts_without_predictions() {
        let loader = MissingDatasetLoader {
            delay_calls: Arc::new(AtomicUsize::new(0)),
            demand_calls: Arc::new(AtomicUsize::new(0)),
        };
        let delay_calls = loader.delay_calls.clone();
        let demand_calls = loader.demand_calls.clone();
        let mut dashboard = Dashboard::new(loader, PipelineConfig::default(), true);

        let report = dashboard.render(&FormInput::default());

        assert!(report.is_halted());
        assert!(report.to_text(10).contains("load_failure"));
        assert_eq!(delay_calls.load(Ordering::SeqCst), 0);
        assert_eq!(demand_calls.load(Ordering::SeqCst), 0);
        assert_eq!(dashboard.metrics().total_model_calls(), 0);
        assert_eq!(dashboard.metrics().load_failures.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_failed_load_is_retried_on_next_render() {
        let loader = MissingDatasetLoader {
            delay_calls: Arc::new(AtomicUsize::new(0)),
            demand_calls: Arc::new(AtomicUsize::new(0)),
        };
        let mut dashboard = Dashboard::new(loader, PipelineConfig::default(), false);

        dashboard.render(&FormInput::default());
        dashboard.render(&FormInput::default());

        assert!(dashboard.context.is_none());
        assert_eq!(dashboard.metrics().load_failures.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_demand_failure_does_not_block_other_sections() {
        let context = context_with(dataset(), Box::new(LogisticDelay::new()), Box::new(FailingDemand));
        let mut dashboard = Dashboard::new(StaticLoader::new(context), PipelineConfig::default(), false);

        let report = dashboard.render(&FormInput::default());
        let view = report.view().unwrap();

        assert!(view.demand_forecast.is_failed());
        assert!(view.delay_prediction.ready().is_some());
        assert!(view.reroute_recommendations.ready().is_some());
        assert!(report.to_text(10).contains("runtime exploded"));
    }

    #[test]
    fn test_delay_failure_keeps_restock_and_demand() {
        let context = context_with(dataset(), Box::new(FailingDelay), Box::new(SumDemand::new()));
        let mut dashboard = Dashboard::new(StaticLoader::new(context), PipelineConfig::default(), false);

        let report = dashboard.render(&FormInput::default());
        let view = report.view().unwrap();

        assert!(view.predicted_delays.is_failed());
        assert!(view.reroute_recommendations.is_failed());
        assert!(view.delay_distribution.is_failed());
        assert!(view.delay_prediction.is_failed());
        assert_eq!(view.assets_to_restock, 2);
        assert_eq!(view.demand_forecast.ready(), Some(&75.0));
        assert_eq!(dashboard.metrics().section_failures.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_fs_loader_reports_missing_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let artifacts = ArtifactsConfig {
            dir: dir.path().display().to_string(),
            ..ArtifactsConfig::default()
        };

        let err = FsArtifactLoader::new(artifacts, 1).load().err().unwrap();

        assert!(matches!(
            err,
            DashboardError::Load {
                kind: ArtifactKind::Dataset,
                ..
            }
        ));
    }
}
