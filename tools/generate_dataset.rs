//! Synthetic Dataset Generator
//!
//! Writes a `processed_data.csv` with the columns the dashboard reads, plus
//! matching feature-schema and scaler JSON files, for local runs. The ONNX
//! models still have to be exported from the training environment.

use anyhow::Context;
use chrono::{Duration, Utc};
use clap::Parser;
use rand::Rng;
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use supply_chain_dashboard::types::DASHBOARD_COLUMNS;
use tracing::info;

/// Columns the demand model is trained on: everything but its own target,
/// plus a status code the manual form never supplies.
const DEMAND_COLUMNS: [&str; 13] = [
    "Latitude",
    "Longitude",
    "Inventory_Level",
    "Temperature",
    "Humidity",
    "Waiting_Time",
    "User_Transaction_Amount",
    "User_Purchase_Frequency",
    "Asset_Utilization",
    "Logistics_Delay_Reason_enc",
    "Traffic_Status_enc",
    "Asset_ID_enc",
    "Shipment_Status_enc",
];

#[derive(Parser)]
#[command(name = "generate-dataset")]
#[command(about = "Write a synthetic dataset and companion artifacts", long_about = None)]
struct Args {
    /// Output directory
    #[arg(short, long, default_value = "artifacts")]
    out: PathBuf,

    /// Number of rows
    #[arg(short, long, default_value_t = 500)]
    rows: usize,

    /// Share of rows generated under congested conditions
    #[arg(long, default_value_t = 0.3)]
    congestion_rate: f64,
}

/// Row generator for testing
struct RowGenerator {
    rng: rand::rngs::ThreadRng,
    row_counter: u64,
}

impl RowGenerator {
    fn new() -> Self {
        Self {
            rng: rand::thread_rng(),
            row_counter: 0,
        }
    }

    /// Generate a row under normal traffic: short waits, stock near demand
    fn generate_normal(&mut self) -> Vec<f64> {
        let demand = self.rng.gen_range(50.0..250.0_f64).round();
        vec![
            self.rng.gen_range(-90.0..90.0),
            self.rng.gen_range(-180.0..180.0),
            (demand * self.rng.gen_range(0.8..1.6_f64)).round(),
            self.rng.gen_range(15.0..30.0_f64).round(),
            self.rng.gen_range(40.0..70.0_f64).round(),
            self.rng.gen_range(5.0..30.0_f64).round(),
            self.rng.gen_range(100.0..8000.0_f64).round(),
            self.rng.gen_range(1..10) as f64,
            self.rng.gen_range(0.5..0.95),
            demand,
            self.rng.gen_range(0..4) as f64,
            self.rng.gen_range(0..2) as f64,
            self.rng.gen_range(0..50) as f64,
        ]
    }

    /// Generate a row under congestion: long waits, heavy traffic, thin stock
    fn generate_congested(&mut self) -> Vec<f64> {
        let mut row = self.generate_normal();
        row[2] = (row[9] * self.rng.gen_range(0.2..1.0_f64)).round(); // Inventory below demand
        row[3] = self.rng.gen_range(28.0..42.0_f64).round(); // Hot
        row[5] = self.rng.gen_range(40.0..90.0_f64).round(); // Long wait
        row[8] = self.rng.gen_range(0.85..1.0); // Saturated assets
        row[11] = 2.0; // Heavy traffic
        row
    }

    fn next_timestamp(&mut self) -> String {
        self.row_counter += 1;
        (Utc::now() - Duration::hours(self.row_counter as i64))
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
    }
}

fn column_stats(rows: &[Vec<f64>], index: usize) -> (f64, f64) {
    let n = rows.len().max(1) as f64;
    let mean = rows.iter().map(|r| r[index]).sum::<f64>() / n;
    let variance = rows.iter().map(|r| (r[index] - mean).powi(2)).sum::<f64>() / n;
    let std = variance.sqrt();
    (mean, if std == 0.0 { 1.0 } else { std })
}

fn write_json(path: &Path, value: &serde_json::Value) -> anyhow::Result<()> {
    fs::write(path, serde_json::to_string_pretty(value)?)
        .with_context(|| format!("Failed to write {}", path.display()))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("generate_dataset=info".parse()?),
        )
        .init();

    let args = Args::parse();
    info!(
        out = %args.out.display(),
        rows = args.rows,
        congestion_rate = args.congestion_rate,
        "Starting synthetic dataset generation"
    );

    fs::create_dir_all(&args.out)
        .with_context(|| format!("Failed to create {}", args.out.display()))?;

    let mut generator = RowGenerator::new();
    let mut rng = rand::thread_rng();
    let mut rows = Vec::with_capacity(args.rows);
    let mut congested_count = 0;

    let dataset_path = args.out.join("processed_data.csv");
    let mut writer = csv::Writer::from_path(&dataset_path)?;

    let mut header: Vec<&str> = vec!["Timestamp"];
    header.extend(DASHBOARD_COLUMNS);
    header.push("Shipment_Status_enc");
    writer.write_record(&header)?;

    for _ in 0..args.rows {
        let congested = rng.gen_bool(args.congestion_rate.clamp(0.0, 1.0));
        let row = if congested {
            congested_count += 1;
            generator.generate_congested()
        } else {
            generator.generate_normal()
        };

        let mut record = vec![generator.next_timestamp()];
        record.extend(row.iter().map(|v| v.to_string()));
        record.push(if congested { "1" } else { "0" }.to_string());
        writer.write_record(&record)?;

        rows.push(row);
    }
    writer.flush()?;

    info!(
        "Wrote {} rows ({} congested) to {}",
        args.rows,
        congested_count,
        dataset_path.display()
    );

    write_json(
        &args.out.join("delay_feature_columns.json"),
        &json!(DASHBOARD_COLUMNS),
    )?;
    write_json(
        &args.out.join("demand_feature_columns.json"),
        &json!(DEMAND_COLUMNS),
    )?;

    let (mean, scale): (Vec<f64>, Vec<f64>) = (0..DASHBOARD_COLUMNS.len())
        .map(|i| column_stats(&rows, i))
        .unzip();
    write_json(
        &args.out.join("scaler.json"),
        &json!({
            "mean": mean,
            "scale": scale,
            "feature_names": DASHBOARD_COLUMNS,
        }),
    )?;

    info!("Wrote feature schemas and scaler; export delay_model.onnx and demand_model.onnx alongside them");
    Ok(())
}
