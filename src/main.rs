//! Supply Chain Dashboard - Main Entry Point
//!
//! Loads the dataset and trained artifacts, runs one render pass with the
//! configured form inputs and prints the dashboard to stdout.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use supply_chain_dashboard::{
    config::{AppConfig, OutputFormat},
    Dashboard,
};
use tracing::{info, warn};

const DEFAULT_CONFIG: &str = "config/config.toml";

#[derive(Parser)]
#[command(name = "supply-chain-dashboard")]
#[command(about = "AI-powered supply chain dashboard", long_about = None)]
struct Cli {
    /// Configuration file (default: config/config.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override a form input, e.g. --set Temperature=35
    #[arg(short, long = "set", value_name = "COLUMN=VALUE")]
    set: Vec<String>,

    /// Output format (text, json)
    #[arg(short, long)]
    format: Option<String>,

    /// Attach full diagnostics to error banners
    #[arg(short, long)]
    diagnostics: bool,
}

fn load_config(cli: &Cli) -> Result<AppConfig> {
    match &cli.config {
        Some(path) => AppConfig::load_from_path(path),
        None if Path::new(DEFAULT_CONFIG).exists() => AppConfig::load(),
        None => Ok(AppConfig::default()),
    }
}

fn apply_overrides(cli: &Cli, config: &mut AppConfig) -> Result<()> {
    for assignment in &cli.set {
        let (column, raw) = assignment
            .split_once('=')
            .with_context(|| format!("expected COLUMN=VALUE, got '{}'", assignment))?;
        let value: f64 = raw
            .trim()
            .parse()
            .with_context(|| format!("value for {} is not a number: '{}'", column, raw))?;
        if !config.form.set(column.trim(), value) {
            anyhow::bail!("unknown form input '{}'", column);
        }
    }

    if let Some(format) = &cli.format {
        config.display.format = match format.to_ascii_lowercase().as_str() {
            "text" => OutputFormat::Text,
            "json" => OutputFormat::Json,
            other => anyhow::bail!("unknown output format '{}'", other),
        };
    }

    if cli.diagnostics {
        config.display.diagnostics = true;
    }
    Ok(())
}

fn init_logging(config: &AppConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(format!("supply_chain_dashboard={}", config.logging.level).parse()?);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if config.logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let mut config = load_config(&cli)?;
    apply_overrides(&cli, &mut config)?;
    init_logging(&config)?;

    info!("Starting Supply Chain Dashboard");
    if cli.config.is_none() && !Path::new(DEFAULT_CONFIG).exists() {
        warn!("No configuration file found, using built-in defaults");
    }
    info!(
        artifacts_dir = %config.artifacts.dir,
        missing_field_policy = ?config.pipeline.missing_field_policy,
        demand_path_skips_scaling = config.pipeline.demand_path_skips_scaling,
        diagnostics = config.display.diagnostics,
        "Configuration loaded"
    );
    if config.pipeline.demand_path_skips_scaling {
        warn!("Demand model receives unscaled features (demand_path_skips_scaling = true)");
    }

    let mut dashboard = Dashboard::from_config(&config);
    let report = dashboard.render(&config.form);

    match config.display.format {
        OutputFormat::Text => print!("{}", report.to_text(config.display.max_rows)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }

    dashboard.metrics().print_summary();

    if report.is_halted() {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}
