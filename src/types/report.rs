//! Render report data structures and text rendering

use crate::error::DashboardError;
use crate::pipeline::DelayPrediction;
use crate::types::record::Record;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::{self, Write};
use uuid::Uuid;

/// Error shown in place of a section's content
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBanner {
    pub section: String,
    pub category: String,
    pub message: String,
    /// Full error chain and artifact location, only in diagnostic mode
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ErrorBanner {
    pub fn new(section: &str, error: &DashboardError, diagnostics: bool) -> Self {
        let detail = diagnostics.then(|| {
            let mut detail = format!("{:?}", error);
            if let DashboardError::Load { path, .. } = error {
                let _ = write!(detail, "\nartifact: {}", path.display());
                let _ = write!(detail, "\nexists: {}", path.exists());
            }
            detail
        });

        Self {
            section: section.to_string(),
            category: error.category().to_string(),
            message: error.to_string(),
            detail,
        }
    }
}

/// Outcome of one independently rendered section
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Section<T> {
    Ready(T),
    Failed(ErrorBanner),
}

impl<T> Section<T> {
    pub fn ready(&self) -> Option<&T> {
        match self {
            Section::Ready(value) => Some(value),
            Section::Failed(_) => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Section::Failed(_))
    }

    /// Derive a dependent section; a failure carries over as the same banner
    pub fn map_ready<U>(&self, f: impl FnOnce(&T) -> U) -> Section<U> {
        match self {
            Section::Ready(value) => Section::Ready(f(value)),
            Section::Failed(banner) => Section::Failed(banner.clone()),
        }
    }
}

/// Subset of dataset rows projected onto a few columns
#[derive(Debug, Clone, Default, Serialize)]
pub struct Table {
    pub columns: Vec<String>,
    /// Dataset row index of each table row
    pub indices: Vec<usize>,
    pub rows: Vec<Vec<Option<f64>>>,
}

impl Table {
    pub fn project(rows: &[Record], indices: impl IntoIterator<Item = usize>, columns: &[&str]) -> Self {
        let indices: Vec<usize> = indices.into_iter().collect();
        let projected = indices
            .iter()
            .map(|&i| columns.iter().map(|c| rows[i].number(c)).collect())
            .collect();

        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            indices,
            rows: projected,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Everything a successful render pass shows
#[derive(Debug, Clone, Serialize)]
pub struct DashboardView {
    pub total_assets: usize,
    pub predicted_delays: Section<usize>,
    pub assets_to_restock: usize,
    pub delay_prediction: Section<DelayPrediction>,
    pub demand_forecast: Section<f64>,
    pub inventory_overview: Table,
    pub restock_recommendations: Table,
    pub reroute_recommendations: Section<Table>,
    pub delay_distribution: Section<BTreeMap<i64, usize>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportBody {
    Rendered(Box<DashboardView>),
    /// Load phase failed; nothing was computed
    Halted(ErrorBanner),
}

/// One render pass of the dashboard
#[derive(Debug, Clone, Serialize)]
pub struct RenderReport {
    pub render_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub body: ReportBody,
}

impl RenderReport {
    pub fn rendered(view: DashboardView) -> Self {
        Self::with_body(ReportBody::Rendered(Box::new(view)))
    }

    pub fn halted(banner: ErrorBanner) -> Self {
        Self::with_body(ReportBody::Halted(banner))
    }

    fn with_body(body: ReportBody) -> Self {
        Self {
            render_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            body,
        }
    }

    pub fn view(&self) -> Option<&DashboardView> {
        match &self.body {
            ReportBody::Rendered(view) => Some(view),
            ReportBody::Halted(_) => None,
        }
    }

    pub fn is_halted(&self) -> bool {
        matches!(self.body, ReportBody::Halted(_))
    }

    /// Plain-text dashboard, tables truncated to `max_rows`
    pub fn to_text(&self, max_rows: usize) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail
        let _ = self.write_text(&mut out, max_rows);
        out
    }

    fn write_text(&self, out: &mut String, max_rows: usize) -> fmt::Result {
        writeln!(out, "AI-Powered Supply Chain Dashboard")?;
        writeln!(
            out,
            "render {} at {}",
            self.render_id,
            self.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
        )?;

        let view = match &self.body {
            ReportBody::Halted(banner) => {
                header(out, "Dashboard unavailable")?;
                return write_banner(out, banner);
            }
            ReportBody::Rendered(view) => view,
        };

        header(out, "Key Metrics")?;
        writeln!(out, "Total Assets: {}", view.total_assets)?;
        match &view.predicted_delays {
            Section::Ready(count) => writeln!(out, "Predicted Delays: {}", count)?,
            Section::Failed(banner) => write_banner(out, banner)?,
        }
        writeln!(out, "Assets to Restock: {}", view.assets_to_restock)?;

        header(out, "Shipment Delay Prediction")?;
        match &view.delay_prediction {
            Section::Ready(p) => {
                writeln!(out, "Predicted Logistics Delay: {}", p.label)?;
                writeln!(out, "Probability of No Delay: {:.4}", p.probability_no_delay)?;
                writeln!(out, "Probability of Delay: {:.4}", p.probability_delay)?;
            }
            Section::Failed(banner) => write_banner(out, banner)?,
        }

        header(out, "Demand Forecast")?;
        match &view.demand_forecast {
            Section::Ready(value) => writeln!(out, "Predicted Demand: {:.4}", value)?,
            Section::Failed(banner) => write_banner(out, banner)?,
        }

        header(out, "Inventory Overview")?;
        write_table(out, &view.inventory_overview, max_rows)?;

        header(out, "Restocking Recommendations")?;
        write_table(out, &view.restock_recommendations, max_rows)?;

        header(out, "Predicted Delays (Rerouting Recommendations)")?;
        match &view.reroute_recommendations {
            Section::Ready(table) => write_table(out, table, max_rows)?,
            Section::Failed(banner) => write_banner(out, banner)?,
        }

        header(out, "Predicted Delays Distribution")?;
        match &view.delay_distribution {
            Section::Ready(counts) => {
                let total: usize = counts.values().sum();
                for (label, count) in counts {
                    let pct = if total > 0 {
                        *count as f64 / total as f64 * 100.0
                    } else {
                        0.0
                    };
                    let bar = "█".repeat(((pct / 2.0) as usize).min(50));
                    writeln!(out, "  {:>3}: {:>6} ({:>5.1}%) {}", label, count, pct, bar)?;
                }
            }
            Section::Failed(banner) => write_banner(out, banner)?,
        }

        Ok(())
    }
}

impl fmt::Display for RenderReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text(usize::MAX))
    }
}

fn header(out: &mut String, title: &str) -> fmt::Result {
    writeln!(out)?;
    writeln!(out, "== {} ==", title)
}

fn write_banner(out: &mut String, banner: &ErrorBanner) -> fmt::Result {
    writeln!(out, "[ERROR] {} ({}): {}", banner.section, banner.category, banner.message)?;
    if let Some(detail) = &banner.detail {
        for line in detail.lines() {
            writeln!(out, "    {}", line)?;
        }
    }
    Ok(())
}

fn write_table(out: &mut String, table: &Table, max_rows: usize) -> fmt::Result {
    if table.is_empty() {
        return writeln!(out, "(no rows)");
    }

    write!(out, "{:>7}", "")?;
    for column in &table.columns {
        write!(out, " {:>16}", column)?;
    }
    writeln!(out)?;

    for (index, row) in table.indices.iter().zip(&table.rows).take(max_rows) {
        write!(out, "{:>7}", index)?;
        for value in row {
            match value {
                Some(v) => write!(out, " {:>16}", format_number(*v))?,
                None => write!(out, " {:>16}", "-")?,
            }
        }
        writeln!(out)?;
    }

    if table.len() > max_rows {
        writeln!(out, "... {} more rows", table.len() - max_rows)?;
    }
    Ok(())
}

fn format_number(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{:.4}", v)
    }
}
