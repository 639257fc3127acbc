//! Pre-processed dataset loading

use crate::error::{ArtifactKind, DashboardError, Result};
use crate::types::record::{FieldValue, Record, DASHBOARD_COLUMNS};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::{info, warn};

/// Tabular dataset held read-only for the lifetime of a dashboard session
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    columns: Vec<String>,
    rows: Vec<Record>,
    /// Blank cells left out of their rows; schema alignment fills them
    empty_cells: usize,
}

impl Dataset {
    /// Load a CSV file with a header row.
    ///
    /// Every column the dashboard reads must be present; any failure is a
    /// load failure for the render pass.
    pub fn from_csv_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| DashboardError::load(ArtifactKind::Dataset, path, e))?;

        let dataset = Self::from_reader(BufReader::new(file))
            .map_err(|reason| DashboardError::load(ArtifactKind::Dataset, path, reason))?;

        info!(
            path = %path.display(),
            rows = dataset.len(),
            columns = dataset.columns.len(),
            "Dataset loaded"
        );
        if dataset.empty_cells > 0 {
            warn!(
                path = %path.display(),
                empty_cells = dataset.empty_cells,
                "Dataset has blank cells; they are filled by the missing-field policy"
            );
        }
        Ok(dataset)
    }

    /// Parse CSV from any reader. Errors are returned as plain messages so the
    /// caller can attach the artifact path.
    pub fn from_reader<R: Read>(reader: R) -> std::result::Result<Self, String> {
        let mut reader = csv::Reader::from_reader(reader);

        let columns: Vec<String> = reader
            .headers()
            .map_err(|e| format!("failed to read CSV header: {}", e))?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let missing: Vec<&str> = DASHBOARD_COLUMNS
            .iter()
            .copied()
            .filter(|required| !columns.iter().any(|c| c == required))
            .collect();
        if !missing.is_empty() {
            return Err(format!("missing required columns: {}", missing.join(", ")));
        }

        let mut rows = Vec::new();
        let mut empty_cells = 0;
        for (index, result) in reader.records().enumerate() {
            let raw = result.map_err(|e| format!("failed to parse CSV row {}: {}", index + 1, e))?;

            let mut record = Record::new();
            for (column, cell) in columns.iter().zip(raw.iter()) {
                if cell.trim().is_empty() {
                    empty_cells += 1;
                    continue;
                }
                record.insert(column, FieldValue::parse(cell));
            }
            rows.push(record);
        }

        Ok(Self {
            columns,
            rows,
            empty_cells,
        })
    }

    /// Build a dataset from in-memory records
    pub fn from_records(columns: Vec<String>, rows: Vec<Record>) -> Self {
        Self {
            columns,
            rows,
            empty_cells: 0,
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Record] {
        &self.rows
    }

    pub fn empty_cells(&self) -> usize {
        self.empty_cells
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> String {
        DASHBOARD_COLUMNS.join(",")
    }

    #[test]
    fn test_parse_rows_and_keep_extra_columns() {
        let csv = format!(
            "{},Timestamp\n12.9,77.5,45,30,60,15,5000,4,0.75,120,3,1,10,2024-03-01\n",
            header()
        );

        let dataset = Dataset::from_reader(csv.as_bytes()).unwrap();

        assert_eq!(dataset.len(), 1);
        assert_eq!(dataset.columns().len(), 14);
        let row = &dataset.rows()[0];
        assert_eq!(row.number("Demand_Forecast"), Some(120.0));
        assert_eq!(
            row.get("Timestamp"),
            Some(&FieldValue::Text("2024-03-01".to_string()))
        );
    }

    #[test]
    fn test_empty_cells_are_absent_and_counted() {
        let csv = format!(
            "{}\n12.9,77.5,,30,60,15,5000,4,0.75,120,3,1,10\n1,2,3,4,5,6,7,8,0.5,9,1,0,\n",
            header()
        );

        let dataset = Dataset::from_reader(csv.as_bytes()).unwrap();

        assert!(!dataset.rows()[0].contains("Inventory_Level"));
        assert!(!dataset.rows()[1].contains("Asset_ID_enc"));
        assert_eq!(dataset.empty_cells(), 2);
    }

    #[test]
    fn test_missing_required_column() {
        let err = Dataset::from_reader("Latitude,Longitude\n1,2\n".as_bytes()).unwrap_err();
        assert!(err.contains("Inventory_Level"));
    }

    #[test]
    fn test_missing_file_is_load_failure() {
        let err = Dataset::from_csv_path("no/such/processed_data.csv").unwrap_err();
        assert!(matches!(
            err,
            DashboardError::Load {
                kind: ArtifactKind::Dataset,
                ..
            }
        ));
    }
}
