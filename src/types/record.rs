//! Record and form input data structures

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The thirteen columns every dataset row and every form submission carries,
/// in the order the dashboard form lists them.
pub const DASHBOARD_COLUMNS: [&str; 13] = [
    "Latitude",
    "Longitude",
    "Inventory_Level",
    "Temperature",
    "Humidity",
    "Waiting_Time",
    "User_Transaction_Amount",
    "User_Purchase_Frequency",
    "Asset_Utilization",
    "Demand_Forecast",
    "Logistics_Delay_Reason_enc",
    "Traffic_Status_enc",
    "Asset_ID_enc",
];

/// A single cell value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
}

impl FieldValue {
    /// Parse a raw CSV cell, keeping it as text when it is not a number
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.parse::<f64>() {
            Ok(v) => FieldValue::Number(v),
            Err(_) => FieldValue::Text(trimmed.to_string()),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(v) => Some(*v),
            FieldValue::Text(_) => None,
        }
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Number(v)
    }
}

/// One row of the dataset or one manually entered case
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: BTreeMap<String, FieldValue>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, name: &str, value: impl Into<FieldValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: &str, value: impl Into<FieldValue>) {
        self.fields.insert(name.to_string(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Numeric value of a field, `None` when absent or text
    pub fn number(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(FieldValue::as_number)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Manual "what-if" form inputs with the dashboard's documented defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormInput {
    pub latitude: f64,
    pub longitude: f64,
    pub inventory_level: f64,
    pub temperature: f64,
    pub humidity: f64,
    pub waiting_time: f64,
    pub user_transaction_amount: f64,
    pub user_purchase_frequency: f64,
    pub asset_utilization: f64,
    pub demand_forecast: f64,
    pub logistics_delay_reason_enc: f64,
    pub traffic_status_enc: f64,
    pub asset_id_enc: f64,
}

impl Default for FormInput {
    fn default() -> Self {
        Self {
            latitude: 12.9716,
            longitude: 77.5946,
            inventory_level: 45.0,
            temperature: 30.0,
            humidity: 60.0,
            waiting_time: 15.0,
            user_transaction_amount: 5000.0,
            user_purchase_frequency: 4.0,
            asset_utilization: 0.75,
            demand_forecast: 120.0,
            logistics_delay_reason_enc: 3.0,
            traffic_status_enc: 1.0,
            asset_id_enc: 10.0,
        }
    }
}

impl FormInput {
    /// Values paired with their dataset column names, in form order
    pub fn values(&self) -> [(&'static str, f64); 13] {
        [
            (DASHBOARD_COLUMNS[0], self.latitude),
            (DASHBOARD_COLUMNS[1], self.longitude),
            (DASHBOARD_COLUMNS[2], self.inventory_level),
            (DASHBOARD_COLUMNS[3], self.temperature),
            (DASHBOARD_COLUMNS[4], self.humidity),
            (DASHBOARD_COLUMNS[5], self.waiting_time),
            (DASHBOARD_COLUMNS[6], self.user_transaction_amount),
            (DASHBOARD_COLUMNS[7], self.user_purchase_frequency),
            (DASHBOARD_COLUMNS[8], self.asset_utilization),
            (DASHBOARD_COLUMNS[9], self.demand_forecast),
            (DASHBOARD_COLUMNS[10], self.logistics_delay_reason_enc),
            (DASHBOARD_COLUMNS[11], self.traffic_status_enc),
            (DASHBOARD_COLUMNS[12], self.asset_id_enc),
        ]
    }

    /// Override one field by its column name (case-insensitive).
    ///
    /// Returns `false` when the name is not one of the form's columns.
    pub fn set(&mut self, column: &str, value: f64) -> bool {
        let slot = match column.to_ascii_lowercase().as_str() {
            "latitude" => &mut self.latitude,
            "longitude" => &mut self.longitude,
            "inventory_level" => &mut self.inventory_level,
            "temperature" => &mut self.temperature,
            "humidity" => &mut self.humidity,
            "waiting_time" => &mut self.waiting_time,
            "user_transaction_amount" => &mut self.user_transaction_amount,
            "user_purchase_frequency" => &mut self.user_purchase_frequency,
            "asset_utilization" => &mut self.asset_utilization,
            "demand_forecast" => &mut self.demand_forecast,
            "logistics_delay_reason_enc" => &mut self.logistics_delay_reason_enc,
            "traffic_status_enc" => &mut self.traffic_status_enc,
            "asset_id_enc" => &mut self.asset_id_enc,
            _ => return false,
        };
        *slot = value;
        true
    }

    /// Collect the form into an ad-hoc record keyed by dataset column names
    pub fn to_record(&self) -> Record {
        self.values()
            .iter()
            .fold(Record::new(), |record, (name, value)| record.with(name, *value))
    }
}
