//! Type definitions for the dashboard

pub mod record;
pub mod report;

pub use record::{FieldValue, FormInput, Record, DASHBOARD_COLUMNS};
pub use report::{ErrorBanner, RenderReport, Section};
