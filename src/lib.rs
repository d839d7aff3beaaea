pub mod aggregation;
pub mod config;
pub mod country;
pub mod dashboard;
pub mod data;
pub mod error;
pub mod geo_join;
pub mod render;
pub mod report;
pub mod server;
pub mod types;

pub use dashboard::{Dashboard, Selection, View};
pub use error::{DashboardError, Result};
pub use types::{Gender, MapLayer, Record, RecordTable, Tab};
