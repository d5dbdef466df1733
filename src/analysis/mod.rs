/// Statistical analyzers fed by metric ingest
pub mod anomaly;
pub mod store;
pub mod trend;

pub use anomaly::{AnomalyConfig, AnomalyDetector, AnomalyVerdict};
pub use store::{Aggregation, MetricStore};
pub use trend::{TrendAnalyzer, TrendConfig, TrendDirection, TrendReport, linear_regression};
