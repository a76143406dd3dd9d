pub mod clock;
pub mod codec;
pub mod config;
pub mod error;
pub mod metric_set;
pub mod sampling;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::StoreConfig;
pub use error::{ConfigError, SampleError, StoreError};
pub use metric_set::{Aggregate, MetricDefinition, MetricSet};
pub use sampling::{compute_value, MetricValue, RawValue, SourceType};
pub use store::{Store, Storer};

pub type MetricKey = String;

/// A raw observation as remembered by the store.
///
/// `time` is in unix seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub time: i64,
    pub value: f64,
}
