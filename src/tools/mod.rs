//! Tasks and processors built on the execution engine.
pub mod filter;
pub mod metrics;
pub mod recorder;

#[cfg(feature = "storage_csv")]
pub mod exporter;

#[cfg(feature = "storage_csv")]
pub use exporter::{load_csv, save_csv, Exporter};
pub use filter::Filter;
pub use metrics::{Average, Maximum, Metric, Minimum, Rms};
pub use recorder::Recorder;
