//! Parsing and plotting of fio benchmark logs.
//!
//! The pipeline is deliberately linear: [`reader`] turns one log file into a
//! [`TimeSeries`], [`render`] draws it into a PNG and [`processor`] walks the
//! fixed scenario x metric grid from [`catalog`] for one benchmark.

pub mod catalog;
pub mod error;
pub mod processor;
pub mod reader;
pub mod render;
pub mod stats;

pub use catalog::{chart_file_name, log_file_name, Metric, Scenario, METRICS, SCENARIOS};
pub use error::AnalysisError;
pub use processor::process_benchmark;
pub use reader::{read_series, Direction, Sample, TimeSeries};
