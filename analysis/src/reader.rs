use crate::{
    catalog::{log_file_name, Metric, Scenario},
    error::AnalysisError,
};
use csv::{ReaderBuilder, Trim};
use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};
use std::{fs::File, io::Read, path::Path};
use tracing::debug;

#[derive(Serialize_repr, Deserialize_repr, PartialEq, Eq, Debug, Clone, Copy)]
#[repr(u8)]
pub enum Direction {
    Read = 0,
    Write = 1,
}

/// One row of a fio log: elapsed time in ms, value, direction and block size
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub time: u64,
    pub value: f64,
    pub direction: Direction,
    pub block_size: u64,
}

/// Chronologically ordered samples of a single metric, indexed by `time`
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries {
    pub label: String,
    pub samples: Vec<Sample>,
}

impl TimeSeries {
    pub fn new(label: impl Into<String>, samples: Vec<Sample>) -> Self {
        Self {
            label: label.into(),
            samples,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn values(&self) -> Vec<f64> {
        self.samples.iter().map(|sample| sample.value).collect()
    }

    /// smallest and largest timestamp, `None` for an empty series
    pub fn time_range(&self) -> Option<(u64, u64)> {
        let first = self.samples.first()?.time;

        Some(self.samples.iter().fold((first, first), |(min, max), sample| {
            (min.min(sample.time), max.max(sample.time))
        }))
    }

    /// copy of the series restricted to one direction
    pub fn filter_direction(&self, direction: Direction) -> Self {
        Self {
            label: self.label.clone(),
            samples: self
                .samples
                .iter()
                .filter(|sample| sample.direction == direction)
                .cloned()
                .collect(),
        }
    }
}

/// parse a headerless four column log from any reader
pub fn parse_log<R: Read>(
    reader: R,
    label: &str,
    path: &Path,
) -> Result<TimeSeries, AnalysisError> {
    let samples = ReaderBuilder::new()
        .has_headers(false)
        .trim(Trim::All)
        .from_reader(reader)
        .deserialize::<Sample>()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| AnalysisError::ParseLog {
            path: path.to_path_buf(),
            source,
        })?;

    Ok(TimeSeries::new(label, samples))
}

pub fn read_log(path: &Path, label: &str) -> Result<TimeSeries, AnalysisError> {
    let file = File::open(path).map_err(|source| AnalysisError::OpenLog {
        path: path.to_path_buf(),
        source,
    })?;

    parse_log(file, label, path)
}

/// Locate and parse the log of `metric` for `scenario`, keeping only the rows
/// of the scenario's direction if it has one
pub fn read_series(
    log_dir: &Path,
    run_id: i64,
    filesystem: &str,
    scenario: &Scenario,
    metric: &Metric,
) -> Result<TimeSeries, AnalysisError> {
    let path = log_dir.join(log_file_name(run_id, filesystem, scenario, metric));
    let series = read_log(&path, metric.secondary())?;

    debug!(path = ?path, samples = series.len(), "Parsed log");

    Ok(match scenario.direction() {
        Some(direction) => series.filter_direction(direction),
        None => series,
    })
}
