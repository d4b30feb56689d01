use crate::reader::Direction;
use std::fmt;

/// A named fio access pattern
///
/// Mixed workloads log reads and writes into the same file, so their names
/// carry a `-read`/`-write` suffix that selects the rows of one direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scenario {
    pub name: &'static str,
}

/// A measured quantity, keyed as `primary.secondary` like fio names its logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Metric {
    pub key: &'static str,
    pub short: &'static str,
    pub unit: &'static str,
    pub display: &'static str,
}

pub const SCENARIOS: [Scenario; 6] = [
    Scenario { name: "seqread" },
    Scenario { name: "seqwrite" },
    Scenario { name: "randread" },
    Scenario { name: "randwrite" },
    Scenario { name: "70mix-read" },
    Scenario { name: "70mix-write" },
];

pub const METRICS: [Metric; 3] = [
    Metric {
        key: "bw.bw",
        short: "bw",
        unit: "KB/s",
        display: "bandwidth",
    },
    Metric {
        key: "iops.iops",
        short: "iops",
        unit: "op/s",
        display: "IOPS",
    },
    Metric {
        key: "lat.lat",
        short: "lat",
        unit: "usec",
        display: "latency",
    },
];

impl Scenario {
    /// name of the scenario as it appears in log file names, without the direction suffix
    pub fn file_scenario(&self) -> &'static str {
        self.name
            .split_once('-')
            .map_or(self.name, |(scenario, _)| scenario)
    }

    /// direction encoded in the name; anything but `read` selects writes
    pub fn direction(&self) -> Option<Direction> {
        self.name.split_once('-').map(|(_, direction)| {
            if direction == "read" {
                Direction::Read
            } else {
                Direction::Write
            }
        })
    }

    /// human readable form used in chart titles, e.g. `70Mix-Read`
    pub fn title(&self) -> String {
        title_case(self.name)
    }
}

impl Metric {
    pub fn primary(&self) -> &'static str {
        self.key.split_once('.').map_or(self.key, |(primary, _)| primary)
    }

    pub fn secondary(&self) -> &'static str {
        self.key
            .split_once('.')
            .map_or(self.key, |(_, secondary)| secondary)
    }

    pub fn is_latency(&self) -> bool {
        self.short.ends_with("lat")
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key)
    }
}

/// `{run_id}-{filesystem}-{scenario}_{primary}.log_{secondary}.log`
pub fn log_file_name(run_id: i64, filesystem: &str, scenario: &Scenario, metric: &Metric) -> String {
    format!(
        "{run_id}-{filesystem}-{}_{}.log_{}.log",
        scenario.file_scenario(),
        metric.primary(),
        metric.secondary()
    )
}

/// `{run_id}-{filesystem}-{scenario}-{metric}.png`
pub fn chart_file_name(
    run_id: i64,
    filesystem: &str,
    scenario: &Scenario,
    metric: &Metric,
) -> String {
    format!("{run_id}-{filesystem}-{}-{}.png", scenario.name, metric.key)
}

// upper case every letter that follows a non letter, lower case the rest
fn title_case(input: &str) -> String {
    let mut previous_is_letter = false;

    input
        .chars()
        .map(|character| {
            let mapped = if previous_is_letter {
                character.to_ascii_lowercase()
            } else {
                character.to_ascii_uppercase()
            };
            previous_is_letter = character.is_alphabetic();

            mapped
        })
        .collect()
}
