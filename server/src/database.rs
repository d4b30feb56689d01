pub mod sqlite;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use sqlite::SharedConnection;

pub type ID = i64;

/// label of the caching layer whose revision is tracked per submission
pub const BCACHE: &str = "bcache";

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("SQLite error: {0}")]
    SQLite(rusqlite::Error),
}

/// One uploaded submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchGroup {
    pub id: ID,
    pub date: DateTime<Utc>,
    pub disk_model: String,
    pub fdisk: String,
}

/// Results of one filesystem within a group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Benchmark {
    pub id: ID,
    pub filesystem: String,
    pub bcache_commit: Option<String>,
    pub benchgroup_id: ID,
}

/// A group together with its benchmarks, sorted by filesystem
#[derive(Debug, Clone, PartialEq)]
pub struct GroupOverview {
    pub group: BenchGroup,
    pub benchmarks: Vec<Benchmark>,
}

impl GroupOverview {
    pub fn bcache_commit(&self) -> Option<&str> {
        self.benchmarks
            .iter()
            .find(|benchmark| benchmark.filesystem == BCACHE)
            .and_then(|benchmark| benchmark.bcache_commit.as_deref())
    }
}
