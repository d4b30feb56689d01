use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Failed to open log {}: {source}", path.display())]
    OpenLog {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse log {}: {source}", path.display())]
    ParseLog { path: PathBuf, source: csv::Error },
    #[error("No samples to plot for {0}")]
    EmptySeries(String),
    #[error("Failed to render chart {}: {message}", path.display())]
    Render { path: PathBuf, message: String },
}
