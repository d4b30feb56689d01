use thiserror::Error;
use zip::result::ZipError;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Failed to read ZIP archive: {0}")]
    Zip(#[from] ZipError),
    #[error("Missing files in ZIP: {}", .0.join(", "))]
    MissingEntries(Vec<String>),
    #[error("Invalid timestamp in date.txt: {0:?}")]
    InvalidDate(String),
    #[error("Failed to copy archive entry: {0}")]
    Io(#[from] std::io::Error),
}
