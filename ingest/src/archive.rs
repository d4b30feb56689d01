use crate::error::ArchiveError;
use chrono::{DateTime, Utc};
use itertools::Itertools;
use std::{
    collections::{BTreeMap, BTreeSet},
    fs::File,
    io::{self, Read, Seek},
    path::Path,
};
use tracing::{debug, info, warn};
use zip::ZipArchive;

pub const MODEL_NUMBER: &str = "model_number.txt";
pub const DATE: &str = "date.txt";
pub const BCACHE_COMMIT: &str = "bcache_commit.txt";
pub const FDISK: &str = "fdisk.txt";

pub const REQUIRED_ENTRIES: [&str; 4] = [MODEL_NUMBER, DATE, BCACHE_COMMIT, FDISK];

/// Metadata shipped next to the logs of one submission
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub disk_model: String,
    pub date: DateTime<Utc>,
    pub bcache_commit: String,
    pub fdisk: String,
}

/// uploads are accepted by file name only, like `run.zip`
pub fn has_zip_extension(file_name: &str) -> bool {
    file_name.rsplit('.').next() == Some("zip")
}

/// A validated benchmark archive
///
/// Opening fails unless all of [`REQUIRED_ENTRIES`] are present.
pub struct BenchArchive<R: Read + Seek> {
    archive: ZipArchive<R>,
    names: BTreeSet<String>,
}

impl<R: Read + Seek> BenchArchive<R> {
    pub fn open(reader: R) -> Result<Self, ArchiveError> {
        let archive = ZipArchive::new(reader)?;
        let names = archive
            .file_names()
            .map(str::to_owned)
            .collect::<BTreeSet<_>>();

        let missing = REQUIRED_ENTRIES
            .iter()
            .filter(|entry| !names.contains(**entry))
            .map(|entry| entry.to_string())
            .sorted()
            .collect_vec();

        if !missing.is_empty() {
            warn!(missing = ?missing, "Rejected archive with missing metadata");

            return Err(ArchiveError::MissingEntries(missing));
        }

        debug!(entries = names.len(), "Opened archive");

        Ok(Self { archive, names })
    }

    /// read and parse the metadata entries
    pub fn submission(&mut self) -> Result<Submission, ArchiveError> {
        let date = self.read_text(DATE)?;

        Ok(Submission {
            disk_model: self.read_text(MODEL_NUMBER)?.trim().to_owned(),
            date: parse_date(&date)?,
            bcache_commit: self.read_text(BCACHE_COMMIT)?,
            fdisk: self.read_text(FDISK)?,
        })
    }

    /// Log entries grouped by filesystem label, the part of the name before the first `-`
    ///
    /// Nested entries are skipped since the label would contain a path.
    pub fn filesystems(&self) -> BTreeMap<String, Vec<String>> {
        let mut filesystems = BTreeMap::<String, Vec<String>>::new();

        for name in self.names.iter() {
            if name.contains(|character: char| character == '/' || character == '\\') {
                warn!(entry = %name, "Skipping nested archive entry");
                continue;
            }

            if let Some((filesystem, _)) = name.split_once('-') {
                filesystems
                    .entry(filesystem.to_owned())
                    .or_default()
                    .push(name.clone());
            }
        }

        filesystems
    }

    /// copy one entry to `destination`, replacing an existing file
    pub fn extract(&mut self, entry: &str, destination: &Path) -> Result<u64, ArchiveError> {
        let mut file = self.archive.by_name(entry)?;
        let mut output = File::create(destination)?;
        let written = io::copy(&mut file, &mut output)?;

        debug!(entry = entry, destination = ?destination, bytes = written, "Extracted entry");

        Ok(written)
    }

    fn read_text(&mut self, entry: &str) -> Result<String, ArchiveError> {
        let mut buffer = String::new();
        self.archive.by_name(entry)?.read_to_string(&mut buffer)?;

        Ok(buffer)
    }
}

/// Unix timestamp with optional fraction, surrounding whitespace allowed
pub fn parse_date(input: &str) -> Result<DateTime<Utc>, ArchiveError> {
    let invalid = || ArchiveError::InvalidDate(input.to_owned());
    let timestamp = input.trim().parse::<f64>().map_err(|_| invalid())?;

    if !timestamp.is_finite() {
        return Err(invalid());
    }

    let seconds = timestamp.floor();
    let nanos = ((timestamp - seconds) * 1e9).round().min(999_999_999.0) as u32;
    let date = DateTime::from_timestamp(seconds as i64, nanos).ok_or_else(invalid)?;

    info!(date = %date, "Parsed submission date");

    Ok(date)
}
