use crate::{
    config::StorageConfig,
    database::{ConnectionError, SharedConnection, ID},
};
use fsbench_analysis::{process_benchmark, AnalysisError};
use fsbench_ingest::{has_zip_extension, ArchiveError, BenchArchive};
use std::{
    io::{Cursor, Read, Seek},
    path::PathBuf,
};
use thiserror::Error;
use tracing::{info, instrument};

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("Bad request, no file")]
    NoFile,
    #[error("Wrong file extension. Not .zip")]
    WrongExtension,
    #[error("{0}")]
    Archive(#[from] ArchiveError),
    #[error("Database query failed: {0}")]
    Database(#[from] ConnectionError),
    #[error("Failed to process benchmark: {0}")]
    Processing(#[from] AnalysisError),
    #[error("No benchmark with id {0}")]
    UnknownBenchmark(ID),
}

impl SubmitError {
    /// errors caused by the uploaded data rather than the server
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::NoFile
                | Self::WrongExtension
                | Self::Archive(
                    ArchiveError::Zip(_)
                        | ArchiveError::MissingEntries(_)
                        | ArchiveError::InvalidDate(_)
                )
        )
    }
}

/// Ingest an uploaded file, see [`ingest_archive`]
pub fn ingest_upload(
    connection: &SharedConnection,
    storage: &StorageConfig,
    file_name: &str,
    data: Vec<u8>,
) -> Result<ID, SubmitError> {
    if !has_zip_extension(file_name) {
        return Err(SubmitError::WrongExtension);
    }

    ingest_archive(connection, storage, Cursor::new(data))
}

/// Store a benchmark archive and render its charts, returns the id of the new group
///
/// The group is committed first and its benchmarks second. Raw logs are saved
/// as `{benchmark_id}-{entry}` in `storage.logs` before any chart is rendered.
/// A failing chart aborts processing but keeps everything already stored.
#[instrument(level = "info", skip_all)]
pub fn ingest_archive<R: Read + Seek>(
    connection: &SharedConnection,
    storage: &StorageConfig,
    reader: R,
) -> Result<ID, SubmitError> {
    let mut archive = BenchArchive::open(reader)?;
    let submission = archive.submission()?;
    let filesystems = archive.filesystems();

    let group = connection.create_group(&submission)?;
    let benchmarks = connection.create_benchmarks(
        group.id,
        filesystems.keys().map(String::as_str),
        &submission.bcache_commit,
    )?;

    for benchmark in benchmarks.iter() {
        for entry in filesystems[&benchmark.filesystem].iter() {
            let destination = storage.logs.join(format!("{}-{entry}", benchmark.id));
            archive.extract(entry, &destination)?;
        }
    }

    for benchmark in benchmarks.iter() {
        process_benchmark(
            benchmark.id,
            &benchmark.filesystem,
            &storage.logs,
            &storage.graphs,
        )?;
    }

    info!(
        group = group.id,
        benchmarks = benchmarks.len(),
        "Ingested submission"
    );

    Ok(group.id)
}

/// Render the charts of a stored benchmark again from its raw logs
#[instrument(level = "info", skip(connection, storage))]
pub fn reprocess(
    connection: &SharedConnection,
    storage: &StorageConfig,
    benchmark_id: ID,
) -> Result<Vec<PathBuf>, SubmitError> {
    let benchmark = connection
        .benchmark(benchmark_id)?
        .ok_or(SubmitError::UnknownBenchmark(benchmark_id))?;

    Ok(process_benchmark(
        benchmark.id,
        &benchmark.filesystem,
        &storage.logs,
        &storage.graphs,
    )?)
}
