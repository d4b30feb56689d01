//! Fixtures shared by the unit tests of this crate

use crate::{
    config::{DatabaseConfig, ServerConfig},
    database::SharedConnection,
};
use fsbench_analysis::{METRICS, SCENARIOS};
use itertools::{iproduct, Itertools};
use std::{
    collections::BTreeSet,
    io::{Cursor, Write},
    path::PathBuf,
};
use tempfile::TempDir;
use zip::{write::SimpleFileOptions, ZipWriter};

pub struct Fixture {
    pub connection: SharedConnection,
    pub config: ServerConfig,
    _dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ServerConfig::default();
        config.database = DatabaseConfig {
            path: PathBuf::from(":memory:"),
        };
        config.storage.logs = dir.path().join("files");
        config.storage.graphs = dir.path().join("graphs");
        assert!(!config.preflight_checks());

        let connection = SharedConnection::load(&config.database).unwrap();
        connection.init().unwrap();

        Self {
            connection,
            config,
            _dir: dir,
        }
    }
}

fn log_contents() -> String {
    (0..200)
        .map(|index| {
            format!(
                "{}, {}, {}, 4096",
                index * 50,
                800 + (index * 53) % 400,
                index % 3 % 2
            )
        })
        .join("\n")
}

/// ZIP with metadata and a complete set of logs for every filesystem, leaving out `omit`
pub fn archive(filesystems: &[&str], omit: &[&str]) -> Vec<u8> {
    let mut entries = vec![
        ("model_number.txt".to_owned(), "INTEL SSDSC2BB240G4\n".to_owned()),
        ("date.txt".to_owned(), "1514764800\n".to_owned()),
        ("bcache_commit.txt".to_owned(), "0123abcd\n".to_owned()),
        ("fdisk.txt".to_owned(), "Disk /dev/sdb: 223.6 GiB\n".to_owned()),
    ];
    entries.retain(|(name, _)| !omit.contains(&name.as_str()));

    let logs = iproduct!(filesystems.iter(), SCENARIOS.iter(), METRICS.iter())
        .map(|(filesystem, scenario, metric)| {
            format!(
                "{filesystem}-{}_{}.log_{}.log",
                scenario.file_scenario(),
                metric.primary(),
                metric.secondary()
            )
        })
        .collect::<BTreeSet<_>>();
    entries.extend(logs.into_iter().map(|name| (name, log_contents())));

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, contents) in entries {
        writer.start_file(name, SimpleFileOptions::default()).unwrap();
        writer.write_all(contents.as_bytes()).unwrap();
    }

    writer.finish().unwrap().into_inner()
}
