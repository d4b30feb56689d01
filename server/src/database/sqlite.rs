use super::{BenchGroup, Benchmark, GroupOverview, BCACHE, ID};
use crate::{config::DatabaseConfig, database::ConnectionError};
use fsbench_ingest::Submission;
use parking_lot::{lock_api::ArcMutexGuard, FairMutex, RawFairMutex};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::Arc;
use tracing::{debug, error, info};
use tracing_unwrap::ResultExt;

#[derive(Debug, Clone)]
/// Transparent, thread safe wrapper over `InnerConnection`
pub struct SharedConnection(Arc<FairMutex<InnerConnection>>);

#[derive(Debug)]
pub struct InnerConnection {
    connection: Connection,
}

impl From<rusqlite::Error> for ConnectionError {
    fn from(error: rusqlite::Error) -> Self {
        ConnectionError::SQLite(error)
    }
}

impl SharedConnection {
    pub fn new(inner_connection: InnerConnection) -> Self {
        Self(Arc::new(FairMutex::new(inner_connection)))
    }

    fn lock(&self) -> ArcMutexGuard<RawFairMutex, InnerConnection> {
        self.0.lock_arc()
    }

    pub fn init(&self) -> Result<(), ConnectionError> {
        self.lock().init()
    }

    /// close the connection, must only be called on the last handle
    pub fn close(self) -> Result<(), ConnectionError> {
        Arc::try_unwrap(self.0).unwrap_or_log().into_inner().close()
    }

    pub fn load(config: &DatabaseConfig) -> Result<Self, ConnectionError> {
        Ok(Self::new(InnerConnection::load(config)?))
    }

    pub fn create_group(&self, submission: &Submission) -> Result<BenchGroup, ConnectionError> {
        self.lock().create_group(submission)
    }

    pub fn create_benchmarks<'a, I: IntoIterator<Item = &'a str>>(
        &self,
        group: ID,
        filesystems: I,
        bcache_commit: &str,
    ) -> Result<Vec<Benchmark>, ConnectionError> {
        self.lock().create_benchmarks(group, filesystems, bcache_commit)
    }

    pub fn list_groups(&self, limit: usize) -> Result<Vec<GroupOverview>, ConnectionError> {
        self.lock().list_groups(limit)
    }

    pub fn group(&self, id: ID) -> Result<Option<GroupOverview>, ConnectionError> {
        self.lock().group(id)
    }

    pub fn benchmark(&self, id: ID) -> Result<Option<Benchmark>, ConnectionError> {
        self.lock().benchmark(id)
    }
}

fn group_from_row(row: &Row<'_>) -> rusqlite::Result<BenchGroup> {
    Ok(BenchGroup {
        id: row.get(0)?,
        date: row.get(1)?,
        disk_model: row.get(2)?,
        fdisk: row.get(3)?,
    })
}

fn benchmark_from_row(row: &Row<'_>) -> rusqlite::Result<Benchmark> {
    Ok(Benchmark {
        id: row.get(0)?,
        filesystem: row.get(1)?,
        bcache_commit: row.get(2)?,
        benchgroup_id: row.get(3)?,
    })
}

impl InnerConnection {
    pub fn init(&mut self) -> Result<(), ConnectionError> {
        let mut counter = 1;

        for table in SQL_SCHEMA {
            match self.connection.execute(table, []) {
                Ok(_) => info!("Applied SQL schema ({counter}/{SQL_SCHEMA_NUMBER})"),
                Err(error) => {
                    error!(error = ?error, table = table, "Failed to apply SQL schema ({counter}/{SQL_SCHEMA_NUMBER}): {error}");

                    return Err(ConnectionError::SQLite(error));
                }
            };

            counter += 1;
        }

        Ok(())
    }

    pub fn close(mut self) -> Result<(), ConnectionError> {
        let mut counter = 0;
        while let Err((connection, error)) = self.connection.close() {
            counter += 1;
            self.connection = connection;
            error!(error = ?error, "Failed to close SQLite connection: {error}, trying again {counter}/3");

            if counter == 3 {
                error!("Failed to close connection");

                return Err(ConnectionError::SQLite(error));
            }
        }

        info!("Closed SQLite connection");

        Ok(())
    }

    pub fn load(config: &DatabaseConfig) -> Result<Self, ConnectionError> {
        let connection = Connection::open(&config.path)?;
        connection.pragma_update(None, "foreign_keys", true)?;

        debug!(path = ?config.path, "Opened SQLite database");

        Ok(Self { connection })
    }

    /// insert and commit the group on its own, before any benchmark exists
    pub fn create_group(&self, submission: &Submission) -> Result<BenchGroup, ConnectionError> {
        let id: ID = self
            .connection
            .prepare_cached(
                "insert into bench_group
                 (date, disk_model, fdisk) values (?, ?, ?)
                 returning id",
            )?
            .query_row(
                params![submission.date, submission.disk_model, submission.fdisk],
                |row| row.get(0),
            )?;

        info!(id = id, disk_model = %submission.disk_model, "Created benchmark group");

        Ok(BenchGroup {
            id,
            date: submission.date,
            disk_model: submission.disk_model.clone(),
            fdisk: submission.fdisk.clone(),
        })
    }

    /// insert one benchmark per filesystem in a single transaction
    pub fn create_benchmarks<'a, I: IntoIterator<Item = &'a str>>(
        &self,
        group: ID,
        filesystems: I,
        bcache_commit: &str,
    ) -> Result<Vec<Benchmark>, ConnectionError> {
        // NOTE: We can guarantee that no nested transactions are present due to only having one
        // connection at a time.
        let mut tx = self.connection.unchecked_transaction()?;
        tx.set_drop_behavior(rusqlite::DropBehavior::Rollback);

        let benchmarks = filesystems
            .into_iter()
            .map(|filesystem| -> Result<Benchmark, ConnectionError> {
                let commit = (filesystem == BCACHE).then(|| bcache_commit.trim().to_owned());
                let id: ID = tx
                    .prepare_cached(
                        "insert into benchmark
                         (filesystem, bcache_commit, benchgroup_id) values (?, ?, ?)
                         returning id",
                    )?
                    .query_row(params![filesystem, commit, group], |row| row.get(0))?;

                debug!(id = id, filesystem = filesystem, "Inserted benchmark");

                Ok(Benchmark {
                    id,
                    filesystem: filesystem.to_owned(),
                    bcache_commit: commit,
                    benchgroup_id: group,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        tx.commit()?;

        info!(group = group, "Stored {} benchmarks", benchmarks.len());

        Ok(benchmarks)
    }

    pub fn list_groups(&self, limit: usize) -> Result<Vec<GroupOverview>, ConnectionError> {
        let groups = self
            .connection
            .prepare_cached(
                "select id, date, disk_model, fdisk from bench_group
                 order by date desc, id desc limit ?",
            )?
            .query_map(params![limit as i64], group_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        groups
            .into_iter()
            .map(|group| -> Result<GroupOverview, ConnectionError> {
                Ok(GroupOverview {
                    benchmarks: self.benchmarks_of(group.id)?,
                    group,
                })
            })
            .collect()
    }

    pub fn group(&self, id: ID) -> Result<Option<GroupOverview>, ConnectionError> {
        let group = self
            .connection
            .prepare_cached("select id, date, disk_model, fdisk from bench_group where id = ?")?
            .query_row(params![id], group_from_row)
            .optional()?;

        match group {
            Some(group) => Ok(Some(GroupOverview {
                benchmarks: self.benchmarks_of(group.id)?,
                group,
            })),
            None => Ok(None),
        }
    }

    pub fn benchmark(&self, id: ID) -> Result<Option<Benchmark>, ConnectionError> {
        self.connection
            .prepare_cached(
                "select id, filesystem, bcache_commit, benchgroup_id from benchmark where id = ?",
            )?
            .query_row(params![id], benchmark_from_row)
            .optional()
            .map_err(ConnectionError::SQLite)
    }

    fn benchmarks_of(&self, group: ID) -> Result<Vec<Benchmark>, ConnectionError> {
        self.connection
            .prepare_cached(
                "select id, filesystem, bcache_commit, benchgroup_id from benchmark
                 where benchgroup_id = ? order by filesystem",
            )?
            .query_map(params![group], benchmark_from_row)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(ConnectionError::SQLite)
    }
}

pub const SQL_SCHEMA: [&str; 2] = [
    "create table if not exists bench_group (
    id integer primary key,
    date text not null,
    disk_model text not null,
    fdisk text not null
);",
    "create table if not exists benchmark (
    id integer primary key,
    filesystem text not null,
    bcache_commit text,
    benchgroup_id integer not null references bench_group (id)
);",
];
pub const SQL_SCHEMA_NUMBER: usize = SQL_SCHEMA.len();
