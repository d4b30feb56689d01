use serde::{Deserialize, Serialize};
use std::{
    fs,
    net::{Ipv4Addr, SocketAddr},
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Error, Debug)]
pub enum ConfigErrors {
    #[error("Failed to read config file: {0}")]
    ReadFailed(#[from] std::io::Error),
    #[error("Config file is invalid: {0}")]
    InvalidConfig(#[from] serde_yaml::Error),
    #[error("Preflight checks failed")]
    PreflightFailed,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default, alias = "db")]
    pub database: DatabaseConfig,
    // where raw logs and rendered charts are kept
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub server: HttpConfig,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    #[serde(default = "default_log_path")]
    pub logs: PathBuf,
    #[serde(default = "default_graph_path")]
    pub graphs: PathBuf,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct HttpConfig {
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
    // maximum size of an uploaded archive in bytes
    #[serde(default = "default_upload_limit")]
    pub upload_limit: usize,
    // number of groups shown on the index page
    #[serde(default = "default_listing_limit")]
    pub listing_limit: usize,
}

impl ServerConfig {
    /// load the YAML config at `path`, or the defaults without one
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigErrors> {
        match path {
            Some(path) => {
                let config = serde_yaml::from_str(&fs::read_to_string(path)?)?;
                info!(path = ?path, "Loaded config");

                Ok(config)
            }
            None => {
                info!("No config given, using defaults");

                Ok(Self::default())
            }
        }
    }

    /// Check the config and create missing storage directories, returns true if any check failed
    pub fn preflight_checks(&self) -> bool {
        // attempt to catch all errors instead of piece-by-piece to make debugging easier for users
        let mut contains_error = false;

        for (name, path) in [
            ("storage.logs", &self.storage.logs),
            ("storage.graphs", &self.storage.graphs),
        ] {
            if path.is_dir() {
                continue;
            }

            if path.exists() {
                error!("{name} ({}) exists but is not a directory", path.to_string_lossy());
                contains_error = true;
            } else {
                match fs::create_dir_all(path) {
                    Ok(()) => warn!("{name} ({}) did not exist and was created", path.to_string_lossy()),
                    Err(e) => {
                        error!("Failed to create {name} ({}): {e}", path.to_string_lossy());
                        contains_error = true;
                    }
                }
            }
        }

        if self.server.upload_limit == 0 {
            error!("server.upload_limit cannot be 0, no archive could ever be uploaded");
            contains_error = true;
        }

        if self.server.listing_limit == 0 {
            error!("server.listing_limit cannot be 0, the index would always be empty");
            contains_error = true;
        }

        contains_error
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            logs: default_log_path(),
            graphs: default_graph_path(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            upload_limit: default_upload_limit(),
            listing_limit: default_listing_limit(),
        }
    }
}

fn default_database_path() -> PathBuf {
    PathBuf::from("benchmarks.db")
}

fn default_log_path() -> PathBuf {
    PathBuf::from("./files")
}

fn default_graph_path() -> PathBuf {
    PathBuf::from("./graphs")
}

fn default_bind() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, 5000))
}

fn default_upload_limit() -> usize {
    256 * 1024 * 1024
}

fn default_listing_limit() -> usize {
    100
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config: ServerConfig = serde_yaml::from_str("{}").unwrap();

        assert_eq!(config.database.path, PathBuf::from("benchmarks.db"));
        assert_eq!(config.storage.logs, PathBuf::from("./files"));
        assert_eq!(config.storage.graphs, PathBuf::from("./graphs"));
        assert_eq!(config.server.bind.port(), 5000);
        assert_eq!(config.server.listing_limit, 100);
    }

    #[test]
    fn partial_config() {
        let config: ServerConfig = serde_yaml::from_str(
            "
db:
  path: /var/lib/fsbench/benchmarks.db
server:
  bind: 0.0.0.0:8080
",
        )
        .unwrap();

        assert_eq!(
            config.database.path,
            PathBuf::from("/var/lib/fsbench/benchmarks.db")
        );
        assert_eq!(config.server.bind.port(), 8080);
        assert_eq!(config.server.upload_limit, 256 * 1024 * 1024);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(serde_yaml::from_str::<ServerConfig>("storage:\n  pngs: ./out\n").is_err());
    }

    #[test]
    fn preflight_creates_storage() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ServerConfig::default();
        config.storage.logs = dir.path().join("files");
        config.storage.graphs = dir.path().join("nested/graphs");

        assert!(!config.preflight_checks());
        assert!(config.storage.logs.is_dir());
        assert!(config.storage.graphs.is_dir());
    }

    #[test]
    fn preflight_reports_all_problems() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("not-a-dir");
        fs::write(&file, "").unwrap();

        let mut config = ServerConfig::default();
        config.storage.logs = file;
        config.storage.graphs = dir.path().join("graphs");
        config.server.listing_limit = 0;

        assert!(config.preflight_checks());
        // the valid directory is still created
        assert!(config.storage.graphs.is_dir());
    }
}
