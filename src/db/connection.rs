//! Connection targets and the bounded connect handshake.

use std::{
    fmt,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::error::StartupError;

use super::sqlite::SqliteStore;

const SCHEME_SEPARATOR: &str = "://";
const FILE_EXTENSION: &str = "db";

/// A resolved database location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionTarget {
    /// Logical database name.
    pub database: String,
    /// Backing file.
    pub path: PathBuf,
}

impl ConnectionTarget {
    /// Parses `file://<dir>/<name>` or a bare `<name>`.
    ///
    /// Relative locations resolve against `base_dir`; the `.db` extension is
    /// implied when missing.
    pub fn parse(target: &str, base_dir: &Path) -> Result<Self, StartupError> {
        let location = match target.split_once(SCHEME_SEPARATOR) {
            Some(("file" | "sqlite", rest)) => rest,
            Some((scheme, _)) => {
                return Err(StartupError(format!(
                    "Unsupported connection scheme '{scheme}'. Use file://<directory>/<database>."
                )));
            }
            None => target,
        };
        let location = location.split('?').next().unwrap_or_default().trim();

        let missing = || StartupError("Database name is required in the connection string.".to_string());
        if location.is_empty() || location.ends_with('/') {
            return Err(missing());
        }

        let mut path = PathBuf::from(location);
        let database = path
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .ok_or_else(missing)?
            .to_string();
        if path.extension().is_none_or(|ext| ext != FILE_EXTENSION) {
            path.set_file_name(format!("{database}.{FILE_EXTENSION}"));
        }
        if path.is_relative() {
            path = base_dir.join(path);
        }
        Ok(Self { database, path })
    }

    /// Opens the database and confirms it is usable within `timeout`.
    ///
    /// The handshake takes the write lock once; a lock still held by another
    /// runner after `timeout` fails the connect.
    pub fn connect(&self, timeout: Duration) -> Result<SqliteStore, StartupError> {
        let store = SqliteStore::open(&self.path, &self.database, timeout)
            .and_then(|store| store.handshake().map(|_| store))
            .map_err(|err| {
                StartupError(format!(
                    "Unable to connect to the database '{}' at {}. Ensure the location exists and is accessible. {err}.",
                    self.database,
                    self.path.display()
                ))
            })?;
        log::debug!("Connected to database '{}' at {}", self.database, self.path.display());
        Ok(store)
    }
}

impl fmt::Display for ConnectionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.database, self.path.display())
    }
}
