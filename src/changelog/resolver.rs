//! Changelog locations and external document loading.

use std::{
    fmt, fs,
    path::{Path, PathBuf},
};

use serde_json::Value;

use crate::{error::ChangeValidationError, types::Document};

/// Where a changelog came from; relative external documents resolve
/// against [`ChangelogLocation::dir`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangelogLocation {
    path: PathBuf,
    dir: PathBuf,
}

impl ChangelogLocation {
    /// A changelog file.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Self { path, dir }
    }

    /// A changelog read from standard input, anchored at `cwd`.
    pub fn stdin(cwd: impl Into<PathBuf>) -> Self {
        let cwd = cwd.into();
        Self {
            path: cwd.clone(),
            dir: cwd,
        }
    }

    /// Rebuilds a location from an audit record's `executed.path`.
    pub fn from_recorded(path: &str) -> Self {
        let path = PathBuf::from(path);
        if path.is_dir() {
            Self::stdin(path)
        } else {
            Self::file(path)
        }
    }

    /// Path recorded as `executed.path`.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory relative references resolve against.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl fmt::Display for ChangelogLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

/// Loads external documents referenced by change actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentResolver {
    base_dir: PathBuf,
}

impl DocumentResolver {
    /// Resolver anchoring non-relative, non-absolute paths at `base_dir`.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Base directory for plain relative paths.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Resolves `path` against `location` when given, else against the
    /// base directory. Absolute paths are kept as is in the latter case.
    pub fn resolve(&self, location: Option<&ChangelogLocation>, path: &str) -> PathBuf {
        match location {
            Some(location) => location.dir().join(path),
            None => self.base_dir.join(path),
        }
    }

    /// Reads one JSON object.
    pub fn load_document(&self, path: &Path) -> Result<Document, ChangeValidationError> {
        match self.read(path)? {
            Value::Object(document) => Ok(document),
            _ => Err(external_error(path, "should be a JSON object")),
        }
    }

    /// Reads a JSON array of objects.
    pub fn load_documents(&self, path: &Path) -> Result<Vec<Document>, ChangeValidationError> {
        let Value::Array(items) = self.read(path)? else {
            return Err(external_error(path, "should be a JSON array"));
        };
        items
            .into_iter()
            .enumerate()
            .map(|(idx, item)| match item {
                Value::Object(document) => Ok(document),
                _ => Err(external_error(
                    path,
                    &format!("element {idx} should be a JSON object"),
                )),
            })
            .collect()
    }

    fn read(&self, path: &Path) -> Result<Value, ChangeValidationError> {
        if !path.is_file() {
            return Err(external_error(path, "is not readable. Ensure the resource exists"));
        }
        log::info!("Reading external file {}", path.display());
        let bytes = fs::read(path).map_err(|err| {
            ChangeValidationError::with_cause(
                format!(
                    "external document [{}] is not readable. Ensure the resource exists",
                    path.display()
                ),
                err,
            )
        })?;
        serde_json::from_slice(&bytes).map_err(|err| {
            ChangeValidationError::with_cause(
                format!("external document [{}] is not valid JSON: {err}", path.display()),
                err,
            )
        })
    }
}

fn external_error(path: &Path, problem: &str) -> ChangeValidationError {
    ChangeValidationError::new(format!("external document [{}] {problem}", path.display()))
}
