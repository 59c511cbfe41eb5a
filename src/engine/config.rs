use std::{env, path::PathBuf, time::Duration};

/// Environment of an engine run: identity recorded in audit records, where
/// relative paths resolve and how long connecting may take.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Recorded as `executed.by`.
    pub username: String,
    /// Recorded as `executed.onHost`.
    pub hostname: Option<String>,
    /// Recorded as `appVersion`.
    pub app_version: String,
    /// Upper bound of the connection handshake.
    pub connect_timeout_ms: u64,
    /// Directory relative changelog paths, external documents and bare
    /// database names resolve against.
    pub base_dir: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            username: "??".to_string(),
            hostname: None,
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            connect_timeout_ms: 5_000,
            base_dir: PathBuf::from("."),
        }
    }
}

impl EngineConfig {
    /// Reads user, host and working directory from the process environment.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            username: first_var(&["USER", "USERNAME"]).unwrap_or(defaults.username),
            hostname: first_var(&["HOSTNAME", "COMPUTERNAME"]),
            base_dir: env::current_dir().unwrap_or(defaults.base_dir),
            ..defaults
        }
    }

    /// [`EngineConfig::connect_timeout_ms`] as a duration.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

fn first_var(names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| env::var(name).ok())
        .find(|value| !value.trim().is_empty())
}
