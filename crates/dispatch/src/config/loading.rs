use std::path::Path;

use tracing::debug;

use crate::error::DispatchError;

use super::types::DivvyConfig;

impl DivvyConfig {
    /// Parse config from a TOML string, apply `DIVVY_*` overrides, validate.
    pub fn from_toml(toml_str: &str) -> Result<Self, DispatchError> {
        let mut config: Self = toml::from_str(toml_str)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path, apply overrides, validate.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, DispatchError> {
        let config = Self::load(Some(path.as_ref()))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults or the given file, with environment overrides applied.
    ///
    /// Not validated: the caller still layers command-line flags on top and
    /// must call [`validate`](Self::validate) afterwards.
    pub fn load(path: Option<&Path>) -> Result<Self, DispatchError> {
        let mut config = match path {
            Some(path) => Self::read_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self, DispatchError> {
        debug!(path = %path.display(), "loading config file");
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    // ── Environment variable overrides ──────────────────────────────

    /// Apply environment variable overrides.
    ///
    /// - `DIVVY_MODE` -> `mode` (`local`/`omp`, `distributed`/`mpi`)
    /// - `DIVVY_THREADS` -> `local.threads`
    /// - `DIVVY_WORKERS` -> `distributed.workers`
    /// - `DIVVY_BIND` -> `distributed.bind`
    /// - `DIVVY_LAUNCH` -> `distributed.launch`
    /// - `DIVVY_SHELL` -> `shell`
    pub fn apply_env_overrides(&mut self) -> Result<(), DispatchError> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup.
    pub(crate) fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<(), DispatchError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("DIVVY_MODE") {
            self.mode = v
                .parse()
                .map_err(|e: String| DispatchError::Config(format!("DIVVY_MODE: {e}")))?;
        }
        if let Some(v) = lookup("DIVVY_THREADS") {
            self.local.threads = Some(parse_count("DIVVY_THREADS", &v)?);
        }
        if let Some(v) = lookup("DIVVY_WORKERS") {
            self.distributed.workers = Some(parse_count("DIVVY_WORKERS", &v)?);
        }
        if let Some(v) = lookup("DIVVY_BIND") {
            self.distributed.bind = v;
        }
        if let Some(v) = lookup("DIVVY_LAUNCH") {
            self.distributed.launch = v.parse()?;
        }
        if let Some(v) = lookup("DIVVY_SHELL") {
            self.shell = v;
        }
        Ok(())
    }
}

fn parse_count(key: &str, value: &str) -> Result<usize, DispatchError> {
    value
        .trim()
        .parse()
        .map_err(|_| DispatchError::Config(format!("{key}: '{value}' is not a count")))
}
