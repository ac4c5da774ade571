use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Static timing and capacity constants carried over from the original
/// implementation. They are not currently exposed as config keys because
/// nothing in the corpus this gateway is modeled on ever varied them at
/// runtime; they live here rather than scattered as magic numbers.
pub const SESSION_TIMEOUT: Duration = Duration::from_secs(20);
pub const EVAL_TIMEOUT: Duration = Duration::from_millis(500);
pub const EVAL_POLL_INTERVAL: Duration = Duration::from_micros(10);
pub const WATCHDOG_INTERVAL: Duration = Duration::from_millis(100);
pub const WORKER_POLL_INTERVAL: Duration = Duration::from_micros(10);
pub const WORKER_SELECT_BUDGET: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path:?}: {source}")]
    Parse {
        path: std::path::PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("backend command must not be empty")]
    EmptyBackendCommand,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub max_sessions: Option<usize>,
    pub backend_program: Option<String>,
    pub backend_args: Option<Vec<String>>,
    pub log_level: Option<String>,
}

/// Fully resolved gateway configuration: built-in defaults merged with an
/// optional project TOML file and CLI overrides.
#[derive(Debug, Clone)]
pub struct Config {
    pub max_sessions: usize,
    pub backend_program: String,
    pub backend_args: Vec<String>,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_sessions: 4,
            backend_program: "julia".to_string(),
            backend_args: vec!["./ui/webserver/julia_web_base.jl".to_string()],
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Loads a `FileConfig` from `path` and merges it over the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file: FileConfig = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::default();
        config.merge(file);
        config.validate()?;
        Ok(config)
    }

    fn merge(&mut self, file: FileConfig) {
        if let Some(max_sessions) = file.max_sessions {
            self.max_sessions = max_sessions;
        }
        if let Some(program) = file.backend_program {
            self.backend_program = program;
        }
        if let Some(args) = file.backend_args {
            self.backend_args = args;
        }
        if let Some(level) = file.log_level {
            self.log_level = level;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.backend_program.trim().is_empty() {
            return Err(ConfigError::EmptyBackendCommand);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_original_backend_contract() {
        let config = Config::default();
        assert_eq!(config.max_sessions, 4);
        assert_eq!(config.backend_program, "julia");
        assert_eq!(config.backend_args, vec!["./ui/webserver/julia_web_base.jl"]);
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("replgate.toml");
        std::fs::write(&path, "max_sessions = 8\nbackend_program = \"echo\"\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.max_sessions, 8);
        assert_eq!(config.backend_program, "echo");
        assert_eq!(config.backend_args, vec!["./ui/webserver/julia_web_base.jl"]);
    }

    #[test]
    fn empty_backend_program_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("replgate.toml");
        std::fs::write(&path, "backend_program = \"\"\n").unwrap();

        assert!(matches!(
            Config::load(&path),
            Err(ConfigError::EmptyBackendCommand)
        ));
    }
}
