use anyhow::Context;
use coexpress_core::{CorrelationConfig, DatasetLayout, IngestConfig};
use serde::Deserialize;
use std::path::PathBuf;
use std::{fs, io};
use tracing::{info, warn};

#[derive(Deserialize, Debug, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { database_path: default_database_path() }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct CoexprConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub layout: DatasetLayout,
    #[serde(default)]
    pub correlation: CorrelationConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

impl CoexprConfig {
    /// Read the TOML file named by `COEXPRESS_CONFIG_PATH` (default `coexpress.toml`).
    /// A missing file means defaults; an unreadable or invalid one is an error.
    pub fn load() -> anyhow::Result<Self> {
        let config_path =
            std::env::var("COEXPRESS_CONFIG_PATH").unwrap_or_else(|_| "coexpress.toml".to_string());

        let config = match fs::read_to_string(&config_path) {
            Ok(text) => toml::from_str(&text)
                .with_context(|| format!("Failed to parse configuration file '{config_path}'"))?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!("Configuration file '{}' not found. Using default configuration.", config_path);
                Self::default()
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read configuration file '{config_path}'"));
            }
        };
        Ok(config)
    }

    pub fn apply_env_overrides(mut self) -> Self {
        if let Ok(path) = std::env::var("COEXPRESS_DATABASE_PATH") {
            self.store.database_path = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("COEXPRESS_STAGING_PATH") {
            self.ingest.staging_path = PathBuf::from(path);
        }
        if let Some(chunk_size) = env_number("COEXPRESS_CHUNK_SIZE") {
            self.ingest.chunk_size = chunk_size;
        }
        if let Some(workers) = env_number("COEXPRESS_WORKER_COUNT") {
            self.correlation.worker_count = workers;
        }
        if let Some(pending) = env_number("COEXPRESS_MAX_PENDING_TASKS") {
            self.correlation.max_pending_tasks = pending;
        }
        info!(
            database = %self.store.database_path.display(),
            staging = %self.ingest.staging_path.display(),
            workers = self.correlation.worker_count,
            "Configuration resolved"
        );
        self
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.layout.validate()?;
        self.correlation.validate()?;
        self.ingest.validate()?;
        Ok(())
    }
}

/// Unparseable values are ignored with a warning.
fn env_number<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(variable = name, value = %raw, "Ignoring non-numeric environment override");
            None
        }
    }
}

fn default_database_path() -> PathBuf {
    PathBuf::from("coexpress.db")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    fn clear_env() {
        for name in [
            "COEXPRESS_CONFIG_PATH",
            "COEXPRESS_DATABASE_PATH",
            "COEXPRESS_STAGING_PATH",
            "COEXPRESS_CHUNK_SIZE",
            "COEXPRESS_WORKER_COUNT",
            "COEXPRESS_MAX_PENDING_TASKS",
        ] {
            unsafe { std::env::remove_var(name) };
        }
    }

    #[test]
    #[serial]
    fn test_missing_file_uses_defaults() {
        clear_env();
        unsafe { std::env::set_var("COEXPRESS_CONFIG_PATH", "/nonexistent/coexpress.toml") };
        let config = CoexprConfig::load().unwrap();
        assert_eq!(config.store.database_path, PathBuf::from("coexpress.db"));
        assert_eq!(config.correlation.max_pending_tasks, 5000);
        assert_eq!(config.ingest.chunk_size, IngestConfig::default().chunk_size);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_partial_file_keeps_other_defaults() {
        clear_env();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[store]\ndatabase_path = \"/data/corr.db\"\n\n[ingest]\ndelimiter = \"\\t\"\nheader_rows = 3\nheader_columns = 3\n\n[correlation]\ntask_width = 16\n"
        )
        .unwrap();
        unsafe { std::env::set_var("COEXPRESS_CONFIG_PATH", file.path()) };

        let config = CoexprConfig::load().unwrap();
        assert_eq!(config.store.database_path, PathBuf::from("/data/corr.db"));
        assert_eq!(config.ingest.delimiter, '\t');
        assert_eq!(config.ingest.header_rows, 3);
        assert_eq!(config.correlation.task_width, 16);
        assert_eq!(config.layout, DatasetLayout::default());
        config.validate().unwrap();
        clear_env();
    }

    #[test]
    #[serial]
    fn test_invalid_toml_is_an_error() {
        clear_env();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[ingest\nchunk_size = ").unwrap();
        unsafe { std::env::set_var("COEXPRESS_CONFIG_PATH", file.path()) };
        assert!(CoexprConfig::load().is_err());
        clear_env();
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        clear_env();
        unsafe {
            std::env::set_var("COEXPRESS_DATABASE_PATH", "/tmp/override.db");
            std::env::set_var("COEXPRESS_CHUNK_SIZE", "250");
            std::env::set_var("COEXPRESS_WORKER_COUNT", "many");
        }
        let config = CoexprConfig::default().apply_env_overrides();
        assert_eq!(config.store.database_path, PathBuf::from("/tmp/override.db"));
        assert_eq!(config.ingest.chunk_size, 250);
        assert_eq!(config.correlation.worker_count, CorrelationConfig::default().worker_count);
        clear_env();
    }
}
