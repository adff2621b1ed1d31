//! Configuration for where a schedule keeps its files.
//!
//! Loaded from `config.toml` in the data directory. Every field has a
//! default, so an absent file or a partial one is fine.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use sched_core::{Error, Result};

/// Default capacity of the shared cache's data region (1 MiB).
pub const MAX_SHARED_SCHEDULE_MEMORY: usize = 1024 * 1024;

/// Name of the configuration file inside the data directory.
pub const CONFIG_FILE_NAME: &str = "config.toml";

const APP_DIR_NAME: &str = "schedulite";
const SCHEDULE_DIR_NAME: &str = "schedule.d";
const SHM_PREFIX: &str = "schedulite-shm-";
const LOCK_PREFIX: &str = "schedulite-lock-";

/// Schedule store configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Root directory; store files live under `schedule.d/`
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Directory holding shared-memory segment files
    #[serde(default = "default_shm_dir")]
    pub shm_dir: PathBuf,

    /// Directory holding named lock files
    #[serde(default = "default_lock_dir")]
    pub lock_dir: PathBuf,

    /// Capacity of the shared cache's data region in bytes.
    /// Every process attached to one account must agree on it.
    #[serde(default = "default_max_shared_memory")]
    pub max_shared_memory: usize,
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR_NAME)
}

fn default_shm_dir() -> PathBuf {
    let dev_shm = Path::new("/dev/shm");
    if dev_shm.is_dir() {
        dev_shm.to_path_buf()
    } else {
        std::env::temp_dir()
    }
}

fn default_lock_dir() -> PathBuf {
    std::env::temp_dir()
}

fn default_max_shared_memory() -> usize {
    MAX_SHARED_SCHEDULE_MEMORY
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            shm_dir: default_shm_dir(),
            lock_dir: default_lock_dir(),
            max_shared_memory: default_max_shared_memory(),
        }
    }
}

impl ScheduleConfig {
    /// Defaults with everything rooted under `root`; used by tests and by
    /// callers that want a fully self-contained directory.
    pub fn isolated(root: &Path) -> Self {
        Self {
            data_dir: root.join("data"),
            shm_dir: root.join("shm"),
            lock_dir: root.join("lock"),
            max_shared_memory: default_max_shared_memory(),
        }
    }

    /// Load configuration from `<data_dir>/config.toml` or use defaults.
    ///
    /// A missing `data_dir` key in the file resolves to `data_dir` itself.
    pub fn load_or_default(data_dir: &Path) -> Result<Self> {
        let config_path = data_dir.join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            return Ok(Self {
                data_dir: data_dir.to_path_buf(),
                ..Self::default()
            });
        }

        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| Error::file_io(&config_path, e))?;
        let mut value: toml::Table = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config file: {}", e)))?;
        if !value.contains_key("data_dir") {
            value.insert(
                "data_dir".to_string(),
                toml::Value::String(data_dir.to_string_lossy().into_owned()),
            );
        }
        Self::deserialize(toml::Value::Table(value))
            .map_err(|e| Error::Config(format!("Invalid config file: {}", e)))
    }

    /// Write this configuration to `<data_dir>/config.toml`.
    pub fn write(&self) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.data_dir).map_err(|e| Error::file_io(&self.data_dir, e))?;

        let config_path = self.data_dir.join(CONFIG_FILE_NAME);
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(&config_path, content).map_err(|e| Error::file_io(&config_path, e))?;
        Ok(config_path)
    }

    /// Write the default configuration for `data_dir`.
    pub fn write_default(data_dir: &Path) -> Result<PathBuf> {
        Self {
            data_dir: data_dir.to_path_buf(),
            ..Self::default()
        }
        .write()
    }

    /// Directory holding the per-account store files.
    pub fn schedule_dir(&self) -> PathBuf {
        self.data_dir.join(SCHEDULE_DIR_NAME)
    }

    pub fn store_path(&self, identifier: &str) -> PathBuf {
        self.schedule_dir().join(identifier)
    }

    pub fn shm_path(&self, identifier: &str) -> PathBuf {
        self.shm_dir.join(format!("{}{}", SHM_PREFIX, identifier))
    }

    pub fn lock_path(&self, identifier: &str) -> PathBuf {
        self.lock_dir.join(format!("{}{}.lock", LOCK_PREFIX, identifier))
    }
}
