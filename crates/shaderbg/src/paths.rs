use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use directories_next::ProjectDirs;

/// Overrides the directory searched for `background.toml`.
pub const ENV_CONFIG_DIR: &str = "SHADERBG_CONFIG_DIR";

const CONFIG_FILE: &str = "background.toml";

#[derive(Debug, Clone)]
pub struct AppPaths {
    config_dir: PathBuf,
}

impl AppPaths {
    pub fn discover() -> Result<Self> {
        Self::from_override(env::var_os(ENV_CONFIG_DIR))
    }

    fn from_override(value: Option<OsString>) -> Result<Self> {
        let config_dir = match value {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => ProjectDirs::from("", "", "shaderbg")
                .ok_or_else(|| anyhow!("failed to determine user directories"))?
                .config_dir()
                .to_path_buf(),
        };
        Ok(Self { config_dir })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE)
    }
}
