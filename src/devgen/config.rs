//! Generator configuration.
//!
//! ```toml
//! output_dir = "generated"
//! pragma = "devlink"
//! headers = ["drivers/math.hpp", "drivers/dev_mem.hpp"]
//! ```
//!
//! Relative paths are resolved against the configuration file directory.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::annotations::DEFAULT_NAMESPACE;
use super::error::{GenError, GenResult};

fn default_pragma() -> String {
    DEFAULT_NAMESPACE.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeneratorConfig {
    pub output_dir: PathBuf,
    /// Device headers, in device id order
    pub headers: Vec<PathBuf>,
    #[serde(default = "default_pragma")]
    pub pragma: String,
}

impl GeneratorConfig {
    pub fn new(output_dir: impl Into<PathBuf>, headers: Vec<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            headers,
            pragma: default_pragma(),
        }
    }

    pub fn from_toml(text: &str) -> GenResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| GenError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> GenResult<Self> {
        let text = fs::read_to_string(path).map_err(|e| GenError::io(path, e))?;
        let mut config = Self::from_toml(&text)?;

        if let Some(base) = path.parent() {
            config.output_dir = base.join(&config.output_dir);
            for header in &mut config.headers {
                *header = base.join(&*header);
            }
        }
        Ok(config)
    }

    fn validate(&self) -> GenResult<()> {
        if self.headers.is_empty() {
            return Err(GenError::Config("no device header listed".to_string()));
        }
        if self.pragma.is_empty() || !self.pragma.chars().all(|c| c.is_alphanumeric() || c == '_') {
            return Err(GenError::Config(format!("invalid pragma namespace '{}'", self.pragma)));
        }
        Ok(())
    }
}
