//! TOML install configuration.

use serde::{Deserialize, Serialize};
use shared_traits::step_params::DeviceLayout;
use std::fs;
use std::path::Path;
use thiserror::Error;
use crate::registry::{StepPath, FLASH_CATEGORY, VERIFICATION_CATEGORY};


pub const DEFAULT_LOG_BUFFER_LINES: usize = 5000;

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("configuration file not found: {0}")]
  FileNotFound(String),
  #[error("invalid TOML in '{path}': {source}")]
  InvalidToml {
    path: String,
    #[source]
    source: toml::de::Error,
  },
  #[error(transparent)]
  Io(#[from] std::io::Error),
  #[error("invalid configuration: {0}")]
  Invalid(String),
}

/// What to run and where the device lives. Every field has a default.
///
/// ```toml
/// platform = "wedge100"
/// flash_method = "flash_procedure/common/flash_cp"
/// verify_step = "verification/common/image_matches_flash"
///
/// [layout]
/// dev_dir = "/dev"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InstallConfig {
  /// Selects `checks_and_remediations/<platform>/` on top of the common checks.
  pub platform: Option<String>,
  pub flash_method: String,
  /// `None` disables both the already-flashed short-circuit and the post-flash check.
  pub verify_step: Option<String>,
  pub log_buffer_lines: usize,
  /// Used by the command runner when a step asks for `0` or a negative timeout.
  pub default_timeout_secs: u64,
  pub layout: DeviceLayout,
}

impl Default for InstallConfig {
  fn default() -> Self {
    InstallConfig {
      platform: None,
      flash_method: step_flash_fw_util::PATH.to_string(),
      verify_step: Some(step_image_matches_flash::PATH.to_string()),
      log_buffer_lines: DEFAULT_LOG_BUFFER_LINES,
      default_timeout_secs: core_exec::cmd::DEFAULT_TIMEOUT_SECS,
      layout: DeviceLayout::default(),
    }
  }
}

impl InstallConfig {
  pub fn validate(&self) -> Result<(), ConfigError> {
    if let Some(platform) = &self.platform {
      if platform.is_empty() || platform.contains('/') {
        return Err(ConfigError::Invalid(format!("platform '{}' must be a single path component", platform)));
      }
    }
    expect_category(&self.flash_method, FLASH_CATEGORY, "flash_method")?;
    if let Some(verify) = &self.verify_step {
      expect_category(verify, VERIFICATION_CATEGORY, "verify_step")?;
    }
    if self.log_buffer_lines == 0 {
      return Err(ConfigError::Invalid("log_buffer_lines must be at least 1".to_string()));
    }
    if self.default_timeout_secs == 0 {
      return Err(ConfigError::Invalid("default_timeout_secs must be at least 1".to_string()));
    }
    Ok(())
  }
}

fn expect_category(path: &str, category: &str, field: &str) -> Result<(), ConfigError> {
  match StepPath::parse(path) {
    Ok(p) if p.category == category => Ok(()),
    Ok(_) => Err(ConfigError::Invalid(format!("{} '{}' is not under '{}/'", field, path, category))),
    Err(e) => Err(ConfigError::Invalid(format!("{}: {}", field, e))),
  }
}

pub fn parse_config(content: &str, origin: &str) -> Result<InstallConfig, ConfigError> {
  let config: InstallConfig = toml::from_str(content)
    .map_err(|source| ConfigError::InvalidToml { path: origin.to_string(), source })?;
  config.validate()?;
  Ok(config)
}

/// `None` means defaults. An explicit path that does not exist is an error.
pub fn load_config(path: Option<&Path>) -> Result<InstallConfig, ConfigError> {
  let Some(path) = path else {
    return Ok(InstallConfig::default());
  };
  let content = fs::read_to_string(path).map_err(|e| {
    if e.kind() == std::io::ErrorKind::NotFound {
      ConfigError::FileNotFound(path.display().to_string())
    } else {
      ConfigError::Io(e)
    }
  })?;
  let config = parse_config(&content, &path.display().to_string())?;
  log::debug!("loaded configuration from '{}'", path.display());
  Ok(config)
}
