use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;


/// Where things live on the device. Defaults are the real BMC paths,
/// tests point everything into a temp dir.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceLayout {
  pub log_dir: PathBuf,
  pub proc_mtd_path: PathBuf,
  pub dev_dir: PathBuf,
  pub drop_caches_path: PathBuf,
  pub data_mount_point: PathBuf,
}

impl Default for DeviceLayout {
  fn default() -> Self {
    DeviceLayout {
      log_dir: PathBuf::from("/var/log"),
      proc_mtd_path: PathBuf::from("/proc/mtd"),
      dev_dir: PathBuf::from("/dev"),
      drop_caches_path: PathBuf::from("/proc/sys/vm/drop_caches"),
      data_mount_point: PathBuf::from("/mnt/data"),
    }
  }
}

impl DeviceLayout {
  /// Same shape as the default layout, re-rooted under `root`. Creates nothing.
  pub fn rooted_at(root: &Path) -> Self {
    let default = DeviceLayout::default();
    let reroot = |p: &Path| root.join(p.strip_prefix("/").unwrap_or(p));
    DeviceLayout {
      log_dir: reroot(&default.log_dir),
      proc_mtd_path: reroot(&default.proc_mtd_path),
      dev_dir: reroot(&default.dev_dir),
      drop_caches_path: reroot(&default.drop_caches_path),
      data_mount_point: reroot(&default.data_mount_point),
    }
  }

  pub fn mtd_node(&self, mtd: &str) -> PathBuf {
    self.dev_dir.join(mtd)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind { Mtd }

impl DeviceKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      DeviceKind::Mtd => "mtd",
    }
  }
}

/// Parsed `"<kind>:<name>"`, e.g. `mtd:flash0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceId {
  pub kind: DeviceKind,
  pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceIdError {
  #[error("device id '{0}' is not of the form '<kind>:<name>'")]
  Malformed(String),
  #[error("unsupported device kind '{kind}' in device id '{id}'")]
  UnsupportedKind { kind: String, id: String },
}

impl FromStr for DeviceId {
  type Err = DeviceIdError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let (kind, name) = s.split_once(':')
      .filter(|(kind, name)| !kind.is_empty() && !name.is_empty())
      .ok_or_else(|| DeviceIdError::Malformed(s.to_string()))?;
    match kind {
      "mtd" => Ok(DeviceId { kind: DeviceKind::Mtd, name: name.to_string() }),
      other => Err(DeviceIdError::UnsupportedKind { kind: other.to_string(), id: s.to_string() }),
    }
  }
}

impl fmt::Display for DeviceId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.kind.as_str(), self.name)
  }
}

/// Input bundle for a single install run. Built once, never mutated by steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepParams {
  pub image_file_path: PathBuf,
  pub device_id: String,
  pub platform: Option<String>,
  pub layout: DeviceLayout,
}

impl StepParams {
  pub fn new(image_file_path: impl Into<PathBuf>, device_id: impl Into<String>) -> Self {
    StepParams {
      image_file_path: image_file_path.into(),
      device_id: device_id.into(),
      platform: None,
      layout: DeviceLayout::default(),
    }
  }

  pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
    self.platform = Some(platform.into());
    self
  }

  pub fn with_layout(mut self, layout: DeviceLayout) -> Self {
    self.layout = layout;
    self
  }

  pub fn device(&self) -> Result<DeviceId, DeviceIdError> {
    self.device_id.parse()
  }

  /// Image path as it goes on a command line.
  pub fn image_arg(&self) -> String {
    self.image_file_path.to_string_lossy().into_owned()
  }
}
