//! Write-once mapping from step path to step.
//!
//! Built explicitly at startup from every step crate, then frozen. A duplicate path
//! means two crates claim the same slot: that is a programming error and the process
//! refuses to start.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use shared_traits::step_traits::Step;
use step_check_data_mounted::CheckDataMounted;
use step_drop_caches::DropCaches;
use step_ensure_flash_device::EnsureFlashDevice;
use step_flash_cp::FlashCp;
use step_flash_fw_util::FlashFwUtil;
use step_image_matches_flash::ImageMatchesFlash;
use step_truncate_logs::TruncateLogs;


pub const CHECKS_CATEGORY: &str = "checks_and_remediations";
pub const FLASH_CATEGORY: &str = "flash_procedure";
pub const VERIFICATION_CATEGORY: &str = "verification";
pub const COMMON_SUBCATEGORY: &str = "common";

/// Every category a step crate may live under, in `steps/<category>/...`.
pub const STEP_CATEGORIES: [&str; 3] = [CHECKS_CATEGORY, FLASH_CATEGORY, VERIFICATION_CATEGORY];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
  #[error("step '{0}' is registered twice")]
  Duplicate(String),
  #[error("step path '{0}' is not of the form '<category>/<subcategory>/<step_name>'")]
  InvalidPath(String),
  #[error("no step registered at '{0}'")]
  UnknownStep(String),
  #[error("step '{path}' is not a {expected} step")]
  WrongCategory { path: String, expected: &'static str },
}

/// `<category>/<subcategory>/<step_name>` split into its parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepPath<'a> {
  pub category: &'a str,
  pub subcategory: &'a str,
  pub name: &'a str,
}

impl<'a> StepPath<'a> {
  pub fn parse(path: &'a str) -> Result<Self, RegistryError> {
    let parts: Vec<&str> = path.split('/').collect();
    match parts.as_slice() {
      [category, subcategory, name] if !category.is_empty() && !subcategory.is_empty() && !name.is_empty() => {
        Ok(StepPath { category, subcategory, name })
      }
      _ => Err(RegistryError::InvalidPath(path.to_string())),
    }
  }
}

#[derive(Default)]
pub struct StepRegistryBuilder {
  steps: BTreeMap<&'static str, Arc<dyn Step>>,
}

impl StepRegistryBuilder {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn register<S: Step + 'static>(mut self, step: S) -> Result<Self, RegistryError> {
    let path = step.path();
    StepPath::parse(path)?;
    if self.steps.contains_key(path) {
      return Err(RegistryError::Duplicate(path.to_string()));
    }
    self.steps.insert(path, Arc::new(step));
    Ok(self)
  }

  pub fn build(self) -> StepRegistry {
    StepRegistry { steps: Arc::new(self.steps) }
  }
}

/// Frozen registry. Cheap to clone, read-only, no locking.
#[derive(Clone)]
pub struct StepRegistry {
  steps: Arc<BTreeMap<&'static str, Arc<dyn Step>>>,
}

impl StepRegistry {
  pub fn get(&self, path: &str) -> Option<&dyn Step> {
    self.steps.get(path).map(|step| step.as_ref())
  }

  /// The registered key for `path`, so plans can hold `&'static str`.
  pub fn resolve(&self, path: &str) -> Result<&'static str, RegistryError> {
    self.steps.get_key_value(path)
      .map(|(key, _)| *key)
      .ok_or_else(|| RegistryError::UnknownStep(path.to_string()))
  }

  pub fn paths(&self) -> impl Iterator<Item = &'static str> + '_ {
    self.steps.keys().copied()
  }

  pub fn len(&self) -> usize {
    self.steps.len()
  }

  pub fn is_empty(&self) -> bool {
    self.steps.is_empty()
  }

  /// Paths under `<category>/<subcategory>/`, ordered by step name.
  pub fn under(&self, category: &str, subcategory: &str) -> Vec<&'static str> {
    // `BTreeMap` keys are sorted by full path, so with a fixed prefix this is name order
    self.paths()
      .filter(|path| matches!(
        StepPath::parse(path),
        Ok(p) if p.category == category && p.subcategory == subcategory
      ))
      .collect()
  }
}

impl fmt::Debug for StepRegistry {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_list().entries(self.paths()).finish()
  }
}

/// Collects every step crate of this workspace into one frozen registry.
pub fn default_registry() -> Result<StepRegistry, RegistryError> {
  let registry = StepRegistryBuilder::new()
    .register(TruncateLogs)?
    .register(DropCaches)?
    .register(CheckDataMounted::default())?
    .register(EnsureFlashDevice)?
    .register(FlashFwUtil)?
    .register(FlashCp)?
    .register(ImageMatchesFlash)?
    .build();
  Ok(registry)
}
