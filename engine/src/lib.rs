//! Install engine: step registry, plan resolution and the orchestrator that runs a plan.

pub mod config;
pub mod install_steps_runner;
pub mod registry;

use core_exec::cmd::CommandRunner;
use shared_traits::step_params::StepParams;
use crate::config::InstallConfig;
use crate::install_steps_runner::{InstallPlan, InstallReport, Installer};
use crate::registry::{default_registry, StepRegistry};


/// Builds the registry from every step crate and runs one install.
///
/// `Err` only when the registry itself cannot be built, which is a programming error.
/// Every other outcome, failures included, is in the report.
pub async fn run(config: &InstallConfig, params: &StepParams, runner: &dyn CommandRunner) -> anyhow::Result<InstallReport> {
  let registry = default_registry()?;
  log::debug!("registered steps: {:?}", registry);
  Ok(install(&registry, config, params, runner).await)
}

pub async fn install(
  registry: &StepRegistry,
  config: &InstallConfig,
  params: &StepParams,
  runner: &dyn CommandRunner,
) -> InstallReport {
  let plan = match InstallPlan::resolve(registry, config) {
    Ok(plan) => plan,
    Err(e) => return InstallReport::rejected(anyhow::Error::new(e).context("Unable to resolve install plan")),
  };
  log::info!(
    "install plan: {} check(s), flash '{}', verification {}",
    plan.checks.len(),
    plan.flash,
    plan.verify.unwrap_or("disabled")
  );
  Installer::new(registry, runner)
    .with_log_capacity(config.log_buffer_lines)
    .run(&plan, params)
    .await
}
