use async_trait::async_trait;
use core_exec::cmd::CommandRunner;
use crate::{
  exit_error::ExitError,
  log_sink::LogSink,
  step_params::StepParams,
};


/// What a step gets to work with. Built once per step invocation by the orchestrator,
/// read-only to the step.
pub struct StepContext<'a> {
  pub params: &'a StepParams,
  pub runner: &'a dyn CommandRunner,
  pub log: &'a LogSink,
}

impl<'a> StepContext<'a> {
  pub fn new(params: &'a StepParams, runner: &'a dyn CommandRunner, log: &'a LogSink) -> Self {
    Self { params, runner, log }
  }
}

/// One check, remediation, flash or verification action.
///
/// `Ok(())` means the device is in a state where the next step can start.
/// Every failure is an `ExitError`, so the caller always knows whether a reboot is safe.
#[async_trait]
pub trait Step: Send + Sync {
  /// Unique registry path, `<category>/<subcategory>/<step_name>`.
  fn path(&self) -> &'static str;
  async fn run(&self, ctx: &StepContext<'_>) -> Result<(), ExitError>;
}
