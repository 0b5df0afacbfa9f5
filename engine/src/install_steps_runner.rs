use anyhow::anyhow;
use futures::FutureExt;
use core_exec::{
  cmd::CommandRunner,
  state::{InstallPhase, RunState, StepInfo, StepStatus},
};
use shared_fn::file_utils::ensure_readable_file;
use shared_traits::{
  exit_error::{ExitError, InstallExitCode},
  log_sink::{drain_lines, LogSink},
  step_params::StepParams,
  step_traits::StepContext,
};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use tokio::sync::mpsc::UnboundedReceiver;
use crate::config::{InstallConfig, DEFAULT_LOG_BUFFER_LINES};
use crate::registry::{
  RegistryError,
  StepPath,
  StepRegistry,
  CHECKS_CATEGORY,
  COMMON_SUBCATEGORY,
  FLASH_CATEGORY,
  VERIFICATION_CATEGORY,
};


/// Ordered step paths for one run, all known to be registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallPlan {
  pub checks: Vec<&'static str>,
  pub flash: &'static str,
  pub verify: Option<&'static str>,
}

impl InstallPlan {
  /// Common checks plus the platform's own, ordered by step name, then the configured
  /// flash method and verification step.
  pub fn resolve(registry: &StepRegistry, config: &InstallConfig) -> Result<Self, RegistryError> {
    let mut checks = registry.under(CHECKS_CATEGORY, COMMON_SUBCATEGORY);
    if let Some(platform) = &config.platform {
      checks.extend(registry.under(CHECKS_CATEGORY, platform));
    }
    // numeric prefixes order checks across subcategories
    checks.sort_by_key(|&path| (step_name(path), path));

    let flash = resolve_in(registry, &config.flash_method, FLASH_CATEGORY)?;
    let verify = config.verify_step.as_deref()
      .map(|path| resolve_in(registry, path, VERIFICATION_CATEGORY))
      .transpose()?;
    Ok(InstallPlan { checks, flash, verify })
  }

  /// One entry per step invocation: the verification step shows up before and after the flash.
  pub fn step_paths(&self) -> Vec<String> {
    let mut paths: Vec<String> = self.checks.iter().map(|p| p.to_string()).collect();
    if let Some(verify) = self.verify {
      paths.push(verify.to_string());
    }
    paths.push(self.flash.to_string());
    if let Some(verify) = self.verify {
      paths.push(verify.to_string());
    }
    paths
  }
}

fn step_name(path: &str) -> &str {
  path.rsplit('/').next().unwrap_or(path)
}

fn resolve_in(registry: &StepRegistry, path: &str, expected: &'static str) -> Result<&'static str, RegistryError> {
  let key = registry.resolve(path)?;
  if StepPath::parse(key)?.category != expected {
    return Err(RegistryError::WrongCategory { path: key.to_string(), expected });
  }
  Ok(key)
}

/// Outcome of one run, what the binary turns into an exit code.
#[derive(Debug)]
pub struct InstallReport {
  pub phase: InstallPhase,
  pub exit_code: InstallExitCode,
  pub failed_step: Option<String>,
  pub error: Option<ExitError>,
  /// Last lines of the run, oldest first.
  pub log: Vec<String>,
  pub steps: Vec<StepInfo>,
  /// Device already held the image, nothing was written.
  pub flash_skipped: bool,
}

impl InstallReport {
  /// Run refused before any step: the device was not touched.
  pub fn rejected(cause: anyhow::Error) -> Self {
    let error = ExitError::safe(cause);
    log::error!("install rejected: {}", error);
    InstallReport {
      phase: InstallPhase::SafeAbort,
      exit_code: InstallExitCode::InitValidation,
      failed_step: None,
      log: vec![error.to_string()],
      error: Some(error),
      steps: Vec::new(),
      flash_skipped: false,
    }
  }

  pub fn is_success(&self) -> bool {
    self.exit_code == InstallExitCode::Success
  }
}

/// Runs a resolved plan against one device, strictly one step at a time.
pub struct Installer<'a> {
  registry: &'a StepRegistry,
  runner: &'a dyn CommandRunner,
  log_capacity: usize,
}

// where a failure happened decides how it is classified and reported
enum Failure {
  Init(anyhow::Error),
  Step { path: &'static str, error: ExitError },
}

impl<'a> Installer<'a> {
  pub fn new(registry: &'a StepRegistry, runner: &'a dyn CommandRunner) -> Self {
    Installer { registry, runner, log_capacity: DEFAULT_LOG_BUFFER_LINES }
  }

  pub fn with_log_capacity(mut self, lines: usize) -> Self {
    self.log_capacity = lines;
    self
  }

  pub async fn run(&self, plan: &InstallPlan, params: &StepParams) -> InstallReport {
    let mut state = RunState::new(&plan.step_paths(), self.log_capacity);
    let (log, mut rx) = LogSink::channel();
    let mut flash_skipped = false;

    let outcome = self.run_phases(plan, params, &mut state, &log, &mut rx, &mut flash_skipped).await;
    // whatever the orchestrator itself said after the last step
    for line in drain_lines(&mut rx) {
      state.log.push(line);
    }

    match outcome {
      Ok(()) => {
        log::info!("install finished ({})", if flash_skipped { "image already on flash" } else { "flashed" });
        InstallReport {
          phase: state.phase,
          exit_code: InstallExitCode::Success,
          failed_step: None,
          error: None,
          log: state.log.to_vec(),
          steps: state.steps,
          flash_skipped,
        }
      }
      Err(failure) => abort(state, failure, flash_skipped),
    }
  }

  async fn run_phases(
    &self,
    plan: &InstallPlan,
    params: &StepParams,
    state: &mut RunState,
    log: &LogSink,
    rx: &mut UnboundedReceiver<String>,
    flash_skipped: &mut bool,
  ) -> Result<(), Failure> {
    /* 1. init: nothing on the device is touched yet */
    self.validate(plan, params).map_err(Failure::Init)?;
    enter(state, InstallPhase::RunningChecks)?;
    let ctx = StepContext::new(params, self.runner, log);

    /* 2. checks and remediations, first failure stops the run */
    for &path in &plan.checks {
      self.run_step(path, &ctx, state, rx).await
        .map_err(|error| Failure::Step { path, error })?;
    }

    /* 3. already flashed with this image? then there is nothing to write */
    if let Some(verify) = plan.verify {
      log.info(format!("Checking whether the device already holds the image ({})", verify));
      match self.run_step(verify, &ctx, state, rx).await {
        Ok(()) => {
          log.info("Device already holds the image, skipping flash");
          state.set_status(plan.flash, StepStatus::Skipped);
          state.set_status(verify, StepStatus::Skipped);
          *flash_skipped = true;
          enter(state, InstallPhase::Verifying)?;
          enter(state, InstallPhase::Done)?;
          return Ok(());
        }
        // expected on a device that still runs the old image
        Err(e) => log.info(format!("Image not on flash yet: {}", e.cause())),
      }
    }

    /* 4. flash: the step's own classification stands */
    enter(state, InstallPhase::RunningFlash)?;
    self.run_step(plan.flash, &ctx, state, rx).await
      .map_err(|error| Failure::Step { path: plan.flash, error })?;

    /* 5. post-flash verification: a write happened, any failure is unsafe */
    if let Some(verify) = plan.verify {
      enter(state, InstallPhase::Verifying)?;
      self.run_step(verify, &ctx, state, rx).await
        .map_err(|error| Failure::Step { path: verify, error: error.escalate() })?;
    }
    enter(state, InstallPhase::Done)?;
    Ok(())
  }

  fn validate(&self, plan: &InstallPlan, params: &StepParams) -> anyhow::Result<()> {
    ensure_readable_file(&params.image_file_path)?;
    params.device()?;
    let planned = plan.checks.iter().chain([&plan.flash]).chain(plan.verify.iter());
    for path in planned {
      if self.registry.get(path).is_none() {
        return Err(RegistryError::UnknownStep(path.to_string()).into());
      }
    }
    Ok(())
  }

  async fn run_step(
    &self,
    path: &'static str,
    ctx: &StepContext<'_>,
    state: &mut RunState,
    rx: &mut UnboundedReceiver<String>,
  ) -> Result<(), ExitError> {
    let Some(step) = self.registry.get(path) else {
      // plan was validated in `Init`, a missing step here is a bug: fail closed
      return Err(ExitError::unsafe_to_reboot(RegistryError::UnknownStep(path.to_string())));
    };
    state.set_status(path, StepStatus::Running);
    ctx.log.info(format!("Running step '{}'", path));

    // a panicking step may have left the device half written
    let result = match AssertUnwindSafe(step.run(ctx)).catch_unwind().await {
      Ok(result) => result,
      Err(panic) => Err(ExitError::unsafe_to_reboot(anyhow!(
        "step '{}' panicked: {}",
        path,
        panic_message(panic.as_ref())
      ))),
    };

    // drain any log lines produced during the step
    for line in drain_lines(rx) {
      state.log.push(line);
    }
    state.set_status(path, if result.is_ok() { StepStatus::Succeeded } else { StepStatus::Failed });
    result
  }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
  if let Some(msg) = panic.downcast_ref::<&str>() {
    msg
  } else if let Some(msg) = panic.downcast_ref::<String>() {
    msg.as_str()
  } else {
    "unknown panic"
  }
}

fn enter(state: &mut RunState, next: InstallPhase) -> Result<(), Failure> {
  state.transition_to(next).map_err(|e| Failure::Step {
    path: "orchestrator",
    error: ExitError::unsafe_to_reboot(e),
  })
}

fn abort(mut state: RunState, failure: Failure, flash_skipped: bool) -> InstallReport {
  let (failed_step, error, exit_code) = match failure {
    Failure::Init(cause) => (None, ExitError::safe(cause), InstallExitCode::InitValidation),
    Failure::Step { path, error } => {
      let code = error.exit_code();
      (Some(path.to_string()), error, code)
    }
  };
  let next = if error.is_safe_to_reboot() { InstallPhase::SafeAbort } else { InstallPhase::UnsafeAbort };
  if state.transition_to(next).is_err() {
    // `Init` has no unsafe exit, keep the stricter class
    state.phase = InstallPhase::UnsafeAbort;
  }
  state.log.push(format!(
    "Aborting in {}: step '{}' failed: {}",
    state.phase,
    failed_step.as_deref().unwrap_or("init"),
    error
  ));

  log::error!("install aborted ({}), step: {}", state.phase, failed_step.as_deref().unwrap_or("init"));
  log::error!("{}", error);
  for line in state.log.iter() {
    log::error!("| {}", line);
  }
  if !error.is_safe_to_reboot() {
    log::error!("DO NOT REBOOT OR POWER-CYCLE THIS DEVICE");
  }

  InstallReport {
    phase: state.phase,
    exit_code,
    failed_step,
    error: Some(error),
    log: state.log.to_vec(),
    steps: state.steps,
    flash_skipped,
  }
}
