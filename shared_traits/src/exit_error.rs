use thiserror::Error;


/// Classified failure of a step. The variant alone tells the caller what it may
/// physically do with the device next, the wrapped cause keeps the original text.
#[derive(Debug, Error)]
pub enum ExitError {
  /// Failed before anything destructive happened, the boot path is intact.
  #[error("safe to reboot: {0:#}")]
  SafeToReboot(anyhow::Error),
  /// Failed during or after a write that may be partial. Do not power-cycle.
  #[error("UNSAFE to reboot: {0:#}")]
  UnsafeToReboot(anyhow::Error),
}

impl ExitError {
  pub fn safe<E: Into<anyhow::Error>>(cause: E) -> Self {
    ExitError::SafeToReboot(cause.into())
  }

  pub fn unsafe_to_reboot<E: Into<anyhow::Error>>(cause: E) -> Self {
    ExitError::UnsafeToReboot(cause.into())
  }

  pub fn cause(&self) -> &anyhow::Error {
    match self {
      ExitError::SafeToReboot(cause) | ExitError::UnsafeToReboot(cause) => cause,
    }
  }

  pub fn is_safe_to_reboot(&self) -> bool {
    matches!(self, ExitError::SafeToReboot(_))
  }

  /// Same cause, unsafe class. Used once a write may have happened.
  pub fn escalate(self) -> Self {
    match self {
      ExitError::SafeToReboot(cause) | ExitError::UnsafeToReboot(cause) => ExitError::UnsafeToReboot(cause),
    }
  }

  pub fn exit_code(&self) -> InstallExitCode {
    match self {
      ExitError::SafeToReboot(_) => InstallExitCode::SafeToReboot,
      ExitError::UnsafeToReboot(_) => InstallExitCode::UnsafeToReboot,
    }
  }

  pub fn kind(&self) -> &'static str {
    match self {
      ExitError::SafeToReboot(_) => "SafeToReboot",
      ExitError::UnsafeToReboot(_) => "UnsafeToReboot",
    }
  }
}

/// Equal when the variant and the cause text match.
impl PartialEq for ExitError {
  fn eq(&self, other: &Self) -> bool {
    self.kind() == other.kind() && format!("{:#}", self.cause()) == format!("{:#}", other.cause())
  }
}

/// An error nobody classified is treated as the worst case.
impl From<anyhow::Error> for ExitError {
  fn from(cause: anyhow::Error) -> Self {
    ExitError::UnsafeToReboot(cause)
  }
}

/// Process exit codes, the only machine-readable signal for the automation around us.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallExitCode {
  Success,
  /// Parameters or plan rejected before any step ran. Safe to reboot.
  InitValidation,
  SafeToReboot,
  UnsafeToReboot,
}

impl InstallExitCode {
  pub fn code(&self) -> i32 {
    match self {
      InstallExitCode::Success => 0,
      InstallExitCode::InitValidation => 41,
      InstallExitCode::SafeToReboot => 42,
      InstallExitCode::UnsafeToReboot => 52,
    }
  }
}
