use std::collections::VecDeque;
use std::fmt;
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepStatus { Pending, Running, Succeeded, Failed, Skipped }

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepInfo {
  pub path: String,
  pub status: StepStatus,
}

// keep last N log lines, drop oldest automatically
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
  // `VecDeque` is like `[oldest, ..., newest]`, when full a push drops `oldest`
  buf: VecDeque<T>,
  cap: usize,
}
impl<T> RingBuffer<T> {
  pub fn new(cap: usize) -> Self {
    // capacity is at least one line
    let cap = cap.max(1);
    Self { buf: VecDeque::with_capacity(cap), cap }
  }
  pub fn push(&mut self, v: T) {
    if self.buf.len() == self.cap { self.buf.pop_front(); }
    self.buf.push_back(v);
  }
  pub fn iter(&self) -> impl Iterator<Item=&T> { self.buf.iter() }
  pub fn len(&self) -> usize { self.buf.len() }
  pub fn is_empty(&self) -> bool { self.buf.is_empty() }
  pub fn capacity(&self) -> usize { self.cap }
}
impl<T: Clone> RingBuffer<T> {
  pub fn to_vec(&self) -> Vec<T> { self.buf.iter().cloned().collect() }
}

/// Phases of one install run. `SafeAbort` and `UnsafeAbort` absorb every failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstallPhase {
  /// Parameters and plan are validated, nothing on the device touched yet
  Init,
  /// Checks and remediations, strictly before anything destructive
  RunningChecks,
  /// The flash method step
  RunningFlash,
  /// Post-flash sanity check, or the "already flashed" short-circuit
  Verifying,
  Done,
  SafeAbort,
  UnsafeAbort,
}

impl InstallPhase {
  pub fn as_str(&self) -> &'static str {
    match self {
      InstallPhase::Init => "init",
      InstallPhase::RunningChecks => "running_checks",
      InstallPhase::RunningFlash => "running_flash",
      InstallPhase::Verifying => "verifying",
      InstallPhase::Done => "done",
      InstallPhase::SafeAbort => "safe_abort",
      InstallPhase::UnsafeAbort => "unsafe_abort",
    }
  }

  pub fn valid_next_phases(&self) -> Vec<InstallPhase> {
    use InstallPhase::*;
    match self {
      Init => vec![RunningChecks, SafeAbort],
      RunningChecks => vec![RunningFlash, Verifying, SafeAbort, UnsafeAbort],
      RunningFlash => vec![Verifying, Done, SafeAbort, UnsafeAbort],
      Verifying => vec![Done, SafeAbort, UnsafeAbort],
      Done | SafeAbort | UnsafeAbort => vec![],
    }
  }

  pub fn can_transition_to(&self, next: InstallPhase) -> bool {
    self.valid_next_phases().contains(&next)
  }

  pub fn is_terminal(&self) -> bool {
    matches!(self, InstallPhase::Done | InstallPhase::SafeAbort | InstallPhase::UnsafeAbort)
  }
}

impl fmt::Display for InstallPhase {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid phase transition from {from} to {to}")]
pub struct PhaseTransitionError {
  pub from: InstallPhase,
  pub to: InstallPhase,
}

/// Everything the orchestrator tracks while a run is in flight.
#[derive(Debug, Clone)]
pub struct RunState {
  pub phase: InstallPhase,
  pub steps: Vec<StepInfo>,
  pub log: RingBuffer<String>,
}
impl RunState {
  pub fn new(step_paths: &[String], log_capacity: usize) -> Self {
    RunState {
      phase: InstallPhase::Init,
      // this will be the `Vec<StepInfo>`, all pending until the runner reaches them
      steps: step_paths.iter().map(|path| StepInfo {
        path: path.clone(),
        status: StepStatus::Pending,
      }).collect(),
      log: RingBuffer::new(log_capacity),
    }
  }

  pub fn transition_to(&mut self, next: InstallPhase) -> Result<(), PhaseTransitionError> {
    if !self.phase.can_transition_to(next) {
      return Err(PhaseTransitionError { from: self.phase, to: next });
    }
    self.phase = next;
    Ok(())
  }

  pub fn set_status(&mut self, path: &str, status: StepStatus) {
    // the same path can appear twice (verification before and after flash): update the first not yet settled one
    let slot = self.steps.iter_mut()
      .find(|s| s.path == path && matches!(s.status, StepStatus::Pending | StepStatus::Running));
    if let Some(info) = slot {
      info.status = status;
    }
  }

  pub fn status_of(&self, path: &str) -> Option<StepStatus> {
    self.steps.iter().find(|s| s.path == path).map(|s| s.status)
  }
}
