//! The contract between the orchestrator and every step: the `Step` trait, the
//! parameters a step receives, the log sink it writes to and the closed set of
//! classified failures it may return.

pub mod exit_error;
pub mod log_sink;
pub mod step_params;
pub mod step_traits;
