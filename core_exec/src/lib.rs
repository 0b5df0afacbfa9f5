//! Process execution and run-state plumbing shared by the engine and every step.

pub mod cmd;
pub mod state;
