//! Small helpers several steps need: bounded retry, `/proc/mtd` lookup,
//! log directory housekeeping and ordered log assertions for tests.

pub mod file_utils;
pub mod log_seq;
pub mod mtd;
pub mod retry;
