use chrono::Local;
use log::{LevelFilter, Log, Metadata, Record};
use std::io::Write;


/// Env var holding the log level (`error`, `warn`, `info`, `debug`, `trace`).
pub const LOG_LEVEL_ENV: &str = "FLASHY_LOG";

/// Timestamped lines on stderr, stdout stays free for whoever wraps us.
pub struct StderrLogger {
  level: LevelFilter,
}

impl Log for StderrLogger {
  fn enabled(&self, metadata: &Metadata) -> bool {
    metadata.level() <= self.level
  }

  fn log(&self, record: &Record) {
    if !self.enabled(record.metadata()) {
      return;
    }
    let line = format!(
      "{} [{:<5}] {}: {}\n",
      Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
      record.level(),
      record.target(),
      record.args()
    );
    // one write per line so lines from different tasks don't interleave
    let _ = std::io::stderr().lock().write_all(line.as_bytes());
  }

  fn flush(&self) {
    let _ = std::io::stderr().flush();
  }
}

/// Unset or unparsable means `info`.
pub fn level_from(value: Option<&str>) -> LevelFilter {
  value.and_then(|v| v.trim().parse().ok()).unwrap_or(LevelFilter::Info)
}

pub fn init() {
  let level = level_from(std::env::var(LOG_LEVEL_ENV).ok().as_deref());
  if let Err(e) = log::set_boxed_logger(Box::new(StderrLogger { level }))
    .map(|()| log::set_max_level(level)) {
    eprintln!("failed to install logger: {}", e);
  }
}
