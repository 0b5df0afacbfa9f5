use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};


/// Append-only text sink handed to steps.
///
/// Every line goes to the `log` facade right away and is also queued on a channel
/// that the orchestrator (or a test) drains to read back what was said, in order.
#[derive(Debug, Clone)]
pub struct LogSink {
  tx: UnboundedSender<String>,
}

impl LogSink {
  /// transmitter for the steps, receiver for whoever reads the lines back
  pub fn channel() -> (LogSink, UnboundedReceiver<String>) {
    let (tx, rx) = mpsc::unbounded_channel::<String>();
    (LogSink { tx }, rx)
  }

  pub fn info(&self, line: impl Into<String>) {
    let line = line.into();
    log::info!("{}", line);
    // nobody listening anymore is fine, the line already went to `log`
    let _ = self.tx.send(line);
  }

  pub fn warn(&self, line: impl Into<String>) {
    let line = line.into();
    log::warn!("{}", line);
    let _ = self.tx.send(line);
  }
}

/// Pulls every line queued so far without waiting.
pub fn drain_lines(rx: &mut UnboundedReceiver<String>) -> Vec<String> {
  let mut lines = Vec::new();
  while let Ok(line) = rx.try_recv() {
    lines.push(line);
  }
  lines
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn lines_come_back_in_order() {
    let (log, mut rx) = LogSink::channel();
    log.info("first");
    log.clone().warn("second");
    assert_eq!(drain_lines(&mut rx), vec!["first", "second"]);
    assert!(drain_lines(&mut rx).is_empty());
  }

  #[test]
  fn writing_after_reader_dropped_does_not_panic() {
    let (log, rx) = LogSink::channel();
    drop(rx);
    log.info("still fine");
  }
}
