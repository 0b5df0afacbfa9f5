use anyhow::Context;
use async_trait::async_trait;
use shared_fn::file_utils::clean_log_dir;
use shared_traits::{
  exit_error::ExitError,
  step_traits::{Step, StepContext},
};


pub const PATH: &str = "checks_and_remediations/common/00_truncate_logs";

/// Makes room on the small BMC filesystems: rotated logs go, live logs are emptied.
pub struct TruncateLogs;

#[async_trait]
impl Step for TruncateLogs {
    fn path(&self) -> &'static str {
        PATH
    }

    async fn run(&self, ctx: &StepContext<'_>) -> Result<(), ExitError> {
        let log_dir = &ctx.params.layout.log_dir;
        ctx.log.info(format!("Truncating logs in '{}'", log_dir.display()));

        // flash is untouched at this point, whatever goes wrong here
        let cleanup = clean_log_dir(log_dir)
            .context("Failed to truncate logs")
            .map_err(ExitError::safe)?;

        ctx.log.info(format!(
            "Removed {} rotated log file(s), truncated {} log file(s)",
            cleanup.removed.len(),
            cleanup.truncated.len(),
        ));
        Ok(())
    }
}
