use anyhow::Context;
use async_trait::async_trait;
use shared_traits::{
  exit_error::ExitError,
  step_traits::{Step, StepContext},
};


pub const PATH: &str = "checks_and_remediations/common/10_drop_caches";

pub const SYNC_TIMEOUT_SECS: i64 = 60;

/// Flushes dirty pages and drops the page cache so the flash tool has memory to work with.
pub struct DropCaches;

#[async_trait]
impl Step for DropCaches {
    fn path(&self) -> &'static str {
        PATH
    }

    async fn run(&self, ctx: &StepContext<'_>) -> Result<(), ExitError> {
        ctx.log.info("Syncing filesystems and dropping caches");

        ctx.runner.run(&["sync".to_string()], SYNC_TIMEOUT_SECS).await
            .check()
            .context("sync failed")
            .map_err(ExitError::safe)?;

        let drop_caches_path = &ctx.params.layout.drop_caches_path;
        // 3 = page cache + dentries and inodes
        std::fs::write(drop_caches_path, "3")
            .with_context(|| format!("Unable to write to '{}'", drop_caches_path.display()))
            .map_err(ExitError::safe)?;

        ctx.log.info("Dropped caches");
        Ok(())
    }
}
