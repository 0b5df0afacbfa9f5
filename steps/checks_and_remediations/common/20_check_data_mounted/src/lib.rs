use async_trait::async_trait;
use shared_fn::retry::RetryPolicy;
use shared_traits::{
  exit_error::ExitError,
  step_traits::{Step, StepContext},
};
use std::path::Path;
use std::time::Duration;


pub const PATH: &str = "checks_and_remediations/common/20_check_data_mounted";

pub const MOUNTPOINT_TIMEOUT_SECS: i64 = 10;

/// The persistent data partition must be mounted before flashing, right after boot
/// it can take a few seconds to show up, hence the bounded retry.
pub struct CheckDataMounted {
    retry: RetryPolicy,
}

impl Default for CheckDataMounted {
    fn default() -> Self {
        CheckDataMounted { retry: RetryPolicy::linear(3, Duration::from_secs(2)) }
    }
}

impl CheckDataMounted {
    pub fn with_retry(retry: RetryPolicy) -> Self {
        CheckDataMounted { retry }
    }
}

/// `mountpoint -q <path>`
pub fn mountpoint_command(mount_point: &Path) -> Vec<String> {
    vec![
        "mountpoint".to_string(),
        "-q".to_string(),
        mount_point.to_string_lossy().into_owned(),
    ]
}

#[async_trait]
impl Step for CheckDataMounted {
    fn path(&self) -> &'static str {
        PATH
    }

    async fn run(&self, ctx: &StepContext<'_>) -> Result<(), ExitError> {
        let mount_point = &ctx.params.layout.data_mount_point;
        ctx.log.info(format!("Checking that '{}' is mounted", mount_point.display()));

        let cmd = mountpoint_command(mount_point);
        let max_attempts = self.retry.max_attempts();
        let result = self.retry.run(|attempt| {
            let cmd = &cmd;
            async move {
                ctx.runner.run(cmd, MOUNTPOINT_TIMEOUT_SECS).await
                    .check()
                    .inspect_err(|e| ctx.log.warn(format!(
                        "'{}' not mounted (attempt {}/{}): {}",
                        mount_point.display(), attempt, max_attempts, e
                    )))
            }
        }).await;

        match result {
            Ok(_) => {
                ctx.log.info(format!("'{}' is mounted", mount_point.display()));
                Ok(())
            }
            Err(e) => Err(ExitError::safe(e.context(format!(
                "'{}' is not mounted after {} attempt(s)",
                mount_point.display(), max_attempts
            )))),
        }
    }
}
