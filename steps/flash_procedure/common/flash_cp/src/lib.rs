use anyhow::{anyhow, Context};
use async_trait::async_trait;
use shared_fn::{file_utils::ensure_readable_file, mtd::resolve_mtd_node};
use shared_traits::{
  exit_error::ExitError,
  step_traits::{Step, StepContext},
};


pub const PATH: &str = "flash_procedure/common/flash_cp";

pub const FLASHCP_TIMEOUT_SECS: i64 = 1800;

/// Flashes the image onto the raw mtd node with `flashcp`.
///
/// flashcp erases blocks and then writes them with no rollback, and its exit code does not
/// say how far it got. Anything it reports is `UnsafeToReboot`. Only the pre-flight checks
/// done here, before flashcp is started, can fail safely.
pub struct FlashCp;

#[async_trait]
impl Step for FlashCp {
    fn path(&self) -> &'static str {
        PATH
    }

    async fn run(&self, ctx: &StepContext<'_>) -> Result<(), ExitError> {
        ctx.log.info("Flashing using flashcp method");

        // pre-flight, nothing has been written yet
        ensure_readable_file(&ctx.params.image_file_path)
            .context("Image file is not usable")
            .map_err(ExitError::safe)?;
        let device = ctx.params.device().map_err(ExitError::safe)?;
        let layout = &ctx.params.layout;
        let node = resolve_mtd_node(&layout.proc_mtd_path, &layout.dev_dir, &device.name)
            .map_err(ExitError::safe)?;

        let image_file_path = ctx.params.image_arg();
        let node = node.to_string_lossy().into_owned();
        ctx.log.info(format!("Attempting to flash '{}' with image file '{}'", node, image_file_path));

        let out = ctx.runner.run(&flashcp_command(&image_file_path, &node), FLASHCP_TIMEOUT_SECS).await;
        if let Some(err) = out.error {
            return Err(ExitError::unsafe_to_reboot(anyhow!(
                "flashcp failed with exit code {}, error: {}, stdout: '{}', stderr: '{}'",
                out.exit_code, err, out.stdout, out.stderr
            )));
        }
        ctx.log.info(format!("flashcp wrote '{}'", node));
        Ok(())
    }
}

/// `flashcp -v <image> <mtd node>`
pub fn flashcp_command(image_file_path: &str, mtd_node: &str) -> Vec<String> {
    ["flashcp", "-v", image_file_path, mtd_node]
        .iter()
        .map(|part| part.to_string())
        .collect()
}
