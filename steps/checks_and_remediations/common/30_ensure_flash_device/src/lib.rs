use anyhow::{anyhow, Context};
use async_trait::async_trait;
use shared_fn::mtd::{find_mtd_device, mtd_node_in, mtd_size, read_proc_mtd};
use shared_traits::{
  exit_error::ExitError,
  step_traits::{Step, StepContext},
};


pub const PATH: &str = "checks_and_remediations/common/30_ensure_flash_device";

/// The target partition exists, has a device node and is large enough for the image.
pub struct EnsureFlashDevice;

#[async_trait]
impl Step for EnsureFlashDevice {
    fn path(&self) -> &'static str {
        PATH
    }

    async fn run(&self, ctx: &StepContext<'_>) -> Result<(), ExitError> {
        let device = ctx.params.device().map_err(ExitError::safe)?;
        let layout = &ctx.params.layout;
        ctx.log.info(format!("Looking for flash device '{}'", device));

        // one read, both the node lookup and the size check use it
        let proc_mtd = read_proc_mtd(&layout.proc_mtd_path).map_err(ExitError::safe)?;
        let node = mtd_node_in(&proc_mtd, &layout.proc_mtd_path, &layout.dev_dir, &device.name)
            .map_err(ExitError::safe)?;
        let image_size = std::fs::metadata(&ctx.params.image_file_path)
            .with_context(|| format!("Unable to stat image file '{}'", ctx.params.image_file_path.display()))
            .map_err(ExitError::safe)?
            .len();
        if let Some(partition_size) = mtd_size(&proc_mtd, &device.name) {
            if image_size > partition_size {
                return Err(ExitError::safe(anyhow!(
                    "Image file is {} bytes but partition '{}' ({}) only holds {} bytes",
                    image_size,
                    device.name,
                    find_mtd_device(&proc_mtd, &device.name).unwrap_or_default(),
                    partition_size,
                )));
            }
        }

        ctx.log.info(format!("Found flash device '{}' at '{}'", device, node.display()));
        Ok(())
    }
}
