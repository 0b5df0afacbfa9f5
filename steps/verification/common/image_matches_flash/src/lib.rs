use anyhow::{bail, Context};
use async_trait::async_trait;
use shared_fn::mtd::resolve_mtd_node;
use shared_traits::{
  exit_error::ExitError,
  step_traits::{Step, StepContext},
};
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncReadExt;


pub const PATH: &str = "verification/common/image_matches_flash";

const CHUNK: usize = 64 * 1024;

/// Reads the target partition back and checks it starts with the exact image bytes.
///
/// Read-only. Any failure means the flash does not hold the image (or we cannot tell),
/// which after a write is `UnsafeToReboot`.
pub struct ImageMatchesFlash;

#[async_trait]
impl Step for ImageMatchesFlash {
    fn path(&self) -> &'static str {
        PATH
    }

    async fn run(&self, ctx: &StepContext<'_>) -> Result<(), ExitError> {
        let device = ctx.params.device().map_err(ExitError::unsafe_to_reboot)?;
        let layout = &ctx.params.layout;
        let node = resolve_mtd_node(&layout.proc_mtd_path, &layout.dev_dir, &device.name)
            .map_err(ExitError::unsafe_to_reboot)?;

        ctx.log.info(format!(
            "Verifying '{}' against image file '{}'",
            node.display(),
            ctx.params.image_file_path.display()
        ));
        compare_flash_with_image(&ctx.params.image_file_path, &node).await
            .map_err(ExitError::unsafe_to_reboot)?;

        ctx.log.info("Flash contents match image file");
        Ok(())
    }
}

/// `Ok` when the first `len(image)` bytes of `flash` equal the image.
/// Both files are read a chunk at a time.
pub async fn compare_flash_with_image(image_file_path: &Path, flash: &Path) -> anyhow::Result<()> {
    let mut image_file = File::open(image_file_path).await
        .with_context(|| format!("Unable to read image file '{}'", image_file_path.display()))?;
    let mut flash_file = File::open(flash).await
        .with_context(|| format!("Unable to open '{}'", flash.display()))?;

    let mut want = vec![0u8; CHUNK];
    let mut got = vec![0u8; CHUNK];
    let mut offset = 0;
    loop {
        let n = fill(&mut image_file, &mut want).await
            .with_context(|| format!("Unable to read image file '{}'", image_file_path.display()))?;
        if n == 0 {
            break;
        }
        flash_file.read_exact(&mut got[..n]).await
            .with_context(|| format!("'{}' is shorter than the image", flash.display()))?;
        if let Some(i) = want[..n].iter().zip(&got[..n]).position(|(a, b)| a != b) {
            bail!("Flash contents differ from image at offset {:#x}", offset + i);
        }
        offset += n;
    }
    if offset == 0 {
        bail!("Image file '{}' is empty", image_file_path.display());
    }
    Ok(())
}

// reads until `buf` is full or EOF, returns how much was read
async fn fill(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]).await? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}
