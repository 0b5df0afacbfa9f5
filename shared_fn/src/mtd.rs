use anyhow::{anyhow, bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};


/// Finds the `mtdN` device whose name is `name` in the text of `/proc/mtd`.
///
/// ```text
/// dev:    size   erasesize  name
/// mtd0: 00060000 00010000 "u-boot"
/// mtd5: 02000000 00010000 "flash0"
/// ```
pub fn find_mtd_device(proc_mtd: &str, name: &str) -> Option<String> {
  proc_mtd.lines().skip(1).find_map(|line| {
    let (dev, rest) = line.split_once(':')?;
    let label = rest.split_whitespace().nth(2)?.trim_matches('"');
    (label == name).then(|| dev.trim().to_string())
  })
}

/// Size in bytes of the named partition, from the same table.
pub fn mtd_size(proc_mtd: &str, name: &str) -> Option<u64> {
  proc_mtd.lines().skip(1).find_map(|line| {
    let (_, rest) = line.split_once(':')?;
    let mut fields = rest.split_whitespace();
    let size = fields.next()?;
    let label = fields.nth(1)?.trim_matches('"');
    if label != name {
      return None;
    }
    u64::from_str_radix(size, 16).ok()
  })
}

pub fn read_proc_mtd(proc_mtd_path: &Path) -> Result<String> {
  fs::read_to_string(proc_mtd_path)
    .with_context(|| format!("Unable to read '{}'", proc_mtd_path.display()))
}

/// Device node under `dev_dir` for partition `name`, looked up in already read
/// `/proc/mtd` text (`source` is only used in errors). The node must exist.
pub fn mtd_node_in(proc_mtd: &str, source: &Path, dev_dir: &Path, name: &str) -> Result<PathBuf> {
  let mtd = find_mtd_device(proc_mtd, name)
    .ok_or_else(|| anyhow!("No mtd partition named '{}' in '{}'", name, source.display()))?;
  let node = dev_dir.join(&mtd);
  if !node.exists() {
    bail!("Device node '{}' for partition '{}' does not exist", node.display(), name);
  }
  Ok(node)
}

/// Looks `name` up in the `/proc/mtd` file and returns its device node under `dev_dir`,
/// which must exist.
pub fn resolve_mtd_node(proc_mtd_path: &Path, dev_dir: &Path, name: &str) -> Result<PathBuf> {
  let proc_mtd = read_proc_mtd(proc_mtd_path)?;
  mtd_node_in(&proc_mtd, proc_mtd_path, dev_dir, name)
}
