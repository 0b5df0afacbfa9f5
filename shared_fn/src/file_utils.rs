use anyhow::{bail, Context, Result};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};


/// What `clean_log_dir` did, for the step to report.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LogCleanup {
  pub truncated: Vec<PathBuf>,
  pub removed: Vec<PathBuf>,
}

/// Rotated copies: `messages.1`, `syslog.log.3`, anything gzipped.
pub fn is_rotated_log(path: &Path) -> bool {
  match path.extension().and_then(|e| e.to_str()) {
    Some("gz") => true,
    Some(ext) => !ext.is_empty() && ext.chars().all(|c| c.is_ascii_digit()),
    None => false,
  }
}

pub fn truncate_file(path: &Path) -> Result<()> {
  OpenOptions::new()
    .write(true)
    .truncate(true)
    .open(path)
    .with_context(|| format!("Unable to truncate '{}'", path.display()))?;
  Ok(())
}

/// Removes rotated logs and truncates every other regular file under `dir`, recursively.
/// Symlinks are left alone, whatever they point to.
pub fn clean_log_dir(dir: &Path) -> Result<LogCleanup> {
  let mut cleanup = LogCleanup::default();
  clean_dir_into(dir, &mut cleanup)?;
  Ok(cleanup)
}

fn clean_dir_into(dir: &Path, cleanup: &mut LogCleanup) -> Result<()> {
  let entries = fs::read_dir(dir)
    .with_context(|| format!("Unable to read log directory '{}'", dir.display()))?;
  let mut paths: Vec<PathBuf> = entries
    .map(|entry| entry.map(|e| e.path()))
    .collect::<std::io::Result<_>>()
    .with_context(|| format!("Unable to list '{}'", dir.display()))?;
  // stable order so the step log reads the same every run
  paths.sort();

  for path in paths {
    let meta = fs::symlink_metadata(&path)
      .with_context(|| format!("Unable to stat '{}'", path.display()))?;
    let file_type = meta.file_type();
    if file_type.is_symlink() {
      continue;
    } else if file_type.is_dir() {
      clean_dir_into(&path, cleanup)?;
    } else if file_type.is_file() {
      if is_rotated_log(&path) {
        fs::remove_file(&path)
          .with_context(|| format!("Unable to remove '{}'", path.display()))?;
        cleanup.removed.push(path);
      } else {
        truncate_file(&path)?;
        cleanup.truncated.push(path);
      }
    }
  }
  Ok(())
}

/// The path exists, is a regular file (after following symlinks) and can be opened for reading.
pub fn ensure_readable_file(path: &Path) -> Result<()> {
  let meta = fs::metadata(path)
    .with_context(|| format!("'{}' does not exist or cannot be accessed", path.display()))?;
  if !meta.is_file() {
    bail!("'{}' is not a regular file", path.display());
  }
  File::open(path).with_context(|| format!("'{}' is not readable", path.display()))?;
  Ok(())
}
