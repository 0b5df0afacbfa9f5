mod logger;

use anyhow::{bail, Context, Result};
use core_exec::cmd::SystemCommandRunner;
use engine::config::load_config;
use shared_traits::step_params::StepParams;
use std::path::PathBuf;


const USAGE: &str = "usage: flashy <image_file> <device_id> [--config <file.toml>]";

#[derive(Debug, PartialEq, Eq)]
struct Args {
  image: PathBuf,
  device_id: String,
  config: Option<PathBuf>,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Args> {
  let mut positional = Vec::new();
  let mut config = None;
  while let Some(arg) = args.next() {
    match arg.as_str() {
      "--config" | "-c" => {
        config = Some(PathBuf::from(args.next().context("--config needs a path")?));
      }
      "--help" | "-h" => bail!(USAGE),
      _ => positional.push(arg),
    }
  }
  match <[String; 2]>::try_from(positional) {
    Ok([image, device_id]) => Ok(Args { image: PathBuf::from(image), device_id, config }),
    Err(_) => bail!(USAGE),
  }
}

#[tokio::main]
async fn main() -> Result<()> {
  logger::init();
  let args = parse_args(std::env::args().skip(1))?;
  let config = load_config(args.config.as_deref())?;

  let mut params = StepParams::new(args.image, args.device_id).with_layout(config.layout.clone());
  if let Some(platform) = &config.platform {
    params = params.with_platform(platform.clone());
  }
  let runner = SystemCommandRunner::new(config.default_timeout_secs);

  let report = engine::run(&config, &params, &runner).await?;
  log::info!("install ended in {} (exit code {})", report.phase, report.exit_code.code());
  std::process::exit(report.exit_code.code());
}


#[cfg(test)]
mod tests {
  use super::*;

  fn args(parts: &[&str]) -> impl Iterator<Item = String> {
    parts.iter().map(|p| p.to_string()).collect::<Vec<_>>().into_iter()
  }

  #[test]
  fn positional_and_config() {
    assert_eq!(
      parse_args(args(&["/tmp/image", "mtd:flash0", "--config", "/etc/flashy.toml"])).unwrap(),
      Args {
        image: PathBuf::from("/tmp/image"),
        device_id: "mtd:flash0".to_string(),
        config: Some(PathBuf::from("/etc/flashy.toml")),
      }
    );
  }

  #[test]
  fn missing_or_extra_arguments_are_usage_errors() {
    assert_eq!(parse_args(args(&["/tmp/image"])).unwrap_err().to_string(), USAGE);
    assert!(parse_args(args(&["a", "b", "c"])).is_err());
    assert!(parse_args(args(&["a", "b", "--config"])).is_err());
  }
}
