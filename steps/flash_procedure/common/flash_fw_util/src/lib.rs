use anyhow::anyhow;
use async_trait::async_trait;
use core_exec::cmd::CommandRunner;
use shared_traits::{
  exit_error::ExitError,
  step_traits::{Step, StepContext},
};


pub const PATH: &str = "flash_procedure/common/flash_fw_util";

/// A full BMC image write through fw-util takes minutes, not seconds.
pub const FW_UTIL_TIMEOUT_SECS: i64 = 1800;

/// Flashes the BMC image with `fw-util`.
///
/// fw-util validates the image before it erases anything and exits non-zero at that point,
/// so a failure it reports itself leaves the running firmware in place: `SafeToReboot`.
/// If fw-util was killed (timeout, signal) it may have been writing: `UnsafeToReboot`.
pub struct FlashFwUtil;

#[async_trait]
impl Step for FlashFwUtil {
    fn path(&self) -> &'static str {
        PATH
    }

    async fn run(&self, ctx: &StepContext<'_>) -> Result<(), ExitError> {
        ctx.log.info("Flashing using fw-util method");

        let image_file_path = ctx.params.image_arg();
        ctx.log.info(format!("Attempting to flash with image file '{}'", image_file_path));

        run_fw_util_cmd(ctx.runner, &image_file_path).await
    }
}

/// `fw-util bmc --update bmc <image>`
pub fn fw_util_command(image_file_path: &str) -> Vec<String> {
    ["fw-util", "bmc", "--update", "bmc", image_file_path]
        .iter()
        .map(|part| part.to_string())
        .collect()
}

pub async fn run_fw_util_cmd(runner: &dyn CommandRunner, image_file_path: &str) -> Result<(), ExitError> {
    let out = runner.run(&fw_util_command(image_file_path), FW_UTIL_TIMEOUT_SECS).await;
    let Some(err) = &out.error else {
        return Ok(());
    };
    let cause = anyhow!(
        "Flashing failed with exit code {}, error: {}, stdout: '{}', stderr: '{}'",
        out.exit_code, err, out.stdout, out.stderr
    );
    if out.was_interrupted() {
        Err(ExitError::unsafe_to_reboot(cause))
    } else {
        Err(ExitError::safe(cause))
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use core_exec::cmd::{command_line, CommandError, CommandOutput, FnCommandRunner, NO_EXIT_CODE};
    use shared_fn::log_seq::log_contains_seq;
    use shared_traits::{
        log_sink::{drain_lines, LogSink},
        step_params::StepParams,
    };
    use std::sync::Mutex;

    fn example_params() -> StepParams {
        StepParams::new("/tmp/image", "mtd:flash0")
    }

    #[tokio::test]
    async fn flash_fw_util() {
        struct Case {
            name: &'static str,
            cmd_out: CommandOutput,
            want: Result<(), ExitError>,
        }
        let cases = vec![
            Case {
                name: "basic successful flash",
                cmd_out: CommandOutput::success(""),
                want: Ok(()),
            },
            Case {
                name: "fw-util failed",
                cmd_out: CommandOutput::failure(1, CommandError::other("RunCommand error")),
                want: Err(ExitError::safe(anyhow!(
                    "Flashing failed with exit code 1, error: RunCommand error, stdout: '', stderr: ''"
                ))),
            },
            Case {
                name: "fw-util rejected the image",
                cmd_out: CommandOutput::failure(2, CommandError::ExitStatus { cmd: "fw-util".to_string(), code: 2 }),
                want: Err(ExitError::safe(anyhow!(
                    "Flashing failed with exit code 2, error: `fw-util` exited with status 2, stdout: '', stderr: ''"
                ))),
            },
            Case {
                name: "fw-util not installed",
                cmd_out: CommandOutput::failure(NO_EXIT_CODE, CommandError::Spawn { cmd: "fw-util".to_string(), reason: "not found".to_string() }),
                want: Err(ExitError::safe(anyhow!(
                    "Flashing failed with exit code -1, error: failed to start `fw-util`: not found, stdout: '', stderr: ''"
                ))),
            },
            Case {
                name: "fw-util killed on timeout",
                cmd_out: CommandOutput {
                    stdout: "Erasing flash".to_string(),
                    ..CommandOutput::failure(NO_EXIT_CODE, CommandError::Timeout { cmd: "fw-util".to_string(), secs: 1800 })
                },
                want: Err(ExitError::unsafe_to_reboot(anyhow!(
                    "Flashing failed with exit code -1, error: `fw-util` timed out after 1800s, stdout: 'Erasing flash', stderr: ''"
                ))),
            },
            Case {
                name: "fw-util died on a signal",
                cmd_out: CommandOutput::failure(NO_EXIT_CODE, CommandError::Wait {
                    cmd: "fw-util".to_string(),
                    reason: "terminated by signal (signal: 9 (SIGKILL))".to_string(),
                }),
                want: Err(ExitError::unsafe_to_reboot(anyhow!(
                    "Flashing failed with exit code -1, error: failed waiting for `fw-util`: terminated by signal (signal: 9 (SIGKILL)), stdout: '', stderr: ''"
                ))),
            },
        ];

        for case in cases {
            let seen = Mutex::new(Vec::new());
            let runner = FnCommandRunner::new(|argv: &[String], _timeout: i64| {
                seen.lock().unwrap().push(argv.last().cloned().unwrap_or_default());
                case.cmd_out.clone()
            });
            let (log, mut rx) = LogSink::channel();
            let params = example_params();

            let got = FlashFwUtil.run(&StepContext::new(&params, &runner, &log)).await;

            assert_eq!(got, case.want, "{}", case.name);
            assert_eq!(*seen.lock().unwrap(), vec!["/tmp/image".to_string()], "{}", case.name);
            let lines = drain_lines(&mut rx);
            log_contains_seq(&lines, &[
                "Flashing using fw-util method",
                "Attempting to flash with image file '/tmp/image'",
            ]).unwrap_or_else(|e| panic!("{}: {}", case.name, e));
        }
    }

    #[tokio::test]
    async fn run_fw_util_cmd_builds_exact_command() {
        struct Case {
            name: &'static str,
            cmd_out: CommandOutput,
            want: Option<&'static str>,
        }
        let cases = vec![
            Case { name: "basic succeeding", cmd_out: CommandOutput::success(""), want: None },
            Case {
                name: "cmd failed",
                cmd_out: CommandOutput::failure(1, CommandError::other("fw-util failed")),
                want: Some("Flashing failed with exit code 1, error: fw-util failed, stdout: '', stderr: ''"),
            },
        ];

        for case in cases {
            let runner = FnCommandRunner::new(|argv: &[String], timeout: i64| {
                assert_eq!(command_line(argv), "fw-util bmc --update bmc a");
                assert_eq!(timeout, FW_UTIL_TIMEOUT_SECS);
                case.cmd_out.clone()
            });
            let got = run_fw_util_cmd(&runner, "a").await;
            assert_eq!(got.err().map(|e| e.cause().to_string()).as_deref(), case.want, "{}", case.name);
        }
    }

    #[tokio::test]
    async fn device_id_does_not_change_the_command() {
        let seen = Mutex::new(String::new());
        let runner = FnCommandRunner::new(|argv: &[String], _timeout: i64| {
            *seen.lock().unwrap() = command_line(argv);
            CommandOutput::success("")
        });
        let (log, _rx) = LogSink::channel();
        let params = StepParams::new("a", "mtd:flash0");

        FlashFwUtil.run(&StepContext::new(&params, &runner, &log)).await.unwrap();

        assert_eq!(*seen.lock().unwrap(), "fw-util bmc --update bmc a");
    }

    #[tokio::test]
    async fn keeps_tool_output_in_the_cause() {
        let runner = FnCommandRunner::new(|_argv: &[String], _timeout: i64| CommandOutput {
            exit_code: 2,
            error: Some(CommandError::other("exit status 2")),
            stdout: "checking image".to_string(),
            stderr: "bad signature".to_string(),
        });
        let (log, _rx) = LogSink::channel();
        let params = example_params();

        let err = FlashFwUtil.run(&StepContext::new(&params, &runner, &log)).await.unwrap_err();

        assert!(err.is_safe_to_reboot());
        assert_eq!(
            err.cause().to_string(),
            "Flashing failed with exit code 2, error: exit status 2, stdout: 'checking image', stderr: 'bad signature'"
        );
    }
}
