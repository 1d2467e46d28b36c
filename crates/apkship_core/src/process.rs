//! External tool execution.
//!
//! Tools (apktool, apksigner) are run to completion with output captured.
//! Output lines go to the run logger's tail buffer; only the exit status
//! decides success. Arguments marked secret are masked wherever the
//! command line is displayed.

use std::ffi::OsStr;
use std::fmt;
use std::io::Read;
use std::path::Path;
use std::process::{Command, Output, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::logging::RunLogger;
use crate::orchestrator::{StageError, StageResult};

const MASK: &str = "****";

/// Lines of stderr kept in a command failure message.
const FAILURE_LINES: usize = 5;

/// How often a time-limited child is polled for exit.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
struct ToolArg {
    value: String,
    secret: bool,
}

/// Command line for an external tool.
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: String,
    args: Vec<ToolArg>,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Append a plain argument.
    pub fn arg(mut self, value: impl AsRef<OsStr>) -> Self {
        self.args.push(ToolArg {
            value: value.as_ref().to_string_lossy().into_owned(),
            secret: false,
        });
        self
    }

    /// Append a path argument.
    pub fn path(self, path: &Path) -> Self {
        self.arg(path.as_os_str())
    }

    /// Append an argument that must never be logged.
    pub fn secret(mut self, value: impl Into<String>) -> Self {
        self.args.push(ToolArg {
            value: value.into(),
            secret: true,
        });
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Tool name for error messages (file name of the program).
    pub fn tool_name(&self) -> String {
        Path::new(&self.program)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.clone())
    }

    /// Unmasked argument values.
    pub fn args(&self) -> impl Iterator<Item = &str> {
        self.args.iter().map(|a| a.value.as_str())
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            let shown = if arg.secret { MASK } else { arg.value.as_str() };
            if shown.contains(char::is_whitespace) {
                write!(f, " \"{}\"", shown)?;
            } else {
                write!(f, " {}", shown)?;
            }
        }
        Ok(())
    }
}

/// Captured result of a successful tool run.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs tool commands, reporting through the run logger.
#[derive(Clone)]
pub struct ToolRunner {
    logger: Arc<RunLogger>,
    limit: Option<Duration>,
}

impl ToolRunner {
    pub fn new(logger: Arc<RunLogger>) -> Self {
        Self {
            logger,
            limit: None,
        }
    }

    /// Kill any tool still running after `limit`.
    pub fn with_limit(mut self, limit: Option<Duration>) -> Self {
        self.limit = limit;
        self
    }

    pub fn logger(&self) -> &Arc<RunLogger> {
        &self.logger
    }

    /// Run `command` to completion.
    ///
    /// A spawn failure is an I/O error; a non-zero exit is a command
    /// failure carrying the tail of stderr (or stdout when stderr is empty).
    /// With a limit set, a tool still running at the deadline is killed and
    /// the run fails with a timeout.
    pub fn run(&self, command: &ToolCommand) -> StageResult<ToolOutput> {
        self.logger.command(&command.to_string());
        self.logger.clear_tail();

        let output = match self.limit {
            Some(limit) => self.output_within(command, limit)?,
            None => Command::new(command.program())
                .args(command.args())
                .output()
                .map_err(|e| spawn_error(command, e))?,
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        for line in stdout.lines() {
            self.logger.output_line(line, false);
        }
        for line in stderr.lines() {
            self.logger.output_line(line, true);
        }

        if !output.status.success() {
            let exit_code = output.status.code().unwrap_or(-1);
            self.logger
                .show_tail(&format!("{} output", command.tool_name()));
            let detail = if stderr.trim().is_empty() { &stdout } else { &stderr };
            return Err(StageError::command_failed(
                command.tool_name(),
                exit_code,
                last_lines(detail, FAILURE_LINES),
            ));
        }

        Ok(ToolOutput { stdout, stderr })
    }
}

impl ToolRunner {
    fn output_within(&self, command: &ToolCommand, limit: Duration) -> StageResult<Output> {
        let mut child = Command::new(command.program())
            .args(command.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| spawn_error(command, e))?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());
        let deadline = Instant::now() + limit;

        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    self.logger.warn(&format!(
                        "{} killed after {}s",
                        command.tool_name(),
                        limit.as_secs_f64()
                    ));
                    return Err(StageError::timeout(limit));
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    let _ = child.kill();
                    return Err(StageError::io_error(
                        format!("waiting for {}", command.tool_name()),
                        e,
                    ));
                }
            }
        };

        Ok(Output {
            status,
            stdout: stdout.join().unwrap_or_default(),
            stderr: stderr.join().unwrap_or_default(),
        })
    }
}

fn spawn_error(command: &ToolCommand, err: std::io::Error) -> StageError {
    StageError::io_error(format!("executing {}", command.tool_name()), err)
}

/// Read a child pipe to the end on its own thread.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

fn last_lines(text: &str, count: usize) -> String {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(count);
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::ErrorKind;

    #[test]
    fn display_masks_secrets() {
        let cmd = ToolCommand::new("apksigner")
            .arg("sign")
            .arg("--ks-pass")
            .secret("pass:hunter2")
            .path(Path::new("/tmp/my app.apk"));

        let shown = cmd.to_string();
        assert_eq!(shown, "apksigner sign --ks-pass **** \"/tmp/my app.apk\"");
        assert!(cmd.args().any(|a| a == "pass:hunter2"));
    }

    #[test]
    fn tool_name_strips_directories() {
        assert_eq!(ToolCommand::new("/opt/android/apksigner").tool_name(), "apksigner");
        assert_eq!(ToolCommand::new("apktool").tool_name(), "apktool");
    }

    #[test]
    fn last_lines_skips_blanks() {
        assert_eq!(last_lines("a\n\nb\nc\n", 2), "b\nc");
        assert_eq!(last_lines("", 3), "");
    }

    #[test]
    fn missing_program_is_io_error() {
        let runner = ToolRunner::new(RunLogger::quiet("t"));
        let err = runner
            .run(&ToolCommand::new("apkship-no-such-tool-xyz"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(matches!(err, StageError::IoError { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn non_zero_exit_is_command_failure() {
        let runner = ToolRunner::new(RunLogger::quiet("t"));
        let cmd = ToolCommand::new("sh")
            .arg("-c")
            .arg("echo working; echo 'W: broken resource' >&2; exit 3");

        match runner.run(&cmd).unwrap_err() {
            StageError::CommandFailed {
                tool,
                exit_code,
                message,
            } => {
                assert_eq!(tool, "sh");
                assert_eq!(exit_code, 3);
                assert_eq!(message, "W: broken resource");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(runner.logger().get_tail().len(), 2);
    }

    #[cfg(unix)]
    #[test]
    fn hung_tool_is_killed_at_limit() {
        let runner = ToolRunner::new(RunLogger::quiet("t"))
            .with_limit(Some(Duration::from_millis(100)));
        let started = Instant::now();

        let err = runner
            .run(&ToolCommand::new("sh").arg("-c").arg("sleep 10"))
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[cfg(unix)]
    #[test]
    fn limited_run_captures_output_and_exit_code() {
        let runner = ToolRunner::new(RunLogger::quiet("t"))
            .with_limit(Some(Duration::from_secs(10)));

        let out = runner
            .run(&ToolCommand::new("sh").arg("-c").arg("echo Verifies"))
            .unwrap();
        assert_eq!(out.stdout.trim(), "Verifies");

        let err = runner
            .run(&ToolCommand::new("sh").arg("-c").arg("echo bad >&2; exit 4"))
            .unwrap_err();
        assert!(matches!(err, StageError::CommandFailed { exit_code: 4, .. }));
    }

    #[cfg(unix)]
    #[test]
    fn success_captures_output() {
        let runner = ToolRunner::new(RunLogger::quiet("t"));
        let out = runner
            .run(&ToolCommand::new("sh").arg("-c").arg("echo Verifies"))
            .unwrap();
        assert_eq!(out.stdout.trim(), "Verifies");
    }
}
